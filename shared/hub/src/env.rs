use std::path::PathBuf;

/// Overrides the OS user-cache default as the cache root.
pub const CACHE_DIR_VAR: &str = "DATASETS_CACHE_DIR";
/// `"1"` or `"true"` forces offline mode process-wide.
pub const OFFLINE_VAR: &str = "DATASETS_OFFLINE";
/// Default bearer token; must begin with `hf_` to be used.
pub const TOKEN_VAR: &str = "HF_TOKEN";

pub fn default_cache_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CACHE_DIR_VAR) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("silo")
}

pub fn offline_default() -> bool {
    offline_from(std::env::var(OFFLINE_VAR).ok().as_deref())
}

fn offline_from(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true"))
}

pub fn default_token() -> Option<String> {
    valid_token(std::env::var(TOKEN_VAR).ok().as_deref()).map(str::to_string)
}

/// Tokens without the `hf_` prefix are treated as no token at all.
pub(crate) fn valid_token(value: Option<&str>) -> Option<&str> {
    value.filter(|token| token.starts_with("hf_"))
}
