use std::io::Write;
use std::path::{Path, PathBuf};

use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use url::Url;

use crate::client::{bearer_header, error_for_status, HubClient};
use crate::env;
use crate::error::HubError;

/// Fixed subdirectory under the cache root. Part of the stable on-disk
/// layout; other tools read it.
pub const CACHE_SUBDIR: &str = "huggingface";

const MAX_REDIRECT_HOPS: usize = 5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DownloadMode {
    #[default]
    ReuseIfExists,
    ForceRedownload,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VerificationMode {
    #[default]
    BasicChecks,
    NoChecks,
}

#[derive(Clone, Debug)]
pub struct FetchOptions {
    pub cache_dir: PathBuf,
    pub cache_scope: Option<String>,
    pub auth_token: Option<String>,
    /// Known etag for the resource. When the cache already holds this exact
    /// version, the probe is skipped entirely.
    pub etag: Option<String>,
    /// `None` defers to the `DATASETS_OFFLINE` environment variable.
    pub offline: Option<bool>,
    pub download_mode: DownloadMode,
    pub verification_mode: VerificationMode,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            cache_dir: env::default_cache_dir(),
            cache_scope: None,
            auth_token: None,
            etag: None,
            offline: None,
            download_mode: DownloadMode::default(),
            verification_mode: VerificationMode::default(),
        }
    }
}

impl FetchOptions {
    fn offline(&self) -> bool {
        self.offline.unwrap_or_else(env::offline_default)
    }

    fn entry_dir(&self) -> PathBuf {
        let base = self.cache_dir.join(CACHE_SUBDIR);
        match &self.cache_scope {
            Some(scope) => base.join(scope),
            None => base,
        }
    }
}

/// Outcome of the HEAD probe: the strong validator, plus where the payload
/// actually lives after redirect handling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadInfo {
    /// Stored verbatim, surrounding quotes included.
    pub etag: String,
    pub final_url: String,
    /// True once a cross-origin hop happened; the follow-up GET must not
    /// carry credentials either.
    pub was_redirected: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    etag: String,
    url: String,
}

/// `base32(md5(url))`, lowercase, unpadded. Cache filenames are pure
/// functions of the URL and etag; no process-local state leaks into them.
pub fn encode_url(url: &str) -> String {
    let digest = md5::compute(url.as_bytes());
    base32_lower(&digest.0)
}

/// `base32(etag)`, lowercase, unpadded, over the verbatim etag bytes.
pub fn encode_etag(etag: &str) -> String {
    base32_lower(etag.as_bytes())
}

fn base32_lower(bytes: &[u8]) -> String {
    base32::encode(base32::Alphabet::Rfc4648 { padding: false }, bytes).to_ascii_lowercase()
}

pub fn metadata_path(dir: &Path, url: &str) -> PathBuf {
    dir.join(format!("{}.json", encode_url(url)))
}

pub fn content_path(dir: &Path, url: &str, etag: &str) -> PathBuf {
    dir.join(format!("{}.{}", encode_url(url), encode_etag(etag)))
}

/// Returns a local path holding a byte-identical copy of `url`, detecting
/// staleness through the server's strong validator.
pub async fn cached_download(
    client: &HubClient,
    url: &str,
    opts: &FetchOptions,
) -> Result<PathBuf, HubError> {
    let dir = opts.entry_dir();
    std::fs::create_dir_all(&dir).map_err(HubError::io(&dir))?;
    let meta_path = metadata_path(&dir, url);

    if opts.download_mode == DownloadMode::ForceRedownload {
        match std::fs::remove_file(&meta_path) {
            Ok(()) => debug!("dropped cache metadata of {url} for forced redownload"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(HubError::io(&meta_path)(err)),
        }
    }

    if opts.offline() {
        return match read_meta(&meta_path) {
            Some(meta) => {
                let content = content_path(&dir, url, &meta.etag);
                if content.is_file() || opts.verification_mode == VerificationMode::NoChecks {
                    Ok(content)
                } else {
                    Err(HubError::OfflineMiss {
                        url: url.to_string(),
                    })
                }
            }
            None => Err(HubError::OfflineMiss {
                url: url.to_string(),
            }),
        };
    }

    if let Some(expected) = &opts.etag {
        if let Some(meta) = read_meta(&meta_path) {
            if meta.etag == *expected {
                let content = content_path(&dir, url, &meta.etag);
                if content.is_file() {
                    trace!("etag hint matched cached copy of {url}, skipping probe");
                    return Ok(content);
                }
            }
        }
    }

    let head = head_download(client, url, opts.auth_token.as_deref()).await?;
    let content = content_path(&dir, url, &head.etag);

    if opts.download_mode == DownloadMode::ReuseIfExists {
        if let Some(meta) = read_meta(&meta_path) {
            if meta.etag == head.etag && content.is_file() {
                trace!("cached copy of {url} is current");
                return Ok(content);
            }
        }
    }

    debug!("downloading {url} via {}", head.final_url);
    let mut headers = HeaderMap::new();
    if !head.was_redirected {
        if let Some(token) = &opts.auth_token {
            headers.insert(AUTHORIZATION, bearer_header(token)?);
        }
    }
    if let Err(err) = client.download(&head.final_url, headers, &content).await {
        rollback(&meta_path, &content);
        return Err(err);
    }
    let meta = CacheMeta {
        etag: head.etag,
        url: url.to_string(),
    };
    if let Err(err) = write_meta(&meta_path, &meta) {
        rollback(&meta_path, &content);
        return Err(err);
    }
    Ok(content)
}

/// The HEAD-and-follow half of the cache, for callers that manage storage
/// themselves. Relative `Location`s are same-origin path swaps and keep the
/// original headers; absolute `Location`s point off-origin, so the
/// `Authorization` header is dropped before following.
pub async fn head_download(
    client: &HubClient,
    url: &str,
    auth_token: Option<&str>,
) -> Result<HeadInfo, HubError> {
    let mut current = Url::parse(url)
        .map_err(|err| HubError::Argument(format!("invalid url {url}: {err}")))?;
    let mut authorized = auth_token.is_some();
    let mut was_redirected = false;

    for _ in 0..MAX_REDIRECT_HOPS {
        let mut headers = HeaderMap::new();
        if authorized {
            if let Some(token) = auth_token {
                headers.insert(AUTHORIZATION, bearer_header(token)?);
            }
        }
        let response = client
            .request(Method::HEAD, current.as_str(), headers)
            .await?;

        if (300..400).contains(&response.status) {
            let location = response.header("location").ok_or_else(|| {
                HubError::BadConfig(format!("redirect from {current} without a Location header"))
            })?;
            match Url::parse(location) {
                Ok(absolute) => {
                    trace!("following cross-origin redirect to {absolute}");
                    authorized = false;
                    was_redirected = true;
                    current = absolute;
                }
                Err(url::ParseError::RelativeUrlWithoutBase) => {
                    current = current.join(location).map_err(|err| {
                        HubError::BadConfig(format!("bad redirect location {location}: {err}"))
                    })?;
                }
                Err(err) => {
                    return Err(HubError::BadConfig(format!(
                        "bad redirect location {location}: {err}"
                    )))
                }
            }
            continue;
        }

        if !(100..400).contains(&response.status) {
            return Err(error_for_status(
                response.status,
                &response.headers,
                current.as_str(),
            ));
        }

        let etag = response
            .header("x-linked-etag")
            .or_else(|| response.header("etag"))
            .ok_or_else(|| HubError::NoEtag {
                url: current.to_string(),
            })?;
        return Ok(HeadInfo {
            etag: etag.to_string(),
            final_url: current.to_string(),
            was_redirected,
        });
    }

    Err(HubError::BadConfig(format!(
        "redirect chain for {url} exceeded {MAX_REDIRECT_HOPS} hops"
    )))
}

fn read_meta(path: &Path) -> Option<CacheMeta> {
    let bytes = std::fs::read(path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(meta) => Some(meta),
        Err(err) => {
            // A concurrent writer may have been interrupted mid-rename on a
            // non-atomic filesystem; an unreadable entry counts as absent.
            warn!(
                "treating unreadable cache metadata {} as absent: {err}",
                path.display()
            );
            None
        }
    }
}

fn write_meta(path: &Path, meta: &CacheMeta) -> Result<(), HubError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = tempfile::NamedTempFile::new_in(parent).map_err(HubError::io(parent))?;
    serde_json::to_writer(&mut staged, meta)
        .map_err(|err| HubError::BadConfig(format!("failed encoding cache metadata: {err}")))?;
    staged.flush().map_err(HubError::io(path))?;
    staged.persist(path).map_err(|err| HubError::Io {
        path: path.to_path_buf(),
        source: err.error,
    })?;
    Ok(())
}

/// Drops both halves of an entry so a failed transfer leaves the cache in
/// the "absent" state rather than a metadata/content mismatch.
fn rollback(meta_path: &Path, content_path: &Path) {
    for path in [meta_path, content_path] {
        if let Err(err) = std::fs::remove_file(path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("failed rolling back cache file {}: {err}", path.display());
            }
        }
    }
}
