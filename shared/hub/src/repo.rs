use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::cache::{cached_download, DownloadMode, FetchOptions, VerificationMode};
use crate::client::HubClient;
use crate::env;
use crate::error::HubError;

pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";
pub const DEFAULT_REVISION: &str = "main";

/// Filename -> etag. Local files carry no etag. The ordered map keeps
/// listing iteration deterministic for a given input.
pub type Listing = BTreeMap<String, Option<String>>;

/// A dataset repository: either a plain directory on disk or a repository
/// on the hub addressed as `owner/name`.
#[derive(Clone, Debug)]
pub enum Repository {
    Local(PathBuf),
    Remote(RemoteRepo),
}

#[derive(Clone, Debug)]
pub struct RemoteRepo {
    pub repo_id: String,
    pub endpoint: String,
    pub revision: String,
    /// Path prefix within the repository; stripped from listing entries and
    /// re-added on download.
    pub subdir: Option<String>,
    pub auth_token: Option<String>,
    pub cache_dir: PathBuf,
    pub offline: Option<bool>,
    pub download_mode: DownloadMode,
    pub verification_mode: VerificationMode,
    pub etag: Option<String>,
}

impl RemoteRepo {
    pub fn new(repo_id: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            revision: DEFAULT_REVISION.to_string(),
            subdir: None,
            auth_token: env::default_token(),
            cache_dir: env::default_cache_dir(),
            offline: None,
            download_mode: DownloadMode::default(),
            verification_mode: VerificationMode::default(),
            etag: None,
        }
    }

    pub fn tree_url(&self) -> String {
        let base = format!(
            "{}/api/datasets/{}/tree/{}",
            self.endpoint, self.repo_id, self.revision
        );
        match &self.subdir {
            Some(subdir) => format!("{base}/{subdir}"),
            None => base,
        }
    }

    pub fn resolve_url(&self, filename: &str) -> String {
        let path = match &self.subdir {
            Some(subdir) => format!("{subdir}/{filename}"),
            None => filename.to_string(),
        };
        format!(
            "{}/datasets/{}/resolve/{}/{}",
            self.endpoint, self.repo_id, self.revision, path
        )
    }

    pub fn info_url(&self) -> String {
        format!("{}/api/datasets/{}", self.endpoint, self.repo_id)
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            cache_dir: self.cache_dir.clone(),
            cache_scope: Some(cache_scope(&self.repo_id)),
            auth_token: self.auth_token.clone(),
            etag: None,
            offline: self.offline,
            download_mode: self.download_mode,
            verification_mode: self.verification_mode,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    oid: Option<String>,
    lfs: Option<LfsPointer>,
}

#[derive(Debug, Deserialize)]
struct LfsPointer {
    oid: String,
}

impl Repository {
    pub fn local(dir: impl Into<PathBuf>) -> Self {
        Repository::Local(dir.into())
    }

    pub fn remote(repo_id: impl Into<String>) -> Self {
        Repository::Remote(RemoteRepo::new(repo_id))
    }

    /// Validates the handle before any I/O happens. Malformed handles are a
    /// programmer error and fail fast with `HubError::Argument`.
    pub fn normalize(self) -> Result<Self, HubError> {
        if let Repository::Remote(remote) = &self {
            let mut parts = remote.repo_id.split('/');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {}
                _ => {
                    return Err(HubError::Argument(format!(
                        "repository id '{}' is not of the form owner/name",
                        remote.repo_id
                    )))
                }
            }
            if remote.revision.is_empty() {
                return Err(HubError::Argument("revision must not be empty".into()));
            }
            if let Some(subdir) = &remote.subdir {
                if subdir.is_empty() || subdir.starts_with('/') {
                    return Err(HubError::Argument(format!(
                        "subdir '{subdir}' must be a relative path"
                    )));
                }
            }
        }
        Ok(self)
    }

    pub async fn list(&self, client: &HubClient) -> Result<Listing, HubError> {
        match self {
            Repository::Local(dir) => list_local(dir),
            Repository::Remote(remote) => list_remote(client, remote).await,
        }
    }

    /// Fetches a single file and returns its local path. The etag hint, when
    /// the caller already knows one from a listing, enables the cache's
    /// probe-free path.
    pub async fn download(
        &self,
        client: &HubClient,
        filename: &str,
        etag: Option<&str>,
    ) -> Result<PathBuf, HubError> {
        match self {
            Repository::Local(dir) => {
                let path = dir.join(filename);
                if !path.is_file() {
                    return Err(HubError::EntryNotFound {
                        url: path.display().to_string(),
                    });
                }
                std::fs::canonicalize(&path).map_err(HubError::io(&path))
            }
            Repository::Remote(remote) => {
                let url = remote.resolve_url(filename);
                let mut opts = remote.fetch_options();
                opts.etag = etag.map(str::to_string).or_else(|| remote.etag.clone());
                cached_download(client, &url, &opts).await
            }
        }
    }
}

impl Display for Repository {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Repository::Local(dir) => write!(f, "{}", dir.display()),
            Repository::Remote(remote) => write!(f, "{}@{}", remote.repo_id, remote.revision),
        }
    }
}

/// Per-repository cache namespace: slashes become `--`, anything outside
/// `[A-Za-z0-9_-]` is dropped.
pub fn cache_scope(repo_id: &str) -> String {
    let mut scope = String::with_capacity(repo_id.len() + 2);
    for ch in repo_id.chars() {
        if ch == '/' {
            scope.push_str("--");
        } else if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            scope.push(ch);
        }
    }
    scope
}

fn list_local(dir: &Path) -> Result<Listing, HubError> {
    let mut listing = Listing::new();
    for entry in std::fs::read_dir(dir).map_err(HubError::io(dir))? {
        let entry = entry.map_err(HubError::io(dir))?;
        let file_type = entry.file_type().map_err(HubError::io(entry.path()))?;
        if !file_type.is_file() {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            listing.insert(name, None);
        }
    }
    debug!("listed {} file(s) in {}", listing.len(), dir.display());
    Ok(listing)
}

async fn list_remote(client: &HubClient, remote: &RemoteRepo) -> Result<Listing, HubError> {
    let url = remote.tree_url();
    let listing_path = cached_download(client, &url, &remote.fetch_options()).await?;
    let bytes = std::fs::read(&listing_path).map_err(HubError::io(&listing_path))?;
    let entries: Vec<TreeEntry> = serde_json::from_slice(&bytes).map_err(|err| {
        HubError::BadConfig(format!(
            "failed parsing file listing of {}: {err}",
            remote.repo_id
        ))
    })?;

    let mut listing = Listing::new();
    for entry in entries {
        if entry.kind != "file" {
            continue;
        }
        // Large files resolve to their LFS object; the hub serves that oid
        // as the etag on HEAD, quotes included.
        let oid = match (entry.lfs, entry.oid) {
            (Some(lfs), _) => lfs.oid,
            (None, Some(oid)) => oid,
            (None, None) => continue,
        };
        let filename = match &remote.subdir {
            Some(subdir) => match entry.path.strip_prefix(&format!("{subdir}/")) {
                Some(stripped) => stripped.to_string(),
                None => entry.path,
            },
            None => entry.path,
        };
        listing.insert(filename, Some(format!("\"{oid}\"")));
    }
    debug!("listed {} file(s) in {}", listing.len(), remote.repo_id);
    Ok(listing)
}
