use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("repository not found: {url} (it may be private; pass an access token)")]
    RepoNotFound { url: String },

    #[error("repository is gated: {url} (request access on the hub, then retry with a token)")]
    GatedRepo { url: String },

    #[error("entry not found: {url}")]
    EntryNotFound { url: String },

    #[error("revision not found: {url}")]
    RevisionNotFound { url: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("{url} is not cached (offline mode is enabled; disable it to download)")]
    OfflineMiss { url: String },

    #[error("response for {url} carries no etag header")]
    NoEtag { url: String },

    #[error("malformed hub payload: {0}")]
    BadConfig(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid argument: {0}")]
    Argument(String),
}

impl HubError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| HubError::Io { path, source }
    }
}
