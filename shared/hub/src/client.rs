use std::io::Write;
use std::path::Path;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use tracing::trace;

use crate::error::HubError;

pub(crate) const USER_AGENT: &str = concat!("silo/", env!("CARGO_PKG_VERSION"));

/// Thin HTTP adapter over `reqwest`. Redirects are disabled on purpose: the
/// cache performs its own redirect handling so it can strip credentials on
/// cross-origin hops.
#[derive(Clone, Debug)]
pub struct HubClient {
    http: reqwest::Client,
}

/// A fully buffered response.
#[derive(Debug)]
pub struct HubResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HubResponse {
    /// First value for a case-insensitive header name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

impl HubClient {
    pub fn new() -> Result<Self, HubError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http })
    }

    pub async fn request(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
    ) -> Result<HubResponse, HubError> {
        trace!("{method} {url}");
        let response = self.http.request(method, url).headers(headers).send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(HubResponse {
            status,
            headers,
            body,
        })
    }

    /// Streams `url` into `dest`. The body lands in a temporary file next to
    /// `dest` and is renamed into place, so a failed transfer never leaves a
    /// partial file visible under `dest`.
    pub async fn download(
        &self,
        url: &str,
        headers: HeaderMap,
        dest: &Path,
    ) -> Result<(), HubError> {
        let mut response = self.http.get(url).headers(headers).send().await?;
        if !response.status().is_success() {
            return Err(error_for_status(
                response.status().as_u16(),
                response.headers(),
                url,
            ));
        }

        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        let mut staged =
            tempfile::NamedTempFile::new_in(parent).map_err(HubError::io(parent))?;
        while let Some(chunk) = response.chunk().await? {
            staged.write_all(&chunk).map_err(HubError::io(dest))?;
        }
        staged.flush().map_err(HubError::io(dest))?;
        staged.persist(dest).map_err(|err| HubError::Io {
            path: dest.to_path_buf(),
            source: err.error,
        })?;
        trace!("downloaded {url} -> {}", dest.display());
        Ok(())
    }
}

/// Maps a non-success response to the error taxonomy. The hub reports the
/// precise condition in `x-error-code`; a bare 401 means the repository is
/// invisible to the caller.
pub(crate) fn error_for_status(status: u16, headers: &HeaderMap, url: &str) -> HubError {
    let code = headers
        .get("x-error-code")
        .and_then(|value| value.to_str().ok());
    let url = url.to_string();
    match code {
        Some("RepoNotFound") => HubError::RepoNotFound { url },
        Some("GatedRepo") => HubError::GatedRepo { url },
        Some("EntryNotFound") => HubError::EntryNotFound { url },
        Some("RevisionNotFound") => HubError::RevisionNotFound { url },
        _ if status == 401 => HubError::RepoNotFound { url },
        _ => HubError::HttpStatus { status, url },
    }
}

pub(crate) fn bearer_header(token: &str) -> Result<HeaderValue, HubError> {
    HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| HubError::Argument("auth token contains invalid header characters".into()))
}
