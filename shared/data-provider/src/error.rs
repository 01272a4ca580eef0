use std::path::PathBuf;

use silo_hub::HubError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Hub(HubError),

    #[error("failed decoding {origin}: {reason}")]
    Decode { origin: String, reason: String },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid argument: {0}")]
    Argument(String),
}

impl From<HubError> for LoadError {
    fn from(err: HubError) -> Self {
        match err {
            // Programmer faults keep their own kind end to end.
            HubError::Argument(message) => LoadError::Argument(message),
            other => LoadError::Hub(other),
        }
    }
}
