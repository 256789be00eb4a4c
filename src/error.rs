use serde::Serialize;
use thiserror::Error;

/// Failures talking to the movie catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Network(#[source] reqwest::Error),
    #[error("catalog returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("catalog response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NetworkFailure,
    DecodeFailure,
}

impl CatalogError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CatalogError::Network(_) | CatalogError::Status { .. } => FailureKind::NetworkFailure,
            CatalogError::Decode(_) => FailureKind::DecodeFailure,
        }
    }
}

/// Failures of the persistent key-value surface.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io failed for key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
    #[error("storage is unavailable: {0}")]
    Unavailable(String),
}
