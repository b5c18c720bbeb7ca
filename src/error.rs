/// Error types for the viewer's boundaries
///
/// Each boundary owns one error enum. Most of these are absorbed where
/// they occur (fallback data, empty tables, placeholder images); only
/// storage write failures and missing selections reach the UI.
use thiserror::Error;

/// Failures of the local key/value store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode stored value: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not determine a user data directory")]
    NoDataDir,
}

/// Failures while fetching the remote damage list
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server responded with status {0}")]
    Status(u16),

    #[error("server rejected the request: {0}")]
    Rejected(String),
}

/// Failures of the cross-page selection handoff
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandoffError {
    #[error("no damage record has been selected")]
    MissingSelection,
}

/// Failures while loading an image reference
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server responded with status {0}")]
    Status(u16),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}
