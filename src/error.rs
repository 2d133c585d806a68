//! Error types for the bridge

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the bridge
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Upstream gateway call failure (timeout, connect error, non-success status)
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Unexpected JSON/XML payload shape
    #[error("payload error: {0}")]
    Payload(String),

    /// Attachment fetch failure (missing length, missing chunk buffer, decode error)
    #[error("download error: {0}")]
    Download(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML config parsing error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
