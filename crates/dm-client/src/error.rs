//! Download manager error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DmError {
    #[error("HTTP request to download manager failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed download manager response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to serialize DAR document: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid download manager configuration: {0}")]
    Config(String),

    #[error("Download manager rejected the request: {0}")]
    Rejected(String),

    #[error("Download manager protocol error: {0}")]
    Protocol(String),

    #[error("Timed out waiting for download manager: {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, DmError>;
