//! Catalogue error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogueError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Service reported an exception: {0}")]
    ServiceException(String),

    #[error("Unexpected response root: expected {expected}, got {found}")]
    UnexpectedRoot { expected: String, found: String },

    #[error("Unsupported data source: {0}")]
    UnsupportedSource(String),

    #[error("Invalid filter value: {0}")]
    InvalidFilterValue(String),

    #[error("Invalid condition path: {0}")]
    InvalidConditionPath(String),

    #[error("Response too large: {size} bytes (limit {limit})")]
    ResponseTooLarge { size: usize, limit: usize },
}

pub type Result<T> = std::result::Result<T, CatalogueError>;
