//! Scenario ingestion.
//!
//! The pipeline for one run: query the catalogue for candidate
//! coverages, filter them against the scenario's conditions, hand the
//! surviving GetCoverage URLs to the download manager as one DAR, watch
//! the download, then write a product manifest per download directory
//! for the post-processing scripts.

pub mod archive;
pub mod dirs;
pub mod download;
pub mod error;
pub mod logic;
pub mod manifest;

pub use error::{IngestError, Result};
pub use logic::{IngestOutcome, IngestionEngine, IngestionConfig};
