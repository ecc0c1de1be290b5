//! EO-WCS catalogue access.
//!
//! Talks to a WCS 2.0 endpoint with the EO application profile:
//! GetCapabilities to enumerate dataset series, DescribeEOCoverageSet to
//! list candidate coverages, and GetCoverage URL construction for the
//! actual product downloads. Responses are parsed into a small DOM and
//! picked apart by the extractors in [`metadata`]; [`conditions`] holds
//! the per-product filter predicates.

pub mod client;
pub mod conditions;
pub mod error;
pub mod metadata;
pub mod ns;
pub mod xml;

pub use client::{CatalogueClient, ClientConfig, SourceKind};
pub use error::{CatalogueError, Result};
pub use xml::Element;
