//! Client side of the ngEO download manager (DM) protocol.
//!
//! The DM runs as a separate process next to the engine. Submitting a
//! download hands the DM a callback URL; the DM fetches the actual data
//! access request (DAR) document from that URL, downloads the listed
//! products into the directories the DAR names, and exposes progress
//! through its status endpoint.

pub mod client;
pub mod config;
pub mod dar;
pub mod error;

pub use client::{
    dar_response_url, DarRegistry, DarStatus, DmClient, DmClientConfig, ProductProgress,
    ProductStatus, SubmitOutcome, DAR_RESPONSE_PATH, PRODUCT_COMPLETED, PRODUCT_IN_ERROR,
};
pub use config::{ensure_download_dirs, wait_for_port, DmConfig};
pub use dar::{build_dar, DarEntry};
pub use error::{DmError, Result};
