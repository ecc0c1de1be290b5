//! Scenario persistence.
//!
//! Scenarios, their live status rows, the archive of already-ingested
//! product ids and add-product operation records all live in one SQLite
//! database. The status row doubles as the cross-worker lock: flipping
//! `is_available` and `active_dar` happens through conditional UPDATEs
//! so concurrent workers cannot both claim a scenario.

pub mod error;
pub mod model;
pub mod store;

pub use error::{Result, StorageError};
pub use model::{status_text, ProductInfo, Scenario, ScenarioStatus};
pub use store::ScenarioStore;
