//! Common value types shared across the eo-ingest services.

pub mod bbox;
pub mod time;

pub use bbox::{Bbox, BboxParseError};
pub use time::{TimeParseError, TimePeriod};
