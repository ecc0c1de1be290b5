//! Scenario domain types and the status vocabulary.

use chrono::{DateTime, Utc};
use eo_common::{Bbox, TimePeriod};
use serde::{Deserialize, Serialize};

/// An ingestion scenario: what to fetch, from where, under which
/// conditions, and what to run afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Stable scenario identifier, used in directory and file names.
    pub ncn_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,

    /// Data source endpoint URL.
    pub dsrc: String,
    /// Data source flavour, "EOWCS" or "OSCAT".
    pub dsrc_type: String,

    /// Area of interest.
    pub aoi: Bbox,
    /// Acquisition time window; both ends optional.
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,

    /// Filter values kept as entered; validation happens when the
    /// filters run, so a bad value fails the run, not the save.
    #[serde(default)]
    pub cloud_cover: Option<String>,
    #[serde(default)]
    pub view_angle: Option<String>,
    #[serde(default)]
    pub sensor_type: Option<String>,

    /// Dataset series to search; empty means all advertised series.
    #[serde(default)]
    pub dssids: Vec<String>,
    /// Extra (element path, expected text) conditions, ANDed.
    #[serde(default)]
    pub custom_conditions: Vec<(String, String)>,

    /// Auto-ingest repeat interval in minutes; 0 disables it.
    #[serde(default)]
    pub repeat_interval: i64,
    /// Earliest time the next auto-ingest may run.
    pub starting_date: DateTime<Utc>,

    #[serde(default)]
    pub coastline_check: bool,
    /// Land polygon file for the coastline check.
    #[serde(default)]
    pub coastline_file: Option<String>,
    /// Skip products already in the archive.
    #[serde(default)]
    pub check_archived: bool,
    /// Register ingested products in the external catalogue.
    #[serde(default)]
    pub cat_registration: bool,
    /// Request only the AOI subset of each coverage.
    #[serde(default)]
    pub download_subset: bool,
    /// Tar up the result directory after the scripts ran.
    #[serde(default)]
    pub tar_result: bool,

    /// Post-download scripts, run in order for every product.
    #[serde(default)]
    pub ingest_scripts: Vec<String>,
    /// Scripts run when the scenario's products are deleted.
    #[serde(default)]
    pub delete_scripts: Vec<String>,
}

impl Scenario {
    /// The acquisition window as a period, when both ends are set.
    pub fn period(&self) -> Option<TimePeriod> {
        match (self.from_date, self.to_date) {
            (Some(from), Some(to)) => Some(TimePeriod::new(from, to)),
            _ => None,
        }
    }
}

/// Live status row for one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioStatus {
    pub ncn_id: String,
    /// Scenario lock: false while a worker owns the scenario.
    pub is_available: bool,
    /// Operator-facing status text, see [`status_text`].
    pub status: String,
    /// Percent done of the current phase.
    pub done: f64,
    /// Callback URL of the download in progress, empty when none.
    pub active_dar: String,
    /// Task id of the worker processing the scenario, 0 when none.
    pub ingestion_pid: i64,
}

/// One add-product operation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInfo {
    pub id: i64,
    pub info_date: DateTime<Utc>,
    pub info_status: String,
    pub info_error: String,
    pub new_product_id: String,
    pub product_url: String,
}

/// The operator-facing status vocabulary. Tests and the UI match on
/// these strings, so they are defined once.
pub mod status_text {
    use chrono::{DateTime, Utc};

    pub const IDLE: &str = "IDLE";
    pub const QUEUED: &str = "QUEUED";
    pub const GENERATING_URLS: &str = "GENERATING URLS";
    pub const CREATE_DAR: &str = "Create DAR: get MD";
    pub const DOWNLOADING: &str = "Downloading";
    pub const RUNNING_SCRIPTS: &str = "RUNNING SCRIPTS";
    /// Sentinel written by a stop request; workers poll for it.
    pub const STOP_REQUEST: &str = "STOP_REQUEST";
    pub const STOPPED_IDLE: &str = "STOPPED, IDLE";
    pub const INGEST_ERROR: &str = "INGEST ERROR";
    pub const NOTHING_INGESTED: &str = "NOTHING INGESTED";
    pub const DELETE_DEREG: &str = "DELETE: De-reg products.";
    pub const DELETING: &str = "DELETING";
    pub const NOT_DELETED_ERROR: &str = "NOT DELETED - ERROR.";
    pub const LOCAL_INGEST_UNPACK: &str = "LOCAL ING.: UNPACK";

    pub fn downloading(n_done: usize, n_total: usize) -> String {
        format!("{} ({}/{})", DOWNLOADING, n_done, n_total)
    }

    pub fn finished_dl(n_products: usize) -> String {
        format!("Finished Dl. ({})", n_products)
    }

    pub fn dl_errors(n_errors: usize) -> String {
        format!("{} errors during Dl.", n_errors)
    }

    pub fn ok_at(t: DateTime<Utc>) -> String {
        format!("OK {}", t.format("%Y-%m-%d %H:%M"))
    }
}
