//! Archive bookkeeping for downloaded products.
//!
//! After a product is downloaded its EO metadata file is parsed for the
//! product identifier, which goes into the archive table so later runs
//! with the archived-check enabled skip it.

use std::path::Path;

use catalogue::{metadata, Element};
use storage::ScenarioStore;
use tracing::{info, warn};

use crate::error::Result;

/// Pull the product identifier out of one metadata file and record it
/// for the scenario. A file without an identifier is logged and skipped
/// so one odd product does not fail the run.
pub async fn archive_metadata(store: &ScenarioStore, ncn_id: &str, metafile: &Path) -> Result<()> {
    let text = std::fs::read_to_string(metafile)?;
    let root = match Element::parse(&text) {
        Ok(root) => root,
        Err(e) => {
            warn!(file = %metafile.display(), error = %e, "unparsable metadata file");
            return Ok(());
        }
    };

    let eo = if root.name == "EarthObservation" {
        &root
    } else {
        match metadata::earth_observation(&root) {
            Some(eo) => eo,
            None => {
                warn!(file = %metafile.display(), "no EarthObservation in metadata file");
                return Ok(());
            }
        }
    };

    match metadata::identifier(eo) {
        Some(eoid) => {
            if store.add_archived(ncn_id, &eoid).await? {
                info!(ncn_id, %eoid, "product archived");
            }
        }
        None => {
            warn!(file = %metafile.display(), "metadata file carries no identifier");
        }
    }
    Ok(())
}
