//! Product manifests.
//!
//! The post-processing scripts take one manifest file per product
//! directory: shell-style `KEY="value"` lines naming the scenario, the
//! directory and the metadata and data files in it.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{IngestError, Result};

pub const MANIFEST_FN: &str = "MANIFEST";
pub const META_SUFFIX: &str = ".meta";
const MAX_MANIF_FILES: u32 = 750_000;

/// Write `contents` to `MANIFEST` in `dir`, falling back to
/// `MANIFEST_1`, `MANIFEST_2`, .. when earlier ones exist.
pub fn write_manifest_file(dir: &Path, contents: &str) -> Result<PathBuf> {
    let mut mf_name = dir.join(MANIFEST_FN);
    if mf_name.exists() {
        warn!(dir = %dir.display(), "MANIFEST file already exists, creating another one");
        let mut i = 0;
        while mf_name.exists() {
            i += 1;
            if i > MAX_MANIF_FILES {
                return Err(IngestError::Failed(format!(
                    "Too many manifest files (>{})",
                    MAX_MANIF_FILES
                )));
            }
            mf_name = dir.join(format!("{}_{}", MANIFEST_FN, i));
        }
    }
    std::fs::write(&mf_name, contents)?;
    Ok(mf_name)
}

/// Build and write a manifest naming the given files, all relative to
/// `dir`. Used for local ingests where the caller knows the file names.
pub fn create_manifest(
    ncn_id: &str,
    dir: &Path,
    metadata: Option<&str>,
    data: Option<&str>,
    orig_data: Option<&str>,
) -> Result<PathBuf> {
    let mut manif = format!(
        "SCENARIO_NCN_ID=\"{}\"\nDOWNLOAD_DIR=\"{}\"\n",
        ncn_id,
        dir.display()
    );
    if let Some(metadata) = metadata {
        manif.push_str(&format!("METADATA=\"{}\"\n", dir.join(metadata).display()));
    }
    if let Some(data) = data {
        manif.push_str(&format!("DATA=\"{}\"\n", dir.join(data).display()));
    }
    if let Some(orig) = orig_data {
        manif.push_str(&format!("ORIG_DATA=\"{}\"\n", dir.join(orig).display()));
    }
    write_manifest_file(dir, &manif)
}

/// Pair up the downloaded files in one product directory and write its
/// manifest. Returns the manifest path and the metadata files found, or
/// `None` when the directory holds no usable product.
pub fn product_manifest(dir: &Path, ncn_id: &str) -> Result<Option<(PathBuf, Vec<PathBuf>)>> {
    let mut metafiles = Vec::new();
    let mut datafiles = Vec::new();

    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    for path in entries {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        if name.starts_with(MANIFEST_FN) {
            warn!(file = name, "ignoring leftover manifest");
            continue;
        }
        if name.ends_with(META_SUFFIX) {
            metafiles.push(path);
        } else {
            datafiles.push(path);
        }
    }

    if metafiles.is_empty() || datafiles.is_empty() {
        warn!(
            dir = %dir.display(),
            n_meta = metafiles.len(),
            n_data = datafiles.len(),
            "incomplete product, no manifest written"
        );
        return Ok(None);
    }
    if metafiles.len() != datafiles.len() {
        warn!(
            dir = %dir.display(),
            n_meta = metafiles.len(),
            n_data = datafiles.len(),
            "unpaired product files"
        );
    }

    let mut manif = format!(
        "SCENARIO_NCN_ID=\"{}\"\nDOWNLOAD_DIR=\"{}\"\n",
        ncn_id,
        dir.display()
    );
    for m in &metafiles {
        manif.push_str(&format!("METADATA=\"{}\"\n", m.display()));
    }
    for d in &datafiles {
        manif.push_str(&format!("DATA=\"{}\"\n", d.display()));
    }

    let mf_name = write_manifest_file(dir, &manif)?;
    Ok(Some((mf_name, metafiles)))
}
