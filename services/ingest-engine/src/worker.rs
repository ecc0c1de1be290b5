//! Task execution.
//!
//! `do_task` is the dispatch boundary: every error a task produces is
//! converted into a terminal scenario status here, so a misbehaving job
//! never takes a worker down. A stop request surfaces as
//! `IngestError::Stopped` and ends in `STOPPED, IDLE` rather than an
//! error status.

use std::path::{Path, PathBuf};

use chrono::Utc;
use ingestion::{archive, dirs, manifest, IngestError, IngestOutcome};
use metrics::counter;
use serde::Deserialize;
use storage::status_text;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::engine::{Task, WorkflowEngine};

/// One add-product request as accepted by the HTTP interface.
#[derive(Debug, Clone, Deserialize)]
pub struct AddProductRequest {
    /// Path of the product data file.
    pub data: String,
    /// Path of the product metadata file.
    pub metadata: String,
    /// Coverage id of an existing product to replace; a request
    /// without one adds a new product.
    #[serde(rename = "productID", default)]
    pub product_id: Option<String>,
}

/// Run one task to completion, converting its outcome into terminal
/// status records.
pub async fn do_task(engine: &WorkflowEngine, task: Task, task_id: i64) {
    counter!("tasks_dispatched_total").increment(1);
    info!(kind = task.kind(), ncn_id = task.ncn_id(), task_id, "task started");

    match task {
        Task::Ingest { ncn_id } => ingest_task(engine, &ncn_id, task_id).await,
        Task::Delete { ncn_id } => delete_task(engine, &ncn_id, task_id).await,
        Task::IngestLocal {
            ncn_id,
            dir,
            metadata,
            data,
        } => ingest_local_task(engine, &ncn_id, &dir, &metadata, &data, task_id).await,
        Task::AddProduct { info_id, request } => add_product_task(engine, info_id, request).await,
    }

    counter!("tasks_completed_total").increment(1);
}

/// Set a terminal status, logging rather than propagating store errors:
/// at this point the task outcome is already decided.
async fn finalize_status(engine: &WorkflowEngine, ncn_id: &str, status: &str) {
    if let Err(e) = engine.store.set_status(ncn_id, true, status, 0.0).await {
        error!(ncn_id, error = %e, "cannot record terminal status");
    }
    if let Err(e) = engine.store.set_pid(ncn_id, 0).await {
        error!(ncn_id, error = %e, "cannot clear worker id");
    }
}

async fn ingest_task(engine: &WorkflowEngine, ncn_id: &str, task_id: i64) {
    let status = match run_ingest(engine, ncn_id, task_id).await {
        Ok(status) => status,
        Err(e) if e.is_stop() => {
            info!(ncn_id, "ingestion stopped by request");
            status_text::STOPPED_IDLE.to_string()
        }
        Err(e) => {
            error!(ncn_id, error = %e, "ingestion failed");
            status_text::INGEST_ERROR.to_string()
        }
    };
    finalize_status(engine, ncn_id, &status).await;
}

async fn run_ingest(
    engine: &WorkflowEngine,
    ncn_id: &str,
    task_id: i64,
) -> ingestion::Result<String> {
    engine
        .store
        .set_status(ncn_id, false, status_text::GENERATING_URLS, 1.0)
        .await?;
    engine.store.set_pid(ncn_id, task_id).await?;

    let sc = engine
        .store
        .get_scenario(ncn_id)
        .await?
        .ok_or_else(|| IngestError::Failed(format!("no such scenario '{}'", ncn_id)))?;

    match engine.ingestion.ingest(&sc).await? {
        IngestOutcome::NothingIngested => Ok(status_text::NOTHING_INGESTED.to_string()),
        IngestOutcome::Downloaded {
            dl_dir, dl_errors, ..
        } => {
            let script_errors = post_download_actions(engine, &sc, &dl_dir).await?;
            let n_errors = dl_errors + script_errors;
            if n_errors > 0 {
                return Err(IngestError::Failed(format!(
                    "{} errors during ingestion of '{}'",
                    n_errors, ncn_id
                )));
            }
            Ok(status_text::ok_at(Utc::now()))
        }
    }
}

/// Write a manifest per product directory, archive the product ids and
/// run the scenario's ingest scripts. Returns the error count; per
/// product failures do not stop the remaining products.
async fn post_download_actions(
    engine: &WorkflowEngine,
    sc: &storage::Scenario,
    dl_dir: &Path,
) -> ingestion::Result<usize> {
    let mut subdirs: Vec<PathBuf> = std::fs::read_dir(dl_dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    subdirs.sort();

    let total = subdirs.len();
    let mut n_errors = 0usize;

    for (i, dir) in subdirs.iter().enumerate() {
        let percent = (((100 * i) / total.max(1)) as f64).max(1.0);
        engine
            .store
            .set_status(&sc.ncn_id, false, status_text::RUNNING_SCRIPTS, percent)
            .await?;

        let (mf_name, metafiles) = match manifest::product_manifest(dir, &sc.ncn_id) {
            Ok(Some(found)) => found,
            Ok(None) => {
                n_errors += 1;
                continue;
            }
            Err(e) => {
                error!(dir = %dir.display(), error = %e, "cannot build product manifest");
                n_errors += 1;
                continue;
            }
        };

        for metafile in &metafiles {
            if let Err(e) = archive::archive_metadata(&engine.store, &sc.ncn_id, metafile).await {
                warn!(file = %metafile.display(), error = %e, "cannot archive product id");
            }
        }

        let mut args = vec![mf_name.display().to_string()];
        if sc.cat_registration {
            if let Some(catreg) = &engine.config.catreg_script {
                args.push(format!("-catreg={}", catreg.display()));
            }
        }
        n_errors += run_scripts(engine, &sc.ncn_id, &sc.ingest_scripts, &args).await?;
    }

    if sc.tar_result {
        let mut args = vec![dl_dir.display().to_string()];
        if sc.cat_registration {
            if let Some(catreg) = &engine.config.catreg_script {
                args.push(format!("-catreg={}", catreg.display()));
            }
        }
        let tar_script = engine.config.tar_script.display().to_string();
        n_errors += run_scripts(engine, &sc.ncn_id, &[tar_script], &args).await?;
    }

    Ok(n_errors)
}

/// Run each script with the given arguments. A non-zero exit counts as
/// an error but the remaining scripts still run; a stop request between
/// scripts aborts.
async fn run_scripts(
    engine: &WorkflowEngine,
    ncn_id: &str,
    scripts: &[String],
    args: &[String],
) -> ingestion::Result<usize> {
    let mut n_errors = 0usize;

    for script in scripts {
        if engine.store.stop_requested(ncn_id).await? {
            return Err(IngestError::Stopped);
        }

        info!(ncn_id, %script, ?args, "running script");
        let status = Command::new(script).args(args).status().await?;
        if !status.success() {
            error!(ncn_id, %script, code = status.code(), "script failed");
            n_errors += 1;
        }
    }
    Ok(n_errors)
}

async fn delete_task(engine: &WorkflowEngine, ncn_id: &str, task_id: i64) {
    match run_delete(engine, ncn_id, task_id).await {
        Ok(true) => {
            // The scenario and its status row are gone; nothing to
            // finalize.
            info!(ncn_id, "scenario deleted");
        }
        Ok(false) => {
            finalize_status(engine, ncn_id, status_text::NOT_DELETED_ERROR).await;
        }
        Err(e) => {
            error!(ncn_id, error = %e, "delete failed");
            finalize_status(engine, ncn_id, status_text::NOT_DELETED_ERROR).await;
        }
    }
}

/// Returns true when the scenario was deleted.
async fn run_delete(
    engine: &WorkflowEngine,
    ncn_id: &str,
    task_id: i64,
) -> ingestion::Result<bool> {
    let active_dar = engine.store.get_active_dar(ncn_id).await?;
    if active_dar.is_some_and(|d| !d.is_empty()) {
        warn!(ncn_id, "refusing to delete a scenario with an active download");
        return Ok(false);
    }

    engine
        .store
        .set_status(ncn_id, false, status_text::DELETE_DEREG, 1.0)
        .await?;
    engine.store.set_pid(ncn_id, task_id).await?;

    let sc = engine
        .store
        .get_scenario(ncn_id)
        .await?
        .ok_or_else(|| IngestError::Failed(format!("no such scenario '{}'", ncn_id)))?;

    let mut args = vec![ncn_id.to_string()];
    if sc.cat_registration {
        if let Some(dereg) = &engine.config.dereg_script {
            args.push(format!("-catreg={}", dereg.display()));
        }
    }

    let n_errors = run_scripts(engine, ncn_id, &sc.delete_scripts, &args).await?;
    if n_errors > 0 {
        return Ok(false);
    }

    engine
        .store
        .set_status(ncn_id, false, status_text::DELETING, 100.0)
        .await?;
    engine.store.delete_scenario(ncn_id).await?;
    Ok(true)
}

async fn ingest_local_task(
    engine: &WorkflowEngine,
    ncn_id: &str,
    dir: &Path,
    metadata: &str,
    data: &str,
    task_id: i64,
) {
    let status = match run_ingest_local(engine, ncn_id, dir, metadata, data, task_id).await {
        Ok(()) => status_text::IDLE.to_string(),
        Err(e) if e.is_stop() => {
            info!(ncn_id, "local ingestion stopped by request");
            status_text::IDLE.to_string()
        }
        Err(e) => {
            error!(ncn_id, error = %e, "local ingestion failed");
            status_text::INGEST_ERROR.to_string()
        }
    };
    finalize_status(engine, ncn_id, &status).await;
}

/// Ingest a product that is already on local disk: write a manifest
/// over the caller's directory and run the scenario's scripts on it.
async fn run_ingest_local(
    engine: &WorkflowEngine,
    ncn_id: &str,
    dir: &Path,
    metadata: &str,
    data: &str,
    task_id: i64,
) -> ingestion::Result<()> {
    engine
        .store
        .set_status(ncn_id, false, status_text::LOCAL_INGEST_UNPACK, 1.0)
        .await?;
    engine.store.set_pid(ncn_id, task_id).await?;

    let sc = engine
        .store
        .get_scenario(ncn_id)
        .await?
        .ok_or_else(|| IngestError::Failed(format!("no such scenario '{}'", ncn_id)))?;

    let mf_name = manifest::create_manifest(ncn_id, dir, Some(metadata), Some(data), None)?;

    engine
        .store
        .set_status(ncn_id, false, status_text::RUNNING_SCRIPTS, 1.0)
        .await?;

    let args = vec![mf_name.display().to_string()];
    let n_errors = run_scripts(engine, ncn_id, &sc.ingest_scripts, &args).await?;
    if n_errors > 0 {
        return Err(IngestError::Failed(format!(
            "{} errors during local ingestion of '{}'",
            n_errors, ncn_id
        )));
    }
    Ok(())
}

async fn add_product_task(engine: &WorkflowEngine, info_id: i64, request: AddProductRequest) {
    match run_add_product(engine, &request).await {
        Ok((new_product_id, product_url)) => {
            info!(info_id, %new_product_id, %product_url, "add-product succeeded");
            if let Err(e) = engine
                .store
                .update_product_info(info_id, "success", "", &new_product_id, &product_url)
                .await
            {
                error!(info_id, error = %e, "cannot record add-product outcome");
            }
        }
        Err(msg) => {
            error!(info_id, error = %msg, "add-product failed");
            if let Err(e) = engine
                .store
                .update_product_info(info_id, "failed", &msg, "", "")
                .await
            {
                error!(info_id, error = %e, "cannot record add-product outcome");
            }
        }
    }
}

/// Move the product pair into a fresh download directory and hand it to
/// the add-product script. Errors are plain strings recorded verbatim
/// on the ProductInfo row.
async fn run_add_product(
    engine: &WorkflowEngine,
    request: &AddProductRequest,
) -> Result<(String, String), String> {
    let product = Path::new(&request.data);
    let metadata = Path::new(&request.metadata);
    if !product.is_file() {
        return Err("Product not found or is not a file.".into());
    }
    if !metadata.is_file() {
        return Err("Metadata not found or is not a file.".into());
    }

    let (dl_dir, _) = dirs::create_dl_dir(&engine.config.dl_root, "ap_", Some("addProduct"))
        .map_err(|e| format!("cannot create download directory: {}", e))?;

    let meta_base = move_into(metadata, &dl_dir)?;
    let data_base = move_into(product, &dl_dir)?;

    let resp_name = dirs::mk_leaf_name("addProdResp_");
    let action = match &request.product_id {
        Some(cov_id) => format!("-replace={}", cov_id),
        None => "-add".to_string(),
    };

    let status = Command::new(&engine.config.addprod_script)
        .arg(&action)
        .arg(format!("-dldir={}", dl_dir.display()))
        .arg(format!("-response={}", resp_name))
        .arg(format!("-meta={}", meta_base))
        .arg(format!("-data={}", data_base))
        .status()
        .await
        .map_err(|e| format!("cannot run add-product script: {}", e))?;

    if !status.success() {
        return Err(format!(
            "AddProduct script returned status:{}",
            status.code().unwrap_or(-1)
        ));
    }

    parse_response_file(&dl_dir.join(&resp_name))
}

fn move_into(src: &Path, dir: &Path) -> Result<String, String> {
    let base = src
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("bad file name: {}", src.display()))?
        .to_string();
    let dest = dir.join(&base);

    // rename fails across filesystems; fall back to copy + remove.
    if std::fs::rename(src, &dest).is_err() {
        std::fs::copy(src, &dest)
            .and_then(|_| std::fs::remove_file(src))
            .map_err(|e| format!("cannot move {} into place: {}", src.display(), e))?;
    }
    Ok(base)
}

/// The script's response file holds `productId=<id>` and/or
/// `url=<url>` lines; at least one must be present. The file is
/// removed after reading.
fn parse_response_file(path: &Path) -> Result<(String, String), String> {
    let text = std::fs::read_to_string(path)
        .map_err(|_| "Response file not a file or nonexistent.".to_string())?;

    let mut product_id = String::new();
    let mut url = String::new();
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().replace('"', "");
        match key.trim() {
            "productId" => product_id = value,
            "url" => url = value,
            _ => {}
        }
    }

    if let Err(e) = std::fs::remove_file(path) {
        warn!(file = %path.display(), error = %e, "cannot remove response file");
    }

    if product_id.is_empty() && url.is_empty() {
        return Err("No data in response file".into());
    }
    Ok((product_id, url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;

    async fn test_engine(dl_root: &Path) -> WorkflowEngine {
        let store = storage::ScenarioStore::open_memory().await.unwrap();
        WorkflowEngine::new(
            store,
            "http://127.0.0.1:18082/download-manager/".into(),
            EngineConfig {
                dl_root: dl_root.to_path_buf(),
                engine_port: 18000,
                n_workers: 1,
                max_download_wait: None,
                addprod_script: "/usr/local/bin/oda_addProduct.sh".into(),
                tar_script: "/usr/local/bin/oda_tar.sh".into(),
                catreg_script: None,
                dereg_script: None,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_run_scripts_counts_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = test_engine(tmp.path()).await;

        let scripts = vec![
            "/bin/true".to_string(),
            "/bin/false".to_string(),
            "/bin/true".to_string(),
        ];
        let n_errors = run_scripts(&engine, "sc_x", &scripts, &[]).await.unwrap();
        assert_eq!(n_errors, 1);
    }

    #[tokio::test]
    async fn test_run_scripts_honors_stop_request() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = test_engine(tmp.path()).await;

        let mut sc = sample_scenario();
        sc.ncn_id = "sc_stop".into();
        engine.store.upsert_scenario(&sc).await.unwrap();
        engine.store.set_pid("sc_stop", 7).await.unwrap();
        engine.store.stop_request("sc_stop").await.unwrap();

        let scripts = vec!["/bin/true".to_string()];
        let err = run_scripts(&engine, "sc_stop", &scripts, &[])
            .await
            .unwrap_err();
        assert!(err.is_stop());
    }

    fn sample_scenario() -> storage::Scenario {
        storage::Scenario {
            ncn_id: "sc_test_1".into(),
            name: "t".into(),
            description: String::new(),
            dsrc: "http://cat.example.com/wcs".into(),
            dsrc_type: "EOWCS".into(),
            aoi: eo_common::Bbox::new(0.0, 0.0, 1.0, 1.0),
            from_date: None,
            to_date: None,
            cloud_cover: None,
            view_angle: None,
            sensor_type: None,
            dssids: vec![],
            custom_conditions: vec![],
            repeat_interval: 0,
            starting_date: chrono::Utc::now(),
            coastline_check: false,
            coastline_file: None,
            check_archived: true,
            cat_registration: false,
            download_subset: false,
            tar_result: false,
            ingest_scripts: vec![],
            delete_scripts: vec![],
        }
    }

    #[test]
    fn test_parse_response_file() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = tmp.path().join("addProdResp_x");
        std::fs::write(&resp, "productId=\"p_new_1\"\nurl=http://oda/p_new_1\n").unwrap();

        let (id, url) = parse_response_file(&resp).unwrap();
        assert_eq!(id, "p_new_1");
        assert_eq!(url, "http://oda/p_new_1");
        assert!(!resp.exists());
    }

    #[test]
    fn test_parse_response_file_requires_content() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = tmp.path().join("addProdResp_y");
        std::fs::write(&resp, "something else entirely\n").unwrap();
        assert!(parse_response_file(&resp).is_err());

        assert!(parse_response_file(&tmp.path().join("missing")).is_err());
    }

    #[test]
    fn test_move_into() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("scene.tif");
        std::fs::write(&src, "II*").unwrap();
        let dest_dir = tmp.path().join("dest");
        std::fs::create_dir(&dest_dir).unwrap();

        let base = move_into(&src, &dest_dir).unwrap();
        assert_eq!(base, "scene.tif");
        assert!(!src.exists());
        assert!(dest_dir.join("scene.tif").exists());
    }
}
