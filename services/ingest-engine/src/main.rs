//! Earth-observation bulk-ingestion engine.
//!
//! Orchestrates scenario-driven ingestion of EO products:
//! - Generates GetCoverage URLs from an EO-WCS catalogue with
//!   per-coverage filtering
//! - Hands the URLs to an external download manager as a DAR and polls
//!   the downloads to completion
//! - Runs the scenario's ingestion scripts on each downloaded product
//! - Repeats on a per-scenario schedule
//! - HTTP API for scenario management, status and add-product requests

mod engine;
mod scheduler;
mod server;
mod worker;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use storage::ScenarioStore;
use tokio::sync::broadcast;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use engine::{EngineConfig, WorkflowEngine};
use server::ServerState;

#[derive(Parser, Debug)]
#[command(name = "ingest-engine")]
#[command(about = "EO bulk-ingestion engine")]
struct Args {
    /// Scenario database file
    #[arg(long, env = "INGEST_DB", default_value = "/data/ingest/scenarios.db")]
    db_path: PathBuf,

    /// Download manager properties file; supplies the download root and
    /// the DM port
    #[arg(long, env = "DM_PROPERTIES")]
    dm_properties: Option<PathBuf>,

    /// Download manager base URL (used when no properties file is given)
    #[arg(long, env = "DM_URL", default_value = "http://127.0.0.1:8082/download-manager/")]
    dm_url: String,

    /// Download root shared with the DM (used when no properties file
    /// is given)
    #[arg(long, env = "DL_ROOT", default_value = "/data/ingest/downloads")]
    dl_root: PathBuf,

    /// Port of the engine's HTTP interface
    #[arg(long, env = "ENGINE_PORT", default_value = "8000")]
    port: u16,

    /// Number of task workers
    #[arg(long, default_value = "4")]
    workers: usize,

    /// Upper bound in seconds on one download phase (0 = no limit)
    #[arg(long, default_value = "0")]
    max_download_wait: u64,

    /// Script invoked for add-product requests
    #[arg(long, default_value = "/usr/local/bin/oda_addProduct.sh")]
    addprod_script: PathBuf,

    /// Script invoked to tar a finished download directory
    #[arg(long, default_value = "/usr/local/bin/oda_tar.sh")]
    tar_script: PathBuf,

    /// Catalogue registration script passed to ingest scripts
    #[arg(long)]
    catreg_script: Option<PathBuf>,

    /// Catalogue de-registration script passed to delete scripts
    #[arg(long)]
    dereg_script: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting EO bulk-ingestion engine");

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("install metrics recorder")?;

    // The DM properties file, when given, is authoritative for both the
    // download root and the DM location.
    let (dm_url, dl_root) = match &args.dm_properties {
        Some(path) => {
            let dm = dm_client::DmConfig::from_properties(path)
                .with_context(|| format!("read {}", path.display()))?;
            dm_client::ensure_download_dirs(&dm.download_dir)?;
            dm_client::wait_for_port(dm.port, dm_client::config::DEFAULT_PORT_WAIT).await?;
            (dm.base_url(), dm.download_dir)
        }
        None => {
            dm_client::ensure_download_dirs(&args.dl_root)?;
            (args.dm_url.clone(), args.dl_root.clone())
        }
    };

    if let Some(parent) = args.db_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let store = ScenarioStore::open(&args.db_path).await?;

    let max_download_wait = match args.max_download_wait {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    let config = EngineConfig {
        dl_root,
        engine_port: args.port,
        n_workers: args.workers.max(1),
        max_download_wait,
        addprod_script: args.addprod_script.clone(),
        tar_script: args.tar_script.clone(),
        catreg_script: args.catreg_script.clone(),
        dereg_script: args.dereg_script.clone(),
    };

    let engine = Arc::new(WorkflowEngine::new(store, dm_url, config)?);

    // Shutdown signal
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    engine.spawn_workers(&shutdown_tx);

    {
        let engine = engine.clone();
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            scheduler::run_scheduler(engine, shutdown).await;
        });
    }

    let server_state = Arc::new(ServerState {
        engine: engine.clone(),
        metrics: prometheus,
    });
    let port = args.port;
    tokio::spawn(async move {
        if let Err(e) = server::run_server(server_state, port).await {
            tracing::error!(error = %e, "Engine server failed");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    shutdown_tx.send(()).ok();

    // Give running tasks a moment to notice the shutdown.
    tokio::time::sleep(Duration::from_millis(200)).await;

    Ok(())
}
