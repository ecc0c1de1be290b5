//! Task queue, worker pool and scenario-level control.
//!
//! Scenario tasks take the scenario's lock on submission, so at most
//! one worker processes a scenario at a time. The queue is LIFO: a
//! manually triggered ingest jumps ahead of the auto-ingest backlog.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dm_client::DarRegistry;
use ingestion::{IngestError, IngestionConfig, IngestionEngine};
use storage::{status_text, ScenarioStore};
use tokio::sync::{broadcast, Mutex, Notify};
use tracing::{info, warn};

use crate::worker::{self, AddProductRequest};

/// Engine-wide settings from the command line.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of the download tree shared with the DM.
    pub dl_root: PathBuf,
    /// Port of the engine's own HTTP interface.
    pub engine_port: u16,
    pub n_workers: usize,
    /// Upper bound on one download phase.
    pub max_download_wait: Option<Duration>,
    /// Script invoked for add-product requests.
    pub addprod_script: PathBuf,
    /// Script invoked to tar a finished download directory.
    pub tar_script: PathBuf,
    /// Catalogue registration script, passed to ingest scripts as
    /// `-catreg=<path>` when a scenario asks for registration.
    pub catreg_script: Option<PathBuf>,
    /// Catalogue de-registration script for delete tasks.
    pub dereg_script: Option<PathBuf>,
}

/// One unit of work for the pool.
#[derive(Debug, Clone)]
pub enum Task {
    Ingest {
        ncn_id: String,
    },
    Delete {
        ncn_id: String,
    },
    IngestLocal {
        ncn_id: String,
        dir: PathBuf,
        metadata: String,
        data: String,
    },
    AddProduct {
        info_id: i64,
        request: AddProductRequest,
    },
}

impl Task {
    /// The scenario the task locks, if any.
    pub fn ncn_id(&self) -> Option<&str> {
        match self {
            Task::Ingest { ncn_id }
            | Task::Delete { ncn_id }
            | Task::IngestLocal { ncn_id, .. } => Some(ncn_id),
            Task::AddProduct { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Task::Ingest { .. } => "ingest",
            Task::Delete { .. } => "delete",
            Task::IngestLocal { .. } => "ingest_local",
            Task::AddProduct { .. } => "add_product",
        }
    }
}

pub struct WorkflowEngine {
    pub(crate) store: ScenarioStore,
    pub(crate) ingestion: IngestionEngine,
    pub(crate) registry: Arc<DarRegistry>,
    pub(crate) config: EngineConfig,
    queue: Mutex<Vec<Task>>,
    notify: Notify,
    next_task_id: AtomicI64,
}

impl WorkflowEngine {
    pub fn new(
        store: ScenarioStore,
        dm_base_url: String,
        config: EngineConfig,
    ) -> ingestion::Result<Self> {
        let registry = Arc::new(DarRegistry::new());
        let ingestion = IngestionEngine::new(
            store.clone(),
            dm_base_url,
            registry.clone(),
            IngestionConfig {
                dl_root: config.dl_root.clone(),
                engine_port: config.engine_port,
                max_download_wait: config.max_download_wait,
            },
        )?;

        Ok(Self {
            store,
            ingestion,
            registry,
            config,
            queue: Mutex::new(Vec::new()),
            notify: Notify::new(),
            // Task ids double as the status row's worker pid; 0 means
            // no worker, so ids start at 1.
            next_task_id: AtomicI64::new(1),
        })
    }

    pub fn store(&self) -> &ScenarioStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<DarRegistry> {
        &self.registry
    }

    /// Queue a task. Scenario tasks take the scenario's lock and show
    /// up as QUEUED; a busy scenario rejects the submission.
    pub async fn submit(&self, task: Task) -> ingestion::Result<()> {
        if let Some(ncn_id) = task.ncn_id() {
            if !self.store.try_lock(ncn_id).await? {
                return Err(IngestError::Failed(format!(
                    "scenario '{}' is busy",
                    ncn_id
                )));
            }
            // Progress is never reported as 0; a queued scenario shows
            // 1 percent like every other live phase.
            self.store
                .set_status(ncn_id, false, status_text::QUEUED, 1.0)
                .await?;
        }
        info!(kind = task.kind(), ncn_id = task.ncn_id(), "task queued");
        self.queue.lock().await.push(task);
        self.notify.notify_one();
        Ok(())
    }

    async fn next_task(&self) -> Task {
        loop {
            if let Some(task) = self.queue.lock().await.pop() {
                return task;
            }
            self.notify.notified().await;
        }
    }

    pub async fn queued_tasks(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Start the worker pool. Workers run until the shutdown channel
    /// fires; a running task finishes before its worker exits.
    pub fn spawn_workers(self: &Arc<Self>, shutdown: &broadcast::Sender<()>) {
        for worker_id in 0..self.config.n_workers {
            let engine = Arc::clone(self);
            let mut shutdown = shutdown.subscribe();
            tokio::spawn(async move {
                info!(worker_id, "worker started");
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        task = engine.next_task() => {
                            let task_id = engine.next_task_id.fetch_add(1, Ordering::Relaxed);
                            worker::do_task(&engine, task, task_id).await;
                        }
                    }
                }
                info!(worker_id, "worker stopped");
            });
        }
    }

    /// Ask a running scenario task to stop. The store flips the stop
    /// sentinel for the worker to see; any in-flight download is
    /// cancelled out of band right here so the DM stops pulling data
    /// before the worker reaches its next checkpoint.
    pub async fn stop_scenario(&self, ncn_id: &str) -> ingestion::Result<()> {
        let active_dar = self.store.stop_request(ncn_id).await?;

        if let Some(dar_url) = active_dar.filter(|d| !d.is_empty()) {
            match self.ingestion.dm().find_dar(&dar_url).await {
                Ok(Some(dar)) => {
                    for product in &dar.products {
                        if product.is_completed() {
                            continue;
                        }
                        let Some(uuid) = &product.uuid else { continue };
                        if let Err(e) = self.ingestion.dm().cancel_product(uuid).await {
                            warn!(%uuid, error = %e, "error from DM while cancelling download");
                        }
                    }
                }
                Ok(None) => {
                    warn!(ncn_id, %dar_url, "stop request: DM does not list the active DAR")
                }
                Err(e) => warn!(ncn_id, error = %e, "stop request: cannot reach DM"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_scenario(ncn_id: &str) -> storage::Scenario {
        storage::Scenario {
            ncn_id: ncn_id.into(),
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

    async fn test_engine(dl_root: std::path::PathBuf) -> WorkflowEngine {
        let store = ScenarioStore::open_memory().await.unwrap();
        WorkflowEngine::new(
            store,
            "http://127.0.0.1:18082/download-manager/".into(),
            EngineConfig {
                dl_root,
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
    async fn test_submit_locks_scenario() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = test_engine(tmp.path().to_path_buf()).await;
        engine
            .store
            .upsert_scenario(&sample_scenario("sc_a"))
            .await
            .unwrap();

        engine
            .submit(Task::Ingest {
                ncn_id: "sc_a".into(),
            })
            .await
            .unwrap();
        assert_eq!(engine.queued_tasks().await, 1);

        let status = engine.store.get_status("sc_a").await.unwrap().unwrap();
        assert!(!status.is_available);
        assert_eq!(status.status, status_text::QUEUED);
        assert!(status.done >= 1.0, "queued progress must be >= 1");

        // A second submission for the same scenario is rejected while
        // the first is queued.
        let err = engine
            .submit(Task::Delete {
                ncn_id: "sc_a".into(),
            })
            .await;
        assert!(err.is_err());
        assert_eq!(engine.queued_tasks().await, 1);
    }

    #[tokio::test]
    async fn test_add_product_tasks_take_no_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = test_engine(tmp.path().to_path_buf()).await;

        let request = crate::worker::AddProductRequest {
            data: "/tmp/p.tif".into(),
            metadata: "/tmp/p.xml".into(),
            product_id: None,
        };
        for info_id in 1..=2 {
            engine
                .submit(Task::AddProduct {
                    info_id,
                    request: request.clone(),
                })
                .await
                .unwrap();
        }
        assert_eq!(engine.queued_tasks().await, 2);
    }

    #[tokio::test]
    async fn test_queue_is_lifo() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = test_engine(tmp.path().to_path_buf()).await;
        engine
            .store
            .upsert_scenario(&sample_scenario("sc_first"))
            .await
            .unwrap();
        engine
            .store
            .upsert_scenario(&sample_scenario("sc_second"))
            .await
            .unwrap();

        engine
            .submit(Task::Ingest {
                ncn_id: "sc_first".into(),
            })
            .await
            .unwrap();
        engine
            .submit(Task::Ingest {
                ncn_id: "sc_second".into(),
            })
            .await
            .unwrap();

        let task = engine.next_task().await;
        assert_eq!(task.ncn_id(), Some("sc_second"));
    }
}
