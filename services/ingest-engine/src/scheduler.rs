//! Auto-ingest scheduler.
//!
//! Sweeps the store once a minute for scenarios whose repeat interval
//! has elapsed, advances their next-run time and queues an ingest task
//! for each. A scenario that is still busy from the previous run is
//! skipped; its next-run time stays put so it is retried on the next
//! sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::engine::{Task, WorkflowEngine};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run_scheduler(engine: Arc<WorkflowEngine>, mut shutdown: broadcast::Receiver<()>) {
    info!("auto-ingest scheduler started");
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => sweep(&engine).await,
        }
    }
    info!("auto-ingest scheduler stopped");
}

async fn sweep(engine: &WorkflowEngine) {
    let now = Utc::now();
    let due = match engine.store().due_scenarios(now).await {
        Ok(due) => due,
        Err(e) => {
            error!(error = %e, "scheduler cannot read scenarios");
            return;
        }
    };
    debug!(n_due = due.len(), "scheduler sweep");

    for sc in due {
        match engine.store().get_status(&sc.ncn_id).await {
            Ok(Some(status)) if !status.is_available => {
                warn!(
                    ncn_id = %sc.ncn_id,
                    status = %status.status,
                    "auto-ingest due but scenario is busy"
                );
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                error!(ncn_id = %sc.ncn_id, error = %e, "scheduler cannot read status");
                continue;
            }
        }

        // Advance before queueing so a failed run does not re-fire
        // every sweep.
        let next = now + chrono::Duration::seconds(sc.repeat_interval * 60);
        if let Err(e) = engine.store().set_starting_date(&sc.ncn_id, next).await {
            error!(ncn_id = %sc.ncn_id, error = %e, "scheduler cannot advance next-run time");
            continue;
        }

        info!(ncn_id = %sc.ncn_id, next_run = %next, "auto-ingest triggered");
        if let Err(e) = engine
            .submit(Task::Ingest {
                ncn_id: sc.ncn_id.clone(),
            })
            .await
        {
            warn!(ncn_id = %sc.ncn_id, error = %e, "auto-ingest submission rejected");
        }
    }
}
