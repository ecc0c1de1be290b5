//! Watching and stopping DM downloads.
//!
//! After a DAR is submitted the worker polls the DM status endpoint
//! until every product of the DAR is completed or in error, updating
//! the scenario status as it goes. A stop request observed between
//! polls cancels the remaining product downloads.

use std::time::{Duration, Instant};

use dm_client::{DarStatus, DmClient, ProductStatus};
use metrics::counter;
use storage::{status_text, ScenarioStore};
use tracing::{info, warn};

use crate::error::{IngestError, Result};

/// What the download phase produced, error-wise.
#[derive(Debug, Default)]
pub struct DownloadReport {
    pub n_errors: usize,
    /// Download directories of failed products, relative to the root.
    pub failed_dirs: Vec<String>,
    pub failed_urls: Vec<String>,
}

/// One pass over the product list.
#[derive(Debug, Default, PartialEq)]
struct ProgressSummary {
    all_done: bool,
    n_done: usize,
    /// Percent of the whole DAR, at least 1 so the UI shows life.
    percent: f64,
    total_size: u64,
}

fn summarize(
    products: &[ProductStatus],
    failed_urls: &mut Vec<String>,
    failed_dirs: &mut Vec<String>,
) -> ProgressSummary {
    let mut sum = ProgressSummary {
        all_done: true,
        ..Default::default()
    };
    let mut part_percent = 0.0;

    for product in products {
        let Some(progress) = &product.progress else {
            continue;
        };

        if product.is_in_error() {
            let url = product.access_url.clone().unwrap_or_else(|| "(unknown)".into());
            if !failed_urls.contains(&url) {
                info!(
                    uuid = product.uuid.as_deref().unwrap_or("(unknown)"),
                    %url,
                    message = progress.message.as_deref().unwrap_or("(none)"),
                    "DM reports a failed product download"
                );
                if let Some(dir) = &product.download_directory {
                    failed_dirs.push(dir.clone());
                }
                failed_urls.push(url);
            }
            sum.n_done += 1;
        } else if product.is_completed() {
            sum.n_done += 1;
        } else {
            sum.all_done = false;
        }

        // A product without a reported percentage counts as complete
        // so it cannot drag the total below what actually happened.
        part_percent += progress.progress_percentage.unwrap_or(100.0);
        sum.total_size += progress.downloaded_size.unwrap_or(0);
    }

    let total_percent = (products.len() * 100) as f64;
    sum.percent = if total_percent > 0.0 {
        ((part_percent / total_percent) * 100.0).floor().max(1.0)
    } else {
        100.0
    };
    sum
}

/// Cancel the product downloads of a DAR that is being stopped.
///
/// Clears the scenario's active DAR first; if someone else already
/// cleared it they are cancelling too and we leave it to them. Per
/// product cancel failures are logged and ignored, the DM forgets
/// stale downloads on its own.
pub async fn stop_download(
    store: &ScenarioStore,
    dm: &DmClient,
    ncn_id: &str,
    dar: Option<&DarStatus>,
) -> Result<()> {
    let Some(dar) = dar else {
        warn!(ncn_id, "stop download: no DAR request to process");
        return Ok(());
    };

    if !store.clear_active_dar(ncn_id).await? {
        warn!(ncn_id, "stop download: DAR had been cleared");
        return Ok(());
    }

    for product in &dar.products {
        if product.is_completed() {
            continue;
        }
        let Some(uuid) = &product.uuid else { continue };
        if let Err(e) = dm.cancel_product(uuid).await {
            warn!(%uuid, error = %e, "error from DM while cancelling download");
        }
    }
    Ok(())
}

async fn stop_if_requested(
    store: &ScenarioStore,
    dm: &DmClient,
    ncn_id: &str,
    dar: Option<&DarStatus>,
) -> Result<()> {
    if store.stop_requested(ncn_id).await? {
        stop_download(store, dm, ncn_id, dar).await?;
        return Err(IngestError::Stopped);
    }
    Ok(())
}

/// Block until the DM reports every product of the DAR as completed or
/// failed. The scenario's active DAR is cleared on the way out, on
/// success and failure both.
pub async fn wait_for_download(
    store: &ScenarioStore,
    dm: &DmClient,
    ncn_id: &str,
    dar_url: &str,
    max_wait: Option<Duration>,
) -> Result<DownloadReport> {
    let result = wait_inner(store, dm, ncn_id, dar_url, max_wait).await;
    if let Err(e) = store.clear_active_dar(ncn_id).await {
        warn!(ncn_id, error = %e, "failed to clear active DAR");
    }
    result
}

async fn wait_inner(
    store: &ScenarioStore,
    dm: &DmClient,
    ncn_id: &str,
    dar_url: &str,
    max_wait: Option<Duration>,
) -> Result<DownloadReport> {
    store
        .set_status(ncn_id, false, status_text::DOWNLOADING, 1.0)
        .await?;

    let interval = dm.poll_interval();
    let mut request = dm.find_dar(dar_url).await?;
    stop_if_requested(store, dm, ncn_id, request.as_ref()).await?;

    // The DM may not list a freshly submitted DAR right away.
    for retry_sleep in [interval, Duration::from_secs(1), Duration::from_secs(1)] {
        if request.is_some() {
            break;
        }
        tokio::time::sleep(retry_sleep).await;
        request = dm.find_dar(dar_url).await?;
        stop_if_requested(store, dm, ncn_id, request.as_ref()).await?;
    }
    let Some(mut request) = request else {
        return Err(IngestError::Failed(format!(
            "DM does not list the submitted DAR '{}'",
            dar_url
        )));
    };

    let n_products = request.products.len();
    let mut report = DownloadReport::default();
    let mut last_message = String::new();
    let start = Instant::now();

    loop {
        if let Some(max_wait) = max_wait {
            if start.elapsed() > max_wait {
                report.n_errors += 1;
                warn!(ncn_id, "Time-out waiting for download");
                break;
            }
        }

        let sum = summarize(
            &request.products,
            &mut report.failed_urls,
            &mut report.failed_dirs,
        );
        report.n_errors = report.failed_urls.len();

        if sum.all_done {
            let status = if report.n_errors > 0 {
                status_text::dl_errors(report.n_errors)
            } else {
                status_text::finished_dl(n_products)
            };
            store.set_status(ncn_id, false, &status, sum.percent).await?;
            info!(
                ncn_id,
                n_products,
                total_size = sum.total_size,
                n_errors = report.n_errors,
                "download finished"
            );
            break;
        }

        stop_if_requested(store, dm, ncn_id, Some(&request)).await?;

        let status = status_text::downloading(sum.n_done, n_products);
        store.set_status(ncn_id, false, &status, sum.percent).await?;
        let message = format!("{} {} done: {}%", ncn_id, status, sum.percent);
        if message != last_message {
            info!("{}", message);
            last_message = message;
        }

        // Back off on long downloads.
        let elapsed = start.elapsed();
        let sleep_time = if elapsed > 32 * interval {
            5 * interval
        } else if elapsed > 6 * interval {
            2 * interval
        } else {
            interval
        };
        tokio::time::sleep(sleep_time).await;

        request = match dm.find_dar(dar_url).await? {
            Some(r) => r,
            None => {
                return Err(IngestError::Failed(format!(
                    "DM no longer lists DAR '{}'",
                    dar_url
                )))
            }
        };
        stop_if_requested(store, dm, ncn_id, Some(&request)).await?;
    }

    if report.n_errors > 0 {
        info!(ncn_id, n_errors = report.n_errors, "completed download with errors");
    }
    counter!("products_downloaded_total").increment((n_products - report.failed_urls.len()) as u64);
    counter!("product_download_errors_total").increment(report.n_errors as u64);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(url: &str, dir: &str, status: &str, pct: Option<f64>) -> ProductStatus {
        serde_json::from_value(serde_json::json!({
            "uuid": format!("u-{}", url),
            "productAccessUrl": url,
            "downloadDirectory": dir,
            "productProgress": {
                "status": status,
                "progressPercentage": pct,
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_summarize_in_progress() {
        let products = vec![
            product("http://c/p1", "d1", "RUNNING", Some(50.0)),
            product("http://c/p2", "d2", "COMPLETED", Some(100.0)),
        ];
        let mut urls = Vec::new();
        let mut dirs = Vec::new();
        let sum = summarize(&products, &mut urls, &mut dirs);

        assert!(!sum.all_done);
        assert_eq!(sum.n_done, 1);
        assert_eq!(sum.percent, 75.0);
        assert!(urls.is_empty());
    }

    #[test]
    fn test_summarize_counts_failures_once() {
        let products = vec![product("http://c/p1", "d1", "IN_ERROR", Some(10.0))];
        let mut urls = Vec::new();
        let mut dirs = Vec::new();

        let first = summarize(&products, &mut urls, &mut dirs);
        let second = summarize(&products, &mut urls, &mut dirs);

        assert!(first.all_done && second.all_done);
        assert_eq!(urls, vec!["http://c/p1".to_string()]);
        assert_eq!(dirs, vec!["d1".to_string()]);
    }

    #[test]
    fn test_summarize_missing_percentage_counts_full() {
        let p: ProductStatus = serde_json::from_value(serde_json::json!({
            "productAccessUrl": "http://c/p1",
            "productProgress": { "status": "RUNNING" }
        }))
        .unwrap();

        let sum = summarize(&[p], &mut Vec::new(), &mut Vec::new());
        assert_eq!(sum.percent, 100.0);
        assert!(!sum.all_done);
    }

    #[test]
    fn test_summarize_floors_at_one_percent() {
        let products = vec![
            product("http://c/p1", "d1", "RUNNING", Some(0.0)),
            product("http://c/p2", "d2", "RUNNING", Some(0.0)),
        ];
        let sum = summarize(&products, &mut Vec::new(), &mut Vec::new());
        assert_eq!(sum.percent, 1.0);
    }
}
