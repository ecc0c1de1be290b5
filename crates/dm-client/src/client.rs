//! DM command client and the DAR hand-off registry.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::error::{DmError, Result};

/// Product progress states reported by the DM.
pub const PRODUCT_COMPLETED: &str = "COMPLETED";
pub const PRODUCT_IN_ERROR: &str = "IN_ERROR";

/// Path under which the engine serves DAR documents back to the DM.
pub const DAR_RESPONSE_PATH: &str = "/ingest/darResponse";

/// Sequenced DAR documents waiting to be collected by the DM.
///
/// Submitting a download hands the DM a callback URL carrying a
/// sequence id; the DM then fetches the document from us. Hand-offs
/// normally happen in submission order, so this is a FIFO queue with a
/// linear scan as fallback.
#[derive(Default)]
pub struct DarRegistry {
    next_id: AtomicU64,
    queue: Mutex<VecDeque<(u64, String)>>,
}

impl DarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a DAR document and return its sequence id.
    pub async fn register(&self, dar_xml: String) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.queue.lock().await.push_back((id, dar_xml));
        id
    }

    /// Hand out the document for the given sequence id.
    pub async fn take(&self, id: u64) -> Option<String> {
        let mut queue = self.queue.lock().await;
        let pos = queue.iter().position(|(qid, _)| *qid == id)?;
        if pos != 0 {
            warn!(id, pos, "DAR collected out of submission order");
        }
        queue.remove(pos).map(|(_, xml)| xml)
    }

    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }
}

/// The callback URL passed to the DM for one submitted DAR.
pub fn dar_response_url(engine_port: u16, seq: u64) -> String {
    format!("http://127.0.0.1:{}{}/{}", engine_port, DAR_RESPONSE_PATH, seq)
}

/// Client-side tunables for talking to the DM.
#[derive(Debug, Clone)]
pub struct DmClientConfig {
    /// Base cadence for polling download progress.
    pub poll_interval: Duration,
    /// How long to keep retrying an unresponsive status endpoint.
    pub status_max_wait: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for DmClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            status_max_wait: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of submitting a DAR to the DM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// The DM already knows this DAR; treated as success on resubmit.
    AlreadyExists,
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    success: Option<bool>,
    #[serde(rename = "errorType")]
    error_type: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

/// One DAR as reported by the DM status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DarStatus {
    #[serde(rename = "darURL")]
    pub dar_url: Option<String>,
    pub uuid: Option<String>,
    #[serde(rename = "monitoringStatus")]
    pub monitoring_status: Option<String>,
    #[serde(rename = "productList", default)]
    pub products: Vec<ProductStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductStatus {
    pub uuid: Option<String>,
    #[serde(rename = "productAccessUrl")]
    pub access_url: Option<String>,
    #[serde(rename = "downloadDirectory")]
    pub download_directory: Option<String>,
    #[serde(rename = "productProgress")]
    pub progress: Option<ProductProgress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductProgress {
    pub status: Option<String>,
    #[serde(rename = "progressPercentage")]
    pub progress_percentage: Option<f64>,
    #[serde(rename = "downloadedSize")]
    pub downloaded_size: Option<u64>,
    pub message: Option<String>,
}

impl ProductStatus {
    pub fn is_completed(&self) -> bool {
        self.progress_status() == Some(PRODUCT_COMPLETED)
    }

    pub fn is_in_error(&self) -> bool {
        self.progress_status() == Some(PRODUCT_IN_ERROR)
    }

    fn progress_status(&self) -> Option<&str> {
        self.progress.as_ref().and_then(|p| p.status.as_deref())
    }
}

/// HTTP client for the DM command interface.
pub struct DmClient {
    client: reqwest::Client,
    base_url: String,
    config: DmClientConfig,
}

impl DmClient {
    /// `base_url` is the DM command root, e.g.
    /// `http://127.0.0.1:8082/download-manager/`.
    pub fn new(base_url: String, config: DmClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    /// Submit a DAR by callback URL.
    #[instrument(skip(self))]
    pub async fn submit_dar(&self, callback_url: &str) -> Result<SubmitOutcome> {
        let url = format!("{}download", self.base_url);
        let body = format!("darUrl={}", callback_url);

        let resp = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;
        let text = resp.text().await?;
        let cmd: CommandResponse = serde_json::from_str(&text)?;
        interpret_command_response(cmd)
    }

    /// Current list of DARs known to the DM. Retries while the DM is
    /// unresponsive, up to the configured bound.
    pub async fn dar_list(&self) -> Result<Vec<DarStatus>> {
        let url = format!("{}dataAccessRequests", self.base_url);
        let start = Instant::now();

        loop {
            match self.fetch_dar_list(&url).await {
                Ok(list) => return Ok(list),
                // A well-formed response without the expected key will
                // not get better by retrying.
                Err(e @ DmError::Protocol(_)) => return Err(e),
                Err(e) => {
                    if start.elapsed() > self.config.status_max_wait {
                        return Err(DmError::Timeout(format!(
                            "unable to get DAR list from DM: {}",
                            e
                        )));
                    }
                    warn!(error = %e, "DM status request failed, retrying");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    }

    async fn fetch_dar_list(&self, url: &str) -> Result<Vec<DarStatus>> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        let body = resp.text().await?;
        let parsed: serde_json::Value = serde_json::from_str(&body)?;

        let Some(list) = parsed.get("dataAccessRequests") else {
            return Err(DmError::Protocol(
                "bad DAR status from DM; no 'dataAccessRequests' found".into(),
            ));
        };
        Ok(serde_json::from_value(list.clone())?)
    }

    /// Find a DAR by the callback URL it was submitted with.
    pub async fn find_dar(&self, dar_url: &str) -> Result<Option<DarStatus>> {
        Ok(self
            .dar_list()
            .await?
            .into_iter()
            .find(|d| d.dar_url.as_deref() == Some(dar_url)))
    }

    /// Ask the DM to cancel one product download. The DM has no call to
    /// cancel a whole DAR, so stopping a download cancels its products
    /// one by one.
    pub async fn cancel_product(&self, uuid: &str) -> Result<()> {
        let url = format!("{}products/{}/cancel", self.base_url, uuid);
        debug!(uuid, "Cancelling product download");
        self.client.get(&url).send().await?.error_for_status()?;
        Ok(())
    }
}

fn interpret_command_response(cmd: CommandResponse) -> Result<SubmitOutcome> {
    if cmd.success == Some(true) {
        return Ok(SubmitOutcome::Accepted);
    }
    if cmd.error_type.as_deref() == Some("DataAccessRequestAlreadyExistsException") {
        return Ok(SubmitOutcome::AlreadyExists);
    }
    Err(DmError::Rejected(cmd.error_message.unwrap_or_else(|| {
        "Unknown error, no 'errorMessage' found in response".into()
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_is_fifo() {
        let reg = DarRegistry::new();
        let a = reg.register("<dar>a</dar>".into()).await;
        let b = reg.register("<dar>b</dar>".into()).await;
        assert_ne!(a, b);
        assert_eq!(reg.pending().await, 2);

        assert_eq!(reg.take(a).await.as_deref(), Some("<dar>a</dar>"));
        assert_eq!(reg.take(b).await.as_deref(), Some("<dar>b</dar>"));
        assert_eq!(reg.take(b).await, None);
    }

    #[tokio::test]
    async fn test_registry_out_of_order_take() {
        let reg = DarRegistry::new();
        let a = reg.register("a".into()).await;
        let b = reg.register("b".into()).await;

        assert_eq!(reg.take(b).await.as_deref(), Some("b"));
        assert_eq!(reg.take(a).await.as_deref(), Some("a"));
    }

    #[test]
    fn test_dar_response_url() {
        assert_eq!(
            dar_response_url(8000, 3),
            "http://127.0.0.1:8000/ingest/darResponse/3"
        );
    }

    #[test]
    fn test_interpret_command_response() {
        let ok: CommandResponse = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert_eq!(interpret_command_response(ok).unwrap(), SubmitOutcome::Accepted);

        let dup: CommandResponse = serde_json::from_str(
            r#"{"success":false,"errorType":"DataAccessRequestAlreadyExistsException"}"#,
        )
        .unwrap();
        assert_eq!(
            interpret_command_response(dup).unwrap(),
            SubmitOutcome::AlreadyExists
        );

        let bad: CommandResponse =
            serde_json::from_str(r#"{"success":false,"errorMessage":"disk full"}"#).unwrap();
        match interpret_command_response(bad) {
            Err(DmError::Rejected(msg)) => assert_eq!(msg, "disk full"),
            other => panic!("unexpected: {:?}", other),
        }

        let opaque: CommandResponse = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert!(matches!(
            interpret_command_response(opaque),
            Err(DmError::Rejected(_))
        ));
    }

    #[test]
    fn test_parse_dar_status() {
        let json = r#"{
          "dataAccessRequests": [
            {
              "darURL": "http://127.0.0.1:8000/ingest/darResponse/0",
              "uuid": "dar-1",
              "monitoringStatus": "IN_PROGRESS",
              "productList": [
                {
                  "uuid": "p-1",
                  "productAccessUrl": "http://cat.example.com/p1",
                  "downloadDirectory": "2020/06/run_1/p_sc1_001",
                  "productProgress": {
                    "status": "RUNNING",
                    "progressPercentage": 40,
                    "downloadedSize": 1024
                  }
                },
                {
                  "uuid": "p-2",
                  "productAccessUrl": "http://cat.example.com/p2",
                  "productProgress": { "status": "COMPLETED" }
                }
              ]
            }
          ]
        }"#;

        let parsed: serde_json::Value = serde_json::from_str(json).unwrap();
        let list: Vec<DarStatus> =
            serde_json::from_value(parsed.get("dataAccessRequests").cloned().unwrap()).unwrap();

        assert_eq!(list.len(), 1);
        let dar = &list[0];
        assert_eq!(dar.uuid.as_deref(), Some("dar-1"));
        assert_eq!(dar.products.len(), 2);
        assert!(!dar.products[0].is_completed());
        assert!(dar.products[1].is_completed());
        assert!(!dar.products[1].is_in_error());
        assert_eq!(
            dar.products[0].progress.as_ref().unwrap().progress_percentage,
            Some(40.0)
        );
    }
}
