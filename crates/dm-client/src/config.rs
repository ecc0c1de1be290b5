//! Download manager deployment configuration.
//!
//! The DM is configured through a Java properties file; we read the two
//! keys the engine needs from the same file rather than duplicating
//! them in our own configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::error::{DmError, Result};

/// Hard upper bound on waiting for the DM web interface.
pub const MAX_PORT_WAIT: Duration = Duration::from_secs(40);
/// Default wait when the caller does not specify one.
pub const DEFAULT_PORT_WAIT: Duration = Duration::from_secs(20);

const KEY_DOWNLOAD_DIR: &str = "BASE_DOWNLOAD_FOLDER_ABSOLUTE";
const KEY_PORT: &str = "WEB_INTERFACE_PORT_NO";

/// The DM settings shared with the engine.
#[derive(Debug, Clone)]
pub struct DmConfig {
    /// Root of the tree the DM downloads into.
    pub download_dir: PathBuf,
    /// Port of the DM web interface on localhost.
    pub port: u16,
}

impl DmConfig {
    /// Read the DM's properties file. Lines starting with '#' are
    /// comments; everything else is `key=value`.
    pub fn from_properties(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let mut download_dir: Option<PathBuf> = None;
        let mut port: Option<u16> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key.trim() {
                KEY_DOWNLOAD_DIR => download_dir = Some(PathBuf::from(value.trim())),
                KEY_PORT => {
                    port = Some(value.trim().parse().map_err(|_| {
                        DmError::Config(format!("Bad {}: '{}'", KEY_PORT, value.trim()))
                    })?)
                }
                _ => {}
            }
        }

        let download_dir = download_dir.ok_or_else(|| {
            DmError::Config(format!("{} not found in {}", KEY_DOWNLOAD_DIR, path.display()))
        })?;
        let port = port.ok_or_else(|| {
            DmError::Config(format!("{} not found in {}", KEY_PORT, path.display()))
        })?;

        debug!(dir = %download_dir.display(), port, "Read download manager properties");
        Ok(Self { download_dir, port })
    }

    /// Base URL of the DM command interface.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}/download-manager/", self.port)
    }
}

/// Make sure the download tree exists: the base directory plus the
/// current-year subdirectory new downloads land in.
pub fn ensure_download_dirs(base: &Path) -> Result<()> {
    std::fs::create_dir_all(base)?;
    let year = chrono::Utc::now().format("%Y").to_string();
    std::fs::create_dir_all(base.join(year))?;
    Ok(())
}

/// Wait until the DM web interface accepts TCP connections.
pub async fn wait_for_port(port: u16, max_wait: Duration) -> Result<()> {
    let max_wait = max_wait.min(MAX_PORT_WAIT);
    let addr = format!("127.0.0.1:{}", port);
    let start = std::time::Instant::now();

    info!(port, "Waiting for download manager port");
    loop {
        match TcpStream::connect(&addr).await {
            Ok(_) => {
                info!(port, "Download manager port is up");
                return Ok(());
            }
            Err(e) => {
                if start.elapsed() >= max_wait {
                    return Err(DmError::Timeout(format!(
                        "port {} not up after {}s: {}",
                        port,
                        max_wait.as_secs(),
                        e
                    )));
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
