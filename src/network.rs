/// Network link supervision: local interface state and Wi-Fi (re)association
use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tokio::time::sleep;

const RECHECK_INTERVAL: Duration = Duration::from_millis(500);
const RECHECK_ATTEMPTS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

#[async_trait]
pub trait Network: Send {
    async fn status(&mut self) -> LinkStatus;

    /// Try to bring the link up and report where it ended
    async fn connect(&mut self) -> LinkStatus;
}

/// Reads the kernel's operstate for one interface; no traffic leaves the device
pub struct LinkMonitor {
    operstate: PathBuf,
    connection: Option<String>,
}

impl LinkMonitor {
    /// # Arguments
    /// * `interface` - Interface name, e.g. `wlan0`
    /// * `connection` - Saved NetworkManager profile to bring up on reconnect
    pub fn new(interface: &str, connection: Option<String>) -> Self {
        Self::at(
            Path::new("/sys/class/net").join(interface).join("operstate"),
            connection,
        )
    }

    pub fn at(operstate: PathBuf, connection: Option<String>) -> Self {
        Self {
            operstate,
            connection,
        }
    }

    // Credentials stay in the NetworkManager profile, off the command line
    async fn activate(&self, profile: &str) {
        info!("Activating connection {}", profile);
        let output = Command::new("nmcli")
            .args(["connection", "up", "id", profile])
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => info!("Connection {} activated", profile),
            Ok(out) => warn!(
                "nmcli failed for {}: {}",
                profile,
                String::from_utf8_lossy(&out.stderr).trim()
            ),
            Err(e) => warn!("Could not run nmcli: {}", e),
        }
    }
}

#[async_trait]
impl Network for LinkMonitor {
    async fn status(&mut self) -> LinkStatus {
        match fs::read_to_string(&self.operstate).await {
            Ok(state) if state.trim() == "up" => LinkStatus::Connected,
            Ok(state) => {
                debug!("Interface state is {}", state.trim());
                LinkStatus::Disconnected
            }
            Err(e) => {
                debug!("Could not read {}: {}", self.operstate.display(), e);
                LinkStatus::Disconnected
            }
        }
    }

    async fn connect(&mut self) -> LinkStatus {
        if let Some(profile) = self.connection.clone() {
            self.activate(&profile).await;
        }

        for _ in 0..RECHECK_ATTEMPTS {
            if self.status().await == LinkStatus::Connected {
                return LinkStatus::Connected;
            }
            sleep(RECHECK_INTERVAL).await;
        }
        LinkStatus::Disconnected
    }
}
