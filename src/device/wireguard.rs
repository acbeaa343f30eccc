use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::TunnelDevice;
use crate::error::{RoamError, Result};

const DEFAULT_WG_BINARY: &str = "wg";

/// Kernel WireGuard device driven through the `wg` tool
#[derive(Clone, Debug)]
pub struct WgDevice {
    binary: String,
}

impl Default for WgDevice {
    fn default() -> Self {
        Self {
            binary: DEFAULT_WG_BINARY.to_string(),
        }
    }
}

impl WgDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different `wg` executable (e.g. a wrapper or absolute path)
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(args).kill_on_drop(true);
        command
    }
}

#[async_trait]
impl TunnelDevice for WgDevice {
    async fn dump(&self, interface: &str) -> Result<String> {
        let output = self
            .command(&["show", interface, "dump"])
            .output()
            .await
            .map_err(|e| {
                RoamError::DeviceQueryFailed(format!("failed to run {}: {}", self.binary, e))
            })?;

        if !output.status.success() {
            return Err(RoamError::DeviceQueryFailed(format!(
                "{} show {} dump exited with {}: {}",
                self.binary,
                interface,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn set_peer_endpoint(
        &self,
        interface: &str,
        public_key: &str,
        endpoint: SocketAddr,
    ) -> Result<()> {
        let endpoint = endpoint.to_string();
        debug!(
            "[{}] {} set {} peer {} endpoint {}",
            interface, self.binary, interface, public_key, endpoint
        );
        let output = self
            .command(&["set", interface, "peer", public_key, "endpoint", &endpoint])
            .output()
            .await
            .map_err(|e| {
                RoamError::DeviceCommandFailed(format!("failed to run {}: {}", self.binary, e))
            })?;

        if !output.status.success() {
            return Err(RoamError::DeviceCommandFailed(format!(
                "setting endpoint {} for peer {} exited with {}: {}",
                endpoint,
                public_key,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}
