use async_trait::async_trait;
use tokio::process::Command;

use super::RouteProbe;
use crate::error::{RoamError, Result};

/// Answers routing questions with `ip -6 route show`
#[derive(Clone, Debug)]
pub struct IpRouteProbe {
    binary: String,
}

impl Default for IpRouteProbe {
    fn default() -> Self {
        Self {
            binary: "ip".to_string(),
        }
    }
}

impl IpRouteProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl RouteProbe for IpRouteProbe {
    async fn has_ipv6_default_route(&self, table: &str) -> Result<bool> {
        let output = Command::new(&self.binary)
            .args(["-6", "route", "show", "default", "table", table])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                RoamError::DeviceQueryFailed(format!("failed to run {}: {}", self.binary, e))
            })?;

        if !output.status.success() {
            return Err(RoamError::DeviceQueryFailed(format!(
                "route lookup in table {} exited with {}",
                table, output.status
            )));
        }
        Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }
}
