use std::sync::Arc;

use tracing::{debug, error};

use crate::device::{parse_dump, PeerSessionRecord, TunnelDevice};
use crate::error::Result;

/// Turns device dumps into peer session records
#[derive(Clone)]
pub struct StatusCollector {
    interface: String,
    device: Arc<dyn TunnelDevice>,
}

impl std::fmt::Debug for StatusCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusCollector")
            .field("interface", &self.interface)
            .finish()
    }
}

impl StatusCollector {
    pub fn new(interface: impl Into<String>, device: Arc<dyn TunnelDevice>) -> Self {
        Self {
            interface: interface.into(),
            device,
        }
    }

    /// Current peer records; an unavailable device yields none
    pub async fn collect(&self) -> Vec<PeerSessionRecord> {
        match self.try_collect().await {
            Ok(records) => records,
            Err(e) => {
                error!("[{}] Failed to dump wireguard peers: {}", self.interface, e);
                Vec::new()
            }
        }
    }

    /// Like [`collect`](Self::collect), but a failed dump is returned to the caller.
    /// Malformed lines are still skipped.
    pub async fn try_collect(&self) -> Result<Vec<PeerSessionRecord>> {
        let dump = self.device.dump(&self.interface).await?;
        let mut records = Vec::new();
        for result in parse_dump(&dump) {
            match result {
                Ok(record) => records.push(record),
                Err(e) => error!("[{}] Failed to parse dump result: {}", self.interface, e),
            }
        }
        debug!(
            "[{}] Collected {} peer records",
            self.interface,
            records.len()
        );
        Ok(records)
    }
}
