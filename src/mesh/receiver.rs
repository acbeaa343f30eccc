use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tracing::{debug, error};

use super::messages::GossipMessage;
use super::peer_info::PeerInfoTable;
use super::stats::AutomatonStats;
use crate::concurrency_error;
use crate::error::Result;

/// Merges inbound peer status into the peer-info table.
///
/// Runs on the socket task, so it never touches the device.
#[derive(Clone, Debug)]
pub struct GossipReceiver {
    interface: String,
    peer_info: Arc<Mutex<PeerInfoTable>>,
    stats: Arc<AutomatonStats>,
}

impl GossipReceiver {
    pub fn new(
        interface: impl Into<String>,
        peer_info: Arc<Mutex<PeerInfoTable>>,
        stats: Arc<AutomatonStats>,
    ) -> Self {
        Self {
            interface: interface.into(),
            peer_info,
            stats,
        }
    }

    /// Socket callback: handle one datagram, logging instead of failing
    pub fn on_datagram(&self, data: &[u8], from: SocketAddr) {
        if let Err(e) = self.handle_datagram(data, from) {
            error!(
                "[{}] Failed to handle peer status msg from {}: {}",
                self.interface, from, e
            );
        }
    }

    /// Handle one datagram; returns how many peers advanced
    pub fn handle_datagram(&self, data: &[u8], from: SocketAddr) -> Result<usize> {
        AutomatonStats::incr(&self.stats.datagrams_received);
        let message = match GossipMessage::decode(data) {
            Ok(message) => message,
            Err(e) => {
                AutomatonStats::incr(&self.stats.malformed_payloads);
                return Err(e);
            }
        };

        let mut table = self
            .peer_info
            .lock()
            .map_err(|e| concurrency_error!("Mutex lock fail {}", e))?;
        let advanced = table.merge_message(&message);
        AutomatonStats::add(&self.stats.peers_advanced, advanced as u64);

        debug!(
            "[{}] Peer status from {}: {} peers, {} advanced, {} known",
            self.interface,
            from,
            message.len(),
            advanced,
            table.len()
        );
        Ok(advanced)
    }
}
