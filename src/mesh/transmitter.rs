use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ipnet::IpNet;
use tracing::{debug, warn};

use super::collector::StatusCollector;
use super::messages::{GossipMessage, PeerObservation};
use super::stats::AutomatonStats;
use crate::concurrency_error;
use crate::device::PeerSessionRecord;
use crate::error::Result;
use crate::settings::{AutomatonConfig, NetworkConfig};
use crate::transport::DatagramSender;

/// The most recent status we put on the wire
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LastSentStatus {
    pub message: GossipMessage,
    pub sent_at: u64,
}

/// Periodically tells subnet-adjacent peers which endpoints we see live.
pub struct Transmitter {
    interface: String,
    collector: StatusCollector,
    destinations: Vec<SocketAddr>,
    liveness_threshold: Duration,
    cooldown: Duration,
    last_sent: Mutex<Option<LastSentStatus>>,
    stats: Arc<AutomatonStats>,
}

impl std::fmt::Debug for Transmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transmitter")
            .field("interface", &self.interface)
            .field("destinations", &self.destinations)
            .finish()
    }
}

impl Transmitter {
    pub fn new(
        config: &AutomatonConfig,
        collector: StatusCollector,
        stats: Arc<AutomatonStats>,
    ) -> Self {
        let destinations = gossip_destinations(&config.network, config.rendezvous_port);
        debug!(
            "[{}] Gossip destinations: {:?}",
            config.interface, destinations
        );
        Self {
            interface: config.interface.clone(),
            collector,
            destinations,
            liveness_threshold: config.timing.liveness_threshold,
            cooldown: config.timing.cooldown,
            last_sent: Mutex::new(None),
            stats,
        }
    }

    pub fn destinations(&self) -> &[SocketAddr] {
        &self.destinations
    }

    pub fn last_sent(&self) -> Option<LastSentStatus> {
        self.last_sent.lock().ok().and_then(|last| last.clone())
    }

    /// Forget what was sent, so the next cycle sends regardless of cool-down
    pub fn reset(&self) {
        if let Ok(mut last) = self.last_sent.lock() {
            *last = None;
        }
    }

    /// One transmit cycle; returns the number of datagrams sent
    pub async fn run_once(&self, now: u64, sender: &dyn DatagramSender) -> Result<usize> {
        let records = self.collector.collect().await;
        let message = build_status(&records, now, self.liveness_threshold);

        let due = {
            let last = self
                .last_sent
                .lock()
                .map_err(|e| concurrency_error!("Mutex lock fail {}", e))?;
            should_send(&message, last.as_ref(), now, self.cooldown)
        };
        if !due {
            if !message.is_empty() {
                AutomatonStats::incr(&self.stats.gossip_suppressed);
            }
            debug!(
                "[{}] Skipping status message ({} live peers)",
                self.interface,
                message.len()
            );
            return Ok(0);
        }

        let payload = message.encode()?;
        debug!(
            "[{}] Send status message: {}",
            self.interface,
            String::from_utf8_lossy(&payload)
        );

        let mut sent = 0;
        for target in &self.destinations {
            match sender.send_to(&payload, *target).await {
                Ok(()) => {
                    sent += 1;
                    AutomatonStats::incr(&self.stats.gossip_sent);
                }
                Err(e) => {
                    AutomatonStats::incr(&self.stats.send_errors);
                    warn!(
                        "[{}] Failed to send peer status to {}: {}",
                        self.interface, target, e
                    );
                }
            }
        }

        let mut last = self
            .last_sent
            .lock()
            .map_err(|e| concurrency_error!("Mutex lock fail {}", e))?;
        *last = Some(LastSentStatus {
            message,
            sent_at: now,
        });
        Ok(sent)
    }
}

/// Status of every peer handshaked within `liveness` that has an endpoint
pub fn build_status(records: &[PeerSessionRecord], now: u64, liveness: Duration) -> GossipMessage {
    let mut message = GossipMessage::default();
    for record in records {
        let live = matches!(record.handshake_age(now), Some(age) if age < liveness.as_secs());
        if let (true, Some(endpoint), Some(ts)) = (live, record.endpoint, record.last_handshake) {
            message.peers.insert(
                record.public_key.clone(),
                PeerObservation::from_endpoint(endpoint, ts),
            );
        }
    }
    message
}

/// Non-empty status goes out if it changed or the cool-down has elapsed
pub fn should_send(
    message: &GossipMessage,
    last: Option<&LastSentStatus>,
    now: u64,
    cooldown: Duration,
) -> bool {
    if message.is_empty() {
        return false;
    }
    match last {
        None => true,
        Some(last) => {
            last.message != *message || now.saturating_sub(last.sent_at) > cooldown.as_secs()
        }
    }
}

/// One address per configured peer: its first allowed IPv4 range inside our
/// own tunnel subnet. Peers outside the subnet are not gossiped to.
pub fn gossip_destinations(network: &NetworkConfig, port: u16) -> Vec<SocketAddr> {
    network
        .peers
        .iter()
        .filter_map(|peer| {
            peer.allowed_ips.iter().find_map(|allowed| match allowed {
                IpNet::V4(net) if network.ipv4.contains(net) => {
                    Some(SocketAddr::new(IpAddr::V4(net.addr()), port))
                }
                _ => None,
            })
        })
        .collect()
}
