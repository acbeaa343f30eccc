//! Endpoint Reconciler
//!
//! Points peers that stopped handshaking at an endpoint some other node saw
//! working more recently than our own last handshake. IPv6 endpoints are
//! preferred whenever this host has IPv6 egress.
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::collector::StatusCollector;
use super::peer_info::{PeerInfo, PeerInfoTable};
use super::stats::AutomatonStats;
use crate::concurrency_error;
use crate::device::{PeerSessionRecord, RouteProbe, TunnelDevice};
use crate::error::Result;
use crate::settings::AutomatonConfig;

pub struct Reconciler {
    interface: String,
    collector: StatusCollector,
    device: Arc<dyn TunnelDevice>,
    routes: Arc<dyn RouteProbe>,
    routing_table: String,
    staleness_threshold: Duration,
    peer_info: Arc<Mutex<PeerInfoTable>>,
    stats: Arc<AutomatonStats>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("interface", &self.interface)
            .field("routing_table", &self.routing_table)
            .field("staleness_threshold", &self.staleness_threshold)
            .finish()
    }
}

impl Reconciler {
    pub fn new(
        config: &AutomatonConfig,
        device: Arc<dyn TunnelDevice>,
        routes: Arc<dyn RouteProbe>,
        peer_info: Arc<Mutex<PeerInfoTable>>,
        stats: Arc<AutomatonStats>,
    ) -> Self {
        Self {
            interface: config.interface.clone(),
            collector: StatusCollector::new(config.interface.clone(), Arc::clone(&device)),
            device,
            routes,
            routing_table: config.network.routing_table(),
            staleness_threshold: config.timing.staleness_threshold,
            peer_info,
            stats,
        }
    }

    /// Whether IPv6 endpoints may be used; a failed probe counts as no
    pub async fn ipv6_eligible(&self) -> bool {
        match self.routes.has_ipv6_default_route(&self.routing_table).await {
            Ok(eligible) => eligible,
            Err(e) => {
                warn!(
                    "[{}] Failed to probe IPv6 default route in {}: {}",
                    self.interface, self.routing_table, e
                );
                false
            }
        }
    }

    /// One reconcile cycle; returns the number of endpoints changed
    pub async fn run_once(&self, now: u64) -> Result<usize> {
        let ipv6_eligible = self.ipv6_eligible().await;
        let records = self.collector.collect().await;

        let mut overridden = 0;
        for record in records
            .iter()
            .filter(|record| is_stale(record, now, self.staleness_threshold))
        {
            let info = {
                let table = self
                    .peer_info
                    .lock()
                    .map_err(|e| concurrency_error!("Mutex lock fail {}", e))?;
                table.get(&record.public_key).cloned()
            };
            let Some(info) = info else {
                continue;
            };
            let Some(endpoint) = choose_endpoint(record, &info, ipv6_eligible) else {
                debug!(
                    "[{}] No newer endpoint known for stale peer {}",
                    self.interface, record.public_key
                );
                continue;
            };

            match self
                .device
                .set_peer_endpoint(&self.interface, &record.public_key, endpoint)
                .await
            {
                Ok(()) => {
                    overridden += 1;
                    AutomatonStats::incr(&self.stats.endpoint_overrides);
                    info!(
                        "[{}] Set endpoint of peer {} to {}",
                        self.interface, record.public_key, endpoint
                    );
                }
                Err(e) => {
                    AutomatonStats::incr(&self.stats.device_errors);
                    warn!(
                        "[{}] Failed to set endpoint of peer {} to {}: {}",
                        self.interface, record.public_key, endpoint, e
                    );
                }
            }
        }
        Ok(overridden)
    }
}

/// Never handshaked, or not within `staleness`
pub fn is_stale(record: &PeerSessionRecord, now: u64, staleness: Duration) -> bool {
    match record.handshake_age(now) {
        None => true,
        Some(age) => age > staleness.as_secs(),
    }
}

/// Endpoint observed after our own last handshake, IPv6 first when eligible
pub fn choose_endpoint(
    record: &PeerSessionRecord,
    info: &PeerInfo,
    ipv6_eligible: bool,
) -> Option<SocketAddr> {
    let last_handshake = record.last_handshake.unwrap_or(0);

    if ipv6_eligible && info.ts6 > last_handshake {
        if let Some(endpoint) = info.endpoint_v6() {
            return Some(endpoint);
        }
    }
    if info.ts4 > last_handshake {
        return info.endpoint_v4();
    }
    None
}
