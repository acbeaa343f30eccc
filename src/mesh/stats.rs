//! Counters for one automaton instance
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct AutomatonStats {
    pub datagrams_received: AtomicU64,
    pub malformed_payloads: AtomicU64,
    pub peers_advanced: AtomicU64,
    pub gossip_sent: AtomicU64,
    pub gossip_suppressed: AtomicU64,
    pub send_errors: AtomicU64,
    pub endpoint_overrides: AtomicU64,
    pub device_errors: AtomicU64,
    pub socket_restarts: AtomicU64,
}

/// Point-in-time copy of [`AutomatonStats`]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FrozenAutomatonStats {
    pub datagrams_received: u64,
    pub malformed_payloads: u64,
    pub peers_advanced: u64,
    pub gossip_sent: u64,
    pub gossip_suppressed: u64,
    pub send_errors: u64,
    pub endpoint_overrides: u64,
    pub device_errors: u64,
    pub socket_restarts: u64,
}

impl AutomatonStats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn freeze(&self) -> FrozenAutomatonStats {
        FrozenAutomatonStats {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            malformed_payloads: self.malformed_payloads.load(Ordering::Relaxed),
            peers_advanced: self.peers_advanced.load(Ordering::Relaxed),
            gossip_sent: self.gossip_sent.load(Ordering::Relaxed),
            gossip_suppressed: self.gossip_suppressed.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            endpoint_overrides: self.endpoint_overrides.load(Ordering::Relaxed),
            device_errors: self.device_errors.load(Ordering::Relaxed),
            socket_restarts: self.socket_restarts.load(Ordering::Relaxed),
        }
    }
}
