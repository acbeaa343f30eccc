//! Merged knowledge of where each peer was last seen.
//!
//! Every address family keeps its own timestamp and only moves forward: an
//! observation is applied to a family only if its timestamp is strictly newer
//! than the stored one. This makes merging idempotent and independent of
//! delivery order.
use std::collections::{BTreeMap, HashMap};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::Serialize;

use super::messages::{GossipMessage, PeerObservation};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PeerInfo {
    pub v4: Option<Ipv4Addr>,
    pub port4: Option<u16>,
    /// Handshake time that justified `v4`, 0 if never set
    pub ts4: u64,
    pub v6: Option<Ipv6Addr>,
    pub port6: Option<u16>,
    /// Handshake time that justified `v6`, 0 if never set
    pub ts6: u64,
}

impl PeerInfo {
    /// Apply one observation; returns whether any family advanced
    pub fn merge(&mut self, observation: &PeerObservation) -> bool {
        let mut advanced = false;

        if let (Some(v4), Some(ts4)) = (observation.v4, observation.ts4) {
            if ts4 > self.ts4 {
                self.v4 = Some(v4);
                self.ts4 = ts4;
                if observation.port.is_some() {
                    self.port4 = observation.port;
                }
                advanced = true;
            }
        }

        if let (Some(v6), Some(ts6)) = (observation.v6, observation.ts6) {
            if ts6 > self.ts6 {
                self.v6 = Some(v6);
                self.ts6 = ts6;
                if observation.port.is_some() {
                    self.port6 = observation.port;
                }
                advanced = true;
            }
        }

        advanced
    }

    pub fn endpoint_v4(&self) -> Option<SocketAddr> {
        match (self.v4, self.port4) {
            (Some(ip), Some(port)) => Some(SocketAddr::from((ip, port))),
            _ => None,
        }
    }

    pub fn endpoint_v6(&self) -> Option<SocketAddr> {
        match (self.v6, self.port6) {
            (Some(ip), Some(port)) => Some(SocketAddr::from((ip, port))),
            _ => None,
        }
    }
}

/// Peer info keyed by public key, one table per automaton instance
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PeerInfoTable {
    entries: HashMap<String, PeerInfo>,
}

impl PeerInfoTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a whole gossip message; returns how many peers advanced
    pub fn merge_message(&mut self, message: &GossipMessage) -> usize {
        let mut advanced = 0;
        for (public_key, observation) in &message.peers {
            if self.merge(public_key, observation) {
                advanced += 1;
            }
        }
        advanced
    }

    pub fn merge(&mut self, public_key: &str, observation: &PeerObservation) -> bool {
        self.entries
            .entry(public_key.to_string())
            .or_default()
            .merge(observation)
    }

    pub fn get(&self, public_key: &str) -> Option<&PeerInfo> {
        self.entries.get(public_key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ordered copy of the table, for reporting
    pub fn snapshot(&self) -> BTreeMap<String, PeerInfo> {
        self.entries
            .iter()
            .map(|(key, info)| (key.clone(), info.clone()))
            .collect()
    }
}
