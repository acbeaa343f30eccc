//! meshroam application settings
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use ipnet::{IpNet, Ipv4Net};
use serde::{Deserialize, Serialize};

use crate::config_error;
use crate::error::Result;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_PORT_HTTP: u16 = 8420;
pub const DEFAULT_PORT_HTTP: &str = "8420";
pub const STANDARD_PORT_RENDEZVOUS: u16 = 6666;
pub const DEFAULT_PORT_RENDEZVOUS: &str = "6666";

pub const DEFAULT_TRANSMIT_INTERVAL_SECS: &str = "15";
pub const DEFAULT_RECONCILE_INTERVAL_SECS: &str = "19";
pub const DEFAULT_LIVENESS_THRESHOLD_SECS: &str = "120";
pub const DEFAULT_STALENESS_THRESHOLD_SECS: &str = "150";
pub const DEFAULT_COOLDOWN_SECS: &str = "120";
pub const DEFAULT_RESTART_BACKOFF_SECS: &str = "5";

/// Routing table consulted for IPv6 egress when no WAN is bound
pub const GLOBAL_DEFAULT_TABLE: &str = "global_default";

/// Timers and thresholds of the automaton.
///
/// The transmit and reconcile periods should stay coprime so the two tasks
/// do not keep firing in the same phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimingConfig {
    pub transmit_interval: Duration,
    pub reconcile_interval: Duration,
    /// A peer handshaked within this window is advertised as live
    pub liveness_threshold: Duration,
    /// A peer not handshaked within this window may get its endpoint overridden
    pub staleness_threshold: Duration,
    /// Identical status is not re-sent within this window
    pub cooldown: Duration,
    pub restart_backoff: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            transmit_interval: Duration::from_secs(15),
            reconcile_interval: Duration::from_secs(19),
            liveness_threshold: Duration::from_secs(120),
            staleness_threshold: Duration::from_secs(150),
            cooldown: Duration::from_secs(120),
            restart_backoff: Duration::from_secs(5),
        }
    }
}

/// Static configuration of one mesh peer, as written to the tunnel config
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeerConfig {
    pub public_key: String,
    #[serde(rename = "allowedIPs", default)]
    pub allowed_ips: Vec<IpNet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Network configuration of the managed tunnel interface
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Own tunnel address with its subnet prefix, e.g. 10.89.0.1/24
    pub ipv4: Ipv4Net,
    /// WAN the tunnel is bound to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_intf: Option<String>,
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

impl NetworkConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            config_error!("Cannot read network config {}: {}", path.display(), e)
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| config_error!("Invalid network config {}: {}", path.display(), e))
    }

    /// Routing table whose default route decides IPv6 eligibility
    pub fn routing_table(&self) -> String {
        match &self.bind_intf {
            Some(intf) => format!("{}_default", intf),
            None => GLOBAL_DEFAULT_TABLE.to_string(),
        }
    }
}

/// Everything one automaton instance needs to run
#[derive(Clone, Debug)]
pub struct AutomatonConfig {
    pub interface: String,
    pub network: NetworkConfig,
    pub rendezvous_port: u16,
    pub timing: TimingConfig,
}

impl AutomatonConfig {
    /// Address the rendezvous socket binds to: own tunnel address
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.network.ipv4.addr()), self.rendezvous_port)
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    // Status API listen address
    pub listen_address: String,

    // Status API listen port
    pub listen_port: u16,

    // Tunnel interface managed by this process
    pub interface: String,

    // UDP port of the gossip side-channel
    pub rendezvous_port: u16,

    // Interface network configuration
    pub network: NetworkConfig,

    // Timers and thresholds
    pub timing: TimingConfig,
}

impl Settings {
    pub fn automaton_config(&self) -> AutomatonConfig {
        AutomatonConfig {
            interface: self.interface.clone(),
            network: self.network.clone(),
            rendezvous_port: self.rendezvous_port,
            timing: self.timing.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interface.is_empty() {
            return Err(config_error!("Interface name must not be empty"));
        }
        let timing = &self.timing;
        if timing.transmit_interval.is_zero() || timing.reconcile_interval.is_zero() {
            return Err(config_error!("Transmit and reconcile intervals must be positive"));
        }
        if timing.staleness_threshold < timing.liveness_threshold {
            return Err(config_error!(
                "Staleness threshold ({}s) must not be below liveness threshold ({}s)",
                timing.staleness_threshold.as_secs(),
                timing.liveness_threshold.as_secs()
            ));
        }
        Ok(())
    }
}
