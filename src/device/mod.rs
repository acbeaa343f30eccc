//! Tunnel device and routing boundaries
//!
//! The automaton only ever reads a dump of peer session state and writes peer
//! endpoints; it asks the routing subsystem a single question. Both sides sit
//! behind traits so the automaton can run against in-memory fakes.
pub mod records;
pub mod routing;
pub mod wireguard;

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::Result;
pub use records::{parse_dump, parse_endpoint, PeerSessionRecord};
pub use routing::IpRouteProbe;
pub use wireguard::WgDevice;

/// Access to the tunnel device's live peer state
#[async_trait]
pub trait TunnelDevice: Send + Sync {
    /// Raw dump of the interface and its peers (`wg show <intf> dump` format)
    async fn dump(&self, interface: &str) -> Result<String>;

    /// Point a peer at a new remote endpoint
    async fn set_peer_endpoint(
        &self,
        interface: &str,
        public_key: &str,
        endpoint: SocketAddr,
    ) -> Result<()>;
}

/// Query side of the local routing subsystem
#[async_trait]
pub trait RouteProbe: Send + Sync {
    /// Whether `table` holds an IPv6 default route
    async fn has_ipv6_default_route(&self, table: &str) -> Result<bool>;
}
