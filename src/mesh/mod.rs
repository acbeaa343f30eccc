//! Peer-endpoint rendezvous
//!
//! Mesh members tell their subnet neighbours where they currently see each
//! peer, and point quiet tunnels at endpoints that others saw working more
//! recently.
pub mod automaton;
pub mod collector;
pub mod messages;
pub mod peer_info;
pub mod receiver;
pub mod reconciler;
pub mod stats;
pub mod transmitter;

#[cfg(test)]
pub(crate) mod testing;

pub use automaton::MeshAutomaton;
pub use collector::StatusCollector;
pub use messages::{GossipMessage, PeerObservation};
pub use peer_info::{PeerInfo, PeerInfoTable};
pub use receiver::GossipReceiver;
pub use reconciler::Reconciler;
pub use stats::{AutomatonStats, FrozenAutomatonStats};
pub use transmitter::{LastSentStatus, Transmitter};

/// Wall-clock seconds since the epoch, the unit of handshake timestamps
pub fn now_epoch_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}
