//! Transport traits
//!
//! The transmitter only needs to hand a datagram to an address; keeping that
//! behind a trait lets it run against a recording sender in tests.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::Result;

/// Fire-and-forget datagram delivery
#[async_trait]
pub trait DatagramSender: Send + Sync {
    /// Send one datagram to `target`
    async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()>;
}
