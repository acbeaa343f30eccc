//! Rendezvous UDP Transport
//!
//! One socket per automaton, bound to the local tunnel address on the
//! rendezvous port. It both receives peer status and sends our own, so peers
//! see datagrams coming from our tunnel address.

pub mod receiver;
pub mod traits;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::{RoamError, Result};
pub use traits::DatagramSender;

#[derive(Clone, Debug)]
pub struct RendezvousSocket {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
}

impl RendezvousSocket {
    /// Bind the rendezvous socket. The address is reusable so a restarted
    /// automaton can bind again right after the old socket closed.
    pub async fn bind(bind_addr: SocketAddr) -> Result<Self> {
        let fault = |e: std::io::Error| {
            RoamError::SocketFault(format!("Socket bind to {} failed: {}", bind_addr, e))
        };
        let domain = if bind_addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(fault)?;
        socket.set_reuse_address(true).map_err(fault)?;
        socket.set_nonblocking(true).map_err(fault)?;
        socket.bind(&bind_addr.into()).map_err(fault)?;

        let socket = UdpSocket::from_std(socket.into()).map_err(fault)?;
        let local_addr = socket.local_addr().map_err(fault)?;

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
        })
    }

    /// Get the local socket address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl DatagramSender for RendezvousSocket {
    async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        self.socket.send_to(data, target).await?;
        Ok(())
    }
}
