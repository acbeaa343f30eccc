//! UDP Receiver
//!
//! Drains the rendezvous socket on its own task and hands every datagram to a
//! synchronous callback. Payload problems are the callback's business; only a
//! failing socket ends the loop, reported on the fault channel.
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::RendezvousSocket;
use crate::error::RoamError;

const RECV_BUFFER_SIZE: usize = 65536;

impl RendezvousSocket {
    /// Start receiving with a synchronous callback
    pub fn start_receiving<F>(
        &self,
        interface: String,
        mut callback: F,
        fault_tx: mpsc::Sender<RoamError>,
    ) -> JoinHandle<()>
    where
        F: FnMut(&[u8], SocketAddr) + Send + 'static,
    {
        let socket = Arc::clone(&self.socket);

        tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, addr)) => callback(&buf[..len], addr),
                    Err(e) if is_transient(&e) => {
                        // ICMP feedback from an earlier send, not a broken socket
                        debug!("[{}] Ignoring transient UDP error: {}", interface, e);
                    }
                    Err(e) => {
                        error!("[{}] Error occurred on UDP socket: {}", interface, e);
                        let _ = fault_tx
                            .send(RoamError::SocketFault(format!("receive failed: {}", e)))
                            .await;
                        break;
                    }
                }
            }
        })
    }
}

fn is_transient(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset | ErrorKind::Interrupted
    )
}
