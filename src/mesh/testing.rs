//! In-memory stand-ins for the device, routing and socket seams
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::device::{RouteProbe, TunnelDevice};
use crate::error::{RoamError, Result};
use crate::transport::DatagramSender;

pub const INTERFACE_LINE: &str = "cHJpdmF0ZQ==\tcHVibGlj\t51820\toff";

/// One dump line for a peer
pub fn peer_line(public_key: &str, endpoint: Option<&str>, last_handshake: u64) -> String {
    format!(
        "{}\t(none)\t{}\t10.89.0.2/32\t{}\t100\t200\toff",
        public_key,
        endpoint.unwrap_or("(none)"),
        last_handshake
    )
}

pub fn dump_of(lines: &[String]) -> String {
    let mut dump = String::from(INTERFACE_LINE);
    for line in lines {
        dump.push('\n');
        dump.push_str(line);
    }
    dump.push('\n');
    dump
}

#[derive(Debug, Default)]
pub struct FakeDevice {
    dump: Mutex<String>,
    dump_fails: Mutex<bool>,
    failing_keys: Mutex<HashSet<String>>,
    endpoint_sets: Mutex<Vec<(String, String)>>,
}

impl FakeDevice {
    pub fn set_dump(&self, dump: &str) {
        *self.dump.lock().unwrap() = dump.to_string();
    }

    pub fn fail_dump(&self, fail: bool) {
        *self.dump_fails.lock().unwrap() = fail;
    }

    pub fn fail_set_for(&self, public_key: &str) {
        self.failing_keys
            .lock()
            .unwrap()
            .insert(public_key.to_string());
    }

    /// `(public_key, endpoint)` of every successful endpoint set
    pub fn endpoint_sets(&self) -> Vec<(String, String)> {
        self.endpoint_sets.lock().unwrap().clone()
    }
}

#[async_trait]
impl TunnelDevice for FakeDevice {
    async fn dump(&self, _interface: &str) -> Result<String> {
        if *self.dump_fails.lock().unwrap() {
            return Err(RoamError::DeviceQueryFailed("no such device".to_string()));
        }
        Ok(self.dump.lock().unwrap().clone())
    }

    async fn set_peer_endpoint(
        &self,
        _interface: &str,
        public_key: &str,
        endpoint: SocketAddr,
    ) -> Result<()> {
        if self.failing_keys.lock().unwrap().contains(public_key) {
            return Err(RoamError::DeviceCommandFailed(format!(
                "peer {} rejected",
                public_key
            )));
        }
        self.endpoint_sets
            .lock()
            .unwrap()
            .push((public_key.to_string(), endpoint.to_string()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeRoutes {
    pub ipv6_default: bool,
    pub fails: bool,
}

#[async_trait]
impl RouteProbe for FakeRoutes {
    async fn has_ipv6_default_route(&self, _table: &str) -> Result<bool> {
        if self.fails {
            return Err(RoamError::DeviceQueryFailed("ip not found".to_string()));
        }
        Ok(self.ipv6_default)
    }
}

#[derive(Debug, Default)]
pub struct RecordingSender {
    failing: Mutex<HashSet<SocketAddr>>,
    sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
}

impl RecordingSender {
    pub fn fail_for(&self, target: SocketAddr) {
        self.failing.lock().unwrap().insert(target);
    }

    pub fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DatagramSender for RecordingSender {
    async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        if self.failing.lock().unwrap().contains(&target) {
            return Err(RoamError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "unreachable",
            )));
        }
        self.sent.lock().unwrap().push((data.to_vec(), target));
        Ok(())
    }
}
