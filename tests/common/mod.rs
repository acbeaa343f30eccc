#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Mutex;

use async_trait::async_trait;

use meshroam::device::{RouteProbe, TunnelDevice};
use meshroam::error::{Result, RoamError};

/// Tunnel device answering from an in-memory dump
#[derive(Debug, Default)]
pub struct FakeDevice {
    dump: Mutex<String>,
    failing_keys: Mutex<HashSet<String>>,
    endpoint_sets: Mutex<Vec<(String, String)>>,
}

impl FakeDevice {
    pub fn with_peers(lines: &[String]) -> Self {
        let device = Self::default();
        device.set_peers(lines);
        device
    }

    pub fn set_peers(&self, lines: &[String]) {
        let mut dump = String::from("cHJpdmF0ZQ==\tcHVibGlj\t51820\toff\n");
        for line in lines {
            dump.push_str(line);
            dump.push('\n');
        }
        *self.dump.lock().unwrap() = dump;
    }

    pub fn fail_set_for(&self, public_key: &str) {
        self.failing_keys
            .lock()
            .unwrap()
            .insert(public_key.to_string());
    }

    pub fn endpoint_sets(&self) -> Vec<(String, String)> {
        self.endpoint_sets.lock().unwrap().clone()
    }
}

#[async_trait]
impl TunnelDevice for FakeDevice {
    async fn dump(&self, _interface: &str) -> Result<String> {
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
}

#[async_trait]
impl RouteProbe for FakeRoutes {
    async fn has_ipv6_default_route(&self, _table: &str) -> Result<bool> {
        Ok(self.ipv6_default)
    }
}

/// One dump line for a peer
pub fn peer_line(public_key: &str, endpoint: Option<&str>, last_handshake: u64) -> String {
    format!(
        "{}\t(none)\t{}\t10.89.0.0/24\t{}\t100\t200\t25",
        public_key,
        endpoint.unwrap_or("(none)"),
        last_handshake
    )
}

/// A port free on both given loopback addresses
pub fn free_port(addrs: &[&str]) -> u16 {
    loop {
        let probe = std::net::UdpSocket::bind((addrs[0], 0)).unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);
        if addrs
            .iter()
            .all(|addr| std::net::UdpSocket::bind((*addr, port)).is_ok())
        {
            return port;
        }
    }
}
