//! Parsing of `wg show <intf> dump` output
//!
//! The first line describes the interface itself and is skipped. Every
//! following line is one peer with eight tab-separated fields:
//! public key, preshared key, endpoint, allowed IPs, latest handshake,
//! rx bytes, tx bytes, persistent keepalive.
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use ipnet::IpNet;
use serde::Serialize;

use crate::error::Result;
use crate::malformed_record;

const NONE_MARKER: &str = "(none)";
const KEEPALIVE_OFF: &str = "off";
const PEER_FIELDS: usize = 8;

/// Live view of one remote peer, as reported by the tunnel device
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PeerSessionRecord {
    pub public_key: String,
    pub preshared_key: bool,
    pub endpoint: Option<SocketAddr>,
    pub allowed_ips: Vec<IpNet>,
    /// Epoch seconds of the latest handshake, `None` if never
    pub last_handshake: Option<u64>,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub keepalive: Option<u16>,
}

impl PeerSessionRecord {
    /// Seconds since the latest handshake, `None` if never handshaked
    pub fn handshake_age(&self, now: u64) -> Option<u64> {
        self.last_handshake.map(|ts| now.saturating_sub(ts))
    }
}

/// Parse a full dump, one result per peer line
pub fn parse_dump(dump: &str) -> Vec<Result<PeerSessionRecord>> {
    dump.lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(parse_peer_line)
        .collect()
}

pub fn parse_peer_line(line: &str) -> Result<PeerSessionRecord> {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
    if fields.len() != PEER_FIELDS {
        return Err(malformed_record!(
            "expected {} fields, got {} in {:?}",
            PEER_FIELDS,
            fields.len(),
            line
        ));
    }

    let public_key = fields[0].trim();
    if public_key.is_empty() {
        return Err(malformed_record!("empty public key in {:?}", line));
    }

    let endpoint = match fields[2] {
        NONE_MARKER | "" => None,
        raw => Some(parse_endpoint(raw)?),
    };

    let allowed_ips = match fields[3] {
        NONE_MARKER | "" => Vec::new(),
        raw => raw
            .split(',')
            .map(|cidr| {
                cidr.trim()
                    .parse::<IpNet>()
                    .map_err(|e| malformed_record!("bad allowed ip {:?}: {}", cidr, e))
            })
            .collect::<Result<Vec<_>>>()?,
    };

    let last_handshake = match parse_u64(fields[4], "latest handshake")? {
        0 => None,
        ts => Some(ts),
    };

    let keepalive = match fields[7] {
        KEEPALIVE_OFF | "" | "0" => None,
        raw => Some(
            raw.parse::<u16>()
                .map_err(|e| malformed_record!("bad keepalive {:?}: {}", raw, e))?,
        ),
    };

    Ok(PeerSessionRecord {
        public_key: public_key.to_string(),
        preshared_key: !matches!(fields[1], NONE_MARKER | ""),
        endpoint,
        allowed_ips,
        last_handshake,
        rx_bytes: parse_u64(fields[5], "rx bytes")?,
        tx_bytes: parse_u64(fields[6], "tx bytes")?,
        keepalive,
    })
}

/// Parse a device endpoint: `[ipv6]:port` or `ipv4:port`
pub fn parse_endpoint(raw: &str) -> Result<SocketAddr> {
    if let Some(rest) = raw.strip_prefix('[') {
        let (host, port) = rest
            .split_once("]:")
            .ok_or_else(|| malformed_record!("bad ipv6 endpoint {:?}", raw))?;
        // zone ids (fe80::1%wg0) are not carried in gossip
        let host = host.split('%').next().unwrap_or(host);
        let host: Ipv6Addr = host
            .parse()
            .map_err(|e| malformed_record!("bad ipv6 host in {:?}: {}", raw, e))?;
        Ok(SocketAddr::V6(SocketAddrV6::new(host, parse_port(port, raw)?, 0, 0)))
    } else {
        let (host, port) = raw
            .rsplit_once(':')
            .ok_or_else(|| malformed_record!("bad ipv4 endpoint {:?}", raw))?;
        let host: Ipv4Addr = host
            .parse()
            .map_err(|e| malformed_record!("bad ipv4 host in {:?}: {}", raw, e))?;
        Ok(SocketAddr::V4(SocketAddrV4::new(host, parse_port(port, raw)?)))
    }
}

fn parse_port(port: &str, raw: &str) -> Result<u16> {
    port.parse::<u16>()
        .map_err(|e| malformed_record!("bad port in {:?}: {}", raw, e))
}

fn parse_u64(field: &str, what: &str) -> Result<u64> {
    field
        .trim()
        .parse::<u64>()
        .map_err(|e| malformed_record!("bad {} {:?}: {}", what, field, e))
}
