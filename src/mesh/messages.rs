//! Gossip Message Protocol
//!
//! Peer status travels as UTF-8 JSON over the rendezvous UDP port:
//!
//! ```text
//! {"peers":{"<publicKey>":{"v4":"203.0.113.5","port":51820,"ts4":1700000000}}}
//! ```
//!
//! Absent fields are omitted. Timestamps are epoch seconds; decimal strings
//! are accepted as well since some senders forward the raw dump text.
//! A `%zone` suffix on a link-local IPv6 address is dropped.
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::{RoamError, Result};

/// One peer as observed first-hand by the sender
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerObservation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v4: Option<Ipv4Addr>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_ipv6"
    )]
    pub v6: Option<Ipv6Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_timestamp"
    )]
    pub ts4: Option<u64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_timestamp"
    )]
    pub ts6: Option<u64>,
}

impl PeerObservation {
    /// Observation of a peer seen at `endpoint` with a handshake at `ts`
    pub fn from_endpoint(endpoint: SocketAddr, ts: u64) -> Self {
        match endpoint {
            SocketAddr::V4(addr) => Self {
                v4: Some(*addr.ip()),
                port: Some(addr.port()),
                ts4: Some(ts),
                ..Default::default()
            },
            SocketAddr::V6(addr) => Self {
                v6: Some(*addr.ip()),
                port: Some(addr.port()),
                ts6: Some(ts),
                ..Default::default()
            },
        }
    }
}

/// Status message exchanged between mesh members
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipMessage {
    #[serde(default)]
    pub peers: BTreeMap<String, PeerObservation>,
}

impl GossipMessage {
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| RoamError::MalformedGossipPayload(e.to_string()))
    }
}

fn deserialize_ipv6<'de, D>(deserializer: D) -> std::result::Result<Option<Ipv6Addr>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(text) => {
            let host = text.split('%').next().unwrap_or(&text);
            host.parse::<Ipv6Addr>()
                .map(Some)
                .map_err(|e| de::Error::custom(format!("invalid ipv6 address {:?}: {}", text, e)))
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Seconds(u64),
    Fractional(f64),
    Text(String),
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawTimestamp>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawTimestamp::Seconds(ts)) => Ok(Some(ts)),
        Some(RawTimestamp::Fractional(ts)) if ts.is_finite() && ts >= 0.0 => Ok(Some(ts as u64)),
        Some(RawTimestamp::Fractional(ts)) => {
            Err(de::Error::custom(format!("invalid timestamp {}", ts)))
        }
        Some(RawTimestamp::Text(text)) => text
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| de::Error::custom(format!("invalid timestamp {:?}: {}", text, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_omits_absent_fields() {
        let mut message = GossipMessage::default();
        message.peers.insert(
            "peerA=".to_string(),
            PeerObservation::from_endpoint("203.0.113.5:51820".parse().unwrap(), 1_700_000_000),
        );

        let encoded = String::from_utf8(message.encode().unwrap()).unwrap();
        assert_eq!(
            encoded,
            r#"{"peers":{"peerA=":{"v4":"203.0.113.5","port":51820,"ts4":1700000000}}}"#
        );
    }

    #[test]
    fn test_ipv6_observation() {
        let obs = PeerObservation::from_endpoint("[2001:db8::1]:51820".parse().unwrap(), 42);
        assert_eq!(obs.v6, Some("2001:db8::1".parse().unwrap()));
        assert_eq!(obs.ts6, Some(42));
        assert_eq!(obs.v4, None);
        assert_eq!(obs.ts4, None);
    }

    #[test]
    fn test_decode_string_timestamps() {
        let raw = br#"{"peers":{"peerA=":{"v6":"2001:db8::1","port":51820,"ts6":"1700000000"}}}"#;
        let message = GossipMessage::decode(raw).unwrap();
        assert_eq!(message.peers["peerA="].ts6, Some(1_700_000_000));
    }

    #[test]
    fn test_decode_drops_ipv6_zone() {
        let raw = br#"{"peers":{"peerA=":{"v6":"fe80::1%eth0","port":51820,"ts6":100},"peerB=":{"v4":"203.0.113.5","port":51820,"ts4":100}}}"#;
        let message = GossipMessage::decode(raw).unwrap();
        assert_eq!(message.len(), 2);
        assert_eq!(message.peers["peerA="].v6, Some("fe80::1".parse().unwrap()));
        assert_eq!(message.peers["peerA="].ts6, Some(100));
        assert_eq!(message.peers["peerB="].v4, Some("203.0.113.5".parse().unwrap()));
    }

    #[test]
    fn test_decode_fractional_timestamps() {
        let raw = br#"{"peers":{"peerA=":{"v4":"203.0.113.5","port":51820,"ts4":1700000000.75}}}"#;
        let message = GossipMessage::decode(raw).unwrap();
        assert_eq!(message.peers["peerA="].ts4, Some(1_700_000_000));
    }

    #[test]
    fn test_decode_missing_peers_is_empty() {
        let message = GossipMessage::decode(b"{}").unwrap();
        assert!(message.is_empty());
    }

    #[test]
    fn test_decode_garbage_is_malformed() {
        for raw in [
            &b"not json"[..],
            &b"\xff\xfe"[..],
            &br#"{"peers":{"peerA=":{"v4":"not-an-ip"}}}"#[..],
            &br#"{"peers":{"peerA=":{"v6":"%eth0"}}}"#[..],
            &br#"{"peers":{"peerA=":{"ts4":"yesterday"}}}"#[..],
        ] {
            assert!(matches!(
                GossipMessage::decode(raw),
                Err(RoamError::MalformedGossipPayload(_))
            ));
        }
    }
}
