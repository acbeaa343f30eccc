//! Read-only views of the running automaton
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use serde::Serialize;
use tracing::instrument;

use crate::error::Result;
use crate::mesh::{FrozenAutomatonStats, MeshAutomaton, PeerInfo};

#[derive(Debug, Serialize)]
pub struct PeersResponse {
    interface: String,
    rendezvous: Option<SocketAddr>,
    peers: BTreeMap<String, PeerInfo>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    interface: String,
    running: bool,
    #[serde(flatten)]
    stats: FrozenAutomatonStats,
}

#[instrument(skip(automaton))]
pub async fn peers(
    State(automaton): State<Arc<MeshAutomaton>>,
) -> Result<axum::Json<PeersResponse>> {
    Ok(axum::Json(PeersResponse {
        interface: automaton.interface().to_string(),
        rendezvous: automaton.local_addr(),
        peers: automaton.peer_info_snapshot()?,
    }))
}

#[instrument(skip(automaton))]
pub async fn stats(State(automaton): State<Arc<MeshAutomaton>>) -> axum::Json<StatsResponse> {
    axum::Json(StatsResponse {
        interface: automaton.interface().to_string(),
        running: automaton.is_running().await,
        stats: automaton.stats(),
    })
}
