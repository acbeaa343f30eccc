use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meshroam::api;
use meshroam::cli;
use meshroam::device::{IpRouteProbe, WgDevice};
use meshroam::mesh::MeshAutomaton;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meshroam=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse args and env vars
    let settings = cli::Cli::parse().into_settings()?;
    // Status API listen address setup
    let listen_address: IpAddr = settings
        .listen_address
        .parse()
        .with_context(|| format!("Invalid ip address {}", settings.listen_address))?;
    let socket_address = SocketAddr::from((listen_address, settings.listen_port));

    let automaton = Arc::new(MeshAutomaton::new(
        settings.automaton_config(),
        Arc::new(WgDevice::new()),
        Arc::new(IpRouteProbe::new()),
    ));
    automaton.start().await;

    // Start server
    info!(
        "Starting meshroam status API for {} on {}",
        settings.interface, socket_address
    );
    let served = axum::Server::bind(&socket_address)
        .serve(api::api(Arc::clone(&automaton)).into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await;

    automaton.stop().await;
    served?;
    Ok(())
}
