//! CLI for this application
//!
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::settings;

#[derive(Clone, Debug, clap::Parser)]
#[clap(name = settings::APP_NAME, version = settings::APP_VERSION)]
pub struct Cli {
    // Status API listen address
    #[clap(
        long,
        default_value = "127.0.0.1",
        env("MESHROAM_LISTEN_ADDRESS"),
        help = "IP Address the status API listens on"
    )]
    pub listen_address: String,

    // Status API listen port
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_HTTP,
        env("MESHROAM_HTTP_LISTEN_PORT"),
        help = "Port to bind the status API to"
    )]
    pub listen_port: u16,

    // Managed tunnel interface
    #[clap(
        long,
        env("MESHROAM_INTERFACE"),
        help = "WireGuard interface to manage (e.g. wg0)"
    )]
    pub interface: String,

    // Interface network configuration (JSON)
    #[clap(
        long,
        env("MESHROAM_NETWORK_CONFIG"),
        help = "Path to the interface network config (ipv4, bindIntf, peers)"
    )]
    pub network_config: PathBuf,

    // UDP port for gossip
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_RENDEZVOUS,
        env("MESHROAM_RENDEZVOUS_PORT"),
        help = "UDP port of the gossip side-channel"
    )]
    pub rendezvous_port: u16,

    #[clap(
        long,
        default_value = settings::DEFAULT_TRANSMIT_INTERVAL_SECS,
        env("MESHROAM_TRANSMIT_INTERVAL_SECONDS"),
        help = "Seconds between peer status broadcasts"
    )]
    pub transmit_interval_seconds: u64,

    #[clap(
        long,
        default_value = settings::DEFAULT_RECONCILE_INTERVAL_SECS,
        env("MESHROAM_RECONCILE_INTERVAL_SECONDS"),
        help = "Seconds between endpoint reconciliations"
    )]
    pub reconcile_interval_seconds: u64,

    #[clap(
        long,
        default_value = settings::DEFAULT_LIVENESS_THRESHOLD_SECS,
        env("MESHROAM_LIVENESS_THRESHOLD_SECONDS"),
        help = "Peers handshaked within this many seconds are advertised"
    )]
    pub liveness_threshold_seconds: u64,

    #[clap(
        long,
        default_value = settings::DEFAULT_STALENESS_THRESHOLD_SECS,
        env("MESHROAM_STALENESS_THRESHOLD_SECONDS"),
        help = "Peers not handshaked within this many seconds may be re-pointed"
    )]
    pub staleness_threshold_seconds: u64,

    #[clap(
        long,
        default_value = settings::DEFAULT_COOLDOWN_SECS,
        env("MESHROAM_COOLDOWN_SECONDS"),
        help = "Seconds before an unchanged status is sent again"
    )]
    pub cooldown_seconds: u64,

    #[clap(
        long,
        default_value = settings::DEFAULT_RESTART_BACKOFF_SECS,
        env("MESHROAM_RESTART_BACKOFF_SECONDS"),
        help = "Seconds to wait before rebuilding a failed socket"
    )]
    pub restart_backoff_seconds: u64,
}

impl Cli {
    pub fn into_settings(self) -> Result<settings::Settings> {
        let network = settings::NetworkConfig::load(&self.network_config)?;
        let settings = settings::Settings {
            listen_address: self.listen_address,
            listen_port: self.listen_port,
            interface: self.interface,
            rendezvous_port: self.rendezvous_port,
            network,
            timing: settings::TimingConfig {
                transmit_interval: Duration::from_secs(self.transmit_interval_seconds),
                reconcile_interval: Duration::from_secs(self.reconcile_interval_seconds),
                liveness_threshold: Duration::from_secs(self.liveness_threshold_seconds),
                staleness_threshold: Duration::from_secs(self.staleness_threshold_seconds),
                cooldown: Duration::from_secs(self.cooldown_seconds),
                restart_backoff: Duration::from_secs(self.restart_backoff_seconds),
            },
        };
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from([
            "meshroam",
            "--interface",
            "wg0",
            "--network-config",
            "/etc/meshroam/wg0.json",
        ])
        .unwrap();

        assert_eq!(cli.rendezvous_port, settings::STANDARD_PORT_RENDEZVOUS);
        assert_eq!(cli.listen_port, settings::STANDARD_PORT_HTTP);
        assert_eq!(cli.transmit_interval_seconds, 15);
        assert_eq!(cli.reconcile_interval_seconds, 19);
        assert_eq!(cli.staleness_threshold_seconds, 150);
    }

    #[test]
    fn test_missing_config_file_is_config_error() {
        let cli = Cli::try_parse_from([
            "meshroam",
            "--interface",
            "wg0",
            "--network-config",
            "/nonexistent/meshroam.json",
        ])
        .unwrap();

        let err = cli.into_settings().unwrap_err();
        assert_eq!(err.error_type(), "configuration_error");
    }
}
