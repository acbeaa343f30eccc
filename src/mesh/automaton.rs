//! Mesh Automaton
//!
//! One instance per managed tunnel interface. A supervisor task owns the
//! rendezvous socket and three workers: the receive loop, the transmit timer
//! and the reconcile timer. A socket fault tears the workers down, waits for
//! the restart backoff and builds them again on a fresh socket. The peer-info
//! table outlives restarts.
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::collector::StatusCollector;
use super::now_epoch_secs;
use super::peer_info::{PeerInfo, PeerInfoTable};
use super::receiver::GossipReceiver;
use super::reconciler::Reconciler;
use super::stats::{AutomatonStats, FrozenAutomatonStats};
use super::transmitter::Transmitter;
use crate::concurrency_error;
use crate::device::{RouteProbe, TunnelDevice};
use crate::error::{RoamError, Result};
use crate::settings::AutomatonConfig;
use crate::transport::RendezvousSocket;

/// State shared between the automaton handle and its tasks
#[derive(Debug)]
struct Shared {
    config: AutomatonConfig,
    peer_info: Arc<Mutex<PeerInfoTable>>,
    stats: Arc<AutomatonStats>,
    transmitter: Transmitter,
    reconciler: Reconciler,
    receiver: GossipReceiver,
    bound: Mutex<Option<SocketAddr>>,
    /// Fault channel of the current workers, if any
    faults: Mutex<Option<mpsc::Sender<RoamError>>>,
}

#[derive(Debug)]
struct Running {
    shutdown_tx: oneshot::Sender<()>,
    supervisor: JoinHandle<()>,
}

#[derive(Debug)]
pub struct MeshAutomaton {
    shared: Arc<Shared>,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl MeshAutomaton {
    pub fn new(
        config: AutomatonConfig,
        device: Arc<dyn TunnelDevice>,
        routes: Arc<dyn RouteProbe>,
    ) -> Self {
        let peer_info = Arc::new(Mutex::new(PeerInfoTable::new()));
        let stats = Arc::new(AutomatonStats::default());

        let collector = StatusCollector::new(config.interface.clone(), Arc::clone(&device));
        let transmitter = Transmitter::new(&config, collector, Arc::clone(&stats));
        let reconciler = Reconciler::new(
            &config,
            device,
            routes,
            Arc::clone(&peer_info),
            Arc::clone(&stats),
        );
        let receiver = GossipReceiver::new(
            config.interface.clone(),
            Arc::clone(&peer_info),
            Arc::clone(&stats),
        );

        Self {
            shared: Arc::new(Shared {
                config,
                peer_info,
                stats,
                transmitter,
                reconciler,
                receiver,
                bound: Mutex::new(None),
                faults: Mutex::new(None),
            }),
            running: tokio::sync::Mutex::new(None),
        }
    }

    pub fn interface(&self) -> &str {
        &self.shared.config.interface
    }

    pub fn config(&self) -> &AutomatonConfig {
        &self.shared.config
    }

    /// Bind the rendezvous socket and start the workers. If the first bind
    /// fails the supervisor keeps retrying after each backoff.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("[{}] Automaton already running", self.interface());
            return;
        }

        let bind_addr = self.shared.config.bind_address();
        let first_socket = RendezvousSocket::bind(bind_addr).await;
        if let Ok(socket) = &first_socket {
            self.shared.set_bound(Some(socket.local_addr()));
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        let supervisor = tokio::spawn(async move {
            shared.supervise(first_socket, shutdown_rx).await;
        });

        info!(
            "[{}] Started peer endpoint automaton on {}",
            self.interface(),
            bind_addr
        );
        *running = Some(Running {
            shutdown_tx,
            supervisor,
        });
    }

    /// Stop every task and release the socket. Returns once the port is free.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        let _ = running.shutdown_tx.send(());
        if let Err(e) = running.supervisor.await {
            error!("[{}] Automaton supervisor failed: {}", self.interface(), e);
        }
        self.shared.set_bound(None);
        info!("[{}] Stopped peer endpoint automaton", self.interface());
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Address of the currently bound rendezvous socket
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.bound.lock().ok().and_then(|bound| *bound)
    }

    pub fn peer_info_snapshot(&self) -> Result<BTreeMap<String, PeerInfo>> {
        let table = self
            .shared
            .peer_info
            .lock()
            .map_err(|e| concurrency_error!("Mutex lock fail {}", e))?;
        Ok(table.snapshot())
    }

    pub fn stats(&self) -> FrozenAutomatonStats {
        self.shared.stats.freeze()
    }
}

impl Shared {
    fn interface(&self) -> &str {
        &self.config.interface
    }

    fn set_bound(&self, addr: Option<SocketAddr>) {
        if let Ok(mut bound) = self.bound.lock() {
            *bound = addr;
        }
    }

    fn set_faults(&self, faults: Option<mpsc::Sender<RoamError>>) {
        if let Ok(mut current) = self.faults.lock() {
            *current = faults;
        }
    }

    /// Report a fault as if the receive loop had hit it
    #[cfg(test)]
    fn inject_fault(&self, fault: RoamError) -> bool {
        let faults = self.faults.lock().ok().and_then(|faults| faults.clone());
        match faults {
            Some(faults) => faults.try_send(fault).is_ok(),
            None => false,
        }
    }

    async fn supervise(
        self: Arc<Self>,
        first_socket: Result<RendezvousSocket>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let bind_addr = self.config.bind_address();
        let mut pending = Some(first_socket);

        loop {
            let bound = match pending.take() {
                Some(first) => first,
                None => RendezvousSocket::bind(bind_addr).await,
            };

            let fault = match bound {
                Ok(socket) => {
                    self.set_bound(Some(socket.local_addr()));
                    self.transmitter.reset();

                    let (fault_tx, mut fault_rx) = mpsc::channel(1);
                    self.set_faults(Some(fault_tx.clone()));
                    let workers = self.spawn_workers(&socket, fault_tx);

                    let fault = tokio::select! {
                        _ = &mut shutdown_rx => None,
                        fault = fault_rx.recv() => Some(fault.unwrap_or_else(|| {
                            RoamError::SocketFault("receive loop ended".to_string())
                        })),
                    };

                    self.set_faults(None);
                    workers.shutdown().await;
                    drop(socket);
                    self.set_bound(None);

                    match fault {
                        Some(fault) => fault,
                        None => return,
                    }
                }
                Err(e) => e,
            };

            AutomatonStats::incr(&self.stats.socket_restarts);
            warn!(
                "[{}] {}; restarting in {}s",
                self.interface(),
                fault,
                self.config.timing.restart_backoff.as_secs_f64()
            );
            tokio::select! {
                _ = &mut shutdown_rx => return,
                _ = time::sleep(self.config.timing.restart_backoff) => {}
            }
        }
    }

    fn spawn_workers(
        self: &Arc<Self>,
        socket: &RendezvousSocket,
        fault_tx: mpsc::Sender<RoamError>,
    ) -> Workers {
        let transmit = {
            let shared = Arc::clone(self);
            let sender = socket.clone();
            let period = self.config.timing.transmit_interval;
            tokio::spawn(async move {
                let mut timer = periodic(period);
                loop {
                    timer.tick().await;
                    if let Err(e) = shared.transmitter.run_once(now_epoch_secs(), &sender).await {
                        error!("[{}] Transmit cycle failed: {}", shared.interface(), e);
                    }
                }
            })
        };

        let reconcile = {
            let shared = Arc::clone(self);
            let period = self.config.timing.reconcile_interval;
            tokio::spawn(async move {
                let mut timer = periodic(period);
                loop {
                    timer.tick().await;
                    if let Err(e) = shared.reconciler.run_once(now_epoch_secs()).await {
                        error!("[{}] Reconcile cycle failed: {}", shared.interface(), e);
                    }
                }
            })
        };

        let receiver = self.receiver.clone();
        let receive = socket.start_receiving(
            self.config.interface.clone(),
            move |data, from| receiver.on_datagram(data, from),
            fault_tx,
        );

        Workers {
            transmit,
            reconcile,
            receive,
        }
    }
}

/// Interval that first fires one full period from now
fn periodic(period: time::Duration) -> time::Interval {
    let mut timer = time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

struct Workers {
    transmit: JoinHandle<()>,
    reconcile: JoinHandle<()>,
    receive: JoinHandle<()>,
}

impl Workers {
    /// Timers first, then the receive loop
    async fn shutdown(self) {
        self.transmit.abort();
        self.reconcile.abort();
        let _ = self.transmit.await;
        let _ = self.reconcile.await;

        self.receive.abort();
        let _ = self.receive.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::messages::PeerObservation;
    use crate::mesh::testing::{FakeDevice, FakeRoutes};
    use crate::settings::{NetworkConfig, TimingConfig};
    use std::time::Duration;

    fn config(ipv4: &str) -> AutomatonConfig {
        let network: NetworkConfig =
            serde_json::from_str(&format!(r#"{{"ipv4": "{}"}}"#, ipv4)).unwrap();
        AutomatonConfig {
            interface: "wg0".to_string(),
            network,
            rendezvous_port: 0,
            timing: TimingConfig {
                transmit_interval: Duration::from_millis(50),
                reconcile_interval: Duration::from_millis(70),
                restart_backoff: Duration::from_millis(20),
                ..TimingConfig::default()
            },
        }
    }

    fn automaton(ipv4: &str) -> MeshAutomaton {
        MeshAutomaton::new(
            config(ipv4),
            Arc::new(FakeDevice::default()),
            Arc::new(FakeRoutes::default()),
        )
    }

    #[tokio::test]
    async fn test_inbound_gossip_reaches_peer_info() {
        let automaton = automaton("127.0.0.1/8");
        automaton.start().await;
        let addr = automaton.local_addr().unwrap();

        let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"not json", addr).await.unwrap();
        sender
            .send_to(
                br#"{"peers":{"peerA=":{"v4":"203.0.113.5","port":51820,"ts4":100}}}"#,
                addr,
            )
            .await
            .unwrap();

        let mut snapshot = BTreeMap::new();
        for _ in 0..50 {
            snapshot = automaton.peer_info_snapshot().unwrap();
            if !snapshot.is_empty() {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            snapshot["peerA="].endpoint_v4(),
            Some("203.0.113.5:51820".parse().unwrap())
        );
        assert_eq!(automaton.stats().malformed_payloads, 1);

        automaton.stop().await;
    }

    #[tokio::test]
    async fn test_stop_releases_port() {
        let automaton = automaton("127.0.0.1/8");
        automaton.start().await;
        assert!(automaton.is_running().await);
        let addr = automaton.local_addr().unwrap();

        automaton.stop().await;
        assert!(!automaton.is_running().await);
        assert!(automaton.local_addr().is_none());

        // a socket without SO_REUSEADDR only binds once ours is closed
        std::net::UdpSocket::bind(addr).unwrap();
    }

    #[tokio::test]
    async fn test_restart_keeps_peer_info() {
        let automaton = automaton("127.0.0.1/8");
        automaton.start().await;
        automaton
            .shared
            .peer_info
            .lock()
            .unwrap()
            .merge("peerA=", &Default::default());

        automaton.stop().await;
        automaton.start().await;
        assert!(automaton.peer_info_snapshot().unwrap().contains_key("peerA="));
        automaton.stop().await;
    }

    #[tokio::test]
    async fn test_socket_fault_rebuilds_socket_and_keeps_peer_info() {
        let automaton = automaton("127.0.0.1/8");
        automaton.start().await;
        automaton.shared.peer_info.lock().unwrap().merge(
            "peerA=",
            &PeerObservation::from_endpoint("203.0.113.5:51820".parse().unwrap(), 100),
        );

        // workers come up on the supervisor task
        let mut injected = false;
        for _ in 0..50 {
            injected = automaton
                .shared
                .inject_fault(RoamError::SocketFault("receive failed".to_string()));
            if injected {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert!(injected);

        let mut rebuilt = None;
        for _ in 0..100 {
            if automaton.stats().socket_restarts == 1 {
                rebuilt = automaton.local_addr();
                if rebuilt.is_some() {
                    break;
                }
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        let addr = rebuilt.expect("socket was not rebuilt");
        assert!(automaton.is_running().await);
        assert!(automaton.peer_info_snapshot().unwrap().contains_key("peerA="));

        // the fresh socket receives and merges into the surviving table
        let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender
            .send_to(
                br#"{"peers":{"peerB=":{"v4":"203.0.113.6","port":51820,"ts4":200}}}"#,
                addr,
            )
            .await
            .unwrap();
        let mut snapshot = BTreeMap::new();
        for _ in 0..50 {
            snapshot = automaton.peer_info_snapshot().unwrap();
            if snapshot.contains_key("peerB=") {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert!(snapshot.contains_key("peerA="));
        assert!(snapshot.contains_key("peerB="));

        automaton.stop().await;
        assert!(!automaton.shared.inject_fault(RoamError::SocketFault("late".to_string())));
    }

    #[tokio::test]
    async fn test_bind_failure_retries_until_stopped() {
        // TEST-NET-3 is never a local address
        let automaton = automaton("203.0.113.77/24");
        automaton.start().await;
        assert!(automaton.local_addr().is_none());

        for _ in 0..50 {
            if automaton.stats().socket_restarts >= 2 {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert!(automaton.stats().socket_restarts >= 2);

        time::timeout(Duration::from_secs(1), automaton.stop())
            .await
            .unwrap();
    }
}
