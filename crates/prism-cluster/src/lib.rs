//! Decentralized master election and color coordination
//!
//! This crate implements bully-style leader election among peer nodes on a
//! shared network segment. Each node discovers its peers, determines
//! whether a master already exists, and otherwise runs an election won by
//! the numerically highest address. The elected master assigns a color
//! label to every worker and re-pushes assignments periodically; workers
//! monitor the master and trigger a fresh election when it fails.

pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod election;
pub mod error;
pub mod monitor;
pub mod protocol;
pub mod state;
pub mod transport;

pub use config::ClusterConfig;
pub use coordinator::MasterCoordinator;
pub use election::{ElectionEngine, ElectionOutcome};
pub use error::{ClusterError, Result};
pub use monitor::{FailureDetector, WatchOutcome};
pub use protocol::{ColorAssignment, NodeDetails, RegisterRequest, RegisterResponse};
pub use state::{Color, NodePhase, NodeState, SharedState};
pub use transport::{HttpTransport, PeerTransport};

use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Orchestrates the cluster components of one node.
///
/// All components share the node's [`NodeState`] and its transport; the
/// `Cluster` owns the lifecycle of the background loops (failure detector,
/// coordination loop) and exposes the handlers the HTTP dispatcher routes
/// inbound peer messages to.
pub struct Cluster {
    config: ClusterConfig,
    state: SharedState,
    transport: Arc<dyn PeerTransport>,
    election: ElectionEngine,
    coordinator: MasterCoordinator,
    detector: FailureDetector,
    detector_token: Mutex<Option<CancellationToken>>,
    coordinator_token: Mutex<Option<CancellationToken>>,
}

impl Cluster {
    pub fn new(config: ClusterConfig, transport: Arc<dyn PeerTransport>) -> Arc<Self> {
        let state = NodeState::new(config.self_addr, config.node_name.clone()).shared();

        Arc::new(Self {
            election: ElectionEngine::new(state.clone(), transport.clone()),
            coordinator: MasterCoordinator::new(
                state.clone(),
                transport.clone(),
                config.push_interval,
            ),
            detector: FailureDetector::new(
                state.clone(),
                transport.clone(),
                config.heartbeat_interval,
            ),
            config,
            state,
            transport,
            detector_token: Mutex::new(None),
            coordinator_token: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Discover the segment once and take the resulting role. Runs
    /// concurrently with request handling; callers spawn it. The only
    /// error that escapes is the fatal dual-master inconsistency, which
    /// the caller must treat as a process-terminating condition.
    pub async fn bootstrap(self: Arc<Self>) -> Result<()> {
        let report = discovery::sweep(&self.state, &self.transport, &self.config).await?;

        if report.peers_found == 0 {
            info!("No other nodes have been found on the network");
            self.state.write().await.become_master();
            self.start_coordinator().await;
        } else if let Some(master) = report.master {
            self.register_with(master).await;
            self.start_detector(master).await;
        } else {
            info!("No master has been found on the network");
            self.run_election().await;
        }

        Ok(())
    }

    /// Obtain a color from a just-discovered master. Best-effort: a failed
    /// registration is only logged, since the failure detector will notice
    /// a dead master and trigger an election anyway.
    async fn register_with(&self, master: Ipv4Addr) {
        let request = RegisterRequest {
            address: self.config.self_addr,
            info: self.config.node_name.clone(),
        };
        match self.transport.register_worker(master, request).await {
            Ok(response) => self.state.write().await.set_color(response.color),
            Err(err) => warn!("Failed to register with master {}: {}", master, err),
        }
    }

    // --- Inbound message handlers ---

    /// `GET /node-details`
    pub async fn node_details(&self) -> NodeDetails {
        let node = self.state.read().await;
        NodeDetails {
            is_master: node.is_master(),
            color: node.color(),
            hostname: node.hostname().to_string(),
        }
    }

    /// `POST /greetings` — record the greeter (it is running its own
    /// discovery) and report our details back.
    pub async fn handle_greeting(&self, caller: Option<Ipv4Addr>) -> NodeDetails {
        if let Some(addr) = caller {
            self.state.write().await.add_peer(addr);
        }
        self.node_details().await
    }

    /// `POST /election` — always acknowledged. A master acknowledges
    /// without yielding and re-announces itself to the asker, since the
    /// empty ack alone cannot say "I am already master"; an idle worker
    /// forwards the election on its own behalf; a worker already electing
    /// acknowledges without restarting.
    pub async fn handle_election(self: &Arc<Self>, caller: Option<Ipv4Addr>) {
        let phase = self.state.read().await.phase();
        match phase {
            NodePhase::Master => {
                debug!("Election notice answered as the standing master");
                if let Some(peer) = caller {
                    self.state.write().await.add_peer(peer);
                    let cluster = self.clone();
                    tokio::spawn(async move {
                        if let Err(err) = cluster.transport.announce_master(peer).await {
                            debug!("Could not re-announce mastership to {}: {}", peer, err);
                        }
                    });
                }
            }
            NodePhase::Electing => {
                debug!("Election notice deduplicated: already electing");
            }
            NodePhase::Idle => self.spawn_election(),
        }
    }

    /// `POST /master-announcement`
    pub async fn handle_announcement(self: &Arc<Self>, announcer: Ipv4Addr) {
        info!("{} announced itself as the master", announcer);
        let monitor = {
            let mut node = self.state.write().await;
            node.add_peer(announcer);
            node.accept_master(announcer)
        };
        if monitor {
            self.start_detector(announcer).await;
        }
    }

    /// `POST /color`
    pub async fn handle_color(&self, color: Color) -> Result<()> {
        let mut node = self.state.write().await;
        if node.is_master() {
            return Err(ClusterError::role_mismatch(
                "a master does not accept color assignments",
            ));
        }
        node.set_color(color);
        Ok(())
    }

    /// `POST /worker_register`
    pub async fn handle_register(&self, request: RegisterRequest) -> Result<RegisterResponse> {
        if request.address.is_unspecified() {
            return Err(ClusterError::invalid_request(
                "worker address must not be unspecified",
            ));
        }
        let color = self
            .coordinator
            .register_worker(request.address, &request.info)
            .await?;
        Ok(RegisterResponse { color })
    }

    // --- Background flows ---

    /// Run one election and take the resulting role. Deferred elections
    /// arm a watchdog so a lost master announcement cannot strand this
    /// node in the electing state forever.
    pub async fn run_election(self: &Arc<Self>) {
        match self.election.initiate().await {
            ElectionOutcome::Promoted => self.start_coordinator().await,
            ElectionOutcome::Deferred => self.arm_announcement_watchdog(),
            ElectionOutcome::Skipped => {}
        }
    }

    /// Trigger an election on its own task, never on the path that answers
    /// incoming requests.
    pub fn spawn_election(self: &Arc<Self>) {
        let cluster = self.clone();
        tokio::spawn(async move {
            cluster.run_election().await;
        });
    }

    fn arm_announcement_watchdog(self: &Arc<Self>) {
        let cluster = self.clone();
        let wait = self.config.announcement_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let retry = {
                let mut node = cluster.state.write().await;
                if node.phase() == NodePhase::Electing && node.master().is_none() {
                    node.reset_election();
                    true
                } else {
                    false
                }
            };
            if retry {
                warn!(
                    "No master announcement within {:?}, restarting the election",
                    wait
                );
                cluster.run_election().await;
            }
        });
    }

    /// Start monitoring `master`, superseding any previous detector by
    /// cancelling its token.
    async fn start_detector(self: &Arc<Self>, master: Ipv4Addr) {
        let token = CancellationToken::new();
        if let Some(old) = self.detector_token.lock().await.replace(token.clone()) {
            old.cancel();
        }

        let cluster = self.clone();
        tokio::spawn(async move {
            if cluster.detector.watch(master, token).await == WatchOutcome::MasterDown {
                cluster.run_election().await;
            }
        });
    }

    /// Start the master coordination loop, once. A newly promoted master
    /// has no further use for its failure detector.
    async fn start_coordinator(self: &Arc<Self>) {
        let token = CancellationToken::new();
        {
            let mut guard = self.coordinator_token.lock().await;
            if guard.is_some() {
                return;
            }
            *guard = Some(token.clone());
        }
        if let Some(detector) = self.detector_token.lock().await.take() {
            detector.cancel();
        }

        let cluster = self.clone();
        tokio::spawn(async move {
            cluster.coordinator.run(token).await;
        });
    }

    /// Stop the background loops. Used by tests and orderly shutdown; the
    /// node state itself lives until the process exits.
    pub async fn shutdown(&self) {
        if let Some(token) = self.detector_token.lock().await.take() {
            token.cancel();
        }
        if let Some(token) = self.coordinator_token.lock().await.take() {
            token.cancel();
        }
    }
}
