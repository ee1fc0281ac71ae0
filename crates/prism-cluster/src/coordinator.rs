//! Master-side coordination
//!
//! Once a node is master it accepts worker registrations and periodically
//! re-pushes every peer's color assignment. A peer that fails to
//! acknowledge a push is treated as departed and dropped. The push loop
//! runs until its token is cancelled, which in practice means the process
//! lifetime, since mastership never reverts.

use crate::error::{ClusterError, Result};
use crate::state::{Color, SharedState};
use crate::transport::PeerTransport;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct MasterCoordinator {
    state: SharedState,
    transport: Arc<dyn PeerTransport>,
    interval: Duration,
}

impl MasterCoordinator {
    pub fn new(state: SharedState, transport: Arc<dyn PeerTransport>, interval: Duration) -> Self {
        Self {
            state,
            transport,
            interval,
        }
    }

    /// Register a worker and return its color. A re-registering worker
    /// keeps its previous assignment. Fails unless this node is master.
    pub async fn register_worker(&self, worker: Ipv4Addr, info: &str) -> Result<Color> {
        let mut node = self.state.write().await;
        if !node.is_master() {
            return Err(ClusterError::role_mismatch(
                "worker registration requires the master role",
            ));
        }
        if worker == node.addr() {
            return Err(ClusterError::invalid_request(
                "a node cannot register as its own worker",
            ));
        }
        let color = node.assign_color(worker);
        info!("Registered worker {} ({}) as {}", worker, info, color);
        Ok(color)
    }

    /// Push color assignments to the current peer snapshot, at the
    /// configured interval, until `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        info!("Starting the color coordination loop");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Color coordination loop stopped");
                    return;
                }
                _ = ticker.tick() => self.push_round().await,
            }
        }
    }

    /// One fan-out over the peer snapshot. Peers with no assignment yet
    /// (discovered but never registered) get the next slot of the cycle.
    async fn push_round(&self) {
        let targets: Vec<(Ipv4Addr, Color)> = {
            let mut node = self.state.write().await;
            let peers = node.peer_snapshot();
            peers
                .into_iter()
                .map(|peer| {
                    let color = node.assign_color(peer);
                    (peer, color)
                })
                .collect()
        };

        for (peer, color) in targets {
            if let Err(err) = self.transport.push_color(peer, color).await {
                warn!("Dropping {}: color push failed ({})", peer, err);
                let mut node = self.state.write().await;
                node.remove_peer(peer);
                node.unassign_color(peer);
            }
        }
    }
}
