//! Bully election engine
//!
//! A worker that suspects there is no live master asks every peer that
//! outranks it (higher address) to take over. If none answers, the worker
//! promotes itself and announces its mastership to the remaining peers.
//! Peer-communication failures are absorbed here and converted into
//! membership changes; they never propagate to the caller.

use crate::state::{NodePhase, SharedState};
use crate::transport::PeerTransport;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How one election round ended, from this node's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// No higher-addressed peer answered; this node is now the master and
    /// has announced itself.
    Promoted,
    /// A higher-addressed peer is alive and takes the election over; this
    /// node stays dormant pending a master announcement.
    Deferred,
    /// Nothing to do: this node is the master, or an election was already
    /// running.
    Skipped,
}

pub struct ElectionEngine {
    state: SharedState,
    transport: Arc<dyn PeerTransport>,
}

impl ElectionEngine {
    pub fn new(state: SharedState, transport: Arc<dyn PeerTransport>) -> Self {
        Self { state, transport }
    }

    /// Run one election round. Blocks until every snapshotted higher peer
    /// has been contacted, so callers run it on its own task, never on the
    /// path that answers incoming requests.
    pub async fn initiate(&self) -> ElectionOutcome {
        let higher = {
            let mut node = self.state.write().await;
            if node.phase() == NodePhase::Master {
                debug!("Election skipped: this node is the master");
                return ElectionOutcome::Skipped;
            }
            if !node.begin_election() {
                debug!("Election already in progress");
                return ElectionOutcome::Skipped;
            }
            if let Some(stale) = node.drop_master() {
                debug!("Dropping stale master {}", stale);
            }
            node.higher_peers()
        };

        info!("Starting an election against {} higher peer(s)", higher.len());

        let mut superior = false;
        for peer in higher {
            match self.transport.send_election(peer).await {
                Ok(()) => {
                    info!("{} acknowledged the election and takes over", peer);
                    superior = true;
                }
                Err(err) => {
                    debug!("{} did not answer the election: {}", peer, err);
                    self.state.write().await.remove_peer(peer);
                }
            }
        }

        if superior {
            return ElectionOutcome::Deferred;
        }

        self.promote().await;
        ElectionOutcome::Promoted
    }

    /// Self-promote and broadcast the mastership, best-effort: peers that
    /// fail to acknowledge are dropped.
    async fn promote(&self) {
        let peers = {
            let mut node = self.state.write().await;
            node.become_master();
            node.peer_snapshot()
        };

        for peer in peers {
            if let Err(err) = self.transport.announce_master(peer).await {
                warn!("Dropping {}: master announcement failed ({})", peer, err);
                self.state.write().await.remove_peer(peer);
            }
        }
    }
}
