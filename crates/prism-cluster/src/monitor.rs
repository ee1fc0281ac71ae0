//! Master failure detection
//!
//! Each worker runs at most one detector loop, bound to the master address
//! captured when the loop starts. A fresh master announcement supersedes
//! the loop by cancelling its token and starting a new one; a superseded
//! loop that squeezes in one more probe is a tolerated race, since a
//! redundant election is an idempotent no-op while a live master answers.

use crate::state::SharedState;
use crate::transport::PeerTransport;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Why a detector loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The master stopped answering; it has been removed from the peer set
    /// and the caller must run exactly one election.
    MasterDown,
    /// The loop was superseded by a newer detector or a shutdown.
    Cancelled,
    /// The master stopped answering, but this node was promoted in the
    /// interim; nothing to do.
    SelfPromoted,
}

pub struct FailureDetector {
    state: SharedState,
    transport: Arc<dyn PeerTransport>,
    interval: Duration,
}

impl FailureDetector {
    pub fn new(state: SharedState, transport: Arc<dyn PeerTransport>, interval: Duration) -> Self {
        Self {
            state,
            transport,
            interval,
        }
    }

    /// Probe `target` at the configured interval until it fails or `token`
    /// is cancelled. On failure the dead master is forgotten before
    /// returning, so the caller only has to trigger the election.
    pub async fn watch(&self, target: Ipv4Addr, token: CancellationToken) -> WatchOutcome {
        info!("Start pinging the master ({}) periodically", target);

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Detector for {} superseded", target);
                    return WatchOutcome::Cancelled;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.transport.health_check(target).await {
                        warn!("Master ({}) seems to be down: {}", target, err);
                        break;
                    }
                }
            }
        }

        let mut node = self.state.write().await;
        if node.is_master() {
            return WatchOutcome::SelfPromoted;
        }
        node.remove_peer(target);
        if node.master() == Some(target) {
            node.drop_master();
        }
        WatchOutcome::MasterDown
    }
}
