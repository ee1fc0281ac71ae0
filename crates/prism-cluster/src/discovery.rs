//! Peer discovery
//!
//! A one-shot sweep of the local subnet that populates the peer directory
//! and determines whether a master is already present. The sweep runs
//! concurrently with request handling, so a node being probed can answer
//! the probes of nodes performing their own discovery at the same time.

use crate::config::ClusterConfig;
use crate::error::{ClusterError, Result};
use crate::state::SharedState;
use crate::transport::PeerTransport;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info};

/// What a completed sweep knows about the segment. Taken from the shared
/// state after the sweep, so peers greeted by other nodes mid-sweep count
/// too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub peers_found: usize,
    pub master: Option<Ipv4Addr>,
}

/// Sweep the configured subnet once, greeting every host address except our
/// own, up to `max_probe` probes.
///
/// Absence of a response is the sole failure-detection signal: an
/// unreachable address is silently skipped. A peer that reports itself as
/// master is recorded; a *second* distinct self-reported master in the same
/// sweep is a fatal inconsistency and surfaces as
/// [`ClusterError::SplitBrain`].
pub async fn sweep(
    state: &SharedState,
    transport: &Arc<dyn PeerTransport>,
    config: &ClusterConfig,
) -> Result<SweepReport> {
    info!("Scanning {} for peers", config.subnet);

    let mut probed = 0usize;
    let mut master_found: Option<Ipv4Addr> = None;

    for addr in config.subnet.iter() {
        if addr == config.self_addr
            || addr == config.subnet.network()
            || addr == config.subnet.broadcast()
        {
            continue;
        }

        match transport.greet(addr).await {
            Ok(details) => {
                debug!("{} is up ({})", addr, details.hostname);
                if details.is_master {
                    match master_found {
                        None => {
                            info!("Found the master node: {}", addr);
                            master_found = Some(addr);
                        }
                        Some(first) if first != addr => {
                            return Err(ClusterError::SplitBrain {
                                first,
                                second: addr,
                            });
                        }
                        Some(_) => {}
                    }
                }

                let mut node = state.write().await;
                node.add_peer(addr);
                if details.is_master {
                    node.accept_master(addr);
                }
            }
            Err(err) => debug!("{} is down: {}", addr, err),
        }

        probed += 1;
        if probed == config.max_probe {
            debug!("Probe budget of {} exhausted", config.max_probe);
            break;
        }
    }

    let node = state.read().await;
    let report = SweepReport {
        peers_found: node.peers().len(),
        master: node.master(),
    };
    info!(
        "Finished scanning the network: {} peer(s), master {:?}",
        report.peers_found, report.master
    );
    Ok(report)
}
