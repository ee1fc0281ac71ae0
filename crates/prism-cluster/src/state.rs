//! Node state and peer directory
//!
//! One `NodeState` exists per process. It is mutated from several
//! concurrently running flows (the discovery sweep, the election engine,
//! the failure detector, the coordination loop, and every inbound peer
//! request), so it lives behind a single async lock; see [`SharedState`].
//! Composite check-and-act operations are expressed as methods here so the
//! write guard is held across the whole transition.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared handle to this node's state.
pub type SharedState = Arc<RwLock<NodeState>>;

/// Coordination label assigned to a worker by the master.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    /// No master has assigned a color yet.
    #[default]
    Unassigned,
    Green,
    Red,
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unassigned => write!(f, "unassigned"),
            Self::Green => write!(f, "green"),
            Self::Red => write!(f, "red"),
        }
    }
}

/// Election state of this node.
///
/// Replaces the scattered `election`/`master` booleans of a classic Bully
/// implementation with one explicit state machine, so illegal combinations
/// (a master with an outstanding election) cannot be represented. `Master`
/// is terminal: a node only leaves it through process restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodePhase {
    /// Worker with no outstanding election.
    Idle,
    /// Worker with an unresolved election it initiated or forwarded.
    Electing,
    /// Elected (or self-promoted) master.
    Master,
}

impl fmt::Display for NodePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Electing => write!(f, "electing"),
            Self::Master => write!(f, "master"),
        }
    }
}

/// The mutable record of this node's identity, role, known peers, and
/// election status. Created once at startup and alive for the process
/// lifetime.
#[derive(Debug)]
pub struct NodeState {
    addr: Ipv4Addr,
    hostname: String,
    phase: NodePhase,
    master: Option<Ipv4Addr>,
    color: Color,
    peers: BTreeSet<Ipv4Addr>,
    assignments: HashMap<Ipv4Addr, Color>,
    assign_seq: u64,
}

impl NodeState {
    pub fn new(addr: Ipv4Addr, hostname: impl Into<String>) -> Self {
        Self {
            addr,
            hostname: hostname.into(),
            phase: NodePhase::Idle,
            master: None,
            color: Color::Unassigned,
            peers: BTreeSet::new(),
            assignments: HashMap::new(),
            // The master implicitly takes the first slot of the cycle, so
            // worker assignments start at 1.
            assign_seq: 1,
        }
    }

    /// Wrap this state in the shared lock every component holds.
    pub fn shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn phase(&self) -> NodePhase {
        self.phase
    }

    pub fn is_master(&self) -> bool {
        self.phase == NodePhase::Master
    }

    pub fn master(&self) -> Option<Ipv4Addr> {
        self.master
    }

    pub fn color(&self) -> Color {
        self.color
    }

    // --- Peer directory ---

    /// Record a peer. The node's own address is never admitted. Returns
    /// `true` if the peer was not known before.
    pub fn add_peer(&mut self, peer: Ipv4Addr) -> bool {
        if peer == self.addr {
            return false;
        }
        let new = self.peers.insert(peer);
        if new {
            tracing::info!("New node discovered: {}", peer);
        }
        new
    }

    /// Forget a peer, returning `true` if it was known.
    pub fn remove_peer(&mut self, peer: Ipv4Addr) -> bool {
        self.peers.remove(&peer)
    }

    pub fn peers(&self) -> &BTreeSet<Ipv4Addr> {
        &self.peers
    }

    /// Stable copy of the peer set, taken under the lock.
    pub fn peer_snapshot(&self) -> Vec<Ipv4Addr> {
        self.peers.iter().copied().collect()
    }

    /// Peers strictly greater than this node's address, i.e. the ones that
    /// outrank it in an election.
    pub fn higher_peers(&self) -> Vec<Ipv4Addr> {
        self.peers
            .iter()
            .copied()
            .filter(|peer| *peer > self.addr)
            .collect()
    }

    // --- Election state machine ---

    /// Idle → Electing. Returns `false` (and changes nothing) if this node
    /// is already electing or is the master, which makes concurrent
    /// election triggers idempotent.
    pub fn begin_election(&mut self) -> bool {
        if self.phase != NodePhase::Idle {
            return false;
        }
        self.phase = NodePhase::Electing;
        true
    }

    /// Electing → Idle, used when a deferred election timed out waiting for
    /// a master announcement and must be retried from scratch.
    pub fn reset_election(&mut self) {
        if self.phase == NodePhase::Electing {
            self.phase = NodePhase::Idle;
        }
    }

    /// Promote this node to master. Terminal; the master is implicitly
    /// green (the primary slot of the color cycle).
    pub fn become_master(&mut self) {
        if self.phase == NodePhase::Master {
            return;
        }
        self.phase = NodePhase::Master;
        self.master = None;
        self.set_color(Color::Green);
        tracing::info!("This node ({}) has become the master", self.addr);
    }

    /// Record `announcer` as the known master and end any election on this
    /// node. Returns `true` if the caller should (re)start a failure
    /// detector against it, i.e. this node is not itself the master.
    pub fn accept_master(&mut self, announcer: Ipv4Addr) -> bool {
        if announcer == self.addr && self.phase != NodePhase::Master {
            tracing::warn!("Ignoring master announcement carrying our own address");
            return false;
        }
        self.master = Some(announcer);
        if self.phase == NodePhase::Electing {
            self.phase = NodePhase::Idle;
        }
        self.phase != NodePhase::Master
    }

    /// Forget the currently known master, dropping it from the peer set as
    /// well (it is presumed unreachable or stale). Returns the forgotten
    /// address.
    pub fn drop_master(&mut self) -> Option<Ipv4Addr> {
        let stale = self.master.take()?;
        self.peers.remove(&stale);
        Some(stale)
    }

    pub fn set_color(&mut self, color: Color) {
        if self.color != color {
            tracing::info!("The color has been changed to {}", color);
            self.color = color;
        }
    }

    // --- Master-only color bookkeeping ---

    /// Next color in the round-robin cycle: every third slot is red, the
    /// rest are green.
    fn next_color(&mut self) -> Color {
        let color = if self.assign_seq % 3 == 0 {
            Color::Red
        } else {
            Color::Green
        };
        self.assign_seq += 1;
        color
    }

    /// Color assigned to `worker`, allocating the next slot of the cycle if
    /// it has none yet. A re-registering worker keeps its assignment. Also
    /// records the worker as a peer.
    pub fn assign_color(&mut self, worker: Ipv4Addr) -> Color {
        if let Some(color) = self.assignments.get(&worker) {
            return *color;
        }
        let color = self.next_color();
        self.assignments.insert(worker, color);
        self.add_peer(worker);
        color
    }

    pub fn assigned_color(&self, worker: Ipv4Addr) -> Option<Color> {
        self.assignments.get(&worker).copied()
    }

    /// Drop the assignment of a departed worker so a later return gets a
    /// fresh slot.
    pub fn unassign_color(&mut self, worker: Ipv4Addr) {
        self.assignments.remove(&worker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> NodeState {
        NodeState::new("10.0.0.5".parse().unwrap(), "node-5")
    }

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    #[test]
    fn self_address_is_never_a_peer() {
        let mut node = state();
        assert!(!node.add_peer(addr(5)));
        assert!(node.add_peer(addr(6)));
        assert!(!node.peers().contains(&addr(5)));
    }

    #[test]
    fn higher_peers_are_strictly_greater() {
        let mut node = state();
        for last in [2, 4, 5, 6, 9] {
            node.add_peer(addr(last));
        }
        assert_eq!(node.higher_peers(), vec![addr(6), addr(9)]);
    }

    #[test]
    fn begin_election_is_idempotent() {
        let mut node = state();
        assert!(node.begin_election());
        assert!(!node.begin_election());
        assert_eq!(node.phase(), NodePhase::Electing);
    }

    #[test]
    fn a_master_never_starts_an_election() {
        let mut node = state();
        node.become_master();
        assert!(!node.begin_election());
        assert_eq!(node.phase(), NodePhase::Master);
    }

    #[test]
    fn promotion_makes_the_node_green() {
        let mut node = state();
        node.begin_election();
        node.become_master();
        assert!(node.is_master());
        assert_eq!(node.color(), Color::Green);
        assert_eq!(node.master(), None);
    }

    #[test]
    fn accept_master_ends_an_election() {
        let mut node = state();
        node.add_peer(addr(9));
        node.begin_election();
        assert!(node.accept_master(addr(9)));
        assert_eq!(node.phase(), NodePhase::Idle);
        assert_eq!(node.master(), Some(addr(9)));
    }

    #[test]
    fn accept_master_on_a_master_does_not_ask_for_a_detector() {
        let mut node = state();
        node.become_master();
        assert!(!node.accept_master(addr(9)));
        assert!(node.is_master());
    }

    #[test]
    fn accept_master_rejects_our_own_address() {
        let mut node = state();
        assert!(!node.accept_master(addr(5)));
        assert_eq!(node.master(), None);
    }

    #[test]
    fn drop_master_forgets_the_peer_too() {
        let mut node = state();
        node.add_peer(addr(9));
        node.accept_master(addr(9));
        assert_eq!(node.drop_master(), Some(addr(9)));
        assert_eq!(node.master(), None);
        assert!(!node.peers().contains(&addr(9)));
        assert_eq!(node.drop_master(), None);
    }

    #[test]
    fn color_cycle_is_green_green_red() {
        let mut node = state();
        node.become_master();
        let colors: Vec<Color> = (1..=5).map(|last| node.assign_color(addr(last))).collect();
        assert_eq!(
            colors,
            vec![
                Color::Green,
                Color::Green,
                Color::Red,
                Color::Green,
                Color::Green,
            ]
        );
    }

    #[test]
    fn reassignment_returns_the_existing_color() {
        let mut node = state();
        node.become_master();
        let first = node.assign_color(addr(1));
        assert_eq!(node.assign_color(addr(1)), first);
        // The cycle did not advance for the duplicate.
        assert_eq!(node.assign_color(addr(2)), Color::Green);
        assert_eq!(node.assign_color(addr(3)), Color::Red);
    }

    #[test]
    fn assignment_registers_the_worker_as_a_peer() {
        let mut node = state();
        node.become_master();
        node.assign_color(addr(1));
        assert!(node.peers().contains(&addr(1)));
    }

    #[test]
    fn unassigned_worker_gets_a_fresh_slot_on_return() {
        let mut node = state();
        node.become_master();
        node.assign_color(addr(1));
        node.assign_color(addr(2));
        node.unassign_color(addr(1));
        // Slot 3 of the cycle is red.
        assert_eq!(node.assign_color(addr(1)), Color::Red);
    }

    #[test]
    fn reset_election_only_applies_while_electing() {
        let mut node = state();
        node.reset_election();
        assert_eq!(node.phase(), NodePhase::Idle);
        node.become_master();
        node.reset_election();
        assert_eq!(node.phase(), NodePhase::Master);
    }
}
