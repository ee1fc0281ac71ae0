//! Property tests for the node state machine

use prism_cluster::{Color, NodeState};
use proptest::prelude::*;
use std::net::Ipv4Addr;

const SELF_LAST: u8 = 5;

fn self_addr() -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, SELF_LAST)
}

/// Operations any mix of discovery, election, and coordination flows can
/// apply to the shared state.
#[derive(Debug, Clone)]
enum Op {
    AddPeer(Ipv4Addr),
    RemovePeer(Ipv4Addr),
    AcceptMaster(Ipv4Addr),
    DropMaster,
    BeginElection,
    ResetElection,
    BecomeMaster,
    AssignColor(Ipv4Addr),
    UnassignColor(Ipv4Addr),
}

fn any_addr() -> impl Strategy<Value = Ipv4Addr> {
    // Deliberately includes the node's own address.
    (0u8..16).prop_map(|last| Ipv4Addr::new(10, 0, 0, last))
}

fn any_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        any_addr().prop_map(Op::AddPeer),
        any_addr().prop_map(Op::RemovePeer),
        any_addr().prop_map(Op::AcceptMaster),
        Just(Op::DropMaster),
        Just(Op::BeginElection),
        Just(Op::ResetElection),
        Just(Op::BecomeMaster),
        any_addr().prop_map(Op::AssignColor),
        any_addr().prop_map(Op::UnassignColor),
    ]
}

proptest! {
    /// The peer set never contains the node itself, and the master pointer
    /// never points at a non-master node's own address, no matter how the
    /// concurrent flows interleave their state mutations.
    #[test]
    fn structural_invariants_hold_under_any_operation_order(
        ops in prop::collection::vec(any_op(), 0..64)
    ) {
        let mut node = NodeState::new(self_addr(), "prop");

        for op in ops {
            match op {
                Op::AddPeer(addr) => { node.add_peer(addr); }
                Op::RemovePeer(addr) => { node.remove_peer(addr); }
                Op::AcceptMaster(addr) => { node.accept_master(addr); }
                Op::DropMaster => { node.drop_master(); }
                Op::BeginElection => { node.begin_election(); }
                Op::ResetElection => node.reset_election(),
                Op::BecomeMaster => node.become_master(),
                Op::AssignColor(addr) => {
                    if addr != self_addr() {
                        node.assign_color(addr);
                    }
                }
                Op::UnassignColor(addr) => node.unassign_color(addr),
            }

            prop_assert!(!node.peers().contains(&self_addr()));
            if !node.is_master() {
                prop_assert_ne!(node.master(), Some(self_addr()));
            }
        }
    }

    /// Mastership is terminal: once reached, no later operation leaves it.
    #[test]
    fn mastership_is_terminal(ops in prop::collection::vec(any_op(), 0..32)) {
        let mut node = NodeState::new(self_addr(), "prop");
        node.become_master();

        for op in ops {
            match op {
                Op::AddPeer(addr) => { node.add_peer(addr); }
                Op::RemovePeer(addr) => { node.remove_peer(addr); }
                Op::AcceptMaster(addr) => { node.accept_master(addr); }
                Op::DropMaster => { node.drop_master(); }
                Op::BeginElection => { node.begin_election(); }
                Op::ResetElection => node.reset_election(),
                Op::BecomeMaster => node.become_master(),
                Op::AssignColor(addr) => {
                    if addr != self_addr() {
                        node.assign_color(addr);
                    }
                }
                Op::UnassignColor(addr) => node.unassign_color(addr),
            }
            prop_assert!(node.is_master());
        }
    }

    /// The color cycle hands out red on every third slot and green
    /// everywhere else, for any number of distinct workers.
    #[test]
    fn every_third_assignment_is_red(count in 1usize..64) {
        let mut node = NodeState::new(self_addr(), "prop");
        node.become_master();

        for seq in 1..=count {
            let worker = Ipv4Addr::new(10, 0, 1, seq as u8);
            let expected = if seq % 3 == 0 { Color::Red } else { Color::Green };
            prop_assert_eq!(node.assign_color(worker), expected);
        }
    }
}
