//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The daemon instance shell (component E, not present as such in the
//! single owner — see `holo-rip::instance::Instance` for the pattern
//! this is modeled on, reduced to what DUAL itself needs since
//! northbound/CLI/config-file wiring is out of scope here).
//!
//! Single-threaded cooperative model: every method takes `&mut self`
//! and runs to completion with no suspension point. Callers (packet
//! receive, timers, CLI) are expected to serialize calls through their
//! own event loop.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

use crate::collections::{NeighborId, Neighbors};
use crate::config::Config;
use crate::debug::Debug;
use crate::dispatcher::Dispatcher;
use crate::dual::{self, ActionMessage, Ctx};
use crate::metric::Metric;
use crate::neighbor::Neighbor;
use crate::packet::PacketType;
use crate::southbound::{PacketTx, RouteInstaller};
use crate::topology::Topology;

/// Owns the topology table, the neighbor table, the change dispatcher
/// and the router's configuration. Dropping an `Instance` tears all of
/// these down; unlike `holo-rip`'s `Instance`, there is no socket to
/// close here since raw I/O is out of scope for this crate.
#[derive(Debug)]
pub struct Instance {
    pub config: Config,
    pub neighbors: Neighbors,
    pub topology: Topology,
    pub dispatcher: Dispatcher,
}

impl Instance {
    pub fn new(config: Config) -> Self {
        Debug::InstanceCreate.log();
        Instance {
            config,
            neighbors: Neighbors::default(),
            topology: Topology::default(),
            dispatcher: Dispatcher::default(),
        }
    }

    /// Registers (or refreshes) a neighbor reachable over `ifindex` with
    /// the given link metric. Full adjacency bring-up (hello/hold,
    /// init sequencing) happens one layer up; by the time this is
    /// called the neighbor is already considered up.
    pub fn neighbor_up(
        &mut self,
        router_id: Ipv4Addr,
        ifindex: u32,
        link_metric: Metric,
    ) -> NeighborId {
        Debug::NbrCreate(&router_id).log();
        self.neighbors
            .get_or_insert(Neighbor::new(router_id, ifindex, link_metric))
    }

    /// Tears down a neighbor: synthesizes the last-reply transition for
    /// every prefix where it was an outstanding reply source, then
    /// removes its Neighbor-Entries from every prefix and deletes the
    /// neighbor record itself.
    ///
    /// The synthesized REPLYs must run *before* the neighbor's entries
    /// and record are removed: `update_distance` needs the neighbor to
    /// still exist (for `link_metric`) and its Neighbor-Entry to still be
    /// present, or it would materialize a brand-new entry for an already
    /// dead `NeighborId` that nothing would ever purge again.
    pub fn neighbor_down(
        &mut self,
        id: NeighborId,
        packet_tx: &dyn PacketTx,
        route_installer: &dyn RouteInstaller,
    ) {
        let Some(neighbor) = self.neighbors.get(id) else {
            return;
        };
        Debug::NbrDown(&neighbor.router_id).log();

        let rij_members: Vec<Ipv4Network> = self
            .topology
            .iter()
            .filter(|(_, entry)| entry.rij.contains(&id))
            .map(|(prefix, _)| *prefix)
            .collect();

        for prefix in rij_members {
            let msg = ActionMessage {
                packet_type: PacketType::Reply,
                adv_router: id,
                prefix,
                incoming_metric: Metric::unreachable(),
                autonomous_system: self.config.autonomous_system,
            };
            self.process_action(msg, packet_tx, route_installer);
        }

        self.topology.delete_entries_of_neighbor(id);
        self.neighbors.delete(id);
    }

    /// The single mutation entry point: classify and dispatch `msg`
    /// through DUAL, then immediately drain the change dispatcher. The
    /// cooperative model has no suspension point between the two, so
    /// there is nothing to interleave here the way a full event loop
    /// normally would.
    pub fn process_action(
        &mut self,
        msg: ActionMessage,
        packet_tx: &dyn PacketTx,
        route_installer: &dyn RouteInstaller,
    ) {
        let mut ctx = Ctx {
            topology: &mut self.topology,
            neighbors: &self.neighbors,
            config: &self.config,
            dispatcher: &mut self.dispatcher,
            packet_tx,
        };
        dual::process_action(&mut ctx, msg);

        self.dispatcher
            .flush(&mut self.topology, &self.config, packet_tx, route_installer);
    }

    /// Explicit flush, for callers that batch several `process_action`
    /// calls before draining (e.g. processing a single UPDATE packet
    /// that carries many prefixes).
    pub fn flush(&mut self, packet_tx: &dyn PacketTx, route_installer: &dyn RouteInstaller) {
        self.dispatcher
            .flush(&mut self.topology, &self.config, packet_tx, route_installer);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::southbound::NextHop;
    use crate::topology::DualState;

    #[derive(Default)]
    struct RecordingTx {
        replies: RefCell<Vec<(NeighborId, Ipv4Network)>>,
        updates: RefCell<u32>,
        queries: RefCell<u32>,
    }

    impl PacketTx for RecordingTx {
        fn send_reply(
            &self,
            neighbor: NeighborId,
            prefix: Ipv4Network,
            _metric: Metric,
            _distance: u32,
        ) {
            self.replies.borrow_mut().push((neighbor, prefix));
        }

        fn send_update(
            &self,
            _interfaces: &[u32],
            _prefix: Ipv4Network,
            _metric: Metric,
            _distance: u32,
        ) {
            *self.updates.borrow_mut() += 1;
        }

        fn send_query(
            &self,
            _exclude: Option<NeighborId>,
            _prefix: Ipv4Network,
            _metric: Metric,
            _distance: u32,
        ) {
            *self.queries.borrow_mut() += 1;
        }
    }

    #[derive(Default)]
    struct RecordingInstaller {
        installed: RefCell<Vec<(Ipv4Network, usize)>>,
        withdrawn: RefCell<Vec<Ipv4Network>>,
    }

    impl RouteInstaller for RecordingInstaller {
        fn install(&self, prefix: Ipv4Network, next_hops: &[NextHop]) {
            self.installed
                .borrow_mut()
                .push((prefix, next_hops.len()));
        }

        fn withdraw(&self, prefix: Ipv4Network) {
            self.withdrawn.borrow_mut().push(prefix);
        }
    }

    fn cheap_metric(bandwidth: u32, delay: u32) -> Metric {
        Metric {
            bandwidth,
            delay,
            reliability: 255,
            load: 1,
            mtu: 1500,
            hop_count: 1,
        }
    }

    /// S1/S2 — a feasible successor swap keeps the prefix PASSIVE; a
    /// subsequent loss of feasibility drives it ACTIVE_1.
    #[test]
    fn s1_s2_feasible_swap_then_active() {
        let mut instance = Instance::new(Config::default());
        let tx = RecordingTx::default();
        let installer = RecordingInstaller::default();
        let prefix: Ipv4Network = "172.16.0.0/24".parse().unwrap();

        let n1 = instance.neighbor_up(Ipv4Addr::new(10, 0, 0, 1), 1, cheap_metric(1, 1));
        let n2 = instance.neighbor_up(Ipv4Addr::new(10, 0, 0, 2), 1, cheap_metric(1, 1));

        // Seed N2 first (higher distance), then N1 as the initial best.
        instance.process_action(
            ActionMessage {
                packet_type: PacketType::Update,
                adv_router: n2,
                prefix,
                incoming_metric: cheap_metric(5, 150),
                autonomous_system: 1,
            },
            &tx,
            &installer,
        );
        instance.process_action(
            ActionMessage {
                packet_type: PacketType::Update,
                adv_router: n1,
                prefix,
                incoming_metric: cheap_metric(10, 50),
                autonomous_system: 1,
            },
            &tx,
            &installer,
        );

        let entry = instance.topology.lookup(prefix).unwrap();
        assert_eq!(entry.state, DualState::Passive);
        let fd = entry.fdistance;

        // N1 raises its reported distance, but the new composed distance
        // is still feasible (RD < FD): stays PASSIVE.
        instance.process_action(
            ActionMessage {
                packet_type: PacketType::Update,
                adv_router: n1,
                prefix,
                incoming_metric: cheap_metric(10, 90),
                autonomous_system: 1,
            },
            &tx,
            &installer,
        );
        let entry = instance.topology.lookup(prefix).unwrap();
        assert_eq!(entry.state, DualState::Passive);
        assert_eq!(entry.fdistance, fd);

        // N1 raises its RD further, past FD: feasibility is lost on both
        // candidates, so the prefix goes active.
        instance.process_action(
            ActionMessage {
                packet_type: PacketType::Update,
                adv_router: n1,
                prefix,
                incoming_metric: cheap_metric(10, 1_000),
                autonomous_system: 1,
            },
            &tx,
            &installer,
        );
        let entry = instance.topology.lookup(prefix).unwrap();
        assert_eq!(entry.state, DualState::Active1);
        assert_eq!(entry.rij.len(), 2);
        assert_eq!(*tx.queries.borrow(), 1);
    }

    /// S3 — diffusion completes and FD resets once every reply is in.
    #[test]
    fn s3_diffusion_completes_with_fd_reset() {
        let mut instance = Instance::new(Config::default());
        let tx = RecordingTx::default();
        let installer = RecordingInstaller::default();
        let prefix: Ipv4Network = "198.51.100.0/24".parse().unwrap();

        let n1 = instance.neighbor_up(Ipv4Addr::new(10, 0, 0, 1), 1, cheap_metric(1, 1));
        let n2 = instance.neighbor_up(Ipv4Addr::new(10, 0, 0, 2), 1, cheap_metric(1, 1));

        for (nbr, delay) in [(n1, 50), (n2, 60)] {
            instance.process_action(
                ActionMessage {
                    packet_type: PacketType::Update,
                    adv_router: nbr,
                    prefix,
                    incoming_metric: cheap_metric(10, delay),
                    autonomous_system: 1,
                },
                &tx,
                &installer,
            );
        }

        // Force active by advertising an unreachable route from N1 (both
        // RDs now fail FC against the old FD).
        instance.process_action(
            ActionMessage {
                packet_type: PacketType::Update,
                adv_router: n1,
                prefix,
                incoming_metric: Metric::unreachable(),
                autonomous_system: 1,
            },
            &tx,
            &installer,
        );
        assert!(instance.topology.lookup(prefix).unwrap().state.is_active());

        // N1 replies first: one outstanding neighbor remains.
        instance.process_action(
            ActionMessage {
                packet_type: PacketType::Reply,
                adv_router: n1,
                prefix,
                incoming_metric: cheap_metric(10, 200),
                autonomous_system: 1,
            },
            &tx,
            &installer,
        );
        assert!(instance.topology.lookup(prefix).unwrap().state.is_active());

        // N2 is the last outstanding reply: the prefix converges.
        instance.process_action(
            ActionMessage {
                packet_type: PacketType::Reply,
                adv_router: n2,
                prefix,
                incoming_metric: cheap_metric(10, 250),
                autonomous_system: 1,
            },
            &tx,
            &installer,
        );
        let entry = instance.topology.lookup(prefix).unwrap();
        assert_eq!(entry.state, DualState::Passive);
        assert!(entry.rij.is_empty());
        assert_eq!(entry.fdistance, entry.distance);
    }

    /// S6 — losing the only neighbor while classifying NQ_FCN converges
    /// immediately via `lr` instead of waiting on QUERYs nobody will
    /// answer.
    #[test]
    fn s6_no_neighbors_converges_trivially() {
        let mut instance = Instance::new(Config::default());
        let tx = RecordingTx::default();
        let installer = RecordingInstaller::default();
        let prefix: Ipv4Network = "203.0.113.0/24".parse().unwrap();

        let n1 = instance.neighbor_up(Ipv4Addr::new(10, 0, 0, 1), 1, cheap_metric(1, 1));
        instance.process_action(
            ActionMessage {
                packet_type: PacketType::Update,
                adv_router: n1,
                prefix,
                incoming_metric: cheap_metric(10, 50),
                autonomous_system: 1,
            },
            &tx,
            &installer,
        );

        // Neighbor goes down mid-processing and we're the only source:
        // losing it both removes the candidate and forces NQ_FCN, which
        // with zero remaining neighbors invokes `lr` directly.
        instance.neighbor_down(n1, &tx, &installer);

        let entry = instance.topology.lookup(prefix);
        // Either the prefix converged to PASSIVE with no reachable
        // entries (and was purged), or it remains with distance
        // INFINITY — both are valid "eligible for withdraw" outcomes.
        if let Some(entry) = entry {
            assert_eq!(entry.state, DualState::Passive);
        }
    }

    /// Losing a neighbor while a prefix is ACTIVE with a populated `rij`
    /// must not leave a zombie Neighbor-Entry behind: the synthesized
    /// last-reply event has to run while the departing neighbor (and its
    /// Neighbor-Entry) still exist, and only then is its entry — and its
    /// own record — purged.
    #[test]
    fn neighbor_down_mid_diffusion_leaves_no_zombie_entry() {
        let mut instance = Instance::new(Config::default());
        let tx = RecordingTx::default();
        let installer = RecordingInstaller::default();
        let prefix: Ipv4Network = "198.18.0.0/24".parse().unwrap();

        let n1 = instance.neighbor_up(Ipv4Addr::new(10, 0, 0, 1), 1, cheap_metric(1, 1));
        let n2 = instance.neighbor_up(Ipv4Addr::new(10, 0, 0, 2), 1, cheap_metric(1, 1));

        for (nbr, delay) in [(n1, 50), (n2, 60)] {
            instance.process_action(
                ActionMessage {
                    packet_type: PacketType::Update,
                    adv_router: nbr,
                    prefix,
                    incoming_metric: cheap_metric(10, delay),
                    autonomous_system: 1,
                },
                &tx,
                &installer,
            );
        }

        // Force active: N1's route becomes unreachable, and neither
        // remaining candidate satisfies FC against the old FD.
        instance.process_action(
            ActionMessage {
                packet_type: PacketType::Update,
                adv_router: n1,
                prefix,
                incoming_metric: Metric::unreachable(),
                autonomous_system: 1,
            },
            &tx,
            &installer,
        );
        let entry = instance.topology.lookup(prefix).unwrap();
        assert!(entry.state.is_active());
        assert_eq!(entry.rij.len(), 2);

        // N1 itself goes down mid-diffusion, with N2's reply still
        // outstanding.
        instance.neighbor_down(n1, &tx, &installer);

        let entry = instance.topology.lookup(prefix).unwrap();
        assert!(entry.state.is_active());
        assert!(!entry.rij.contains(&n1));
        assert!(entry.rij.contains(&n2));
        assert!(
            entry.entry(n1).is_none(),
            "n1's Neighbor-Entry must be purged, not recreated as unreachable"
        );
        assert!(instance.neighbors.get(n1).is_none());
    }
}
