//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The change dispatcher (component D): a pair of FIFO queues of
//! prefixes awaiting outbound action, decoupling the FSM from the
//! packet layer so that no FSM mutation ever calls into it
//! synchronously, which would otherwise create a recursion hazard
//! between the FSM and the packet layer.

use std::collections::VecDeque;

use ipnetwork::Ipv4Network;

use crate::config::Config;
use crate::debug::Debug;
use crate::southbound::{NextHop, PacketTx, RouteInstaller};
use crate::topology::{DualState, ReqAction, Topology};

/// One FIFO queue per route class, matching
/// `topology_changes_internal_ipv4` / `topology_changes_external_ipv4`.
/// Internal vs. external only affects which destinations a given
/// instance originates versus redistributes; both drain identically.
#[derive(Debug, Default)]
pub struct Dispatcher {
    internal: VecDeque<Ipv4Network>,
    external: VecDeque<Ipv4Network>,
}

impl Dispatcher {
    /// Appends `prefix` to the internal change queue. Idempotent: a
    /// prefix already pending is not enqueued twice.
    pub fn enqueue(&mut self, prefix: Ipv4Network) {
        self.enqueue_internal(prefix);
    }

    pub fn enqueue_internal(&mut self, prefix: Ipv4Network) {
        if !self.internal.contains(&prefix) {
            self.internal.push_back(prefix);
        }
    }

    pub fn enqueue_external(&mut self, prefix: Ipv4Network) {
        if !self.external.contains(&prefix) {
            self.external.push_back(prefix);
        }
    }

    pub fn pending(&self) -> usize {
        self.internal.len() + self.external.len()
    }

    /// Drains both queues, re-reading each prefix's current state (not
    /// its state at enqueue time) and asking the packet layer / route
    /// installer to act on `req_action`. Draining an already-empty
    /// dispatcher is a no-op, matching the idempotence property in the
    /// dispatcher's idempotence guarantee.
    pub fn flush(
        &mut self,
        topology: &mut Topology,
        config: &Config,
        packet_tx: &dyn PacketTx,
        route_installer: &dyn RouteInstaller,
    ) {
        let pending = self.pending();
        if pending == 0 {
            return;
        }
        Debug::DispatcherFlush(pending).log();

        for prefix in self.internal.drain(..).chain(self.external.drain(..)) {
            Self::drain_one(topology, config, packet_tx, route_installer, prefix);
        }
    }

    fn drain_one(
        topology: &mut Topology,
        config: &Config,
        packet_tx: &dyn PacketTx,
        route_installer: &dyn RouteInstaller,
        prefix: Ipv4Network,
    ) {
        let Some(entry) = topology.lookup_mut(prefix) else {
            return;
        };
        let req_action = entry.req_action;
        if req_action.is_empty() {
            return;
        }

        if req_action.contains(ReqAction::NEED_UPDATE) {
            let interfaces: Vec<u32> = Vec::new();
            packet_tx.send_update(&interfaces, prefix, entry.reported_metric, entry.distance);
            Debug::UpdateEnqueued(&prefix).log();
        }
        if req_action.contains(ReqAction::NEED_QUERY) {
            packet_tx.send_query(None, prefix, entry.reported_metric, entry.distance);
            Debug::QueryEnqueued(&prefix).log();
        }

        entry.req_action = ReqAction::empty();

        let next_hops: Vec<NextHop> = entry
            .successors()
            .map(|e| NextHop {
                neighbor: e.adv_router,
                metric: e.total_metric,
            })
            .collect();

        if entry.state == DualState::Passive {
            if next_hops.is_empty() {
                route_installer.withdraw(prefix);
            } else {
                route_installer.install(prefix, &next_hops);
            }
        }

        let _ = config;
    }
}
