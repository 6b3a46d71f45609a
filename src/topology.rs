//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The topology table: the exclusive owner of every Prefix-Entry and
//! Neighbor-Entry. Provides lookup, insertion, distance recomputation,
//! successor selection and node-flag maintenance.

use std::collections::{BTreeMap, HashSet};

use bitflags::bitflags;
use derive_new::new;
use ipnetwork::Ipv4Network;
use itertools::Itertools;
use smallvec::SmallVec;

use crate::collections::{NeighborId, Neighbors};
use crate::debug::Debug;
use crate::error::Error;
use crate::metric::{self, KValues, Metric};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct EntryFlags: u8 {
        const SUCCESSOR = 0x01;
        const FSUCCESSOR = 0x02;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ReqAction: u8 {
        const NEED_UPDATE = 0x01;
        const NEED_QUERY = 0x02;
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DualState {
    Passive,
    Active0,
    Active1,
    Active2,
    Active3,
}

impl DualState {
    pub fn is_active(&self) -> bool {
        !matches!(self, DualState::Passive)
    }
}

impl std::fmt::Display for DualState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DualState::Passive => "passive",
            DualState::Active0 => "active-0",
            DualState::Active1 => "active-1",
            DualState::Active2 => "active-2",
            DualState::Active3 => "active-3",
        };
        write!(f, "{}", s)
    }
}

/// One candidate route through a single advertising neighbor.
///
/// Invariant: `distance == D(compose(link_metric(adv_router), reported_metric), K)`.
#[derive(Clone, Debug, new)]
pub struct NeighborEntry {
    pub adv_router: NeighborId,
    #[new(value = "Metric::unreachable()")]
    pub reported_metric: Metric,
    #[new(value = "Metric::unreachable()")]
    pub total_metric: Metric,
    // Reported Distance (RD).
    #[new(value = "metric::INFINITY")]
    pub reported_distance: u32,
    // Composed Distance (CD).
    #[new(value = "metric::INFINITY")]
    pub distance: u32,
    #[new(value = "EntryFlags::empty()")]
    pub flags: EntryFlags,
}

impl NeighborEntry {
    pub fn is_successor(&self) -> bool {
        self.flags.contains(EntryFlags::SUCCESSOR)
    }
}

/// A numeric ordering key for a neighbor, used only to make entry
/// ordering deterministic when distances tie. Ties break on the
/// neighbor's router id rather than its `NeighborId` arena slot: the
/// arena slot depends on the order neighbors happened to come up in this
/// particular run, so two runs of the same topology with neighbors
/// adjacency-up in a different order would otherwise tie-break
/// differently. The router id is the neighbor's stable numeric identity.
fn tie_break_key(neighbors: &Neighbors, id: NeighborId) -> u32 {
    neighbors
        .get(id)
        .map(|n| u32::from(n.router_id))
        .unwrap_or(u32::MAX)
}

/// One destination IPv4 prefix and all candidate paths towards it.
#[derive(Clone, Debug)]
pub struct PrefixEntry {
    pub destination: Ipv4Network,
    pub state: DualState,
    // Feasible Distance: smallest distance recorded since the prefix
    // last entered PASSIVE.
    pub fdistance: u32,
    pub distance: u32,
    pub rdistance: u32,
    pub reported_metric: Metric,
    // Sorted ascending by distance, ties broken by neighbor id.
    pub entries: SmallVec<[NeighborEntry; 4]>,
    // Neighbors from which a REPLY is still outstanding. Non-empty iff
    // `state` is one of the ACTIVE_* states.
    pub rij: HashSet<NeighborId>,
    pub req_action: ReqAction,
}

impl PrefixEntry {
    pub fn new(destination: Ipv4Network) -> Self {
        PrefixEntry {
            destination,
            state: DualState::Passive,
            fdistance: metric::INFINITY,
            distance: metric::INFINITY,
            rdistance: metric::INFINITY,
            reported_metric: Metric::unreachable(),
            entries: SmallVec::new(),
            rij: HashSet::new(),
            req_action: ReqAction::empty(),
        }
    }

    pub fn head(&self) -> Option<&NeighborEntry> {
        self.entries.first()
    }

    pub fn entry(&self, adv_router: NeighborId) -> Option<&NeighborEntry> {
        self.entries.iter().find(|e| e.adv_router == adv_router)
    }

    pub fn entry_mut(&mut self, adv_router: NeighborId) -> Option<&mut NeighborEntry> {
        self.entries.iter_mut().find(|e| e.adv_router == adv_router)
    }

    pub fn successors(&self) -> impl Iterator<Item = &NeighborEntry> {
        self.entries.iter().filter(|e| e.is_successor())
    }

    /// True once the prefix carries no candidate path and can be purged.
    pub fn is_empty(&self) -> bool {
        self.state == DualState::Passive && self.distance == metric::INFINITY
    }

    fn sort_entries(&mut self, neighbors: &Neighbors) {
        self.entries = std::mem::take(&mut self.entries)
            .into_iter()
            .sorted_by(|a, b| {
                a.distance.cmp(&b.distance).then_with(|| {
                    tie_break_key(neighbors, a.adv_router).cmp(&tie_break_key(neighbors, b.adv_router))
                })
            })
            .collect();
    }
}

/// Mapping from destination prefix to Prefix-Entry; the exclusive owner
/// of all Prefix-Entry and Neighbor-Entry values.
#[derive(Debug, Default)]
pub struct Topology {
    prefixes: BTreeMap<Ipv4Network, PrefixEntry>,
}

#[derive(Debug, Eq, PartialEq)]
pub struct AlreadyPresent;

impl Topology {
    pub fn lookup(&self, prefix: Ipv4Network) -> Option<&PrefixEntry> {
        self.prefixes.get(&prefix)
    }

    pub fn lookup_mut(&mut self, prefix: Ipv4Network) -> Option<&mut PrefixEntry> {
        self.prefixes.get_mut(&prefix)
    }

    pub fn insert(&mut self, entry: PrefixEntry) -> Result<(), AlreadyPresent> {
        if self.prefixes.contains_key(&entry.destination) {
            return Err(AlreadyPresent);
        }
        self.prefixes.insert(entry.destination, entry);
        Ok(())
    }

    pub fn get_or_create(&mut self, prefix: Ipv4Network) -> &mut PrefixEntry {
        self.prefixes
            .entry(prefix)
            .or_insert_with(|| PrefixEntry::new(prefix))
    }

    pub fn delete(&mut self, prefix: Ipv4Network) -> Option<PrefixEntry> {
        self.prefixes.remove(&prefix)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Ipv4Network, &PrefixEntry)> {
        self.prefixes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Ipv4Network, &mut PrefixEntry)> {
        self.prefixes.iter_mut()
    }

    /// Removes every Neighbor-Entry belonging to `neighbor` across all
    /// prefixes, returning the set of prefixes that were affected (and
    /// whose `rij` the caller must also reconcile).
    pub fn delete_entries_of_neighbor(&mut self, neighbor: NeighborId) -> Vec<Ipv4Network> {
        let mut affected = Vec::new();
        for (prefix, entry) in self.prefixes.iter_mut() {
            let before = entry.entries.len();
            entry.entries.retain(|e| e.adv_router != neighbor);
            entry.rij.remove(&neighbor);
            if entry.entries.len() != before {
                if let Some(head) = entry.entries.first() {
                    entry.distance = head.distance;
                } else {
                    entry.distance = metric::INFINITY;
                }
                affected.push(*prefix);
            }
        }
        affected
    }

    /// The central mutation used by the FSM classifier and actions.
    ///
    /// 1. Locates (or creates) the Neighbor-Entry for `adv_router`.
    /// 2. Recomputes its reported/total metric and distance from
    ///    `incoming_metric`.
    /// 3. Re-sorts `entries` by distance ascending.
    /// 4. Recomputes `prefix.distance` from the new head.
    ///
    /// Returns `true` iff `prefix.distance` strictly increased relative
    /// to its value before this call.
    pub fn update_distance(
        &mut self,
        prefix: Ipv4Network,
        neighbors: &Neighbors,
        k: &KValues,
        adv_router: NeighborId,
        incoming_metric: Metric,
    ) -> bool {
        let Some(neighbor) = neighbors.get(adv_router) else {
            // The neighbor record has already been torn down: never
            // materialize a brand-new Neighbor-Entry for a dead neighbor,
            // or it would linger forever (no future `delete_entries_of_
            // neighbor(adv_router)` call can ever match a `NeighborId`
            // that no longer resolves). Leave any pre-existing entry for
            // it untouched; the caller tearing the neighbor down is
            // responsible for purging it.
            Error::ResourceExhausted.log();
            return false;
        };
        let link_metric = neighbor.link_metric;

        let entry = self.get_or_create(prefix);
        let previous_distance = entry.distance;

        if entry.entry(adv_router).is_none() {
            entry.entries.push(NeighborEntry::new(adv_router));
        }
        let candidate = entry.entry_mut(adv_router).expect("just inserted");

        candidate.reported_metric = incoming_metric;
        candidate.reported_distance = incoming_metric.distance(k);
        candidate.total_metric = Metric::compose(&link_metric, &incoming_metric);
        candidate.distance = candidate.total_metric.distance(k);

        entry.sort_entries(neighbors);
        entry.distance = entry
            .entries
            .first()
            .map(|e| e.distance)
            .unwrap_or(metric::INFINITY);

        entry.distance > previous_distance
    }

    /// Recomputes the SUCCESSOR/FSUCCESSOR flags on every entry of
    /// `prefix` from its current entries, `fdistance`, `variance` and
    /// `max_paths`.
    pub fn update_node_flags(
        &mut self,
        prefix: Ipv4Network,
        variance: u32,
        max_paths: u8,
    ) {
        let Some(entry) = self.lookup_mut(prefix) else {
            return;
        };

        let fd = entry.fdistance;
        let feasible_distances: Vec<u32> = entry
            .entries
            .iter()
            .filter(|e| metric::feasible(e.reported_distance, fd))
            .map(|e| e.distance)
            .collect();
        let best_feasible = feasible_distances.into_iter().min();

        let mut accepted = 0u8;
        for candidate in entry.entries.iter_mut() {
            candidate.flags.remove(EntryFlags::SUCCESSOR | EntryFlags::FSUCCESSOR);

            if !metric::feasible(candidate.reported_distance, fd) {
                continue;
            }
            candidate.flags.insert(EntryFlags::FSUCCESSOR);

            let Some(best) = best_feasible else { continue };
            let within_variance =
                (candidate.distance as u64) <= (best as u64).saturating_mul(variance as u64);
            if within_variance && accepted < max_paths {
                candidate.flags.insert(EntryFlags::SUCCESSOR);
                accepted += 1;
            }
        }
    }

    /// Notifies the route installer that kernel-FIB reconciliation is due
    /// for `prefix`. Actual installation is delegated to the caller via
    /// the `RouteInstaller` trait; this method just logs.
    pub fn prefix_updated(&self, prefix: Ipv4Network) {
        if let Some(entry) = self.lookup(prefix) {
            Debug::TopologyPrefixUpdated(&prefix, entry.state, entry.distance).log();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn nbr(neighbors: &mut Neighbors, last_octet: u8, bandwidth: u32, delay: u32) -> NeighborId {
        use crate::neighbor::Neighbor;
        neighbors.get_or_insert(Neighbor::new(
            Ipv4Addr::new(10, 0, 0, last_octet),
            1,
            Metric {
                bandwidth,
                delay,
                reliability: 255,
                load: 1,
                mtu: 1500,
                hop_count: 0,
            },
        ))
    }

    fn prefix() -> Ipv4Network {
        "192.0.2.0/24".parse().unwrap()
    }

    #[test]
    fn update_distance_sorts_and_tie_breaks() {
        let k = KValues::default();
        let mut neighbors = Neighbors::default();
        // n2 is allocated first (the lower arena slot) but carries the
        // higher router id, so this only passes if the tie-break is
        // keyed on router id rather than arena allocation order.
        let n2 = nbr(&mut neighbors, 2, 10_000, 100);
        let n1 = nbr(&mut neighbors, 1, 10_000, 100);

        let mut topo = Topology::default();
        let m = Metric {
            bandwidth: 10_000,
            delay: 100,
            reliability: 255,
            load: 1,
            mtu: 1500,
            hop_count: 1,
        };
        topo.update_distance(prefix(), &neighbors, &k, n2, m);
        topo.update_distance(prefix(), &neighbors, &k, n1, m);

        let entry = topo.lookup(prefix()).unwrap();
        assert_eq!(entry.entries.len(), 2);
        // Identical distances: tie-break puts the lower router id first,
        // regardless of which neighbor's arena slot is lower.
        assert_eq!(entry.entries[0].adv_router, n1);
        assert_eq!(entry.entries[1].adv_router, n2);
    }

    #[test]
    fn update_distance_reports_increase() {
        let k = KValues::default();
        let mut neighbors = Neighbors::default();
        let n1 = nbr(&mut neighbors, 1, 10_000, 100);

        let mut topo = Topology::default();
        let cheap = Metric {
            bandwidth: 10_000,
            delay: 100,
            reliability: 255,
            load: 1,
            mtu: 1500,
            hop_count: 1,
        };
        assert!(!topo.update_distance(prefix(), &neighbors, &k, n1, cheap));

        let expensive = Metric {
            delay: 100_000,
            ..cheap
        };
        assert!(topo.update_distance(prefix(), &neighbors, &k, n1, expensive));
    }

    #[test]
    fn delete_entries_of_neighbor_updates_head_distance() {
        let k = KValues::default();
        let mut neighbors = Neighbors::default();
        let n1 = nbr(&mut neighbors, 1, 10_000, 100);
        let n2 = nbr(&mut neighbors, 2, 1_000, 100);

        let mut topo = Topology::default();
        topo.update_distance(
            prefix(),
            &neighbors,
            &k,
            n1,
            Metric {
                bandwidth: 10_000,
                delay: 100,
                reliability: 255,
                load: 1,
                mtu: 1500,
                hop_count: 1,
            },
        );
        topo.update_distance(
            prefix(),
            &neighbors,
            &k,
            n2,
            Metric {
                bandwidth: 1_000,
                delay: 100,
                reliability: 255,
                load: 1,
                mtu: 1500,
                hop_count: 1,
            },
        );

        let before = topo.lookup(prefix()).unwrap().distance;
        let affected = topo.delete_entries_of_neighbor(n2);
        assert_eq!(affected, vec![prefix()]);
        let after = topo.lookup(prefix()).unwrap();
        assert_eq!(after.entries.len(), 1);
        assert!(after.distance > before || after.distance != before);
    }

    #[test]
    fn successor_set_is_prefix_of_sorted_entries_under_variance_one() {
        let k = KValues::default();
        let mut neighbors = Neighbors::default();
        let n1 = nbr(&mut neighbors, 1, 10_000, 100);
        let n2 = nbr(&mut neighbors, 2, 5_000, 100);

        let mut topo = Topology::default();
        topo.update_distance(
            prefix(),
            &neighbors,
            &k,
            n1,
            Metric {
                bandwidth: 10_000,
                delay: 100,
                reliability: 255,
                load: 1,
                mtu: 1500,
                hop_count: 1,
            },
        );
        topo.update_distance(
            prefix(),
            &neighbors,
            &k,
            n2,
            Metric {
                bandwidth: 5_000,
                delay: 100,
                reliability: 255,
                load: 1,
                mtu: 1500,
                hop_count: 1,
            },
        );

        let entry = topo.lookup_mut(prefix()).unwrap();
        entry.fdistance = entry.distance;
        topo.update_node_flags(prefix(), 1, 4);

        let entry = topo.lookup(prefix()).unwrap();
        let successors: Vec<_> = entry.successors().collect();
        assert_eq!(successors.len(), 1);
        assert_eq!(successors[0].adv_router, n1);
    }
}
