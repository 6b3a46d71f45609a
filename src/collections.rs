//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Arena-backed storage for neighbors, following the id-indexed arena
//! pattern used throughout the `holo` protocol crates (see
//! `holo-ospf::collections`) so that a Neighbor-Entry can hold a cheap,
//! `Copy` weak handle to a neighbor instead of a shared reference.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use generational_arena::Index;

use crate::neighbor::Neighbor;

pub type NeighborId = Index;

#[derive(Debug, Default)]
pub struct Neighbors {
    arena: generational_arena::Arena<Neighbor>,
    router_id_tree: BTreeMap<Ipv4Addr, NeighborId>,
}

impl Neighbors {
    pub fn get(&self, id: NeighborId) -> Option<&Neighbor> {
        self.arena.get(id)
    }

    pub fn get_mut(&mut self, id: NeighborId) -> Option<&mut Neighbor> {
        self.arena.get_mut(id)
    }

    pub fn get_by_router_id(&self, router_id: Ipv4Addr) -> Option<NeighborId> {
        self.router_id_tree.get(&router_id).copied()
    }

    /// Inserts a neighbor, or returns the id of the existing one if a
    /// neighbor with the same router id is already present.
    pub fn get_or_insert(&mut self, neighbor: Neighbor) -> NeighborId {
        if let Some(id) = self.get_by_router_id(neighbor.router_id) {
            return id;
        }

        let router_id = neighbor.router_id;
        let id = self.arena.insert(neighbor);
        self.router_id_tree.insert(router_id, id);
        id
    }

    pub fn delete(&mut self, id: NeighborId) -> Option<Neighbor> {
        let neighbor = self.arena.remove(id)?;
        self.router_id_tree.remove(&neighbor.router_id);
        Some(neighbor)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NeighborId, &Neighbor)> {
        self.arena.iter()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}
