//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The external interfaces this crate consumes: the packet layer
//! (wire parsing, checksums, authentication, reliable transport) and the
//! route installer (kernel FIB reconciliation). Both are out of scope
//! for this crate and are expressed here only as trait contracts, in the
//! spirit of `holo-rip`'s `southbound` module — except that module talks
//! to a concrete ZAPI client, whereas here the adapter is left to the
//! caller entirely.

use ipnetwork::Ipv4Network;

use crate::collections::NeighborId;
use crate::metric::Metric;

/// The next hop for one successor, as handed to the route installer.
#[derive(Clone, Copy, Debug)]
pub struct NextHop {
    pub neighbor: NeighborId,
    pub metric: Metric,
}

/// Outbound requests the FSM and dispatcher make of the packet layer.
/// Implementations are responsible for wire encoding, TTL/multicast
/// addressing and reliable delivery; none of that is
/// this crate's concern.
pub trait PacketTx {
    /// Send a REPLY (opcode 4) to `neighbor` for `prefix`, carrying the
    /// current reported metric and distance. This is the one outbound
    /// action the FSM may enqueue directly in response to a QUERY,
    /// rather than via the change dispatcher.
    fn send_reply(
        &self,
        neighbor: NeighborId,
        prefix: Ipv4Network,
        metric: Metric,
        distance: u32,
    );

    /// Send an UPDATE (opcode 1) to every neighbor on `interfaces`.
    fn send_update(
        &self,
        interfaces: &[u32],
        prefix: Ipv4Network,
        metric: Metric,
        distance: u32,
    );

    /// Send a QUERY (opcode 3) to every neighbor except `exclude` (the
    /// poisoned source, when the query round was itself triggered by an
    /// incoming QUERY from that neighbor).
    fn send_query(
        &self,
        exclude: Option<NeighborId>,
        prefix: Ipv4Network,
        metric: Metric,
        distance: u32,
    );
}

/// Outbound requests the dispatcher makes of the kernel-FIB adapter.
pub trait RouteInstaller {
    fn install(&self, prefix: Ipv4Network, next_hops: &[NextHop]);
    fn withdraw(&self, prefix: Ipv4Network);
}
