//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Minimal neighbor record. Full adjacency management (hello/hold timers,
//! init sequencing, reliable transport) lives in the packet layer and is
//! out of scope here; this crate only needs enough of a neighbor to
//! compute composed metrics and to address outbound REPLY/UPDATE/QUERY
//! requests.

use std::net::Ipv4Addr;

use derive_new::new;

use crate::metric::Metric;

#[derive(Clone, Debug, new)]
pub struct Neighbor {
    pub router_id: Ipv4Addr,
    // Local interface this neighbor is reachable over.
    pub ifindex: u32,
    // Composite metric of the local interface towards this neighbor,
    // used to compose with whatever the neighbor reports.
    pub link_metric: Metric,
}
