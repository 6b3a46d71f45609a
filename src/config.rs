//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Router-wide EIGRP configuration consumed by DUAL and the topology
//! table. Parsing this from a configuration file or northbound request is
//! out of scope for this crate; callers build it programmatically.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::metric::KValues;

#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct Config {
    pub autonomous_system: u16,
    pub router_id: Ipv4Addr,
    pub k_values: KValues,
    // Maximum number of equal/unequal-cost successors installed per
    // prefix.
    pub max_paths: u8,
    // Variance multiplier: a feasible entry is a successor if its
    // distance is within `variance * best_feasible_distance`.
    pub variance: u32,
    pub hello_interval: u16,
    pub hold_time: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            autonomous_system: 1,
            router_id: Ipv4Addr::UNSPECIFIED,
            k_values: KValues::default(),
            max_paths: 4,
            variance: 1,
            hello_interval: crate::packet::consts::HELLO_INTERVAL_DEFAULT,
            hold_time: crate::packet::consts::HOLD_TIME_DEFAULT,
        }
    }
}
