//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Composite EIGRP metric arithmetic (classic, non-wide metric).

use serde::{Deserialize, Serialize};

/// The conventional EIGRP "unreachable" scalar distance.
pub const INFINITY: u32 = u32::MAX;

/// The six K-weights that parameterize the composite-to-scalar distance
/// function. The same values must be configured on every router in an AS.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct KValues {
    pub k1: u8,
    pub k2: u8,
    pub k3: u8,
    pub k4: u8,
    pub k5: u8,
    pub k6: u8,
}

impl Default for KValues {
    fn default() -> Self {
        KValues {
            k1: 1,
            k2: 0,
            k3: 1,
            k4: 0,
            k5: 0,
            k6: 0,
        }
    }
}

/// A composite EIGRP metric: bandwidth, delay, reliability, load, MTU and
/// hop-count.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[derive(Deserialize, Serialize)]
pub struct Metric {
    // Scaled inverse bandwidth (256 * 10^7 / kbps), smaller is better.
    pub bandwidth: u32,
    // Scaled cumulative delay, smaller is better.
    pub delay: u32,
    pub reliability: u8,
    pub load: u8,
    pub mtu: u32,
    pub hop_count: u8,
}

impl Metric {
    /// A metric representing an unreachable destination.
    pub const fn unreachable() -> Self {
        Metric {
            bandwidth: u32::MAX,
            delay: u32::MAX,
            reliability: 0,
            load: u8::MAX,
            mtu: 0,
            hop_count: u8::MAX,
        }
    }

    pub fn is_unreachable(&self) -> bool {
        self.bandwidth == u32::MAX && self.delay == u32::MAX
    }

    /// Composes the metric of a link with the metric reported by the
    /// neighbor at the far end of that link, producing the metric this
    /// router would report further upstream.
    ///
    /// bandwidth -> min, delay -> sum, reliability/load -> worst, mtu ->
    /// min, hop_count -> +1. All fields saturate rather than overflow.
    pub fn compose(link: &Metric, nbr: &Metric) -> Metric {
        if nbr.is_unreachable() {
            return Metric::unreachable();
        }

        Metric {
            bandwidth: link.bandwidth.max(nbr.bandwidth),
            delay: link.delay.saturating_add(nbr.delay),
            reliability: link.reliability.min(nbr.reliability),
            load: link.load.max(nbr.load),
            mtu: link.mtu.min(nbr.mtu),
            hop_count: nbr.hop_count.saturating_add(1),
        }
    }

    /// Field-wise equality, used to detect whether a change to the best
    /// path is substantive enough to re-baseline and re-advertise.
    pub fn same(a: &Metric, b: &Metric) -> bool {
        a == b
    }

    /// Derives the scalar distance used for every ordering/comparison
    /// decision in DUAL, given the router's configured K-weights.
    ///
    /// Classic (non-wide) EIGRP formula:
    ///   D = [K1 * bw + (K2 * bw) / (256 - load) + K3 * delay] * (K5 / (reliability + K4))
    /// with the K5 term dropped (treated as 1) when K5 == 0, matching
    /// every shipping EIGRP implementation.
    pub fn distance(&self, k: &KValues) -> u32 {
        if self.is_unreachable() {
            return INFINITY;
        }

        let bw_term = (k.k1 as u64).saturating_mul(self.bandwidth as u64);
        let load_term = if k.k2 == 0 {
            0
        } else {
            let denom = 256u64.saturating_sub((self.load as u64) + 1);
            let denom = denom.max(1);
            (k.k2 as u64)
                .saturating_mul(self.bandwidth as u64)
                .saturating_div(denom)
        };
        let delay_term = (k.k3 as u64).saturating_mul(self.delay as u64);

        let mut total = bw_term
            .saturating_add(load_term)
            .saturating_add(delay_term);

        if k.k5 != 0 {
            let denom = (self.reliability as u64).saturating_add(k.k4 as u64);
            let denom = denom.max(1);
            total = total
                .saturating_mul(k.k5 as u64)
                .saturating_div(denom);
        }

        u32::try_from(total).unwrap_or(INFINITY).min(INFINITY)
    }
}

/// The Feasibility Condition: a candidate path is provably loop-free if
/// the distance the neighbor itself reports for the destination is
/// strictly less than this router's feasible distance.
pub fn feasible(reported_distance: u32, fd: u32) -> bool {
    reported_distance < fd
}
