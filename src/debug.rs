//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use ipnetwork::Ipv4Network;
use tracing::debug;

use crate::collections::NeighborId;
use crate::dual::Event;
use crate::metric::Metric;
use crate::packet::PacketType;
use crate::topology::DualState;

// EIGRP debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    InstanceCreate,
    InstanceDelete,
    NbrCreate(&'a std::net::Ipv4Addr),
    NbrDown(&'a std::net::Ipv4Addr),
    ActionRx(&'a PacketType, &'a Ipv4Network, DualState, &'a Metric),
    FsmEvent(&'a Ipv4Network, DualState, Event),
    FsmTransition(&'a Ipv4Network, DualState, DualState),
    TopologyPrefixUpdated(&'a Ipv4Network, DualState, u32),
    DispatcherFlush(usize),
    ReplyEnqueued(&'a Ipv4Network, NeighborId),
    UpdateEnqueued(&'a Ipv4Network),
    QueryEnqueued(&'a Ipv4Network),
}

// ===== impl Debug =====

impl<'a> Debug<'a> {
    // Log debug message using the tracing API.
    pub fn log(&self) {
        match self {
            Debug::InstanceCreate | Debug::InstanceDelete => {
                debug!("{}", self);
            }
            Debug::NbrCreate(addr) | Debug::NbrDown(addr) => {
                debug!(address = %addr, "{}", self);
            }
            Debug::ActionRx(packet_type, prefix, state, incoming_metric) => {
                // Mirrors the full-packet trace the daemon logs on packet
                // receive: the composite metric is cheap to serialize and
                // useful when comparing what a neighbor actually sent
                // against the composed distance DUAL derives from it.
                let data = serde_json::to_string(incoming_metric).unwrap();
                debug!(?packet_type, %prefix, %state, %data, "{}", self);
            }
            Debug::FsmEvent(prefix, state, event) => {
                debug!(%prefix, %state, ?event, "{}", self);
            }
            Debug::FsmTransition(prefix, from, to) => {
                debug!(%prefix, %from, %to, "{}", self);
            }
            Debug::TopologyPrefixUpdated(prefix, state, distance) => {
                debug!(%prefix, %state, %distance, "{}", self);
            }
            Debug::DispatcherFlush(count) => {
                debug!(%count, "{}", self);
            }
            Debug::ReplyEnqueued(prefix, _nbr) => {
                debug!(%prefix, "{}", self);
            }
            Debug::UpdateEnqueued(prefix) | Debug::QueryEnqueued(prefix) => {
                debug!(%prefix, "{}", self);
            }
        }
    }
}

impl<'a> std::fmt::Display for Debug<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::InstanceCreate => write!(f, "instance created"),
            Debug::InstanceDelete => write!(f, "instance deleted"),
            Debug::NbrCreate(..) => write!(f, "neighbor created"),
            Debug::NbrDown(..) => write!(f, "neighbor down"),
            Debug::ActionRx(..) => write!(f, "action message received"),
            Debug::FsmEvent(..) => write!(f, "fsm event classified"),
            Debug::FsmTransition(..) => write!(f, "fsm state transition"),
            Debug::TopologyPrefixUpdated(..) => write!(f, "prefix updated"),
            Debug::DispatcherFlush(..) => write!(f, "change dispatcher flush"),
            Debug::ReplyEnqueued(..) => write!(f, "reply enqueued"),
            Debug::UpdateEnqueued(..) => write!(f, "update enqueued"),
            Debug::QueryEnqueued(..) => write!(f, "query enqueued"),
        }
    }
}
