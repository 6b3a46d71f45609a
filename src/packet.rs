//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! DUAL-visible wire constants. Parsing, serialization, checksumming and
//! authentication TLVs live in the packet layer, which is out of scope
//! for this crate.

use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

pub mod consts {
    use std::net::Ipv4Addr;

    pub const IPPROTO_EIGRPIGP: u8 = 88;
    pub const MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 10);
    pub const IP_TTL: u8 = 1;
    pub const HELLO_INTERVAL_DEFAULT: u16 = 5;
    pub const HOLD_TIME_DEFAULT: u16 = 15;
}

/// EIGRP opcodes relevant to DUAL. Other opcodes (HELLO, PROBE, REQUEST)
/// are handled entirely by the packet/adjacency layer and never reach the
/// FSM.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum Opcode {
    Update = 1,
    Request = 2,
    Query = 3,
    Reply = 4,
    Hello = 5,
    Probe = 7,
    SiaQuery = 10,
    SiaReply = 11,
}

/// The event kind the FSM classifier distinguishes between. `Internal`
/// covers locally-originated changes (e.g. a connected route appearing or
/// disappearing) and synthesized neighbor-down notifications, neither of
/// which corresponds to a received packet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum PacketType {
    Update,
    Query,
    Reply,
    SiaQuery,
    SiaReply,
    Internal,
}

impl PacketType {
    pub fn is_query_like(&self) -> bool {
        matches!(self, PacketType::Query | PacketType::SiaQuery)
    }

    pub fn is_reply_like(&self) -> bool {
        matches!(self, PacketType::Reply | PacketType::SiaReply)
    }
}
