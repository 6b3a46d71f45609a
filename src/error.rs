//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use enum_as_inner::EnumAsInner;
use tracing::warn;

use crate::dual::Event;
use crate::topology::DualState;

// EIGRP errors the FSM can encounter while processing an action message.
//
// None of these are fatal: the FSM never raises to its caller. Every
// variant here is logged and the triggering message is discarded; the
// protocol's reliable-transport layer is responsible for retrying
// delivery.
#[derive(Debug, EnumAsInner)]
pub enum Error {
    // An event the classifier produced has no action in the transition
    // table for the current state. This can only happen for the
    // off-diagonal LR combinations the classifier never actually emits;
    // treated defensively as a protocol violation.
    UnrepresentedEvent { state: DualState, event: Event },
    // Allocation of a new Neighbor-Entry failed (or the neighbor backing
    // it is unknown). The triggering packet is dropped; the protocol
    // recovers on retransmission.
    ResourceExhausted,
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::UnrepresentedEvent { state, event } => {
                warn!(%state, ?event, "{}", self);
            }
            Error::ResourceExhausted => {
                warn!("{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnrepresentedEvent { .. } => {
                write!(f, "event not represented in the transition table")
            }
            Error::ResourceExhausted => {
                write!(f, "failed to allocate neighbor entry")
            }
        }
    }
}

impl std::error::Error for Error {}
