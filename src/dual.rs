//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The DUAL finite state machine (component C): classifies incoming
//! action messages into one of eight events, executes the corresponding
//! state transition from the 2D action table, and enqueues outbound
//! intent on the change dispatcher.

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

use crate::collections::{NeighborId, Neighbors};
use crate::config::Config;
use crate::debug::Debug;
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::metric::{self, Metric};
use crate::packet::PacketType;
use crate::southbound::PacketTx;
use crate::topology::{DualState, ReqAction, Topology};

/// Input envelope the packet layer hands to the FSM for every relevant
/// received message (or synthesizes for internally-originated changes).
#[derive(Clone, Debug)]
pub struct ActionMessage {
    pub packet_type: PacketType,
    pub adv_router: NeighborId,
    pub prefix: Ipv4Network,
    pub incoming_metric: Metric,
    pub autonomous_system: u16,
}

/// The event classified out of a `(state, ActionMessage)` pair. Numbered
/// to match the daemon's NSM transition-table columns.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Event {
    NqFcn = 0,
    Lr = 1,
    QFcn = 2,
    LrFcs = 3,
    Dinc = 4,
    Qact = 5,
    LrFcn = 6,
    Keep = 7,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Action {
    Keep,
    NqFcn,
    QFcn,
    Qact,
    Dinc,
    Lr,
    LrFcs,
    LrFcn,
}

/// Borrowed handles to everything a single FSM invocation may need to
/// mutate. Grouped into one struct purely to avoid a five-argument
/// signature on every action function.
pub struct Ctx<'a> {
    pub topology: &'a mut Topology,
    pub neighbors: &'a Neighbors,
    pub config: &'a Config,
    pub dispatcher: &'a mut Dispatcher,
    pub packet_tx: &'a dyn PacketTx,
}

/// Runs the classifier for `(state, msg)`, mutating the topology table's
/// distance/entry bookkeeping as a side effect; classification and
/// `update_distance` are inseparable.
fn classify(ctx: &mut Ctx, msg: &ActionMessage) -> Event {
    let state = ctx
        .topology
        .lookup(msg.prefix)
        .map(|p| p.state)
        .unwrap_or(DualState::Passive);

    match state {
        DualState::Passive => {
            ctx.topology.update_distance(
                msg.prefix,
                ctx.neighbors,
                &ctx.config.k_values,
                msg.adv_router,
                msg.incoming_metric,
            );
            let prefix = ctx.topology.lookup(msg.prefix).expect("just updated");
            let head = prefix.head().expect("update_distance always leaves an entry");
            if metric::feasible(head.reported_distance, prefix.fdistance) {
                Event::Keep
            } else if msg.packet_type.is_query_like() {
                Event::QFcn
            } else {
                Event::NqFcn
            }
        }
        DualState::Active0 | DualState::Active2 => {
            ctx.topology.update_distance(
                msg.prefix,
                ctx.neighbors,
                &ctx.config.k_values,
                msg.adv_router,
                msg.incoming_metric,
            );
            // ACTIVE_2 ignores QUERY-from-successor (no QACT transition).
            let allow_qact = state == DualState::Active0;

            if msg.packet_type.is_reply_like() {
                let prefix = ctx.topology.lookup_mut(msg.prefix).expect("just updated");
                prefix.rij.remove(&msg.adv_router);
                if !prefix.rij.is_empty() {
                    Event::Keep
                } else {
                    let head = prefix.head().expect("always has an entry");
                    if metric::feasible(head.reported_distance, prefix.fdistance) {
                        Event::LrFcs
                    } else {
                        Event::LrFcn
                    }
                }
            } else if allow_qact && msg.packet_type.is_query_like() {
                let is_successor = ctx
                    .topology
                    .lookup(msg.prefix)
                    .and_then(|p| p.entry(msg.adv_router))
                    .map(|e| e.is_successor())
                    .unwrap_or(false);
                if is_successor {
                    Event::Qact
                } else {
                    Event::Keep
                }
            } else {
                Event::Keep
            }
        }
        DualState::Active1 | DualState::Active3 => {
            let change = ctx.topology.update_distance(
                msg.prefix,
                ctx.neighbors,
                &ctx.config.k_values,
                msg.adv_router,
                msg.incoming_metric,
            );
            // ACTIVE_3 ignores QUERY-from-successor (no QACT transition).
            let allow_qact = state == DualState::Active1;
            let is_successor = ctx
                .topology
                .lookup(msg.prefix)
                .and_then(|p| p.entry(msg.adv_router))
                .map(|e| e.is_successor())
                .unwrap_or(false);

            if allow_qact && msg.packet_type.is_query_like() && is_successor {
                Event::Qact
            } else if msg.packet_type.is_reply_like() {
                let prefix = ctx.topology.lookup_mut(msg.prefix).expect("just updated");
                prefix.rij.remove(&msg.adv_router);
                if change && is_successor {
                    Event::Dinc
                } else if !prefix.rij.is_empty() {
                    Event::Keep
                } else {
                    Event::Lr
                }
            } else if msg.packet_type == PacketType::Update && change && is_successor {
                Event::Dinc
            } else {
                Event::Keep
            }
        }
    }
}

/// The transition table. Cells for events the classifier cannot
/// produce in a given state (e.g. `PASSIVE x LR`, `ACTIVE_0 x LR`) are
/// intentionally absent here and handled as defensive no-ops by the
/// caller.
fn action_for(state: DualState, event: Event) -> Option<Action> {
    use DualState::*;
    use Event::*;

    match (state, event) {
        (_, Keep) => Some(Action::Keep),
        (Passive, NqFcn) => Some(Action::NqFcn),
        (Passive, QFcn) => Some(Action::QFcn),
        (Active0, LrFcs) => Some(Action::LrFcs),
        (Active0, Qact) => Some(Action::Qact),
        (Active0, LrFcn) => Some(Action::LrFcn),
        (Active1, Lr) => Some(Action::Lr),
        (Active1, Dinc) => Some(Action::Dinc),
        (Active1, Qact) => Some(Action::Qact),
        (Active2, LrFcs) => Some(Action::LrFcs),
        (Active2, LrFcn) => Some(Action::LrFcn),
        (Active3, Lr) => Some(Action::Lr),
        (Active3, Dinc) => Some(Action::Dinc),
        _ => None,
    }
}

/// Entry point: classifies `msg`, looks up its action, and executes it.
/// Never panics on malformed input and never propagates an error to the
/// caller — protocol violations are logged and the message is dropped.
pub fn process_action(ctx: &mut Ctx, msg: ActionMessage) {
    let state = ctx
        .topology
        .lookup(msg.prefix)
        .map(|p| p.state)
        .unwrap_or(DualState::Passive);
    Debug::ActionRx(&msg.packet_type, &msg.prefix, state, &msg.incoming_metric).log();

    run(ctx, msg);
}

fn run(ctx: &mut Ctx, msg: ActionMessage) {
    let state = ctx
        .topology
        .lookup(msg.prefix)
        .map(|p| p.state)
        .unwrap_or(DualState::Passive);
    let event = classify(ctx, &msg);
    Debug::FsmEvent(&msg.prefix, state, event).log();

    match action_for(state, event) {
        Some(action) => execute(ctx, msg, state, action),
        None => Error::UnrepresentedEvent { state, event }.log(),
    }
}

fn execute(ctx: &mut Ctx, msg: ActionMessage, from_state: DualState, action: Action) {
    let prefix = msg.prefix;

    match action {
        Action::Keep => keep(ctx, &msg),
        Action::NqFcn => enter_active(ctx, &msg, DualState::Active1),
        Action::QFcn => enter_active(ctx, &msg, DualState::Active3),
        Action::Qact => qact(ctx, &msg),
        Action::Dinc => dinc(ctx, msg),
        Action::Lr => lr(ctx, &msg),
        Action::LrFcs => lr_fcs(ctx, &msg),
        Action::LrFcn => lr_fcn(ctx, msg),
    }

    if let Some(to_state) = ctx.topology.lookup(prefix).map(|p| p.state) {
        if to_state != from_state {
            Debug::FsmTransition(&prefix, from_state, to_state).log();
        }
    }
}

// ===== action implementations =====

fn keep(ctx: &mut Ctx, msg: &ActionMessage) {
    let Some(prefix_entry) = ctx.topology.lookup(msg.prefix) else {
        return;
    };

    if prefix_entry.state == DualState::Passive {
        if let Some(head) = prefix_entry.head() {
            let metric_changed = !Metric::same(&prefix_entry.reported_metric, &head.total_metric);
            if metric_changed {
                let distance = head.distance;
                let reported_metric = head.total_metric;

                let prefix_mut = ctx.topology.lookup_mut(msg.prefix).expect("checked above");
                prefix_mut.rdistance = distance;
                prefix_mut.fdistance = distance;
                prefix_mut.distance = distance;
                prefix_mut.reported_metric = reported_metric;
                prefix_mut.req_action.insert(ReqAction::NEED_UPDATE);
                ctx.dispatcher.enqueue(msg.prefix);
            }
        }
    }

    // A QUERY gets a REPLY unconditionally, regardless of state or
    // whether the best metric changed: a neighbor mid-diffusion still
    // needs an answer even when it isn't our successor, or its own
    // active/SIA timer never resolves.
    if msg.packet_type.is_query_like() {
        if let Some(prefix_entry) = ctx.topology.lookup(msg.prefix) {
            ctx.packet_tx.send_reply(
                msg.adv_router,
                msg.prefix,
                prefix_entry.reported_metric,
                prefix_entry.distance,
            );
            Debug::ReplyEnqueued(&msg.prefix, msg.adv_router).log();
        }
    }

    ctx.topology
        .update_node_flags(msg.prefix, ctx.config.variance, ctx.config.max_paths);
    ctx.topology.prefix_updated(msg.prefix);
}

/// Shared by `nq_fcn` (event 0, target ACTIVE_1) and `q_fcn` (event 2,
/// target ACTIVE_3): snapshot the best entry as FD/distance/RD, and
/// either kick off a round of QUERYs or, if there are no neighbors to
/// query, converge trivially via `lr`.
fn enter_active(ctx: &mut Ctx, msg: &ActionMessage, target_state: DualState) {
    let head = ctx
        .topology
        .lookup(msg.prefix)
        .and_then(|p| p.head())
        .cloned()
        .expect("classifier only reaches here with at least one entry");

    {
        let prefix_mut = ctx.topology.lookup_mut(msg.prefix).expect("just read");
        prefix_mut.state = target_state;
        prefix_mut.rdistance = head.distance;
        prefix_mut.distance = head.distance;
        prefix_mut.fdistance = head.distance;
        prefix_mut.reported_metric = head.total_metric;
    }

    if !ctx.neighbors.is_empty() {
        let exclude = if msg.packet_type.is_query_like() {
            Some(msg.adv_router)
        } else {
            None
        };
        let rij = ctx
            .neighbors
            .iter()
            .map(|(id, _)| id)
            .filter(|id| Some(*id) != exclude)
            .collect();

        let prefix_mut = ctx.topology.lookup_mut(msg.prefix).expect("just written");
        prefix_mut.rij = rij;
        prefix_mut.req_action.insert(ReqAction::NEED_QUERY);
        ctx.dispatcher.enqueue(msg.prefix);
        Debug::QueryEnqueued(&msg.prefix).log();
    } else {
        lr(ctx, msg);
    }
}

fn qact(ctx: &mut Ctx, msg: &ActionMessage) {
    let distance = ctx
        .topology
        .lookup(msg.prefix)
        .and_then(|p| p.head())
        .map(|h| h.distance)
        .unwrap_or(metric::INFINITY);

    let prefix_mut = ctx
        .topology
        .lookup_mut(msg.prefix)
        .expect("QACT only reached from an already-active prefix");
    prefix_mut.state = DualState::Active2;
    prefix_mut.distance = distance;
}

/// Event 4: distance increased while awaiting replies. ACTIVE_1 ->
/// ACTIVE_0, ACTIVE_3 -> ACTIVE_2 (FD is *not* reset, unlike `lr`/
/// `lr_fcs`). If all replies already arrived by the time this runs,
/// re-classify and re-dispatch once more by reusing the same message
/// against the new state.
fn dinc(ctx: &mut Ctx, msg: ActionMessage) {
    let distance = {
        let prefix_mut = ctx
            .topology
            .lookup_mut(msg.prefix)
            .expect("DINC only reached from an already-active prefix");
        prefix_mut.state = match prefix_mut.state {
            DualState::Active1 => DualState::Active0,
            _ => DualState::Active2,
        };
        prefix_mut.head().map(|h| h.distance).unwrap_or(metric::INFINITY)
    };

    let rij_empty = {
        let prefix_mut = ctx.topology.lookup_mut(msg.prefix).expect("just written");
        prefix_mut.distance = distance;
        prefix_mut.rij.is_empty()
    };

    if rij_empty {
        run(ctx, msg);
    }
}

/// Event 1: last reply received, FD is reset, transition to PASSIVE.
fn lr(ctx: &mut Ctx, msg: &ActionMessage) {
    let old_state = ctx
        .topology
        .lookup(msg.prefix)
        .map(|p| p.state)
        .unwrap_or(DualState::Passive);
    let head = ctx
        .topology
        .lookup(msg.prefix)
        .and_then(|p| p.head())
        .cloned()
        .expect("LR only reached from an already-active prefix");

    {
        let prefix_mut = ctx.topology.lookup_mut(msg.prefix).expect("just read");
        prefix_mut.fdistance = head.distance;
        prefix_mut.distance = head.distance;
        prefix_mut.rdistance = head.distance;
        prefix_mut.reported_metric = head.total_metric;
    }

    // Capture-then-assign: check the *old* state (ACTIVE_3) before
    // assigning PASSIVE, so the reply is actually sent to the successor.
    if old_state == DualState::Active3 {
        send_reply_to_successor(ctx, msg.prefix);
    }

    let prefix_mut = ctx.topology.lookup_mut(msg.prefix).expect("still present");
    prefix_mut.state = DualState::Passive;
    prefix_mut.rij.clear();
    prefix_mut.req_action.insert(ReqAction::NEED_UPDATE);
    ctx.dispatcher.enqueue(msg.prefix);

    ctx.topology
        .update_node_flags(msg.prefix, ctx.config.variance, ctx.config.max_paths);
    ctx.topology.prefix_updated(msg.prefix);

    if ctx.topology.lookup(msg.prefix).map(|p| p.is_empty()).unwrap_or(false) {
        ctx.topology.delete(msg.prefix);
    }
}

/// Event 3: last reply, FC satisfied with the current FD.
fn lr_fcs(ctx: &mut Ctx, msg: &ActionMessage) {
    let old_state = ctx
        .topology
        .lookup(msg.prefix)
        .map(|p| p.state)
        .unwrap_or(DualState::Passive);
    let head = ctx
        .topology
        .lookup(msg.prefix)
        .and_then(|p| p.head())
        .cloned()
        .expect("LR_FCS only reached from an already-active prefix");

    {
        let prefix_mut = ctx.topology.lookup_mut(msg.prefix).expect("just read");
        prefix_mut.distance = head.distance;
        prefix_mut.rdistance = head.distance;
        prefix_mut.reported_metric = head.total_metric;
        prefix_mut.fdistance = prefix_mut.fdistance.min(prefix_mut.distance);
    }

    if old_state == DualState::Active2 {
        send_reply_to_successor(ctx, msg.prefix);
    }

    let prefix_mut = ctx.topology.lookup_mut(msg.prefix).expect("still present");
    prefix_mut.state = DualState::Passive;
    prefix_mut.rij.clear();
    prefix_mut.req_action.insert(ReqAction::NEED_UPDATE);
    ctx.dispatcher.enqueue(msg.prefix);

    ctx.topology
        .update_node_flags(msg.prefix, ctx.config.variance, ctx.config.max_paths);
    ctx.topology.prefix_updated(msg.prefix);
}

/// Event 6: last reply, FC not satisfied — remain active one more round.
fn lr_fcn(ctx: &mut Ctx, msg: ActionMessage) {
    let head = {
        let prefix_mut = ctx
            .topology
            .lookup_mut(msg.prefix)
            .expect("LR_FCN only reached from an already-active prefix");
        prefix_mut.state = match prefix_mut.state {
            DualState::Active0 => DualState::Active1,
            _ => DualState::Active3,
        };
        prefix_mut
            .head()
            .cloned()
            .expect("always has an entry while active")
    };

    let prefix_mut = ctx.topology.lookup_mut(msg.prefix).expect("just written");
    prefix_mut.rdistance = head.distance;
    prefix_mut.distance = head.distance;
    prefix_mut.reported_metric = head.total_metric;

    if !ctx.neighbors.is_empty() {
        prefix_mut.req_action.insert(ReqAction::NEED_QUERY);
        ctx.dispatcher.enqueue(msg.prefix);
        Debug::QueryEnqueued(&msg.prefix).log();
    } else {
        lr(ctx, &msg);
    }
}

fn send_reply_to_successor(ctx: &mut Ctx, prefix: Ipv4Network) {
    let successor = ctx
        .topology
        .lookup(prefix)
        .and_then(|p| p.successors().next())
        .map(|e| e.adv_router);
    let Some(nbr) = successor else { return };
    let Some(prefix_entry) = ctx.topology.lookup(prefix) else {
        return;
    };
    ctx.packet_tx
        .send_reply(nbr, prefix, prefix_entry.reported_metric, prefix_entry.distance);
    Debug::ReplyEnqueued(&prefix, nbr).log();
}
