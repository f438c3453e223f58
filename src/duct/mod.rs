// DtnSim: Delay-Tolerant Networking Simulator written in Rust
// Copyright (C) 2022-2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! The convergence layer: ducts.
//!
//! A duct is one half of a typed channel between two nodes: the *outduct*
//! on the sender, the *induct* on the receiver. Variants: basic
//! (pass-through), LTP, multi-band LTP, and parallel LTP. LTP-family ducts
//! run one session state machine per block; a failed session routes its
//! block to the node's limbo with the current contact excluded.

use log::*;

use crate::bundle::Bundle;
use crate::kernel::resources::Fifo;
use crate::kernel::Waker;
use crate::message::Message;
use crate::segment::{CancelSegment, LtpSegment};
use crate::simulation::Simulation;
use crate::types::{Direction, DuctId, NodeId, RerouteReason, SessionId};

mod basic;
pub(crate) mod ltp;
mod mbltp;
mod parallel;

pub use basic::{BasicInduct, BasicOutduct};
pub use ltp::{LtpInduct, LtpOutduct, LtpRxSession, LtpTxSession};
pub use mbltp::{MbltpInduct, MbltpOutduct, MbRxSession};
pub use parallel::{ParallelInduct, ParallelOutduct};

/// Owner of a duct: a node, or a parallel duct for LTP engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuctParent {
    /// A node owns the duct.
    Node(NodeId),
    /// A parallel-LTP duct owns the duct as one of its engines.
    Duct(DuctId),
}

/// Kind-specific duct state.
#[derive(Debug)]
pub enum DuctKind {
    /// Basic outduct.
    BasicOut(BasicOutduct),
    /// Basic induct.
    BasicIn(BasicInduct),
    /// LTP outduct.
    LtpOut(LtpOutduct),
    /// LTP induct.
    LtpIn(LtpInduct),
    /// Multi-band LTP outduct.
    MbltpOut(MbltpOutduct),
    /// Multi-band LTP induct.
    MbltpIn(MbltpInduct),
    /// Parallel LTP outduct.
    ParOut(ParallelOutduct),
    /// Parallel LTP induct.
    ParIn(ParallelInduct),
}

/// One half of a convergence-layer channel.
#[derive(Debug)]
pub struct Duct {
    /// Arena id.
    pub id: DuctId,
    /// Configuration label (e.g. the band or engine name).
    pub label: String,
    /// Node this duct lives on.
    pub node: NodeId,
    /// Node at the other end of the channel.
    pub neighbor: NodeId,
    /// Owner.
    pub parent: DuctParent,
    /// The duct at the other end.
    pub peer: DuctId,
    /// Ingress queue: bundles from the node (outducts) or messages from
    /// the connection (inducts).
    pub in_queue: Fifo<Message>,
    /// Kind-specific state.
    pub kind: DuctKind,
}

impl Duct {
    /// Whether this is an outduct.
    pub fn is_outduct(&self) -> bool {
        matches!(
            self.kind,
            DuctKind::BasicOut(_)
                | DuctKind::LtpOut(_)
                | DuctKind::MbltpOut(_)
                | DuctKind::ParOut(_)
        )
    }

    /// Transmit direction used by this duct: outducts send forward,
    /// inducts send acks back.
    pub fn transmit_mode(&self) -> Direction {
        if self.is_outduct() {
            Direction::Fwd
        } else {
            Direction::Ack
        }
    }
}

impl Simulation {
    /// Hand a bundle to an outduct for transmission. Non-blocking.
    pub(crate) fn duct_send(&mut self, duct: DuctId, bundle: Bundle) {
        self.duct_receive(duct, Message::Bundle(bundle));
    }

    /// Enqueue a message into a duct's ingress queue and wake its drain
    /// loop.
    pub(crate) fn duct_receive(&mut self, duct: DuctId, msg: Message) {
        trace!("{} delivered to duct {}", msg, self.ducts[duct.index()].label);
        let _ = self.ducts[duct.index()].in_queue.try_put(msg);
        self.clock.wake(Waker::DuctIngress(duct));
    }

    /// Deliver a "reverse" message to a duct (e.g. a Report Segment going
    /// back to an LTP outduct).
    pub(crate) fn duct_ack(&mut self, duct: DuctId, msg: Message) {
        let Message::Segment(segment) = msg else {
            error!("duct {} cannot ack a bundle", self.ducts[duct.index()].label);
            return;
        };
        match &self.ducts[duct.index()].kind {
            DuctKind::LtpOut(_) => self.ltp_out_segment(duct, segment),
            DuctKind::MbltpOut(_) => self.mbltp_out_segment(duct, segment),
            _ => {
                error!("duct {} cannot receive acks", self.ducts[duct.index()].label);
            }
        }
    }

    /// Drain one message from a duct's ingress queue.
    pub(crate) fn handle_duct_ingress(&mut self, duct: DuctId) {
        let Some((msg, _)) = self.ducts[duct.index()].in_queue.try_get() else { return };
        match (&self.ducts[duct.index()].kind, msg) {
            (DuctKind::BasicOut(_), Message::Bundle(b)) => self.basic_out_ingress(duct, b),
            (DuctKind::BasicIn(_), Message::Bundle(b)) => self.induct_deliver(duct, b),
            (DuctKind::LtpOut(_), Message::Bundle(b)) => self.ltp_out_ingress(duct, b),
            (DuctKind::LtpIn(_), Message::Segment(s)) => self.ltp_in_segment(duct, s),
            (DuctKind::MbltpOut(_), Message::Bundle(b)) => self.mbltp_out_ingress(duct, b),
            (DuctKind::MbltpIn(_), Message::Segment(s)) => self.mbltp_in_segment(duct, s),
            (DuctKind::ParOut(_), Message::Bundle(b)) => self.par_out_ingress(duct, b),
            (kind, msg) => {
                error!("duct {:?} cannot process {}", std::mem::discriminant(kind), msg);
            }
        }
    }

    /// A radio failed to transmit `msg`: signal the session owning it (via
    /// its session id) to cancel. The owning duct is the peer of the duct
    /// the message was addressed to.
    pub(crate) fn duct_radio_error(&mut self, peer: DuctId, msg: &Message) {
        let Message::Segment(segment) = msg else { return };
        let owner = self.ducts[peer.index()].peer;
        self.duct_cancel_session(owner, segment.session_id());
    }

    /// Enqueue a synthetic Cancel Segment into the session `sid` of `duct`,
    /// with expedited priority.
    pub(crate) fn duct_cancel_session(&mut self, duct: DuctId, sid: SessionId) {
        let cancel = LtpSegment::Cancel(CancelSegment::new(sid));
        match &self.ducts[duct.index()].kind {
            DuctKind::LtpOut(_) => self.ltp_out_segment(duct, cancel),
            DuctKind::LtpIn(_) => self.ltp_in_segment(duct, cancel),
            DuctKind::MbltpOut(_) => self.mbltp_out_segment(duct, cancel),
            DuctKind::MbltpIn(_) => self.mbltp_in_segment(duct, cancel),
            _ => {}
        }
    }

    /// A duct (induct side) hands a received bundle up: to the node's
    /// routing layer, or to the owning parallel induct.
    pub(crate) fn induct_deliver(&mut self, duct: DuctId, bundle: Bundle) {
        match self.ducts[duct.index()].parent {
            DuctParent::Node(node) => self.node_forward(node, bundle),
            DuctParent::Duct(parent) => self.par_in_receive(parent, bundle),
        }
    }

    /// A duct (outduct side) reports that `bundle` was delivered end to
    /// end by its convergence layer.
    pub(crate) fn duct_notify_success(&mut self, duct: DuctId, bundle: Bundle) {
        match self.ducts[duct.index()].parent {
            // the receiving induct has already forwarded its copy; the
            // sender-side copy is done
            DuctParent::Node(_) => drop(bundle),
            DuctParent::Duct(parent) => self.par_out_success(parent, bundle),
        }
    }

    /// A duct (outduct side) reports that its convergence layer failed to
    /// deliver `bundle`: route it to the node's limbo excluding the current
    /// contact, or tally the failure at the owning parallel duct.
    pub(crate) fn duct_notify_fail(&mut self, duct: DuctId, bundle: Bundle) {
        let neighbor = self.ducts[duct.index()].neighbor;
        match self.ducts[duct.index()].parent {
            DuctParent::Node(node) => {
                debug!("{} failed at duct {}", bundle, self.ducts[duct.index()].label);
                let cid = self.nodes[node.index()]
                    .managers
                    .get(&neighbor)
                    .and_then(|&m| self.managers[m.index()].current_cid());
                trace!("re-routing {} ({})", bundle, RerouteReason::SessionCancelled);
                self.node_limbo(node, bundle, cid);
            }
            DuctParent::Duct(parent) => self.par_out_fail(parent, bundle),
        }
    }
}

/// Normalize a set of `(start, end)` intervals into their sorted union.
pub fn union_intervals(mut intervals: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    intervals.retain(|(s, e)| e > s);
    intervals.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    let mut out: Vec<(f64, f64)> = Vec::with_capacity(intervals.len());
    for (s, e) in intervals {
        match out.last_mut() {
            Some(last) if s <= last.1 => last.1 = last.1.max(e),
            _ => out.push((s, e)),
        }
    }
    out
}

/// The intervals of `[lb, ub]` *not* covered by `covered` (which must be a
/// sorted union, see [`union_intervals`]).
pub fn xor_intervals(lb: f64, ub: f64, covered: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut out = Vec::new();
    let mut cursor = lb;
    for &(s, e) in covered {
        if e <= lb {
            continue;
        }
        if s > cursor {
            out.push((cursor, s.min(ub)));
        }
        cursor = cursor.max(e);
        if cursor >= ub {
            return out;
        }
    }
    if cursor < ub {
        out.push((cursor, ub));
    }
    out
}

/// Total length of a set of disjoint intervals.
pub fn interval_volume(intervals: &[(f64, f64)]) -> f64 {
    intervals.iter().map(|(s, e)| e - s).sum()
}

/// Convert `(offset, length)` claims into `(start, end)` intervals.
pub fn claims_to_intervals(claims: &[(f64, f64)]) -> Vec<(f64, f64)> {
    claims.iter().map(|&(o, l)| (o, o + l)).collect()
}

/// Convert `(start, end)` intervals into `(offset, length)` claims.
pub fn intervals_to_claims(intervals: &[(f64, f64)]) -> Vec<(f64, f64)> {
    intervals.iter().map(|&(s, e)| (s, e - s)).collect()
}
