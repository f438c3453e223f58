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

//! Connections: the physical link between two nodes.
//!
//! A connection propagates messages (bundles or LTP segments) with the
//! current propagation delay, applies the message error rate derived from
//! the radio's BER, and delivers to the peer duct's `send` or `ack` entry
//! point. Transmitting while the connection is closed loses the message.

use std::collections::{BTreeMap, BTreeSet};

use log::*;
use rand::Rng;

use crate::kernel::Event;
use crate::message::Message;
use crate::mobility::Contact;
use crate::simulation::Simulation;
use crate::types::{ConnId, Direction, DuctId, NodeId};

/// Kind-specific connection state.
#[derive(Debug, Clone)]
pub enum ConnKind {
    /// Always open.
    Static,
    /// Open/closed according to the pair's contact plan; the propagation
    /// delay of each contact is its range.
    Scheduled {
        /// This pair's contacts, sorted by start time.
        plan: Vec<Contact>,
    },
    /// Open while the pair distance stays below a bound.
    Distance {
        /// `(tstart, tend, prop_delay)` open intervals.
        intervals: Vec<(f64, f64, f64)>,
    },
    /// One instance per origin; destinations come in and out of view.
    Broadcast {
        /// Per-destination `(tstart, tend, prop_delay)` in-view intervals.
        intervals: BTreeMap<NodeId, Vec<(f64, f64, f64)>>,
        /// Destinations currently in view.
        in_view: BTreeSet<NodeId>,
        /// Per-destination view epoch; bumped when the destination leaves
        /// view, so that in-flight deliveries can detect staleness.
        epoch: BTreeMap<NodeId, u64>,
        /// Per-destination propagation delay while in view.
        delay: BTreeMap<NodeId, f64>,
    },
}

/// A directed connection between two nodes (broadcast connections fan out
/// of one origin instead).
#[derive(Debug)]
pub struct Connection {
    /// Arena id.
    pub id: ConnId,
    /// Transmitting node.
    pub orig: NodeId,
    /// Receiving node (the origin itself for broadcast connections; the
    /// actual receiver is the peer duct's node).
    pub dest: NodeId,
    /// Whether the connection is currently open.
    pub active: bool,
    /// Current propagation delay in seconds.
    pub prop_delay: f64,
    /// Messages lost on this connection (closed at transmit time, or the
    /// destination left view mid-flight).
    pub lost: Vec<Message>,
    /// Kind-specific state.
    pub kind: ConnKind,
}

impl Simulation {
    /// Transmit `msg` through `conn` towards `peer_duct`. Non-blocking: a
    /// concurrent propagation is scheduled; if the connection is closed the
    /// message is recorded as lost and discarded.
    pub(crate) fn transmit(
        &mut self,
        conn: ConnId,
        peer_duct: DuctId,
        mut msg: Message,
        ber: f64,
        dir: Direction,
    ) {
        let dest_node = self.ducts[peer_duct.index()].node;
        let c = &mut self.conns[conn.index()];
        let (open, delay, view_epoch) = match &c.kind {
            ConnKind::Broadcast { in_view, epoch, delay, .. } => (
                in_view.contains(&dest_node),
                delay.get(&dest_node).copied().unwrap_or(0.0),
                epoch.get(&dest_node).copied().unwrap_or(0),
            ),
            _ => (c.active, c.prop_delay, 0),
        };
        if !open {
            debug!("{} lost: connection {} -> {} is closed", msg, c.orig, dest_node);
            self.record_lost(conn, msg);
            return;
        }
        msg.add_prop_delay(delay);
        self.clock.schedule_in(
            delay,
            Event::Deliver { conn, duct: peer_duct, msg: Box::new(msg), dir, ber, view_epoch },
        );
    }

    /// A message finished propagating: roll the error dice and deliver it
    /// to the peer duct.
    pub(crate) fn handle_deliver(
        &mut self,
        conn: ConnId,
        duct: DuctId,
        mut msg: Message,
        dir: Direction,
        ber: f64,
        view_epoch: u64,
    ) {
        let dest_node = self.ducts[duct.index()].node;
        if let ConnKind::Broadcast { epoch, .. } = &self.conns[conn.index()].kind {
            if epoch.get(&dest_node).copied().unwrap_or(0) != view_epoch {
                debug!("{} lost: {} left view while propagating", msg, dest_node);
                self.record_lost(conn, msg);
                return;
            }
        }

        let mer = 1.0 - (1.0 - ber).powf(msg.num_bits());
        if mer > 0.0 && self.rng.gen::<f64>() < mer {
            msg.mark_errors(true);
        }

        match dir {
            Direction::Fwd => self.duct_receive(duct, msg),
            Direction::Ack => self.duct_ack(duct, msg),
        }
    }

    fn record_lost(&mut self, conn: ConnId, msg: Message) {
        if matches!(msg, Message::Segment(_)) {
            self.lost_segments += 1;
        }
        self.conns[conn.index()].lost.push(msg);
    }

    /// A scheduled or distance-gated connection opens its `index`-th
    /// interval.
    pub(crate) fn handle_conn_open(&mut self, conn: ConnId, index: usize) {
        let c = &mut self.conns[conn.index()];
        let delay = match &c.kind {
            ConnKind::Scheduled { plan } => plan.get(index).map(|ct| ct.range),
            ConnKind::Distance { intervals } => intervals.get(index).map(|iv| iv.2),
            _ => None,
        };
        let Some(delay) = delay else { return };
        c.active = true;
        c.prop_delay = delay;
        let (orig, dest) = (c.orig, c.dest);
        debug!("connection {} -> {} opens (delay {:.3}s)", orig, dest, delay);

        // an opening connection triggers the opportunistic handshake
        if self.nodes[orig.index()].epidemic.is_some() {
            self.epi_start_handshake(orig, dest);
        }
    }

    /// A scheduled or distance-gated connection closes.
    pub(crate) fn handle_conn_close(&mut self, conn: ConnId, _index: usize) {
        let c = &mut self.conns[conn.index()];
        c.active = false;
        debug!("connection {} -> {} closes", c.orig, c.dest);
        let (orig, dest) = (c.orig, c.dest);
        if self.nodes[orig.index()].epidemic.is_some() {
            self.epi_abort_handshake(orig, dest);
        }
    }

    /// A destination enters the view of a broadcast connection.
    pub(crate) fn handle_broadcast_open(&mut self, conn: ConnId, dest: NodeId, index: usize) {
        let c = &mut self.conns[conn.index()];
        if let ConnKind::Broadcast { intervals, in_view, delay, .. } = &mut c.kind {
            let Some(&(_, _, d)) = intervals.get(&dest).and_then(|v| v.get(index)) else {
                return;
            };
            in_view.insert(dest);
            delay.insert(dest, d);
            c.active = true;
            debug!("broadcast {} sees {} (delay {:.3}s)", c.orig, dest, d);
        }
    }

    /// A destination leaves the view of a broadcast connection.
    pub(crate) fn handle_broadcast_close(&mut self, conn: ConnId, dest: NodeId, _index: usize) {
        let c = &mut self.conns[conn.index()];
        if let ConnKind::Broadcast { in_view, epoch, .. } = &mut c.kind {
            in_view.remove(&dest);
            *epoch.entry(dest).or_insert(0) += 1;
            c.active = !in_view.is_empty();
            debug!("broadcast {} loses sight of {}", c.orig, dest);
        }
    }
}

/// Merge overlapping `[tstart, tend]` contact windows of one destination
/// into maximal in-view intervals; the propagation delay of an interval is
/// the range of its earliest contact.
pub fn union_view_intervals(contacts: &[Contact]) -> Vec<(f64, f64, f64)> {
    let mut sorted: Vec<&Contact> = contacts.iter().collect();
    sorted.sort_by(|a, b| a.tstart.total_cmp(&b.tstart).then(a.cid.cmp(&b.cid)));
    let mut out: Vec<(f64, f64, f64)> = Vec::new();
    for c in sorted {
        match out.last_mut() {
            Some(last) if c.tstart <= last.1 => last.1 = last.1.max(c.tend),
            _ => out.push((c.tstart, c.tend, c.range)),
        }
    }
    out
}
