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

//! Radios: serialization delay, bit errors, and transmit energy.
//!
//! A radio owns a FIFO of outbound items. It serializes one item at a time
//! (suspending for `num_bits / rate`), accounts the transmit energy, and
//! hands the message to the connection towards the item's neighbor.

use std::collections::BTreeMap;

use log::*;
use serde::{Deserialize, Serialize};

use crate::kernel::resources::{Fifo, Semaphore};
use crate::kernel::{Event, Waker};
use crate::message::Message;
use crate::simulation::Simulation;
use crate::types::{Direction, DuctId, NodeId, RadioId};

/// One queued transmission.
#[derive(Debug, Clone)]
pub struct RadioItem {
    /// Neighbor to transmit towards (selects the connection).
    pub neighbor: NodeId,
    /// The message.
    pub msg: Message,
    /// Peer duct that receives the message.
    pub peer: DuctId,
    /// Forward or ack delivery at the peer.
    pub dir: Direction,
}

/// A per-destination step profile of data rates: the rate of step `i` holds
/// from `steps[i].0` until `steps[i+1].0`. A zero rate means the radio
/// cannot transmit towards the destination during the step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateProfile {
    /// `(time, rate)` steps, sorted by time.
    pub steps: Vec<(f64, f64)>,
}

impl RateProfile {
    /// Create a profile from `(time, rate)` steps; sorts them by time.
    pub fn new(mut steps: Vec<(f64, f64)>) -> Self {
        steps.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { steps }
    }

    /// The rate in force at time `t` (zero before the first step).
    pub fn rate_at(&self, t: f64) -> f64 {
        self.steps.iter().take_while(|(ts, _)| *ts <= t).last().map(|(_, r)| *r).unwrap_or(0.0)
    }

    /// The largest rate of the profile.
    pub fn peak_rate(&self) -> f64 {
        self.steps.iter().map(|(_, r)| *r).fold(0.0, f64::max)
    }

    /// Integrate `bits` across the rate steps starting at `t0`, waiting
    /// through zero-rate intervals. Returns the elapsed time until the last
    /// bit is out, or `None` if the remaining profile can never move the
    /// bits.
    pub fn tx_time(&self, bits: f64, t0: f64) -> Option<f64> {
        let mut remaining = bits;
        let mut t = t0;
        for (i, &(ts, rate)) in self.steps.iter().enumerate() {
            let step_start = ts.max(t0);
            let step_end = self.steps.get(i + 1).map(|(te, _)| *te).unwrap_or(f64::INFINITY);
            if step_end <= t0 || rate <= 0.0 {
                continue;
            }
            // waiting through an inactive gap moves t forward for free
            t = t.max(step_start);
            let sendable = (step_end - t) * rate;
            if sendable >= remaining {
                return Some(t + remaining / rate - t0);
            }
            remaining -= sendable;
            t = step_end;
        }
        None
    }
}

/// Kind-specific radio state.
#[derive(Debug, Clone)]
pub enum RadioKind {
    /// Constant rate and bit error rate.
    Basic {
        /// Data rate in bits per second.
        rate: f64,
        /// Bit error rate handed to the connection.
        ber: f64,
        /// Joules per transmitted bit.
        j_bit: f64,
    },
    /// Constant frame error rate; an equivalent BER is derived per message
    /// so that `(1 − FER)^nframes` matches the all-frames-ok probability.
    Coded {
        /// Data rate in bits per second.
        rate: f64,
        /// Frame error rate.
        fer: f64,
        /// Frame size in bits.
        frame_size: f64,
        /// Code rate in (0, 1].
        code_rate: f64,
        /// Joules per transmitted bit.
        j_bit: f64,
    },
    /// Per-destination time-varying rates.
    Variable {
        /// Rate profile per destination.
        profiles: BTreeMap<NodeId, RateProfile>,
        /// Per-destination active/inactive semaphore, green while the
        /// profile rate is non-zero. A radio holding an item for an
        /// inactive destination registers a waker here and waits for the
        /// window to open.
        active: BTreeMap<NodeId, Semaphore>,
        /// Joules per transmitted bit.
        j_bit: f64,
    },
}

/// A radio owned by a node.
#[derive(Debug)]
pub struct Radio {
    /// Arena id.
    pub id: RadioId,
    /// Owning node.
    pub node: NodeId,
    /// Configuration label.
    pub label: String,
    /// Outbound queue.
    pub queue: Fifo<RadioItem>,
    /// The item currently being serialized.
    pub current: Option<RadioItem>,
    /// Accumulated transmit energy in joules.
    pub energy: f64,
    /// Kind-specific state.
    pub kind: RadioKind,
}

impl Radio {
    /// Nominal data rate towards `dest` (the peak rate for variable
    /// radios). Used for capacity derivation of static contacts.
    pub fn datarate(&self, dest: NodeId) -> f64 {
        match &self.kind {
            RadioKind::Basic { rate, .. } | RadioKind::Coded { rate, .. } => *rate,
            RadioKind::Variable { profiles, .. } => {
                profiles.get(&dest).map(RateProfile::peak_rate).unwrap_or(0.0)
            }
        }
    }

    /// Joules per transmitted bit.
    pub fn j_bit(&self) -> f64 {
        match &self.kind {
            RadioKind::Basic { j_bit, .. }
            | RadioKind::Coded { j_bit, .. }
            | RadioKind::Variable { j_bit, .. } => *j_bit,
        }
    }

    /// BER the connection should apply to `msg`.
    pub fn effective_ber(&self, msg: &Message) -> f64 {
        match &self.kind {
            RadioKind::Basic { ber, .. } => *ber,
            RadioKind::Coded { fer, frame_size, code_rate, .. } => {
                coded_equivalent_ber(msg.num_bits(), *fer, *frame_size, *code_rate)
            }
            RadioKind::Variable { .. } => 0.0,
        }
    }
}

/// The BER that reproduces a frame error rate `fer` for a message of
/// `num_bits` bits framed at `frame_size` with the given code rate.
pub fn coded_equivalent_ber(num_bits: f64, fer: f64, frame_size: f64, code_rate: f64) -> f64 {
    if fer <= 0.0 || num_bits <= 0.0 {
        return 0.0;
    }
    let coded_bits = num_bits / code_rate;
    let nframes = (coded_bits / frame_size).ceil();
    let prob_msg_ok = (1.0 - fer).powf(nframes);
    1.0 - prob_msg_ok.powf(code_rate / num_bits)
}

impl Simulation {
    /// Enqueue a transmission into a radio. Non-blocking.
    pub(crate) fn radio_put(&mut self, radio: RadioId, item: RadioItem) {
        trace!("radio {} queues {}", self.radios[radio.index()].label, item.msg);
        let _ = self.radios[radio.index()].queue.try_put(item);
        self.try_start_radio(radio);
    }

    /// Start serializing the next queued item, unless one is in progress.
    ///
    /// A variable-rate radio whose head item targets an inactive
    /// destination holds the item at the queue head, registers a waker on
    /// the destination's semaphore, and resumes when the profile turns
    /// active.
    pub(crate) fn try_start_radio(&mut self, radio: RadioId) {
        let now = self.clock.now();
        let r = &mut self.radios[radio.index()];
        if r.current.is_some() {
            return;
        }
        let Some((item, _)) = r.queue.try_get() else { return };

        let ttx = match &mut r.kind {
            RadioKind::Basic { rate, .. } | RadioKind::Coded { rate, .. } => {
                Some(item.msg.num_bits() / *rate)
            }
            RadioKind::Variable { profiles, active, .. } => {
                match profiles.get(&item.neighbor).and_then(|p| p.tx_time(item.msg.num_bits(), now))
                {
                    Some(ttx) => {
                        let sem = active
                            .entry(item.neighbor)
                            .or_insert_with(|| Semaphore::new(false));
                        if sem.is_red() {
                            trace!(
                                "radio {} waits for {} to become active",
                                r.label,
                                item.neighbor
                            );
                            sem.on_green(Waker::RadioKick(radio));
                            let _ = r.queue.try_put_front(item);
                            return;
                        }
                        Some(ttx)
                    }
                    None => None,
                }
            }
        };
        match ttx {
            Some(ttx) => {
                r.current = Some(item);
                self.clock.schedule_in(ttx, Event::RadioTxDone { radio });
            }
            None => {
                // the destination's rate profile can never move this
                // message: a radio error, reported to the owning duct
                warn!(
                    "radio {} cannot ever transmit {} towards {}",
                    r.label, item.msg, item.neighbor
                );
                let peer = item.peer;
                let msg = item.msg;
                self.duct_radio_error(peer, &msg);
                self.try_start_radio(radio);
            }
        }
    }

    /// The head item finished serializing: account energy and hand it to
    /// the connection.
    pub(crate) fn handle_radio_tx_done(&mut self, radio: RadioId) {
        let r = &mut self.radios[radio.index()];
        let Some(item) = r.current.take() else { return };
        r.energy += item.msg.num_bits() * r.j_bit();
        let ber = r.effective_ber(&item.msg);
        let node = r.node;

        match self.conn_index.get(&(node, item.neighbor)).copied() {
            Some(conn) => self.transmit(conn, item.peer, item.msg, ber, item.dir),
            None => {
                error!("no connection from {} to {}", node, item.neighbor);
            }
        }
        self.try_start_radio(radio);
    }

    /// A variable-rate radio profile advances one step: flip the
    /// per-destination semaphore, waking any transmission held back by an
    /// inactive window.
    pub(crate) fn handle_radio_profile_step(
        &mut self,
        radio: RadioId,
        dest: NodeId,
        index: usize,
    ) {
        let r = &mut self.radios[radio.index()];
        if let RadioKind::Variable { profiles, active, .. } = &mut r.kind {
            let Some(profile) = profiles.get(&dest) else { return };
            let Some(&(_, rate)) = profile.steps.get(index) else { return };
            let sem = active.entry(dest).or_insert_with(|| Semaphore::new(false));
            let wakers =
                if rate > 0.0 { sem.turn_green() } else { sem.turn_red() };
            self.clock.wake_all(wakers);
        }
    }
}
