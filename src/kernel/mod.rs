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

//! The discrete-event kernel: virtual clock, event heap, and the event and
//! waker vocabulary that drives every component state machine.
//!
//! Components are cooperative processes realized as explicit state
//! machines: a suspension point ("sleep until t", "wait for an item",
//! "wait for the semaphore") becomes a scheduled [`Event`] or a [`Waker`]
//! registered on one of the [`resources`]. Events scheduled for the same
//! instant fire in insertion order; this is load-bearing for LTP
//! acknowledgement ordering, queue drain order, and routing tie-break
//! determinism.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use ordered_float::NotNan;

use crate::bundle::Bundle;
use crate::message::Message;
use crate::types::{ConnId, Direction, DuctId, GenId, MgrId, NodeId, RadioId, SessionId};

pub mod resources;

/// A wake-up target registered on a blocking resource.
///
/// When a resource operation unblocks a waiting party, the resource returns
/// the registered waker and the caller schedules it (at the current instant)
/// as an [`Event::Wake`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waker {
    /// Resume the node's ingress drain loop.
    NodeIngress(NodeId),
    /// Resume the node's limbo drain loop (only used with infinite
    /// `limbo_wait`).
    NodeLimbo(NodeId),
    /// Resume a duct's ingress drain loop.
    DuctIngress(DuctId),
    /// Re-attempt extraction from a neighbor manager queue.
    TryExtract(MgrId),
    /// Re-attempt starting a radio transmission.
    RadioKick(RadioId),
}

/// An event to be dispatched by the simulation at a given virtual time.
#[derive(Debug, Clone)]
pub enum Event {
    /// A resource wake-up.
    Wake(Waker),
    /// Emission tick of a constant-bit-rate generator.
    CbrTick {
        /// The generator.
        gen: GenId,
    },
    /// Emission of one file repetition by a file generator or broadcaster.
    FileEmit {
        /// The generator.
        gen: GenId,
        /// Index of the repetition to emit.
        repetition: u32,
    },
    /// A Markov flow switches between its on and off phases.
    MarkovPhase {
        /// The generator.
        gen: GenId,
        /// Index of the flow within the generator.
        flow: usize,
        /// `true` if the flow turns on.
        on: bool,
    },
    /// Emission tick of a Markov flow while in the on phase.
    MarkovTick {
        /// The generator.
        gen: GenId,
        /// Index of the flow within the generator.
        flow: usize,
        /// Phase counter; stale ticks from a previous on-phase are ignored.
        phase: u32,
    },
    /// Periodic drain of the node's limbo queue.
    NodeLimboTick {
        /// The node.
        node: NodeId,
    },
    /// Deferred entry of a re-routed bundle into the limbo queue.
    LimboDeferred {
        /// The node.
        node: NodeId,
        /// The bundle to re-route.
        bundle: Box<Bundle>,
    },
    /// A contact opens at a neighbor manager.
    MgrContactOpen {
        /// The manager.
        mgr: MgrId,
        /// Index into the manager's pair contact plan.
        index: usize,
    },
    /// A contact closes at a neighbor manager.
    MgrContactClose {
        /// The manager.
        mgr: MgrId,
        /// Index into the manager's pair contact plan.
        index: usize,
    },
    /// End of the throttling period after a manager dispatched a bundle.
    ExtractorResume {
        /// The manager.
        mgr: MgrId,
    },
    /// A scheduled or distance-gated connection opens.
    ConnOpen {
        /// The connection.
        conn: ConnId,
        /// Index into the connection's interval table.
        index: usize,
    },
    /// A scheduled or distance-gated connection closes.
    ConnClose {
        /// The connection.
        conn: ConnId,
        /// Index into the connection's interval table.
        index: usize,
    },
    /// A destination comes into view of a broadcast connection.
    BroadcastOpen {
        /// The connection.
        conn: ConnId,
        /// The destination entering view.
        dest: NodeId,
        /// Index into the per-destination interval table.
        index: usize,
    },
    /// A destination leaves the view of a broadcast connection.
    BroadcastClose {
        /// The connection.
        conn: ConnId,
        /// The destination leaving view.
        dest: NodeId,
        /// Index into the per-destination interval table.
        index: usize,
    },
    /// A message finishes propagating through a connection.
    Deliver {
        /// The connection the message travelled through.
        conn: ConnId,
        /// The duct the message is delivered to.
        duct: DuctId,
        /// The message itself.
        msg: Box<Message>,
        /// Forward or ack entry point.
        dir: Direction,
        /// Bit error rate of the emitting radio, applied on delivery.
        ber: f64,
        /// View epoch at emission time (broadcast connections only); a
        /// stale epoch means the destination left view mid-flight.
        view_epoch: u64,
    },
    /// A radio finishes serializing the message at the head of its queue.
    RadioTxDone {
        /// The radio.
        radio: RadioId,
    },
    /// A variable-rate radio profile moves to its next step.
    RadioProfileStep {
        /// The radio.
        radio: RadioId,
        /// Destination whose profile steps.
        dest: NodeId,
        /// Index of the step within the profile.
        index: usize,
    },
    /// An LTP checkpoint timer expires.
    CheckpointTimer {
        /// Outduct owning the session.
        duct: DuctId,
        /// The session.
        sid: SessionId,
        /// Checkpoint serial the timer was armed for.
        ckpt: u32,
    },
    /// An LTP report timer expires.
    ReportTimer {
        /// Induct owning the session.
        duct: DuctId,
        /// The session.
        sid: SessionId,
        /// Report serial the timer was armed for.
        rid: u32,
    },
    /// The session-level wall timer expires.
    SessionTimer {
        /// Outduct owning the session.
        duct: DuctId,
        /// The session.
        sid: SessionId,
    },
}

impl From<Waker> for Event {
    fn from(w: Waker) -> Self {
        Event::Wake(w)
    }
}

/// An event together with its firing time and insertion sequence number.
#[derive(Debug, Clone)]
pub struct TimedEvent {
    /// Virtual time at which the event fires.
    pub time: NotNan<f64>,
    /// Insertion sequence number, the FIFO tiebreaker.
    pub seq: u64,
    /// The event.
    pub event: Event,
}

impl PartialEq for TimedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for TimedEvent {}

impl PartialOrd for TimedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.time, self.seq).cmp(&(other.time, other.seq))
    }
}

/// The virtual clock and pending-event heap.
///
/// The heap is keyed by `(time, seq)` where `seq` increases monotonically
/// with every insertion, so events scheduled for the same instant pop in
/// FIFO order.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<TimedEvent>>,
    now: NotNan<f64>,
    seq: u64,
}

impl EventQueue {
    /// Create an empty queue with the clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> f64 {
        self.now.into_inner()
    }

    /// Schedule `event` to fire `dt` seconds from now. Negative delays are
    /// clamped to zero; an infinite delay means "never" and schedules
    /// nothing.
    pub fn schedule_in(&mut self, dt: f64, event: Event) {
        if !dt.is_finite() && !dt.is_nan() {
            return;
        }
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        let time = self.now + dt;
        self.push(time, event);
    }

    /// Schedule `event` at absolute time `t`, clamped to be no earlier than
    /// the current time. An infinite time means "never" and schedules
    /// nothing.
    pub fn schedule_at(&mut self, t: f64, event: Event) {
        if !t.is_finite() {
            return;
        }
        let t = NotNan::new(t.max(self.now())).expect("event time is NaN");
        self.push(t, event);
    }

    /// Schedule a wake-up at the current instant.
    pub fn wake(&mut self, waker: Waker) {
        self.push(self.now, Event::Wake(waker));
    }

    /// Schedule a batch of wake-ups at the current instant, in order.
    pub fn wake_all(&mut self, wakers: impl IntoIterator<Item = Waker>) {
        for w in wakers {
            self.wake(w);
        }
    }

    fn push(&mut self, time: NotNan<f64>, event: Event) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Reverse(TimedEvent { time, seq, event }));
    }

    /// Pop the earliest event and advance the clock to its firing time.
    ///
    /// If `until` is given and the earliest event fires later, the event
    /// stays in the heap, the clock advances to `until`, and `None` is
    /// returned.
    pub fn pop(&mut self, until: Option<f64>) -> Option<Event> {
        let next_time = self.heap.peek()?.0.time;
        if let Some(until) = until {
            if next_time.into_inner() > until {
                self.now = NotNan::new(until.max(self.now())).expect("until is NaN");
                return None;
            }
        }
        let Reverse(te) = self.heap.pop()?;
        debug_assert!(te.time >= self.now);
        self.now = te.time;
        Some(te.event)
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether no event is pending.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Iterate over the pending events (arbitrary order). Used by the report
    /// collector to account for messages still in flight at shutdown.
    pub fn iter_pending(&self) -> impl Iterator<Item = &Event> {
        self.heap.iter().map(|Reverse(te)| &te.event)
    }
}
