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

//! Per-neighbor queue managers.
//!
//! A [`NeighborManager`] owns the overbookable queue feeding the outducts
//! towards one neighbor. It opens and closes with the pair's contacts,
//! defers records routed through future contacts, throttles extraction to
//! the link rate, and re-routes bundles on overbooking and transmit-overdue
//! conditions. The [`EpidemicManager`] is its opportunistic counterpart:
//! no contact plan, a bounded buffer, and a summary-vector handshake
//! against each in-view peer.

use std::collections::{BTreeMap, VecDeque};

use log::*;

use crate::bundle::{Bundle, NewBundle};
use crate::kernel::resources::{Lock, Semaphore};
use crate::kernel::{Event, Waker};
use crate::mobility::Contact;
use crate::queue::{Admission, BoundedDictQueue, OverbookableQueue};
use crate::router::{OpportunisticRouter, RtRecord};
use crate::simulation::Simulation;
use crate::types::{
    BundleTag, ContactId, DropReason, EpiId, MgrId, NodeId, RerouteReason, BULK_PRIORITY,
};

/// Properties of the contact a manager is currently serving.
#[derive(Debug, Clone, Copy)]
pub struct CurrentContact {
    /// The contact id.
    pub cid: ContactId,
    /// Link rate in bits per second.
    pub rate: f64,
    /// One-way light time in seconds.
    pub range: f64,
}

/// The queue manager for one `(node, neighbor)` pair.
#[derive(Debug)]
pub struct NeighborManager {
    /// Arena id.
    pub id: MgrId,
    /// Owning node.
    pub node: NodeId,
    /// The neighbor this manager feeds.
    pub neighbor: NodeId,
    /// The overbookable queue.
    pub queue: OverbookableQueue,
    /// This pair's contacts, sorted by start time.
    pub plan: Vec<Contact>,
    /// The contact currently open, if any.
    pub current: Option<CurrentContact>,
    /// Records routed through future contacts, per contact.
    pub future: BTreeMap<ContactId, VecDeque<RtRecord>>,
    /// Total bits deferred per future contact.
    pub future_backlog: BTreeMap<ContactId, f64>,
    /// Serializes admissions so capacity check and decrement are atomic.
    pub put_lock: Lock,
    /// Green while bundles may flow to the outducts.
    pub outduct_sem: Semaphore,
    /// Whether the extractor is inside its post-send throttling pause.
    pub throttling: bool,
}

impl NeighborManager {
    /// Create a manager over the pair's contact plan.
    pub fn new(id: MgrId, node: NodeId, neighbor: NodeId, plan: Vec<Contact>) -> Self {
        Self {
            id,
            node,
            neighbor,
            queue: OverbookableQueue::new(),
            plan,
            current: None,
            future: BTreeMap::new(),
            future_backlog: BTreeMap::new(),
            put_lock: Lock::new(),
            outduct_sem: Semaphore::new(false),
            throttling: false,
        }
    }

    /// The id of the currently open contact.
    pub fn current_cid(&self) -> Option<ContactId> {
        self.current.map(|c| c.cid)
    }

    /// Backlog a bundle routed through `cid` would queue behind: the live
    /// queue backlog if `cid` is the current contact, the deferred volume
    /// otherwise.
    pub fn backlog_for(&self, cid: ContactId) -> f64 {
        if self.current_cid() == Some(cid) {
            self.queue.backlog()
        } else {
            self.future_backlog.get(&cid).copied().unwrap_or(0.0)
        }
    }
}

impl Simulation {
    /// Admit a routing record into a neighbor manager.
    ///
    /// Records routed through a contact other than the current one are
    /// parked in the per-contact deferred deque; the rest go through the
    /// overbookable queue under the put-lock.
    pub(crate) fn mgr_put(&mut self, mgr: MgrId, record: RtRecord) {
        let m = &mut self.managers[mgr.index()];
        let current = m.current_cid();
        let cid = record.cid().or(current);

        if cid != current {
            let cid = cid.expect("deferred record without contact");
            trace!(
                "{} deferred at manager {}-{} until contact {}",
                record.bundle,
                m.node,
                m.neighbor,
                cid
            );
            m.future_backlog
                .entry(cid)
                .and_modify(|b| *b += record.bundle.data_vol)
                .or_insert(record.bundle.data_vol);
            m.future.entry(cid).or_default().push_back(record);
            return;
        }
        self.mgr_do_put(mgr, record);
    }

    /// The admission critical section: capacity check and decrement must
    /// not interleave with any other admission.
    fn mgr_do_put(&mut self, mgr: MgrId, record: RtRecord) {
        let now = self.clock.now();
        let m = &mut self.managers[mgr.index()];
        // the critical section never suspends, so the lock is always free
        let granted = m.put_lock.acquire(Waker::TryExtract(mgr));
        debug_assert!(granted);

        let priority = record.priority;
        debug!(
            "{} with priority {} put into manager {}-{}",
            record.bundle, priority, m.node, m.neighbor
        );
        let admission = m.queue.put(record, priority, now);
        if let Some(waker) = m.put_lock.release() {
            self.clock.wake(waker);
        }

        match admission {
            Admission::Accepted(displaced) => {
                for rec in displaced {
                    self.mgr_reroute(mgr, rec, RerouteReason::Overbooked);
                }
                self.clock.wake(Waker::TryExtract(mgr));
            }
            Admission::Rejected(rec) => {
                self.mgr_reroute(mgr, *rec, RerouteReason::Overbooked);
            }
        }
    }

    /// Send a bundle back to the node's limbo for re-routing, crediting
    /// capacity where the reason calls for it.
    pub(crate) fn mgr_reroute(&mut self, mgr: MgrId, record: RtRecord, reason: RerouteReason) {
        let m = &mut self.managers[mgr.index()];
        debug!("{} re-routed at manager {}-{}: {}", record.bundle, m.node, m.neighbor, reason);

        if reason == RerouteReason::TransmitOverdue {
            m.queue.credit(record.bundle.data_vol);
        }
        // give the admission budget back to the contact the record was
        // admitted into
        if let Some(cid) = record.cid() {
            self.plan.credit(cid, record.bundle.data_vol);
        }

        let m = &self.managers[mgr.index()];
        let mut cids = Vec::new();
        if let Some(cur) = m.current_cid() {
            cids.push(cur);
        }
        if let Some(cid) = record.cid() {
            if m.current_cid() != Some(cid) {
                cids.push(cid);
            }
        }
        let node = m.node;
        self.node_limbo(node, record.bundle, cids);
    }

    /// A contact opens: load its properties, flush the deferred deque for
    /// it, and open the gate to the outducts.
    pub(crate) fn handle_mgr_contact_open(&mut self, mgr: MgrId, index: usize) {
        let m = &mut self.managers[mgr.index()];
        let Some(contact) = m.plan.get(index).copied() else { return };
        debug!(
            "manager {}-{} opens contact {} until {:.3}",
            m.node, m.neighbor, contact.cid, contact.tend
        );
        m.current = Some(CurrentContact {
            cid: contact.cid,
            rate: contact.rate,
            range: contact.range,
        });
        m.queue.open_contact(contact.rate, contact.capacity(), contact.tend);

        // records that waited for this contact are admitted first
        let mut deferred = m.future.remove(&contact.cid).unwrap_or_default();
        m.future_backlog.remove(&contact.cid);
        while let Some(record) = deferred.pop_front() {
            self.mgr_put(mgr, record);
        }

        let wakers = self.managers[mgr.index()].outduct_sem.turn_green();
        self.clock.wake_all(wakers);
        self.clock.wake(Waker::TryExtract(mgr));
    }

    /// A contact closes: clear the contact properties and shut the gate.
    /// Queued bundles stay queued for the next contact.
    pub(crate) fn handle_mgr_contact_close(&mut self, mgr: MgrId, index: usize) {
        let m = &mut self.managers[mgr.index()];
        let Some(contact) = m.plan.get(index) else { return };
        if m.current_cid() != Some(contact.cid) {
            return;
        }
        debug!("manager {}-{} closes contact {}", m.node, m.neighbor, contact.cid);
        m.current = None;
        m.queue.close_contact();
        let wakers = m.outduct_sem.turn_red();
        self.clock.wake_all(wakers);
    }

    /// Extract one record and dispatch it, then throttle for
    /// `data_vol / rate` so the queue drains at the link rate.
    pub(crate) fn handle_try_extract(&mut self, mgr: MgrId) {
        let m = &mut self.managers[mgr.index()];
        if m.outduct_sem.is_red() || m.throttling {
            return;
        }
        let Some(record) = m.queue.pop() else { return };
        let Some(current) = m.current else {
            // the gate closed in the same instant; keep the record queued
            let priority = record.priority;
            m.queue.push_front(record, priority);
            return;
        };
        debug!("{} departs from manager {}-{}", record.bundle, m.node, m.neighbor);
        m.throttling = true;
        let rate = current.rate;
        let sent_vol = self.mgr_send(mgr, record);
        self.clock.schedule_in(sent_vol / rate, Event::ExtractorResume { mgr });
    }

    /// End of the throttling pause.
    pub(crate) fn handle_extractor_resume(&mut self, mgr: MgrId) {
        self.managers[mgr.index()].throttling = false;
        self.handle_try_extract(mgr);
    }

    /// Dispatch one record towards the convergence layer, applying the
    /// transmit-overdue check and fragmenting if the remaining capacity
    /// cannot hold the whole bundle. Returns the volume to throttle on.
    fn mgr_send(&mut self, mgr: MgrId, mut record: RtRecord) -> f64 {
        let now = self.clock.now();
        let m = &mut self.managers[mgr.index()];
        let current = m.current.expect("sending without an open contact");
        let data_vol = record.bundle.data_vol;

        // optimistic reception time; if the route has expired by then, the
        // bundle has to be re-routed
        let trx = now + data_vol / current.rate + current.range;
        if trx > record.route.tend {
            self.mgr_reroute(mgr, record, RerouteReason::TransmitOverdue);
            return data_vol;
        }

        // fragment: keep what still fits in the contact, push the rest
        // back at the head of the queue
        if let Some(capacity) = m.queue.capacity(now) {
            if capacity > 0.0 && capacity < data_vol {
                let mut rest = record.clone();
                rest.bundle.data_vol = data_vol - capacity;
                record.bundle.data_vol = capacity;
                let priority = record.priority;
                m.queue.push_front(rest, priority);
                debug!(
                    "{} fragmented at manager {}-{} ({} bits continue)",
                    record.bundle, m.node, m.neighbor, capacity
                );
            }
        }

        let sent_vol = record.bundle.data_vol;
        let (node, neighbor) = (m.node, m.neighbor);
        self.forward_to_outduct(node, neighbor, record);
        sent_vol
    }
}

/// Handshake progress towards one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    /// No handshake running.
    #[default]
    Idle,
    /// Summary sent, waiting for the peer's request.
    AwaitRequest,
}

/// The opportunistic queue manager: one bounded buffer for all neighbors,
/// drained through a summary-vector handshake whenever a connection opens.
#[derive(Debug)]
pub struct EpidemicManager {
    /// Arena id.
    pub id: EpiId,
    /// Owning node.
    pub node: NodeId,
    /// The bounded buffer.
    pub queue: BoundedDictQueue,
    /// Handshake state per peer.
    pub handshake: BTreeMap<NodeId, HandshakeState>,
    /// Serializes admissions.
    pub put_lock: Lock,
}

/// Endpoint id of handshake summary bundles.
pub const SUMMARY_EID: u32 = 1;
/// Endpoint id of handshake request bundles.
pub const REQUEST_EID: u32 = 2;
/// Fixed overhead of a handshake bundle, in bits.
const HANDSHAKE_OVERHEAD: f64 = 16.0;
/// Bits per carried bundle tag in a handshake bundle.
const HANDSHAKE_BITS_PER_TAG: f64 = 8.0;

impl EpidemicManager {
    /// Create a manager with a buffer of `max_buffer_size` bits.
    pub fn new(id: EpiId, node: NodeId, max_buffer_size: f64) -> Self {
        Self {
            id,
            node,
            queue: BoundedDictQueue::new(max_buffer_size),
            handshake: BTreeMap::new(),
            put_lock: Lock::new(),
        }
    }
}

impl Simulation {
    /// Admit a record into the opportunistic buffer. Evicted and rejected
    /// bundles are dropped: the buffer models node storage, not a contact.
    pub(crate) fn epi_put(&mut self, epi: EpiId, record: RtRecord) {
        let m = &mut self.epidemics[epi.index()];
        let granted = m.put_lock.acquire(Waker::NodeIngress(m.node));
        debug_assert!(granted);
        let priority = record.priority;
        let admission = m.queue.put(record, priority);
        if let Some(waker) = m.put_lock.release() {
            self.clock.wake(waker);
        }
        let node = self.epidemics[epi.index()].node;
        match admission {
            Admission::Accepted(evicted) => {
                for rec in evicted {
                    self.drop_bundle(node, rec.bundle, DropReason::OpportunisticQueueFull);
                }
            }
            Admission::Rejected(rec) => {
                self.drop_bundle(node, rec.bundle, DropReason::OpportunisticQueueFull);
            }
        }
    }

    /// A connection towards `dest` opened: start the handshake by sending
    /// the summary vector of everything held here.
    pub(crate) fn epi_start_handshake(&mut self, node: NodeId, dest: NodeId) {
        let Some(epi) = self.nodes[node.index()].epidemic else { return };
        let m = &mut self.epidemics[epi.index()];
        let state = m.handshake.entry(dest).or_default();
        if *state != HandshakeState::Idle {
            return;
        }
        *state = HandshakeState::AwaitRequest;
        let held: Vec<BundleTag> = m.queue.keys();

        debug!("node {} opens handshake with {} ({} bundles held)", node, dest, held.len());
        let mut spec = NewBundle::new(node, dest, "handshake", handshake_bits(held.len()));
        spec.eid = SUMMARY_EID;
        let now = self.clock.now();
        let mut bundle = self.counters.new_bundle(spec, now);
        bundle.manifest = held;
        let choice = OpportunisticRouter::new_choice(node, &bundle);
        self.forward_to_outduct(node, dest, RtRecord::new(bundle, choice));
    }

    /// The connection towards `dest` closed: abort any running handshake.
    pub(crate) fn epi_abort_handshake(&mut self, node: NodeId, dest: NodeId) {
        let Some(epi) = self.nodes[node.index()].epidemic else { return };
        self.epidemics[epi.index()].handshake.insert(dest, HandshakeState::Idle);
    }

    /// A summary vector arrived: answer with the subset of tags this node
    /// does not hold.
    pub(crate) fn epi_receive_summary(&mut self, node: NodeId, summary: Bundle) {
        let Some(epi) = self.nodes[node.index()].epidemic else { return };
        let m = &self.epidemics[epi.index()];
        let peer = summary.orig;
        let missing: Vec<BundleTag> =
            summary.manifest.iter().filter(|&&tag| !m.queue.contains(tag)).copied().collect();

        debug!(
            "node {} answers handshake of {}: {} of {} bundles missing",
            node,
            peer,
            missing.len(),
            summary.manifest.len()
        );
        let mut spec = NewBundle::new(node, peer, "handshake", handshake_bits(missing.len()));
        spec.eid = REQUEST_EID;
        let now = self.clock.now();
        let mut bundle = self.counters.new_bundle(spec, now);
        bundle.manifest = missing;
        let choice = OpportunisticRouter::new_choice(node, &bundle);
        self.forward_to_outduct(node, peer, RtRecord::new(bundle, choice));
    }

    /// The peer's request arrived: forward exactly the requested bundles.
    pub(crate) fn epi_receive_request(&mut self, node: NodeId, request: Bundle) {
        let Some(epi) = self.nodes[node.index()].epidemic else { return };
        let peer = request.orig;
        let mut to_send = Vec::new();
        {
            let m = &mut self.epidemics[epi.index()];
            for &tag in &request.manifest {
                if let Some(rec) = m
                    .queue
                    .remove(tag, crate::types::CRITICAL_PRIORITY)
                    .or_else(|| m.queue.remove(tag, BULK_PRIORITY))
                {
                    to_send.push(rec);
                }
            }
            m.handshake.insert(peer, HandshakeState::Idle);
        }
        debug!("node {} forwards {} requested bundles to {}", node, to_send.len(), peer);
        for rec in to_send {
            self.forward_to_outduct(node, peer, rec);
        }
    }
}

fn handshake_bits(tags: usize) -> f64 {
    HANDSHAKE_OVERHEAD + HANDSHAKE_BITS_PER_TAG * tags as f64
}
