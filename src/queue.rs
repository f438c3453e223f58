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

//! The overbookable priority queue feeding an outduct, and its bounded
//! variant used by the opportunistic manager.

use log::*;

use crate::kernel::resources::{MultiFifo, PriorityDict};
use crate::kernel::Waker;
use crate::router::RtRecord;
use crate::types::BULK_PRIORITY;

/// Outcome of an admission attempt into an overbookable queue.
#[derive(Debug)]
pub enum Admission {
    /// The record was admitted. The carried records were displaced from the
    /// bulk lane to make room and must be re-routed.
    Accepted(Vec<RtRecord>),
    /// The record could not be accommodated and must be re-routed.
    Rejected(Box<RtRecord>),
}

/// A priority queue that admits critical traffic by pre-empting bulk
/// traffic, up to a capacity bound tied to the current contact.
///
/// While a contact is open, the usable capacity is the smaller of the
/// remaining capacity counter and what the link can still move before the
/// contact closes (`rate × (next_close − now)`).
#[derive(Debug, Clone, Default)]
pub struct OverbookableQueue {
    queue: MultiFifo<RtRecord>,
    backlog: f64,
    capacity: f64,
    data_rate: Option<f64>,
    next_close: Option<f64>,
}

impl OverbookableQueue {
    /// Create a queue with no open contact.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the properties of an opening contact.
    pub fn open_contact(&mut self, data_rate: f64, capacity: f64, next_close: f64) {
        self.data_rate = Some(data_rate);
        self.capacity = capacity;
        self.next_close = Some(next_close);
    }

    /// Clear the contact properties when the contact closes. Queued records
    /// stay queued for the next contact.
    pub fn close_contact(&mut self) {
        self.data_rate = None;
        self.next_close = None;
        self.capacity = 0.0;
    }

    /// The capacity usable at time `now`, or `None` while no contact is
    /// open.
    pub fn capacity(&self, now: f64) -> Option<f64> {
        let rate = self.data_rate?;
        let next_close = self.next_close?;
        Some(self.capacity.min(rate * (next_close - now)))
    }

    /// The raw capacity counter.
    pub fn capacity_counter(&self) -> f64 {
        self.capacity
    }

    /// Credit capacity back (transmit-overdue, displaced records).
    pub fn credit(&mut self, data_vol: f64) {
        self.capacity += data_vol;
    }

    /// Total bits queued.
    pub fn backlog(&self) -> f64 {
        self.backlog
    }

    /// Admit `record` into lane `priority`.
    ///
    /// Bulk records are rejected when the capacity is insufficient.
    /// Critical records pre-empt bulk records (newest first) until enough
    /// room is freed; if the bulk lane cannot provide enough room, the
    /// critical record is rejected as well.
    pub fn put(&mut self, record: RtRecord, priority: u8, now: f64) -> Admission {
        let data_vol = record.bundle.data_vol;
        let Some(capacity) = self.capacity(now) else {
            return Admission::Rejected(Box::new(record));
        };

        if capacity > data_vol {
            self.put_in_queue(record, priority);
            return Admission::Accepted(Vec::new());
        }

        if !record.bundle.critical {
            return Admission::Rejected(Box::new(record));
        }

        let removed = self.make_room(data_vol, now);
        if removed.is_empty() {
            return Admission::Rejected(Box::new(record));
        }
        self.put_in_queue(record, priority);
        Admission::Accepted(removed)
    }

    fn put_in_queue(&mut self, record: RtRecord, priority: u8) {
        self.capacity -= record.bundle.data_vol;
        if self.capacity < 0.0 {
            error!("overbookable queue capacity went negative: {}", self.capacity);
            self.capacity = 0.0;
        }
        self.backlog += record.bundle.data_vol;
        let _ = self.queue.try_put(record, priority);
    }

    /// Free room for `data_vol` bits by displacing bulk records, newest
    /// first. Returns the displaced records (empty if the bulk lane cannot
    /// provide enough room; nothing is displaced in that case).
    fn make_room(&mut self, data_vol: f64, now: f64) -> Vec<RtRecord> {
        let mut room = 0.0;
        let mut count = 0;
        for record in self.queue.iter_lane(BULK_PRIORITY).rev() {
            room += record.bundle.data_vol;
            count += 1;
            if room >= data_vol {
                break;
            }
        }
        let capacity = self.capacity(now).unwrap_or(0.0);
        if data_vol > room + capacity {
            return Vec::new();
        }

        let mut removed = Vec::with_capacity(count);
        for _ in 0..count {
            if let Some(record) = self.queue.evict_newest(BULK_PRIORITY) {
                self.capacity += record.bundle.data_vol;
                self.backlog -= record.bundle.data_vol;
                removed.push(record);
            }
        }
        removed
    }

    /// Take the most urgent queued record.
    pub fn pop(&mut self) -> Option<RtRecord> {
        let (record, _) = self.queue.try_get()?;
        self.backlog -= record.bundle.data_vol;
        Some(record)
    }

    /// Put a record back at the head of its lane, without touching the
    /// capacity counter (used when fragmenting at send time).
    pub fn push_front(&mut self, record: RtRecord, priority: u8) {
        self.backlog += record.bundle.data_vol;
        let _ = self.queue.try_put_front(record, priority);
    }

    /// Register a consumer waker for the next admission.
    pub fn on_item(&mut self, waker: Waker) {
        self.queue.on_item(waker);
    }

    /// Number of queued records.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Iterate over the queued records.
    pub fn iter(&self) -> impl Iterator<Item = &RtRecord> {
        self.queue.iter()
    }
}

/// An overbookable queue bounded by a maximum buffer size whose entries can
/// be removed by bundle tag. Evictions from this queue are drops, not
/// re-routes: it models a node buffer, not a contact.
#[derive(Debug, Clone)]
pub struct BoundedDictQueue {
    queue: PriorityDict<RtRecord>,
    capacity: f64,
    max_capacity: f64,
}

impl BoundedDictQueue {
    /// Create a queue bounded by `max_capacity` bits.
    pub fn new(max_capacity: f64) -> Self {
        Self { queue: PriorityDict::new(), capacity: max_capacity, max_capacity }
    }

    /// Admit `record`. Returns the records evicted to make room (to be
    /// dropped); if the record itself cannot be accommodated it is returned
    /// inside [`Admission::Rejected`].
    pub fn put(&mut self, record: RtRecord, priority: u8) -> Admission {
        let data_vol = record.bundle.data_vol;
        if self.capacity > data_vol {
            self.insert(record, priority);
            return Admission::Accepted(Vec::new());
        }
        if !record.bundle.critical {
            return Admission::Rejected(Box::new(record));
        }

        let mut room = 0.0;
        let mut count = 0;
        for (_, rec) in self.queue.iter_lane(BULK_PRIORITY).rev() {
            room += rec.bundle.data_vol;
            count += 1;
            if room >= data_vol {
                break;
            }
        }
        if data_vol > room + self.capacity {
            return Admission::Rejected(Box::new(record));
        }
        let mut removed = Vec::with_capacity(count);
        for _ in 0..count {
            if let Some((_, rec)) = self.queue.evict_newest(BULK_PRIORITY) {
                self.capacity = (self.capacity + rec.bundle.data_vol).min(self.max_capacity);
                removed.push(rec);
            }
        }
        self.insert(record, priority);
        Admission::Accepted(removed)
    }

    fn insert(&mut self, record: RtRecord, priority: u8) {
        self.capacity -= record.bundle.data_vol;
        let tag = record.bundle.tag();
        self.queue.put(tag, record, priority);
    }

    /// Remove the record stored under `tag`, crediting its volume back.
    pub fn remove(&mut self, tag: crate::types::BundleTag, priority: u8) -> Option<RtRecord> {
        let record = self.queue.remove(tag, priority)?;
        self.capacity = (self.capacity + record.bundle.data_vol).min(self.max_capacity);
        Some(record)
    }

    /// Tags of all stored records.
    pub fn keys(&self) -> Vec<crate::types::BundleTag> {
        self.queue.keys()
    }

    /// Whether a record with `tag` is stored.
    pub fn contains(&self, tag: crate::types::BundleTag) -> bool {
        self.queue.contains(tag)
    }

    /// Iterate over all stored records.
    pub fn iter(&self) -> impl Iterator<Item = &RtRecord> {
        self.queue.iter().map(|(_, r)| r)
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
