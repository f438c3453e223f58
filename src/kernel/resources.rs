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

//! Blocking resources for the cooperative process model.
//!
//! Each resource is owned by exactly one component and mutated only through
//! its operations. "Blocking" is expressed with [`Waker`]s: an operation
//! that cannot proceed leaves the state untouched and the caller registers
//! a waker; an operation that unblocks a waiting party returns its waker,
//! which the caller must schedule at the current instant. Waiters are
//! always served in registration order.

use std::collections::{BTreeMap, HashMap, VecDeque};

use super::Waker;
use crate::types::BundleTag;

/// A FIFO queue with an optional capacity.
///
/// `try_put` fails when the queue is full; `try_get` fails when it is
/// empty. Both sides can register wakers.
#[derive(Debug, Clone)]
pub struct Fifo<T> {
    items: VecDeque<T>,
    capacity: usize,
    get_waiters: VecDeque<Waker>,
    put_waiters: VecDeque<Waker>,
}

impl<T> Default for Fifo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Fifo<T> {
    /// Create an unbounded queue.
    pub fn new() -> Self {
        Self::with_capacity(usize::MAX)
    }

    /// Create a queue holding at most `capacity` items.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity,
            get_waiters: VecDeque::new(),
            put_waiters: VecDeque::new(),
        }
    }

    /// Append `item` at the tail. On success, returns the waker of the
    /// oldest registered consumer, if any. If the queue is full, the item
    /// is handed back.
    pub fn try_put(&mut self, item: T) -> Result<Option<Waker>, T> {
        if self.items.len() >= self.capacity {
            return Err(item);
        }
        self.items.push_back(item);
        Ok(self.get_waiters.pop_front())
    }

    /// Insert `item` at the head (it will be the next one taken).
    pub fn try_put_front(&mut self, item: T) -> Result<Option<Waker>, T> {
        if self.items.len() >= self.capacity {
            return Err(item);
        }
        self.items.push_front(item);
        Ok(self.get_waiters.pop_front())
    }

    /// Take the oldest item. On success, also returns the waker of the
    /// oldest registered producer, if any.
    pub fn try_get(&mut self) -> Option<(T, Option<Waker>)> {
        let item = self.items.pop_front()?;
        Some((item, self.put_waiters.pop_front()))
    }

    /// Take all items at once, preserving order.
    pub fn get_all(&mut self) -> (Vec<T>, Vec<Waker>) {
        let items = self.items.drain(..).collect();
        let wakers = self.put_waiters.drain(..).collect();
        (items, wakers)
    }

    /// Register a consumer to wake on the next put.
    pub fn on_item(&mut self, waker: Waker) {
        self.get_waiters.push_back(waker);
    }

    /// Register a producer to wake when space frees up.
    pub fn on_space(&mut self, waker: Waker) {
        self.put_waiters.push_back(waker);
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate over the stored items, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

/// A multi-lane FIFO queue keyed by an integer priority (lower is more
/// urgent), with a single capacity shared across lanes.
#[derive(Debug, Clone)]
pub struct MultiFifo<T> {
    lanes: BTreeMap<u8, VecDeque<T>>,
    len: usize,
    capacity: usize,
    get_waiters: VecDeque<Waker>,
    put_waiters: VecDeque<Waker>,
}

impl<T> Default for MultiFifo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MultiFifo<T> {
    /// Create an unbounded queue.
    pub fn new() -> Self {
        Self::with_capacity(usize::MAX)
    }

    /// Create a queue holding at most `capacity` items across all lanes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lanes: BTreeMap::new(),
            len: 0,
            capacity,
            get_waiters: VecDeque::new(),
            put_waiters: VecDeque::new(),
        }
    }

    /// Append `item` at the tail of lane `priority`.
    pub fn try_put(&mut self, item: T, priority: u8) -> Result<Option<Waker>, T> {
        if self.len >= self.capacity {
            return Err(item);
        }
        self.lanes.entry(priority).or_default().push_back(item);
        self.len += 1;
        Ok(self.get_waiters.pop_front())
    }

    /// Insert `item` at the head of lane `priority` (next to be taken from
    /// that lane).
    pub fn try_put_front(&mut self, item: T, priority: u8) -> Result<Option<Waker>, T> {
        if self.len >= self.capacity {
            return Err(item);
        }
        self.lanes.entry(priority).or_default().push_front(item);
        self.len += 1;
        Ok(self.get_waiters.pop_front())
    }

    /// Take the oldest item of the most urgent non-empty lane.
    pub fn try_get(&mut self) -> Option<(T, Option<Waker>)> {
        let lane = self.lanes.values_mut().find(|l| !l.is_empty())?;
        let item = lane.pop_front()?;
        self.len -= 1;
        Some((item, self.put_waiters.pop_front()))
    }

    /// Remove the most recently added item of lane `priority`. This is the
    /// pre-emption order of the overbookable queue.
    pub fn evict_newest(&mut self, priority: u8) -> Option<T> {
        let item = self.lanes.get_mut(&priority)?.pop_back()?;
        self.len -= 1;
        Some(item)
    }

    /// Register a consumer to wake on the next put.
    pub fn on_item(&mut self, waker: Waker) {
        self.get_waiters.push_back(waker);
    }

    /// Total number of stored items.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether all lanes are empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of items in lane `priority`.
    pub fn lane_len(&self, priority: u8) -> usize {
        self.lanes.get(&priority).map(VecDeque::len).unwrap_or(0)
    }

    /// Iterate over lane `priority`, oldest first.
    pub fn iter_lane(&self, priority: u8) -> impl DoubleEndedIterator<Item = &T> {
        self.lanes.get(&priority).into_iter().flatten()
    }

    /// Iterate over all items, most urgent lane first, oldest first within a
    /// lane.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.lanes.values().flatten()
    }
}

/// A multi-lane queue like [`MultiFifo`], but each lane is an
/// insertion-ordered map keyed by bundle tag so that specific entries can be
/// removed directly.
#[derive(Debug, Clone, Default)]
pub struct PriorityDict<T> {
    lanes: BTreeMap<u8, DictLane<T>>,
    len: usize,
}

#[derive(Debug, Clone)]
struct DictLane<T> {
    order: VecDeque<BundleTag>,
    map: HashMap<BundleTag, T>,
}

impl<T> Default for DictLane<T> {
    fn default() -> Self {
        Self { order: VecDeque::new(), map: HashMap::new() }
    }
}

impl<T> PriorityDict<T> {
    /// Create an empty dict queue.
    pub fn new() -> Self {
        Self { lanes: BTreeMap::new(), len: 0 }
    }

    /// Insert `item` under `tag` at the tail of lane `priority`. Replaces a
    /// previous entry with the same tag in that lane, keeping its position.
    pub fn put(&mut self, tag: BundleTag, item: T, priority: u8) {
        let lane = self.lanes.entry(priority).or_default();
        if lane.map.insert(tag, item).is_none() {
            lane.order.push_back(tag);
            self.len += 1;
        }
    }

    /// Take the oldest entry of the most urgent non-empty lane.
    pub fn pop(&mut self) -> Option<(BundleTag, T)> {
        for lane in self.lanes.values_mut() {
            while let Some(tag) = lane.order.pop_front() {
                if let Some(item) = lane.map.remove(&tag) {
                    self.len -= 1;
                    return Some((tag, item));
                }
            }
        }
        None
    }

    /// Remove the most recently added entry of lane `priority`.
    pub fn evict_newest(&mut self, priority: u8) -> Option<(BundleTag, T)> {
        let lane = self.lanes.get_mut(&priority)?;
        while let Some(tag) = lane.order.pop_back() {
            if let Some(item) = lane.map.remove(&tag) {
                self.len -= 1;
                return Some((tag, item));
            }
        }
        None
    }

    /// Remove the entry stored under `tag` in lane `priority`.
    pub fn remove(&mut self, tag: BundleTag, priority: u8) -> Option<T> {
        let lane = self.lanes.get_mut(&priority)?;
        let item = lane.map.remove(&tag);
        if item.is_some() {
            self.len -= 1;
        }
        item
    }

    /// All tags currently stored, most urgent lane first, insertion order
    /// within a lane.
    pub fn keys(&self) -> Vec<BundleTag> {
        let mut keys = Vec::with_capacity(self.len);
        for lane in self.lanes.values() {
            keys.extend(lane.order.iter().filter(|t| lane.map.contains_key(t)).copied());
        }
        keys
    }

    /// Whether an entry with `tag` exists in any lane.
    pub fn contains(&self, tag: BundleTag) -> bool {
        self.lanes.values().any(|l| l.map.contains_key(&tag))
    }

    /// Iterate over the entries of lane `priority`, oldest first.
    pub fn iter_lane(&self, priority: u8) -> impl DoubleEndedIterator<Item = (&BundleTag, &T)> {
        self.lanes.get(&priority).into_iter().flat_map(|lane| {
            lane.order.iter().filter_map(move |t| lane.map.get(t).map(|i| (t, i)))
        })
    }

    /// Iterate over all entries, most urgent lane first.
    pub fn iter(&self) -> impl Iterator<Item = (&BundleTag, &T)> {
        self.lanes.values().flat_map(|lane| {
            lane.order.iter().filter_map(move |t| lane.map.get(t).map(|i| (t, i)))
        })
    }

    /// Total number of stored entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether all lanes are empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A two-state semaphore. Parties cross while it is green and wait while it
/// is red; `turn_green`/`turn_red` are idempotent.
#[derive(Debug, Clone, Default)]
pub struct Semaphore {
    green: bool,
    green_waiters: Vec<Waker>,
    red_waiters: Vec<Waker>,
}

impl Semaphore {
    /// Create a semaphore in the given initial state.
    pub fn new(green: bool) -> Self {
        Self { green, green_waiters: Vec::new(), red_waiters: Vec::new() }
    }

    /// Whether the semaphore is green.
    pub fn is_green(&self) -> bool {
        self.green
    }

    /// Whether the semaphore is red.
    pub fn is_red(&self) -> bool {
        !self.green
    }

    /// Turn green; returns the wakers of everybody waiting for green, in
    /// registration order. Does nothing if already green.
    pub fn turn_green(&mut self) -> Vec<Waker> {
        if self.green {
            return Vec::new();
        }
        self.green = true;
        std::mem::take(&mut self.green_waiters)
    }

    /// Turn red; returns the wakers of everybody waiting for red. Does
    /// nothing if already red.
    pub fn turn_red(&mut self) -> Vec<Waker> {
        if !self.green {
            return Vec::new();
        }
        self.green = false;
        std::mem::take(&mut self.red_waiters)
    }

    /// Register a waker to fire on the next transition to green.
    pub fn on_green(&mut self, waker: Waker) {
        self.green_waiters.push(waker);
    }

    /// Register a waker to fire on the next transition to red.
    pub fn on_red(&mut self, waker: Waker) {
        self.red_waiters.push(waker);
    }
}

/// A lock of capacity one with FIFO waiter order.
#[derive(Debug, Clone, Default)]
pub struct Lock {
    taken: bool,
    waiters: VecDeque<Waker>,
}

impl Lock {
    /// Create a free lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to acquire the lock. If it is taken, the waker is queued and
    /// `false` is returned; the party will be woken when it is granted the
    /// lock.
    pub fn acquire(&mut self, waker: Waker) -> bool {
        if self.taken {
            self.waiters.push_back(waker);
            false
        } else {
            self.taken = true;
            true
        }
    }

    /// Release the lock. If a party is waiting, the lock is handed over
    /// directly and its waker is returned for scheduling.
    pub fn release(&mut self) -> Option<Waker> {
        debug_assert!(self.taken, "released a lock that is not taken");
        match self.waiters.pop_front() {
            Some(w) => Some(w),
            None => {
                self.taken = false;
                None
            }
        }
    }

    /// Whether the lock is currently held.
    pub fn is_taken(&self) -> bool {
        self.taken
    }
}

/// A bounded counter. `try_put(n)` blocks (fails) on overflow, `try_get(n)`
/// blocks when fewer than `n` tokens are available.
#[derive(Debug, Clone)]
pub struct TokenCounter {
    level: u64,
    capacity: u64,
    get_waiters: VecDeque<Waker>,
    put_waiters: VecDeque<Waker>,
}

impl TokenCounter {
    /// Create a counter with the given initial level and capacity.
    pub fn new(init: u64, capacity: u64) -> Self {
        Self {
            level: init,
            capacity,
            get_waiters: VecDeque::new(),
            put_waiters: VecDeque::new(),
        }
    }

    /// Current level.
    pub fn level(&self) -> u64 {
        self.level
    }

    /// Add `n` tokens. On success returns the waker of the oldest waiting
    /// consumer, if any.
    pub fn try_put(&mut self, n: u64) -> Result<Option<Waker>, ()> {
        if self.level + n > self.capacity {
            return Err(());
        }
        self.level += n;
        Ok(self.get_waiters.pop_front())
    }

    /// Remove `n` tokens. On success returns the waker of the oldest
    /// waiting producer, if any.
    pub fn try_get(&mut self, n: u64) -> Result<Option<Waker>, ()> {
        if self.level < n {
            return Err(());
        }
        self.level -= n;
        Ok(self.put_waiters.pop_front())
    }

    /// Register a consumer to wake on the next level increase.
    pub fn on_put(&mut self, waker: Waker) {
        self.get_waiters.push_back(waker);
    }

    /// Register a producer to wake on the next level decrease.
    pub fn on_get(&mut self, waker: Waker) {
        self.put_waiters.push_back(waker);
    }
}
