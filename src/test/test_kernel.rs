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

//! Tests for the event kernel and its blocking resources.

use pretty_assertions::assert_eq;

use crate::kernel::resources::{Fifo, Lock, MultiFifo, PriorityDict, Semaphore, TokenCounter};
use crate::kernel::{Event, EventQueue, Waker};
use crate::types::{BundleId, CopyId, GenId, NodeId};

fn gen_of(event: Event) -> u32 {
    match event {
        Event::CbrTick { gen } => gen.0,
        _ => panic!("unexpected event"),
    }
}

#[test]
fn same_instant_events_fire_in_insertion_order() {
    let mut q = EventQueue::new();
    q.schedule_in(1.0, Event::CbrTick { gen: GenId(0) });
    q.schedule_in(1.0, Event::CbrTick { gen: GenId(1) });
    q.schedule_in(0.5, Event::CbrTick { gen: GenId(2) });
    q.schedule_in(1.0, Event::CbrTick { gen: GenId(3) });

    let order: Vec<u32> = std::iter::from_fn(|| q.pop(None)).map(gen_of).collect();
    assert_eq!(order, vec![2, 0, 1, 3]);
    assert_eq!(q.now(), 1.0);
}

#[test]
fn clock_never_goes_backwards_and_clamps_to_until() {
    let mut q = EventQueue::new();
    q.schedule_in(5.0, Event::CbrTick { gen: GenId(0) });
    q.schedule_in(10.0, Event::CbrTick { gen: GenId(1) });

    assert!(q.pop(Some(7.0)).is_some());
    assert_eq!(q.now(), 5.0);
    // the event at t=10 stays pending, the clock stops at `until`
    assert!(q.pop(Some(7.0)).is_none());
    assert_eq!(q.now(), 7.0);
    assert_eq!(q.len(), 1);

    // negative delays are clamped to "now"
    q.schedule_in(-3.0, Event::CbrTick { gen: GenId(2) });
    assert_eq!(gen_of(q.pop(None).unwrap()), 2);
    assert_eq!(q.now(), 7.0);
}

#[test]
fn fifo_capacity_blocks_and_wakes_in_order() {
    let mut f: Fifo<u32> = Fifo::with_capacity(1);
    assert!(f.try_put(1).is_ok());
    // full: the item is handed back
    assert_eq!(f.try_put(2), Err(2));

    f.on_space(Waker::NodeIngress(NodeId(7)));
    let (item, woken) = f.try_get().unwrap();
    assert_eq!(item, 1);
    assert_eq!(woken, Some(Waker::NodeIngress(NodeId(7))));

    // a registered consumer is woken by the next put
    f.on_item(Waker::NodeIngress(NodeId(8)));
    assert_eq!(f.try_put(3), Ok(Some(Waker::NodeIngress(NodeId(8)))));
}

#[test]
fn multi_fifo_drains_most_urgent_lane_first() {
    let mut q: MultiFifo<&'static str> = MultiFifo::new();
    q.try_put("bulk-1", 1).unwrap();
    q.try_put("bulk-2", 1).unwrap();
    q.try_put("critical", 0).unwrap();

    assert_eq!(q.try_get().unwrap().0, "critical");
    assert_eq!(q.try_get().unwrap().0, "bulk-1");
    // head insertion puts an item at the front of its lane
    q.try_put_front("urgent-bulk", 1).unwrap();
    assert_eq!(q.try_get().unwrap().0, "urgent-bulk");
    assert_eq!(q.try_get().unwrap().0, "bulk-2");
    assert!(q.try_get().is_none());
}

#[test]
fn multi_fifo_evicts_newest_of_a_lane() {
    let mut q: MultiFifo<u32> = MultiFifo::new();
    for i in 0..4 {
        q.try_put(i, 1).unwrap();
    }
    assert_eq!(q.evict_newest(1), Some(3));
    assert_eq!(q.evict_newest(1), Some(2));
    assert_eq!(q.len(), 2);
    // FIFO order of the remaining items is untouched
    assert_eq!(q.try_get().unwrap().0, 0);
    assert_eq!(q.try_get().unwrap().0, 1);
}

#[test]
fn priority_dict_removes_entries_by_tag() {
    let tag = |i: u64| (BundleId(i), CopyId(0));
    let mut q: PriorityDict<&'static str> = PriorityDict::new();
    q.put(tag(1), "a", 1);
    q.put(tag(2), "b", 1);
    q.put(tag(3), "c", 0);

    assert!(q.contains(tag(2)));
    assert_eq!(q.remove(tag(2), 1), Some("b"));
    assert!(!q.contains(tag(2)));
    assert_eq!(q.keys(), vec![tag(3), tag(1)]);

    // pop serves the most urgent lane first, insertion order within
    assert_eq!(q.pop(), Some((tag(3), "c")));
    assert_eq!(q.pop(), Some((tag(1), "a")));
    assert_eq!(q.pop(), None);
}

#[test]
fn semaphore_transitions_are_idempotent() {
    let mut s = Semaphore::new(false);
    assert!(s.is_red());
    s.on_green(Waker::TryExtract(crate::types::MgrId(0)));

    let woken = s.turn_green();
    assert_eq!(woken.len(), 1);
    // a second turn_green must not wake anybody again
    assert!(s.turn_green().is_empty());
    assert!(s.is_green());

    assert!(s.turn_red().is_empty());
    assert!(s.is_red());
    assert!(s.turn_red().is_empty());
}

#[test]
fn lock_grants_in_fifo_order() {
    let mut l = Lock::new();
    assert!(l.acquire(Waker::NodeIngress(NodeId(1))));
    assert!(!l.acquire(Waker::NodeIngress(NodeId(2))));
    assert!(!l.acquire(Waker::NodeIngress(NodeId(3))));

    // release hands the lock over to the oldest waiter
    assert_eq!(l.release(), Some(Waker::NodeIngress(NodeId(2))));
    assert!(l.is_taken());
    assert_eq!(l.release(), Some(Waker::NodeIngress(NodeId(3))));
    assert_eq!(l.release(), None);
    assert!(!l.is_taken());
}

#[test]
fn token_counter_blocks_on_overflow_and_underflow() {
    let mut c = TokenCounter::new(0, 2);
    assert!(c.try_get(1).is_err());
    assert!(c.try_put(3).is_err());
    assert!(c.try_put(2).is_ok());
    assert_eq!(c.level(), 2);

    c.on_get(Waker::RadioKick(crate::types::RadioId(0)));
    let woken = c.try_get(2).unwrap();
    assert_eq!(woken, Some(Waker::RadioKick(crate::types::RadioId(0))));
    assert_eq!(c.level(), 0);
}
