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

//! Tests for the overbookable queue and its bounded variant.

use pretty_assertions::assert_eq;

use crate::bundle::{IdCounters, NewBundle};
use crate::queue::{Admission, BoundedDictQueue, OverbookableQueue};
use crate::router::{NextHop, Route, RtRecord};
use crate::types::{NodeId, BULK_PRIORITY, CRITICAL_PRIORITY};

fn record(counters: &mut IdCounters, data_vol: f64, critical: bool) -> RtRecord {
    let mut spec = NewBundle::new(NodeId(0), NodeId(1), "file", data_vol);
    spec.critical = critical;
    let bundle = counters.new_bundle(spec, 0.0);
    RtRecord {
        bundle,
        contact: None,
        route: Route::open(NodeId(0), NodeId(1)),
        priority: if critical { CRITICAL_PRIORITY } else { BULK_PRIORITY },
        next_hop: NextHop::Neighbor(NodeId(1)),
    }
}

#[test]
fn admission_is_bounded_by_contact_capacity() {
    let mut counters = IdCounters::default();
    let mut q = OverbookableQueue::new();
    q.open_contact(1e4, 1.05e6, 1e6);

    // ten bulk bundles fit, the eleventh does not
    for _ in 0..10 {
        let adm = q.put(record(&mut counters, 1e5, false), BULK_PRIORITY, 0.0);
        assert!(matches!(adm, Admission::Accepted(ref v) if v.is_empty()));
    }
    let adm = q.put(record(&mut counters, 1e5, false), BULK_PRIORITY, 0.0);
    assert!(matches!(adm, Admission::Rejected(_)));
    assert_eq!(q.len(), 10);
    assert_eq!(q.backlog(), 1e6);
}

#[test]
fn critical_traffic_preempts_bulk_newest_first() {
    let mut counters = IdCounters::default();
    let mut q = OverbookableQueue::new();
    q.open_contact(1e4, 1.05e6, 1e6);
    for _ in 0..10 {
        q.put(record(&mut counters, 1e5, false), BULK_PRIORITY, 0.0);
    }

    // half the capacity of critical traffic displaces ceil(5e5/1e5) bulk
    // records
    let adm = q.put(record(&mut counters, 5e5, true), CRITICAL_PRIORITY, 0.0);
    let Admission::Accepted(displaced) = adm else { panic!("critical was rejected") };
    assert_eq!(displaced.len(), 5);
    assert!(displaced.iter().all(|r| !r.bundle.critical));
    // the displaced records are the newest bulk ones
    let displaced_bids: Vec<u64> = displaced.iter().map(|r| r.bundle.bid.0).collect();
    assert_eq!(displaced_bids, vec![10, 9, 8, 7, 6]);

    // the critical record now sits at the head of the queue
    assert_eq!(q.len(), 6);
    assert!(q.pop().unwrap().bundle.critical);
    // capacity never went negative
    assert!(q.capacity_counter() >= 0.0);
}

#[test]
fn critical_rejected_when_bulk_lane_cannot_make_room() {
    let mut counters = IdCounters::default();
    let mut q = OverbookableQueue::new();
    q.open_contact(1e4, 3e5, 1e6);
    q.put(record(&mut counters, 1e5, false), BULK_PRIORITY, 0.0);
    q.put(record(&mut counters, 1e5, false), BULK_PRIORITY, 0.0);

    // even evicting both bulk records cannot fit this bundle
    let adm = q.put(record(&mut counters, 1e6, true), CRITICAL_PRIORITY, 0.0);
    assert!(matches!(adm, Admission::Rejected(_)));
    assert_eq!(q.len(), 2);
}

#[test]
fn effective_capacity_shrinks_as_the_contact_runs_out() {
    let mut q = OverbookableQueue::new();
    q.open_contact(1e4, 1e6, 100.0);

    // early on the counter is the bound, late the remaining contact time is
    assert_eq!(q.capacity(0.0), Some(1e6));
    assert_eq!(q.capacity(99.0), Some(1e4));
    q.close_contact();
    assert_eq!(q.capacity(99.0), None);
}

#[test]
fn rejected_when_no_contact_is_open() {
    let mut counters = IdCounters::default();
    let mut q = OverbookableQueue::new();
    let adm = q.put(record(&mut counters, 1e5, false), BULK_PRIORITY, 0.0);
    assert!(matches!(adm, Admission::Rejected(_)));
}

#[test]
fn bounded_dict_queue_drops_to_make_room_and_removes_by_tag() {
    let mut counters = IdCounters::default();
    let mut q = BoundedDictQueue::new(3.5e5);

    let a = record(&mut counters, 1e5, false);
    let tag_a = a.bundle.tag();
    q.put(a, BULK_PRIORITY);
    q.put(record(&mut counters, 1e5, false), BULK_PRIORITY);
    q.put(record(&mut counters, 1e5, false), BULK_PRIORITY);

    // a non-critical arrival beyond the buffer bound is rejected
    let adm = q.put(record(&mut counters, 1e5, false), BULK_PRIORITY);
    assert!(matches!(adm, Admission::Rejected(_)));

    // a critical arrival evicts bulk records instead
    let adm = q.put(record(&mut counters, 2e5, true), CRITICAL_PRIORITY);
    let Admission::Accepted(evicted) = adm else { panic!("critical was rejected") };
    assert_eq!(evicted.len(), 2);

    // direct removal by tag, as the handshake does
    assert!(q.contains(tag_a));
    let removed = q.remove(tag_a, BULK_PRIORITY).unwrap();
    assert_eq!(removed.bundle.tag(), tag_a);
    assert!(!q.contains(tag_a));
    assert_eq!(q.len(), 1);
}
