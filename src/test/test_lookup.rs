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

//! Tests for the route schedule and its validation.

use std::collections::BTreeSet;

use pretty_assertions::assert_eq;

use crate::config::{RouteAlgorithm, RouteScheduleRecord};
use crate::mobility::ContactPlan;
use crate::router::{RouteSchedule, Route};
use crate::types::{ContactId, NodeId, SimError};

fn n(i: usize) -> NodeId {
    NodeId::from(i)
}

/// `N1 -> A -> N2` and `N1 -> B -> N2` (0 = N1, 1 = A, 2 = B, 3 = N2).
fn fork_plan() -> ContactPlan {
    let mut plan = ContactPlan::new();
    plan.add_contact(n(0), n(1), 0.0, 100.0, 1e6, 1.0).unwrap();
    plan.add_contact(n(1), n(3), 0.0, 50.0, 1e6, 1.0).unwrap();
    plan.add_contact(n(0), n(2), 0.0, 100.0, 1e6, 5.0).unwrap();
    plan.add_contact(n(2), n(3), 0.0, 100.0, 1e6, 5.0).unwrap();
    plan
}

#[test]
fn schedule_holds_all_route_options_per_pair() {
    let plan = fork_plan();
    let nodes = [n(0), n(1), n(2), n(3)];
    let schedule = RouteSchedule::build(&plan, &nodes, RouteAlgorithm::Cgr, None, 6);

    let options = schedule.get(n(0), n(3)).unwrap();
    assert_eq!(options.len(), 2);
    assert_eq!(options[0].next_hop, n(1));
    assert_eq!(options[1].next_hop, n(2));
    assert_eq!(options[0].next_cid, ContactId(0));
    // derived filter fields are consistent with the route
    assert!(options[0].hops.contains(&n(3)));
    assert!(!options[0].hops.contains(&n(0)));
    assert!(options[0].contact_set.contains(&ContactId(1)));

    // partial legs exist as well
    assert!(schedule.get(n(1), n(3)).is_some());
    assert!(schedule.get(n(3), n(0)).is_none());
}

#[test]
fn bfs_schedule_finds_the_same_routes() {
    let plan = fork_plan();
    let nodes = [n(0), n(1), n(2), n(3)];
    let cgr = RouteSchedule::build(&plan, &nodes, RouteAlgorithm::Cgr, None, 6);
    let bfs = RouteSchedule::build(&plan, &nodes, RouteAlgorithm::Bfs, None, 6);
    assert_eq!(bfs.get(n(0), n(3)).unwrap().len(), 2);
    assert_eq!(cgr.get(n(0), n(3)).unwrap().len(), bfs.get(n(0), n(3)).unwrap().len());
}

#[test]
fn validation_drops_non_relay_mid_hops() {
    let plan = fork_plan();
    let nodes = [n(0), n(1), n(2), n(3)];
    let mut schedule = RouteSchedule::build(&plan, &nodes, RouteAlgorithm::Cgr, None, 6);

    // only A may appear mid-route
    let relays: BTreeSet<NodeId> = [n(1)].into_iter().collect();
    schedule.validate(Some(&relays), 10, &[]);
    let options = schedule.get(n(0), n(3)).unwrap();
    assert_eq!(options.len(), 1);
    assert_eq!(options[0].next_hop, n(1));
}

#[test]
fn validation_drops_excluded_sub_paths() {
    let plan = fork_plan();
    let nodes = [n(0), n(1), n(2), n(3)];
    let mut schedule = RouteSchedule::build(&plan, &nodes, RouteAlgorithm::Cgr, None, 6);

    schedule.validate(None, 10, &[vec![n(0), n(2)]]);
    let options = schedule.get(n(0), n(3)).unwrap();
    assert_eq!(options.len(), 1);
    assert_eq!(options[0].next_hop, n(1));
}

#[test]
fn schedule_loads_from_records() {
    let records = vec![RouteScheduleRecord {
        orig: "N1".into(),
        dest: "N2".into(),
        route: vec!["N1".into(), "A".into(), "N2".into()],
        contacts: vec![0, 1],
        tstart: 0.0,
        tend: 50.0,
        eat: 2.5,
        nhops: 2,
    }];
    let resolve = |name: &str| match name {
        "N1" => Some(n(0)),
        "A" => Some(n(1)),
        "N2" => Some(n(3)),
        _ => None,
    };
    let schedule = RouteSchedule::from_records(&records, &resolve).unwrap();
    let options = schedule.get(n(0), n(3)).unwrap();
    assert_eq!(options.len(), 1);
    let Route { ref contacts, tend, eat, .. } = options[0].route;
    assert_eq!(contacts, &vec![ContactId(0), ContactId(1)]);
    assert_eq!(tend, 50.0);
    assert_eq!(eat, 2.5);

    // a dangling node name fails the load
    let bad = vec![RouteScheduleRecord {
        orig: "N1".into(),
        dest: "X".into(),
        route: vec!["N1".into(), "X".into()],
        contacts: vec![0],
        tstart: 0.0,
        tend: 50.0,
        eat: 2.5,
        nhops: 1,
    }];
    assert!(matches!(
        RouteSchedule::from_records(&bad, &resolve),
        Err(SimError::UnknownNode(_))
    ));

    // an inconsistent route/contacts pair fails the load
    let inconsistent = vec![RouteScheduleRecord {
        orig: "N1".into(),
        dest: "N2".into(),
        route: vec!["N1".into(), "N2".into()],
        contacts: vec![0, 1],
        tstart: 0.0,
        tend: 50.0,
        eat: 2.5,
        nhops: 2,
    }];
    assert!(matches!(
        RouteSchedule::from_records(&inconsistent, &resolve),
        Err(SimError::Decode(_))
    ));
}
