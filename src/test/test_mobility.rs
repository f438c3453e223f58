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

//! Tests for contacts, the contact plan, and the mobility models.

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::connection::union_view_intervals;
use crate::mobility::{
    random_waypoint_table, ContactPlan, DistanceTable, RandomWaypointParams,
};
use crate::types::{NodeId, SimError};

fn n(i: usize) -> NodeId {
    NodeId::from(i)
}

#[test]
fn contact_plan_rejects_invalid_rows() {
    let mut plan = ContactPlan::new();
    assert!(matches!(
        plan.add_contact(n(0), n(0), 0.0, 10.0, 1e6, 1.0),
        Err(SimError::InvalidContactPlan(_))
    ));
    assert!(plan.add_contact(n(0), n(1), -5.0, 10.0, 1e6, 1.0).is_err());
    assert!(plan.add_contact(n(0), n(1), 10.0, 5.0, 1e6, 1.0).is_err());
    assert!(plan.add_contact(n(0), n(1), 0.0, 10.0, -1.0, 1.0).is_err());
    assert!(plan.add_contact(n(0), n(1), 0.0, 10.0, 1e6, -1.0).is_err());
    assert!(plan.is_empty());
}

#[test]
fn pair_plan_is_sorted_by_start_time() {
    let mut plan = ContactPlan::new();
    let c0 = plan.add_contact(n(0), n(1), 50.0, 60.0, 1e6, 1.0).unwrap();
    let c1 = plan.add_contact(n(0), n(1), 0.0, 10.0, 1e6, 1.0).unwrap();
    let c2 = plan.add_contact(n(1), n(0), 5.0, 15.0, 1e6, 1.0).unwrap();

    let pair: Vec<_> = plan.pair_plan(n(0), n(1)).iter().map(|c| c.cid).collect();
    assert_eq!(pair, vec![c1, c0]);
    let rev: Vec<_> = plan.pair_plan(n(1), n(0)).iter().map(|c| c.cid).collect();
    assert_eq!(rev, vec![c2]);
}

#[test]
fn residual_capacity_is_bounded_and_credited() {
    let mut plan = ContactPlan::new();
    let cid = plan.add_contact(n(0), n(1), 0.0, 10.0, 1e5, 1.0).unwrap();
    assert_eq!(plan.residual(cid), 1e6);

    plan.admit(cid, 4e5);
    assert_eq!(plan.residual(cid), 6e5);
    // admission never drives the residual negative
    plan.admit(cid, 1e7);
    assert_eq!(plan.residual(cid), 0.0);
    // and credit never exceeds the total capacity
    plan.credit(cid, 1e7);
    assert_eq!(plan.residual(cid), 1e6);
}

#[test]
fn distance_table_intervals_honor_the_gate() {
    let table = DistanceTable {
        times: vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
        dist: BTreeMap::from([(
            (n(0), n(1)),
            vec![5.0, 20.0, 8.0, 9.0, 20.0, 7.0],
        )]),
    };
    let intervals = table.open_intervals(n(0), n(1), 10.0);
    assert_eq!(intervals.len(), 3);
    assert_eq!((intervals[0].0, intervals[0].1), (0.0, 0.0));
    assert_eq!((intervals[1].0, intervals[1].1), (2.0, 3.0));
    assert_eq!((intervals[2].0, intervals[2].1), (5.0, 5.0));
    // the propagation delay of a run is its mean distance over light speed
    let expected = 8.5 / crate::types::LIGHT_SPEED;
    assert!((intervals[1].2 - expected).abs() < 1e-15);

    // the table answers for the reversed pair as well
    assert_eq!(table.open_intervals(n(1), n(0), 10.0).len(), 3);
    // an unknown pair has no intervals
    assert!(table.open_intervals(n(0), n(2), 10.0).is_empty());
}

#[test]
fn random_waypoint_table_is_deterministic_per_seed() {
    let params = RandomWaypointParams {
        width: 1000.0,
        height: 1000.0,
        min_speed: 1.0,
        max_speed: 5.0,
        pause: 2.0,
        dt: 1.0,
        duration: 50.0,
    };
    let nodes = [n(0), n(1), n(2)];
    let a = random_waypoint_table(&nodes, &params, &mut StdRng::seed_from_u64(7));
    let b = random_waypoint_table(&nodes, &params, &mut StdRng::seed_from_u64(7));

    assert_eq!(a.times.len(), 51);
    assert_eq!(a.dist.len(), 3);
    for (pair, series) in &a.dist {
        assert_eq!(series.len(), a.times.len());
        assert_eq!(series, &b.dist[pair]);
        // distances stay within the motion area diagonal
        let diag = (params.width * params.width + params.height * params.height).sqrt();
        assert!(series.iter().all(|&d| (0.0..=diag).contains(&d)));
    }
}

#[test]
fn broadcast_view_intervals_merge_overlaps() {
    let mut plan = ContactPlan::new();
    plan.add_contact(n(0), n(1), 0.0, 10.0, 1e6, 1.0).unwrap();
    plan.add_contact(n(0), n(1), 5.0, 20.0, 1e6, 2.0).unwrap();
    plan.add_contact(n(0), n(1), 30.0, 40.0, 1e6, 3.0).unwrap();

    let windows = union_view_intervals(&plan.pair_plan(n(0), n(1)));
    assert_eq!(windows.len(), 2);
    assert_eq!((windows[0].0, windows[0].1, windows[0].2), (0.0, 20.0, 1.0));
    assert_eq!((windows[1].0, windows[1].1, windows[1].2), (30.0, 40.0, 3.0));
}
