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

//! Tests for contact-graph routing: Dijkstra, anchored alternates, BFS.

use std::collections::BTreeSet;

use pretty_assertions::assert_eq;

use crate::mobility::ContactPlan;
use crate::router::cgr::{
    anchored_routes, best_route, bfs_routes, owlt, route_from_contacts, CgrQuery, ContactGraph,
};
use crate::types::{ContactId, NodeId};

fn n(i: usize) -> NodeId {
    NodeId::from(i)
}

/// `N1 -> A -> N2` and `N1 -> B -> N2`, with the A-leg faster and ending
/// sooner.
///
/// Nodes: 0 = N1, 1 = A, 2 = B, 3 = N2.
fn fork_plan() -> (ContactPlan, ContactGraph) {
    let mut plan = ContactPlan::new();
    plan.add_contact(n(0), n(1), 0.0, 100.0, 1e6, 1.0).unwrap(); // c0
    plan.add_contact(n(1), n(3), 0.0, 50.0, 1e6, 1.0).unwrap(); // c1
    plan.add_contact(n(0), n(2), 0.0, 100.0, 1e6, 5.0).unwrap(); // c2
    plan.add_contact(n(2), n(3), 0.0, 100.0, 1e6, 5.0).unwrap(); // c3
    let graph = ContactGraph::build(&plan);
    (plan, graph)
}

fn query<'a>(
    plan: &'a ContactPlan,
    excluded: &'a BTreeSet<ContactId>,
    suppressed: &'a BTreeSet<ContactId>,
    visited: &'a [NodeId],
    size: f64,
) -> CgrQuery<'a> {
    CgrQuery {
        plan,
        orig: n(0),
        dest: n(3),
        now: 0.0,
        size,
        visited,
        excluded,
        relays: None,
        suppressed,
        anchor: None,
    }
}

#[test]
fn dijkstra_finds_the_earliest_arrival_route() {
    let (plan, graph) = fork_plan();
    let (excluded, suppressed) = (BTreeSet::new(), BTreeSet::new());
    let route = best_route(&graph, &query(&plan, &excluded, &suppressed, &[], 0.0)).unwrap();

    assert_eq!(route.contacts, vec![ContactId(0), ContactId(1)]);
    assert_eq!(route.nodes, vec![n(0), n(1), n(3)]);
    assert_eq!(route.nhops, 2);
    // both hops add one (margined) light second
    let expected_eat = 2.0 * owlt(plan.get(ContactId(0)).unwrap());
    assert!((route.eat - expected_eat).abs() < 1e-9);
    // the A -> N2 contact ends first and limits the route
    assert_eq!(route.limit_cid, ContactId(1));
    assert_eq!(route.tend, 50.0);
}

#[test]
fn dijkstra_respects_visited_excluded_and_capacity_filters() {
    let (mut plan, graph) = fork_plan();
    let suppressed = BTreeSet::new();

    // a bundle that already visited A must go through B
    let excluded = BTreeSet::new();
    let route =
        best_route(&graph, &query(&plan, &excluded, &suppressed, &[n(1)], 0.0)).unwrap();
    assert_eq!(route.nodes, vec![n(0), n(2), n(3)]);

    // excluding the first contact has the same effect
    let excluded: BTreeSet<ContactId> = [ContactId(0)].into_iter().collect();
    let route = best_route(&graph, &query(&plan, &excluded, &suppressed, &[], 0.0)).unwrap();
    assert_eq!(route.contacts, vec![ContactId(2), ContactId(3)]);

    // draining the capacity of c1 pushes the bundle to the B leg
    let excluded = BTreeSet::new();
    plan.admit(ContactId(1), plan.residual(ContactId(1)));
    let route = best_route(&graph, &query(&plan, &excluded, &suppressed, &[], 1.0)).unwrap();
    assert_eq!(route.contacts, vec![ContactId(2), ContactId(3)]);

    // with every path filtered there is no route
    let excluded: BTreeSet<ContactId> = [ContactId(2)].into_iter().collect();
    assert!(best_route(&graph, &query(&plan, &excluded, &suppressed, &[], 1.0)).is_none());
}

#[test]
fn dijkstra_breaks_ties_towards_lower_contact_ids() {
    let mut plan = ContactPlan::new();
    plan.add_contact(n(0), n(1), 0.0, 100.0, 1e6, 1.0).unwrap(); // c0
    plan.add_contact(n(1), n(3), 0.0, 100.0, 1e6, 1.0).unwrap(); // c1
    plan.add_contact(n(0), n(2), 0.0, 100.0, 1e6, 1.0).unwrap(); // c2
    plan.add_contact(n(2), n(3), 0.0, 100.0, 1e6, 1.0).unwrap(); // c3
    let graph = ContactGraph::build(&plan);

    let (excluded, suppressed) = (BTreeSet::new(), BTreeSet::new());
    let route = best_route(&graph, &query(&plan, &excluded, &suppressed, &[], 0.0)).unwrap();
    assert_eq!(route.contacts, vec![ContactId(0), ContactId(1)]);
}

#[test]
fn dijkstra_waits_for_late_contacts() {
    let mut plan = ContactPlan::new();
    plan.add_contact(n(0), n(1), 10.0, 100.0, 1e6, 1.0).unwrap();
    plan.add_contact(n(1), n(3), 40.0, 100.0, 1e6, 1.0).unwrap();
    let graph = ContactGraph::build(&plan);

    let (excluded, suppressed) = (BTreeSet::new(), BTreeSet::new());
    let route = best_route(&graph, &query(&plan, &excluded, &suppressed, &[], 0.0)).unwrap();
    // EAT = max(10, 0) + owlt, then max(40, ...) + owlt
    let margin = owlt(plan.get(ContactId(0)).unwrap());
    assert!((route.eat - (40.0 + 2.0 * margin - margin)).abs() < 1e-9);
    assert_eq!(route.tstart, 10.0);
}

#[test]
fn anchored_search_returns_disjoint_first_hops() {
    let (plan, graph) = fork_plan();
    let routes = anchored_routes(&graph, &plan, n(0), n(3), 0.0, None, 10);

    assert_eq!(routes.len(), 2);
    assert_eq!(routes[0].contacts, vec![ContactId(0), ContactId(1)]);
    assert_eq!(routes[1].contacts, vec![ContactId(2), ContactId(3)]);
    assert_ne!(routes[0].contacts[0], routes[1].contacts[0]);
}

#[test]
fn best_route_is_optimal_among_all_enumerated_routes() {
    let (plan, graph) = fork_plan();
    let (excluded, suppressed) = (BTreeSet::new(), BTreeSet::new());
    let best = best_route(&graph, &query(&plan, &excluded, &suppressed, &[], 0.0)).unwrap();

    let all = bfs_routes(&graph, &plan, n(0), n(3), 0.0, None, 4);
    assert_eq!(all.len(), 2);
    for route in &all {
        assert!(best.eat <= route.eat + 1e-12);
    }
    // BFS output is sorted by EAT
    assert!(all[0].eat <= all[1].eat);
}

#[test]
fn bfs_honors_the_relay_constraint() {
    let (plan, graph) = fork_plan();
    // only A may relay: the B leg disappears
    let relays: BTreeSet<NodeId> = [n(1)].into_iter().collect();
    let all = bfs_routes(&graph, &plan, n(0), n(3), 0.0, Some(&relays), 4);
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].nodes, vec![n(0), n(1), n(3)]);
}

#[test]
fn route_from_contacts_recomputes_the_arrival_time() {
    let (plan, _) = fork_plan();
    let route = route_from_contacts(&plan, n(0), n(3), 0.0, &[ContactId(2), ContactId(3)]);
    let margin = owlt(plan.get(ContactId(2)).unwrap());
    assert!((route.eat - 2.0 * margin).abs() < 1e-9);
    assert_eq!(route.limit_cid, ContactId(3));
}
