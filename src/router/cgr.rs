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

//! Contact-graph routing: Dijkstra over the contact graph, anchored
//! alternate-route search, and BFS route enumeration.
//!
//! The graph's vertices are contacts; an edge `u → v` exists when data
//! arriving at `u.dest` can continue through `v` (`u.dest == v.orig`). The
//! distance minimized is the earliest arrival time (EAT), with the
//! relaxation `EAT(v) = min(EAT(v), max(tstart(v), EAT(u)) + owlt(v))`.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use ordered_float::NotNan;
use petgraph::graph::{DiGraph, NodeIndex};
use priority_queue::PriorityQueue;

use super::Route;
use crate::mobility::{Contact, ContactPlan};
use crate::types::{ContactId, IndexType, NodeId};

/// Safety margin applied to the one-way light time, accounting for the
/// maximum relative node speed (125 mi/s against 186000 mi/s light speed).
pub const OWLT_MARGIN: f64 = 1.0 + 125.0 / 186_000.0;

/// One-way light time of a contact, margin included.
pub fn owlt(contact: &Contact) -> f64 {
    contact.range * OWLT_MARGIN
}

/// The static shape of the contact graph. Built once per contact plan;
/// validity of individual contacts is re-evaluated per query.
#[derive(Debug, Clone, Default)]
pub struct ContactGraph {
    graph: DiGraph<ContactId, (), IndexType>,
    index: BTreeMap<ContactId, NodeIndex<IndexType>>,
    first_hops: BTreeMap<NodeId, Vec<ContactId>>,
}

impl ContactGraph {
    /// Build the graph over all contacts of the plan.
    pub fn build(plan: &ContactPlan) -> Self {
        let mut graph = DiGraph::default();
        let mut index = BTreeMap::new();
        let mut first_hops: BTreeMap<NodeId, Vec<ContactId>> = BTreeMap::new();

        for c in plan.contacts() {
            let idx = graph.add_node(c.cid);
            index.insert(c.cid, idx);
            first_hops.entry(c.orig).or_default().push(c.cid);
        }
        for u in plan.contacts() {
            for v in plan.contacts() {
                // data leaving u can only continue through v if v is still
                // open once u has started
                if u.cid != v.cid && u.dest == v.orig && v.tend > u.tstart {
                    graph.add_edge(index[&u.cid], index[&v.cid], ());
                }
            }
        }
        Self { graph, index, first_hops }
    }

    /// Contacts leaving `node`, in contact-id order.
    pub fn first_hops(&self, node: NodeId) -> &[ContactId] {
        self.first_hops.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Successor contacts of `cid`, in contact-id order.
    pub fn successors(&self, cid: ContactId) -> Vec<ContactId> {
        let Some(&idx) = self.index.get(&cid) else { return Vec::new() };
        let mut succ: Vec<ContactId> =
            self.graph.neighbors(idx).map(|n| self.graph[n]).collect();
        succ.sort();
        succ
    }

    /// Number of contacts in the graph.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

/// One CGR query.
#[derive(Debug)]
pub struct CgrQuery<'a> {
    /// The contact plan with residual capacities.
    pub plan: &'a ContactPlan,
    /// Origin node (where the bundle currently sits).
    pub orig: NodeId,
    /// Destination node.
    pub dest: NodeId,
    /// Current time.
    pub now: f64,
    /// Bundle size in bits; contacts with less residual capacity are
    /// filtered out.
    pub size: f64,
    /// Nodes the bundle has already visited.
    pub visited: &'a [NodeId],
    /// Contacts excluded for this bundle.
    pub excluded: &'a BTreeSet<ContactId>,
    /// Relay set; `None` means every node relays.
    pub relays: Option<&'a BTreeSet<NodeId>>,
    /// Contacts suppressed by the anchored alternate-route search.
    pub suppressed: &'a BTreeSet<ContactId>,
    /// When set, the route must start with this contact.
    pub anchor: Option<ContactId>,
}

impl CgrQuery<'_> {
    fn contact_valid(&self, c: &Contact) -> bool {
        !self.suppressed.contains(&c.cid)
            && !self.excluded.contains(&c.cid)
            && c.tend > self.now
            && self.plan.residual(c.cid) >= self.size
            && !self.visited.contains(&c.dest)
            && (c.dest == self.dest || self.relays.map_or(true, |r| r.contains(&c.dest)))
    }
}

/// Dijkstra over the contact graph. Returns the route with the smallest
/// earliest arrival time satisfying all query filters, or `None`.
///
/// Ties in EAT are broken towards the smaller contact id, both in the
/// settling order and in the retained predecessor (a later equal relaxation
/// never replaces an earlier one).
pub fn best_route(graph: &ContactGraph, q: &CgrQuery) -> Option<Route> {
    let mut dist: BTreeMap<ContactId, f64> = BTreeMap::new();
    let mut pred: BTreeMap<ContactId, Option<ContactId>> = BTreeMap::new();
    let mut settled: BTreeSet<NodeId> = BTreeSet::new();
    let mut frontier: PriorityQueue<ContactId, Reverse<(NotNan<f64>, ContactId)>> =
        PriorityQueue::new();
    let mut best: Option<(f64, ContactId)> = None;

    // the synthetic source contact sits at the origin with EAT = now
    settled.insert(q.orig);
    let seed: Vec<ContactId> = match q.anchor {
        Some(anchor) => vec![anchor],
        None => graph.first_hops(q.orig).to_vec(),
    };
    for cid in seed {
        let Some(c) = q.plan.get(cid) else { continue };
        if c.orig != q.orig || !q.contact_valid(c) {
            continue;
        }
        let eat = q.now.max(c.tstart) + owlt(c);
        dist.insert(cid, eat);
        pred.insert(cid, None);
        frontier.push(cid, Reverse((NotNan::new(eat).unwrap(), cid)));
        if c.dest == q.dest && best.map_or(true, |(b, _)| eat < b) {
            best = Some((eat, cid));
        }
    }

    while let Some((u, Reverse((eat_u, _)))) = frontier.pop() {
        let eat_u = eat_u.into_inner();
        // nothing left in the frontier can improve on the best route found
        if let Some((best_eat, _)) = best {
            if eat_u >= best_eat {
                break;
            }
        }
        let cu = q.plan.get(u).expect("contact graph out of sync with plan");
        // the first pop reaching a node settles it; avoid loops through it
        if !settled.insert(cu.dest) {
            continue;
        }
        for v in graph.successors(u) {
            let cv = q.plan.get(v).expect("contact graph out of sync with plan");
            if settled.contains(&cv.dest) || !q.contact_valid(cv) {
                continue;
            }
            // the contact must still be open when the data arrives at its
            // transmitter
            if cv.tend <= eat_u {
                continue;
            }
            let cand = eat_u.max(cv.tstart) + owlt(cv);
            if cand < dist.get(&v).copied().unwrap_or(f64::INFINITY) {
                dist.insert(v, cand);
                pred.insert(v, Some(u));
                frontier.push(v, Reverse((NotNan::new(cand).unwrap(), v)));
                if cv.dest == q.dest && best.map_or(true, |(b, _)| cand < b) {
                    best = Some((cand, v));
                }
            }
        }
    }

    let (eat, final_cid) = best?;
    let mut contacts = vec![final_cid];
    while let Some(Some(p)) = pred.get(contacts.last().unwrap()) {
        contacts.push(*p);
    }
    contacts.reverse();
    Some(assemble_route(q.plan, q.orig, q.dest, &contacts, eat))
}

/// Build a [`Route`] from an ordered contact path with a known EAT.
fn assemble_route(
    plan: &ContactPlan,
    orig: NodeId,
    dest: NodeId,
    contacts: &[ContactId],
    eat: f64,
) -> Route {
    let mut nodes = vec![orig];
    let mut tend = f64::INFINITY;
    let mut limit_cid = contacts[0];
    for &cid in contacts {
        let c = plan.get(cid).expect("route through unknown contact");
        nodes.push(c.dest);
        if c.tend <= tend {
            tend = c.tend;
            limit_cid = cid;
        }
    }
    let tstart = plan.get(contacts[0]).map(|c| c.tstart).unwrap_or(0.0);
    Route {
        orig,
        dest,
        contacts: contacts.to_vec(),
        nodes,
        tstart,
        tend,
        eat,
        limit_cid,
        nhops: contacts.len(),
    }
}

/// Compute a route's EAT forward from `now` along a contact path and
/// assemble it.
pub fn route_from_contacts(
    plan: &ContactPlan,
    orig: NodeId,
    dest: NodeId,
    now: f64,
    contacts: &[ContactId],
) -> Route {
    let mut eat = now;
    for &cid in contacts {
        let c = plan.get(cid).expect("route through unknown contact");
        eat = eat.max(c.tstart) + owlt(c);
    }
    assemble_route(plan, orig, dest, contacts, eat)
}

/// Anchored alternate-route search.
///
/// After the best route is found, its limiting contact (smallest `tend`) is
/// suppressed and the search re-runs with the previous first hop pinned as
/// an anchor; if the anchored search fails, the anchor is released for that
/// iteration. The search stops when no new route appears or `limit` routes
/// were produced.
pub fn anchored_routes(
    graph: &ContactGraph,
    plan: &ContactPlan,
    orig: NodeId,
    dest: NodeId,
    now: f64,
    relays: Option<&BTreeSet<NodeId>>,
    limit: usize,
) -> Vec<Route> {
    fn query<'a>(
        plan: &'a ContactPlan,
        orig: NodeId,
        dest: NodeId,
        now: f64,
        empty: &'a (Vec<NodeId>, BTreeSet<ContactId>),
        relays: Option<&'a BTreeSet<NodeId>>,
        suppressed: &'a BTreeSet<ContactId>,
        anchor: Option<ContactId>,
    ) -> CgrQuery<'a> {
        CgrQuery {
            plan,
            orig,
            dest,
            now,
            size: 0.0,
            visited: &empty.0,
            excluded: &empty.1,
            relays,
            suppressed,
            anchor,
        }
    }

    let empty = (Vec::new(), BTreeSet::new());
    let mut suppressed: BTreeSet<ContactId> = BTreeSet::new();
    let mut routes: Vec<Route> = Vec::new();

    let first = best_route(
        graph,
        &query(plan, orig, dest, now, &empty, relays, &suppressed, None),
    );
    let Some(first) = first else { return routes };
    routes.push(first);

    while routes.len() < limit {
        let last = routes.last().unwrap();
        let anchor = last.contacts[0];
        let limiting = last.limit_cid;
        suppressed.insert(limiting);

        let anchored = if limiting != anchor { Some(anchor) } else { None };
        let mut next = best_route(
            graph,
            &query(plan, orig, dest, now, &empty, relays, &suppressed, anchored),
        );
        if next.is_none() && anchored.is_some() {
            next = best_route(
                graph,
                &query(plan, orig, dest, now, &empty, relays, &suppressed, None),
            );
        }
        match next {
            Some(r) if !routes.iter().any(|x| x.contacts == r.contacts) => routes.push(r),
            _ => break,
        }
    }
    routes
}

/// Enumerate all simple contact paths from `orig` to `dest` by iterative
/// deepening, under a hop bound and the relay constraint. Routes come out
/// sorted by `(EAT, nhops, contacts)`.
pub fn bfs_routes(
    graph: &ContactGraph,
    plan: &ContactPlan,
    orig: NodeId,
    dest: NodeId,
    now: f64,
    relays: Option<&BTreeSet<NodeId>>,
    max_hops: usize,
) -> Vec<Route> {
    let mut routes: Vec<Route> = Vec::new();

    for depth in 1..=max_hops {
        let mut path: Vec<ContactId> = Vec::new();
        let mut nodes: Vec<NodeId> = vec![orig];
        for &cid in graph.first_hops(orig) {
            descend(
                graph, plan, dest, now, relays, depth, cid, now, &mut path, &mut nodes,
                &mut routes,
            );
        }
    }

    routes.sort_by(|a, b| {
        a.eat
            .total_cmp(&b.eat)
            .then(a.nhops.cmp(&b.nhops))
            .then(a.contacts.cmp(&b.contacts))
    });
    routes
}

#[allow(clippy::too_many_arguments)]
fn descend(
    graph: &ContactGraph,
    plan: &ContactPlan,
    dest: NodeId,
    now: f64,
    relays: Option<&BTreeSet<NodeId>>,
    depth: usize,
    cid: ContactId,
    eat: f64,
    path: &mut Vec<ContactId>,
    nodes: &mut Vec<NodeId>,
    routes: &mut Vec<Route>,
) {
    let Some(c) = plan.get(cid) else { return };
    if nodes.contains(&c.dest) || c.tend <= now || c.tend <= eat {
        return;
    }
    if c.dest != dest && relays.map_or(false, |r| !r.contains(&c.dest)) {
        return;
    }
    let eat = eat.max(c.tstart) + owlt(c);

    path.push(cid);
    nodes.push(c.dest);
    if c.dest == dest {
        // only emit at the exact depth so iterative deepening does not
        // duplicate shorter paths
        if path.len() == depth {
            routes.push(assemble_route(plan, nodes[0], dest, path, eat));
        }
    } else if path.len() < depth {
        for succ in graph.successors(cid) {
            descend(
                graph, plan, dest, now, relays, depth, succ, eat, path, nodes, routes,
            );
        }
    }
    path.pop();
    nodes.pop();
}
