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

//! The route-lookup pipeline: route schedule, route-list validation,
//! proximate-node selection, and the backlog-aware try-route step.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use log::*;
use serde::{Deserialize, Serialize};

use super::cgr::{self, ContactGraph};
use super::{NextHop, Route, RouteChoice, RouterCtx, RouterVerdict};
use crate::bundle::Bundle;
use crate::config::RouteAlgorithm;
use crate::mobility::ContactPlan;
use crate::types::{ContactId, NodeId, SimError};

/// One precomputed route option of a route schedule, with the derived
/// fields the lookup pipeline filters on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteOption {
    /// The route.
    pub route: Route,
    /// First-hop neighbor.
    pub next_hop: NodeId,
    /// First-hop contact.
    pub next_cid: ContactId,
    /// Nodes the route traverses, without the origin.
    pub hops: BTreeSet<NodeId>,
    /// Contacts the route traverses.
    pub contact_set: BTreeSet<ContactId>,
}

impl From<Route> for RouteOption {
    fn from(route: Route) -> Self {
        let next_cid = route.contacts[0];
        let next_hop = route.nodes[1];
        let hops = route.nodes.iter().skip(1).copied().collect();
        let contact_set = route.contacts.iter().copied().collect();
        Self { route, next_hop, next_cid, hops, contact_set }
    }
}

/// The precomputed table of `(orig, dest) → route options`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSchedule {
    options: BTreeMap<(NodeId, NodeId), Vec<RouteOption>>,
}

impl RouteSchedule {
    /// Build the schedule online for all ordered node pairs, from time zero.
    pub fn build(
        plan: &ContactPlan,
        nodes: &[NodeId],
        algorithm: RouteAlgorithm,
        relays: Option<&BTreeSet<NodeId>>,
        max_hops: usize,
    ) -> Self {
        let graph = ContactGraph::build(plan);
        let mut options: BTreeMap<(NodeId, NodeId), Vec<RouteOption>> = BTreeMap::new();
        for (&orig, &dest) in nodes.iter().cartesian_product(nodes.iter()) {
            if orig == dest {
                continue;
            }
            let routes = match algorithm {
                RouteAlgorithm::Cgr => {
                    cgr::anchored_routes(&graph, plan, orig, dest, 0.0, relays, max_hops * 8)
                }
                RouteAlgorithm::Bfs => {
                    cgr::bfs_routes(&graph, plan, orig, dest, 0.0, relays, max_hops)
                }
            };
            if !routes.is_empty() {
                options.insert((orig, dest), routes.into_iter().map(Into::into).collect());
            }
        }
        let mut schedule = Self { options };
        schedule.sort();
        schedule
    }

    /// Load the schedule from a precomputed table. `resolve` maps node
    /// names to ids.
    pub fn from_records(
        records: &[crate::config::RouteScheduleRecord],
        resolve: &dyn Fn(&str) -> Option<NodeId>,
    ) -> Result<Self, SimError> {
        let mut options: BTreeMap<(NodeId, NodeId), Vec<RouteOption>> = BTreeMap::new();
        for rec in records {
            let lookup = |name: &str| {
                resolve(name).ok_or_else(|| SimError::UnknownNode(name.to_string()))
            };
            let orig = lookup(&rec.orig)?;
            let dest = lookup(&rec.dest)?;
            let nodes = rec.route.iter().map(|n| lookup(n)).collect::<Result<Vec<_>, _>>()?;
            let contacts: Vec<ContactId> = rec.contacts.iter().map(|&c| c.into()).collect();
            if contacts.is_empty() || nodes.len() != contacts.len() + 1 {
                return Err(SimError::Decode(format!(
                    "route schedule row {} -> {} has inconsistent route/contacts",
                    rec.orig, rec.dest
                )));
            }
            let route = Route {
                orig,
                dest,
                contacts: contacts.clone(),
                nodes,
                tstart: rec.tstart,
                tend: rec.tend,
                eat: rec.eat,
                // the table does not carry the limiting contact; any
                // consumer that needs it recomputes from the plan
                limit_cid: contacts[0],
                nhops: rec.nhops,
            };
            options.entry((orig, dest)).or_default().push(route.into());
        }
        let mut schedule = Self { options };
        schedule.sort();
        Ok(schedule)
    }

    fn sort(&mut self) {
        for opts in self.options.values_mut() {
            opts.sort_by(|a, b| {
                a.route
                    .tstart
                    .total_cmp(&b.route.tstart)
                    .then(a.route.eat.total_cmp(&b.route.eat))
                    .then(a.next_cid.cmp(&b.next_cid))
            });
        }
    }

    /// Route options from `orig` to `dest`.
    pub fn get(&self, orig: NodeId, dest: NodeId) -> Option<&[RouteOption]> {
        self.options.get(&(orig, dest)).map(Vec::as_slice)
    }

    /// Drop the options that violate the relay policy or contain an
    /// excluded sub-path.
    ///
    /// A route is removed when (a) a mid-route hop is not a relay, (b) both
    /// ends are non-relays and the route crosses more than `max_relay_hops`
    /// relays, or (c) the route contains one of `excluded_routes` as a
    /// contiguous node sub-path.
    pub fn validate(
        &mut self,
        relays: Option<&BTreeSet<NodeId>>,
        max_relay_hops: usize,
        excluded_routes: &[Vec<NodeId>],
    ) {
        let is_relay =
            |n: &NodeId| relays.map_or(true, |r| r.contains(n));
        for opts in self.options.values_mut() {
            opts.retain(|opt| {
                let nodes = &opt.route.nodes;
                let mid = &nodes[1..nodes.len() - 1];
                if mid.iter().any(|n| !is_relay(n)) {
                    return false;
                }
                if !is_relay(&nodes[0]) && !is_relay(nodes.last().unwrap()) {
                    let relay_hops = nodes.iter().filter(|n| is_relay(n)).count();
                    if relay_hops > max_relay_hops {
                        return false;
                    }
                }
                !excluded_routes
                    .iter()
                    .any(|sub| !sub.is_empty() && nodes.windows(sub.len()).any(|w| w == &sub[..]))
            });
        }
        self.options.retain(|_, opts| !opts.is_empty());
    }

    /// Total number of stored route options.
    pub fn len(&self) -> usize {
        self.options.values().map(Vec::len).sum()
    }

    /// Whether the schedule holds no routes.
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

/// Router that serves queries from a validated route schedule.
#[derive(Debug, Clone)]
pub struct LookupRouter {
    /// Key of this router's schedule in the simulation's schedule table.
    pub(crate) schedule_key: String,
    /// How many neighbors a critical bundle is flooded to.
    pub(crate) max_crit: Option<usize>,
    /// Routing calls served.
    pub calls: u64,
}

impl LookupRouter {
    /// Create a lookup router reading the schedule stored under
    /// `schedule_key`.
    pub fn new(schedule_key: impl Into<String>, max_crit: Option<usize>) -> Self {
        Self { schedule_key: schedule_key.into(), max_crit, calls: 0 }
    }

    pub(crate) fn find_routes(
        &mut self,
        ctx: &RouterCtx,
        bundle: &Bundle,
        first_time: bool,
    ) -> RouterVerdict {
        self.calls += 1;
        let Some(schedule) = ctx.schedules.get(&self.schedule_key) else {
            error!("no route schedule under key {}", self.schedule_key);
            return RouterVerdict::unroutable();
        };

        // step 1: route list for this (orig, dest) pair
        let Some(options) = schedule.get(ctx.nid, bundle.dest) else {
            return RouterVerdict::unroutable();
        };

        // step 2: proximate node list, one earliest-starting option per
        // next-hop neighbor
        let candidates = proximate_options(ctx, bundle, options);
        if candidates.is_empty() {
            return RouterVerdict::Forward { records: Vec::new(), exclude: Vec::new() };
        }

        // step 3: how many neighbors to use
        let take = if bundle.critical && first_time {
            self.max_crit.unwrap_or(candidates.len())
        } else {
            1
        };

        // step 4: try each selected option against the backlog model
        let mut records = Vec::new();
        let mut exclude = Vec::new();
        for opt in candidates.into_iter().take(take) {
            match try_route(ctx, bundle, opt) {
                Ok(choice) => records.push(choice),
                Err(Some(cid)) => exclude.push(cid),
                Err(None) => {}
            }
        }
        RouterVerdict::Forward { records, exclude }
    }
}

/// Filter the route options for `bundle` and reduce them to one option per
/// next-hop neighbor (the earliest-starting one).
fn proximate_options<'a>(
    ctx: &RouterCtx,
    bundle: &Bundle,
    options: &'a [RouteOption],
) -> Vec<&'a RouteOption> {
    let visited: BTreeSet<NodeId> = bundle.visited.iter().copied().collect();
    let mut taken: BTreeSet<NodeId> = BTreeSet::new();
    let mut result = Vec::new();
    for opt in options {
        if opt.route.tend <= ctx.now {
            continue;
        }
        if !opt.hops.is_disjoint(&visited) {
            continue;
        }
        if !opt.contact_set.is_disjoint(&bundle.excluded) {
            continue;
        }
        // the nominal route capacity, not the residual one: admission
        // accounting is the business of the overbookable queues, which may
        // still pre-empt bulk traffic to fit a critical bundle
        let capacity = opt
            .route
            .contacts
            .iter()
            .map(|&c| ctx.plan.get(c).map(|c| c.capacity()).unwrap_or(0.0))
            .fold(f64::INFINITY, f64::min);
        if capacity < bundle.data_vol {
            continue;
        }
        // options are sorted by start time, so the first one per neighbor
        // is the earliest-starting one
        if taken.insert(opt.next_hop) {
            result.push(opt);
        }
    }
    result
}

/// Walk a route option simulating the cumulative backlog ahead of the
/// bundle. Per hop, `EDT = max(EAT, tstart) + backlog/rate` and
/// `EAT = EDT + size/rate + range`; the option is invalidated at the first
/// hop where `EAT ≥ tend`, returning the hop's contact for exclusion.
fn try_route(
    ctx: &RouterCtx,
    bundle: &Bundle,
    opt: &RouteOption,
) -> Result<RouteChoice, Option<ContactId>> {
    let contact = *ctx.plan.get(opt.next_cid).ok_or(None)?;

    // initial backlog at our own neighbor queue; beyond the first hop the
    // state of other nodes' queues is unknown and assumed empty
    let mut backlog = ctx
        .mgr_map
        .get(&opt.next_hop)
        .and_then(|mid| ctx.managers.get(mid.index()))
        .map(|mgr| mgr.backlog_for(opt.next_cid))
        .unwrap_or(0.0);

    let mut eat = ctx.now;
    for &cid in &opt.route.contacts {
        let hop = ctx.plan.get(cid).ok_or(None)?;
        let edt = eat.max(hop.tstart) + backlog / hop.rate;
        eat = edt + bundle.data_vol / hop.rate + hop.range;
        if eat >= hop.tend {
            debug!(
                "route over {} misses contact {} (EAT {:.3} >= tend {:.3})",
                opt.next_hop, cid, eat, hop.tend
            );
            return Err(Some(cid));
        }
        backlog = 0.0;
    }

    Ok(RouteChoice {
        contact: Some(contact),
        route: opt.route.clone(),
        priority: bundle.priority(),
        next_hop: NextHop::Neighbor(opt.next_hop),
    })
}
