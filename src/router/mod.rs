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

//! Routing: route data model, router dispatch, and the simple routers.
//!
//! The heavy lifting lives in the submodules: [`cgr`] implements Dijkstra
//! over the contact graph with anchored alternate-route search and the BFS
//! enumeration, [`lookup`] the route-schedule lookup pipeline with the
//! backlog-aware try-route step.

use std::collections::{BTreeMap, BTreeSet};

use log::*;
use serde::{Deserialize, Serialize};

use crate::bundle::Bundle;
use crate::mobility::{Contact, ContactPlan};
use crate::neighbor::NeighborManager;
use crate::types::{ContactId, MgrId, NodeId};

pub mod cgr;
pub mod lookup;

pub use lookup::{LookupRouter, RouteOption, RouteSchedule};

/// A validated path through the contact graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Origin node.
    pub orig: NodeId,
    /// Destination node.
    pub dest: NodeId,
    /// Traversed contacts, in order. Empty for routes of the static,
    /// source, and opportunistic routers.
    pub contacts: Vec<ContactId>,
    /// Traversed nodes, origin first, destination last.
    pub nodes: Vec<NodeId>,
    /// Time from which the route is usable.
    pub tstart: f64,
    /// Time after which the route is unusable (earliest contact end).
    pub tend: f64,
    /// Earliest arrival time along the route.
    pub eat: f64,
    /// The contact whose end limits the route.
    pub limit_cid: ContactId,
    /// Number of hops.
    pub nhops: usize,
}

impl Route {
    /// A route that never expires, used by routers that do not know the
    /// contact plan.
    pub fn open(orig: NodeId, dest: NodeId) -> Self {
        Self {
            orig,
            dest,
            contacts: Vec::new(),
            nodes: vec![orig, dest],
            tstart: 0.0,
            tend: f64::INFINITY,
            eat: 0.0,
            limit_cid: ContactId::SINK,
            nhops: 1,
        }
    }
}

/// Next hop of a routing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextHop {
    /// Hand the bundle to the manager of this neighbor.
    Neighbor(NodeId),
    /// Hand the bundle to the opportunistic manager.
    Opportunistic,
}

/// A routing decision for one bundle, without the bundle itself. The node
/// attaches the bundle (or a critical copy) to form an [`RtRecord`].
#[derive(Debug, Clone)]
pub struct RouteChoice {
    /// First contact of the route, when the router knows the contact plan.
    pub contact: Option<Contact>,
    /// The route.
    pub route: Route,
    /// Priority lane for the neighbor queue.
    pub priority: u8,
    /// Where to enqueue the bundle.
    pub next_hop: NextHop,
}

/// The unit passed between the router, the neighbor manager, and the limbo:
/// a bundle together with its routing decision.
#[derive(Debug, Clone)]
pub struct RtRecord {
    /// The bundle.
    pub bundle: Bundle,
    /// First contact of the chosen route, if known.
    pub contact: Option<Contact>,
    /// The chosen route.
    pub route: Route,
    /// Priority lane.
    pub priority: u8,
    /// Where the record was (or is to be) enqueued.
    pub next_hop: NextHop,
}

impl RtRecord {
    /// Combine a bundle with a routing decision.
    pub fn new(bundle: Bundle, choice: RouteChoice) -> Self {
        Self {
            bundle,
            contact: choice.contact,
            route: choice.route,
            priority: choice.priority,
            next_hop: choice.next_hop,
        }
    }

    /// The contact id of the record's first contact, if known.
    pub fn cid(&self) -> Option<ContactId> {
        self.contact.map(|c| c.cid)
    }
}

/// What the node should do with a bundle after asking the router.
#[derive(Debug)]
pub enum RouterVerdict {
    /// Enqueue the records; exclude the listed contacts for this bundle.
    /// Both lists empty means the bundle is unroutable and is dropped.
    /// Records empty with exclusions present defers the bundle to the
    /// limbo.
    Forward {
        /// Routing decisions, one per copy to enqueue.
        records: Vec<RouteChoice>,
        /// Contacts to add to the bundle's excluded set.
        exclude: Vec<ContactId>,
    },
    /// Defer the bundle to the limbo with the given exclusions.
    Limbo {
        /// Contacts to add to the bundle's excluded set.
        exclude: Vec<ContactId>,
    },
    /// Drop the bundle (reason `router_drops`).
    Drop,
}

impl RouterVerdict {
    /// An "unroutable" verdict: no records, no exclusions.
    pub fn unroutable() -> Self {
        RouterVerdict::Forward { records: Vec::new(), exclude: Vec::new() }
    }
}

/// Read context handed to a router for one query.
pub struct RouterCtx<'a> {
    /// Current simulation time.
    pub now: f64,
    /// The querying node.
    pub nid: NodeId,
    /// The contact plan with residual capacities.
    pub plan: &'a ContactPlan,
    /// The neighbor-manager arena, for backlog queries.
    pub managers: &'a [NeighborManager],
    /// Managers of the querying node, by neighbor.
    pub mgr_map: &'a BTreeMap<NodeId, MgrId>,
    /// Validated route schedules by router name.
    pub schedules: &'a BTreeMap<String, RouteSchedule>,
}

impl std::fmt::Debug for RouterCtx<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterCtx").field("now", &self.now).field("nid", &self.nid).finish()
    }
}

/// A node's router.
#[derive(Debug, Clone)]
pub enum Router {
    /// Online CGR, best route only.
    CgrBasic(CgrBasicRouter),
    /// Route-schedule lookup.
    Lookup(LookupRouter),
    /// Static next-hop table.
    Static(StaticRouter),
    /// Route carried in the bundle.
    Source(SourceRouter),
    /// Opportunistic flooding.
    Opportunistic(OpportunisticRouter),
}

impl Router {
    /// Route `bundle`. `first_time` is true the first time this node sees
    /// the bundle.
    pub fn find_routes(
        &mut self,
        ctx: &RouterCtx,
        bundle: &Bundle,
        first_time: bool,
    ) -> RouterVerdict {
        match self {
            Router::CgrBasic(r) => r.find_routes(ctx, bundle),
            Router::Lookup(r) => r.find_routes(ctx, bundle, first_time),
            Router::Static(r) => r.find_routes(ctx, bundle),
            Router::Source(r) => r.find_routes(ctx, bundle),
            Router::Opportunistic(r) => r.find_routes(ctx, bundle),
        }
    }

    /// Number of routing calls served so far.
    pub fn calls(&self) -> u64 {
        match self {
            Router::CgrBasic(r) => r.calls,
            Router::Lookup(r) => r.calls,
            Router::Static(r) => r.calls,
            Router::Source(r) => r.calls,
            Router::Opportunistic(r) => r.calls,
        }
    }

    /// Whether this router forwards through the opportunistic manager.
    pub fn is_opportunistic(&self) -> bool {
        matches!(self, Router::Opportunistic(_))
    }
}

/// Online CGR router: computes the absolute best route per query, with no
/// anchoring and no alternate routes.
#[derive(Debug, Clone)]
pub struct CgrBasicRouter {
    /// The contact graph, shared shape for all queries.
    pub(crate) graph: cgr::ContactGraph,
    /// Relay set; `None` means every node relays.
    pub(crate) relays: Option<BTreeSet<NodeId>>,
    /// Routing calls served.
    pub calls: u64,
}

impl CgrBasicRouter {
    /// Create the router over the given contact plan.
    pub fn new(plan: &ContactPlan, relays: Option<BTreeSet<NodeId>>) -> Self {
        Self { graph: cgr::ContactGraph::build(plan), relays, calls: 0 }
    }

    fn find_routes(&mut self, ctx: &RouterCtx, bundle: &Bundle) -> RouterVerdict {
        self.calls += 1;
        let query = cgr::CgrQuery {
            plan: ctx.plan,
            orig: ctx.nid,
            dest: bundle.dest,
            now: ctx.now,
            size: bundle.data_vol,
            visited: &bundle.visited,
            excluded: &bundle.excluded,
            relays: self.relays.as_ref(),
            suppressed: &BTreeSet::new(),
            anchor: None,
        };
        let Some(route) = cgr::best_route(&self.graph, &query) else {
            return RouterVerdict::unroutable();
        };

        let cid = route.contacts[0];
        let contact = *ctx.plan.get(cid).expect("route through unknown contact");
        let choice = RouteChoice {
            contact: Some(contact),
            route,
            priority: bundle.priority(),
            next_hop: NextHop::Neighbor(contact.dest),
        };
        RouterVerdict::Forward { records: vec![choice], exclude: Vec::new() }
    }
}

/// Router with a static next-hop table.
#[derive(Debug, Clone)]
pub struct StaticRouter {
    /// Destination → next hop.
    pub(crate) next_hop: BTreeMap<NodeId, NodeId>,
    /// Fallback next hop for unlisted destinations.
    pub(crate) default: Option<NodeId>,
    /// Routing calls served.
    pub calls: u64,
}

impl StaticRouter {
    /// Create a static router from its next-hop table.
    pub fn new(next_hop: BTreeMap<NodeId, NodeId>, default: Option<NodeId>) -> Self {
        Self { next_hop, default, calls: 0 }
    }

    fn find_routes(&mut self, ctx: &RouterCtx, bundle: &Bundle) -> RouterVerdict {
        self.calls += 1;
        let next = self.next_hop.get(&bundle.dest).copied().or(self.default);
        let Some(next) = next else {
            return RouterVerdict::unroutable();
        };
        let choice = RouteChoice {
            contact: None,
            route: Route::open(ctx.nid, bundle.dest),
            priority: bundle.priority(),
            next_hop: NextHop::Neighbor(next),
        };
        RouterVerdict::Forward { records: vec![choice], exclude: Vec::new() }
    }
}

/// Router following the explicit route carried inside each bundle.
#[derive(Debug, Clone, Default)]
pub struct SourceRouter {
    /// Routing calls served.
    pub calls: u64,
}

impl SourceRouter {
    /// Create a source router.
    pub fn new() -> Self {
        Self::default()
    }

    fn find_routes(&mut self, ctx: &RouterCtx, bundle: &Bundle) -> RouterVerdict {
        self.calls += 1;
        let Some(route) = bundle.source_route.as_ref() else {
            warn!("{} carries no source route", bundle);
            return RouterVerdict::unroutable();
        };
        let Some(idx) = route.iter().position(|&n| n == ctx.nid) else {
            return RouterVerdict::unroutable();
        };
        if idx + 1 >= route.len() {
            error!("{} reached the end of its source route before its destination", bundle);
            return RouterVerdict::Drop;
        }
        let choice = RouteChoice {
            contact: None,
            route: Route::open(ctx.nid, bundle.dest),
            priority: bundle.priority(),
            next_hop: NextHop::Neighbor(route[idx + 1]),
        };
        RouterVerdict::Forward { records: vec![choice], exclude: Vec::new() }
    }
}

/// Opportunistic router: no contact plan; every bundle goes to the
/// opportunistic manager, which floods it via its handshake protocol.
#[derive(Debug, Clone, Default)]
pub struct OpportunisticRouter {
    /// Routing calls served.
    pub calls: u64,
}

impl OpportunisticRouter {
    /// Create an opportunistic router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh record towards the opportunistic manager. Also used by
    /// the epidemic manager for its handshake bundles.
    pub fn new_choice(nid: NodeId, bundle: &Bundle) -> RouteChoice {
        RouteChoice {
            contact: None,
            route: Route::open(nid, bundle.dest),
            priority: bundle.priority(),
            next_hop: NextHop::Opportunistic,
        }
    }

    fn find_routes(&mut self, ctx: &RouterCtx, bundle: &Bundle) -> RouterVerdict {
        self.calls += 1;
        let choice = Self::new_choice(ctx.nid, bundle);
        RouterVerdict::Forward { records: vec![choice], exclude: Vec::new() }
    }
}
