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

//! The DTN node: ingress and limbo queues, the forwarding decision chain,
//! and selector-driven duct choice.

use std::collections::BTreeMap;

use log::*;

use crate::bundle::Bundle;
use crate::endpoint::Endpoint;
use crate::kernel::resources::Fifo;
use crate::kernel::{Event, Waker};
use crate::neighbor::{REQUEST_EID, SUMMARY_EID};
use crate::router::{NextHop, Router, RouterCtx, RouterVerdict, RtRecord};
use crate::simulation::Simulation;
use crate::types::{ContactId, DropReason, DuctId, EndpointId, EpiId, GenId, MgrId, NodeId, RadioId};

/// The outduct/induct pair of one duct label towards a neighbor.
#[derive(Debug, Clone, Copy)]
pub struct DuctPair {
    /// The outduct on this node.
    pub out: DuctId,
    /// The induct on the neighbor.
    pub inn: DuctId,
}

/// Selector choosing among multiple ducts towards the same neighbor.
///
/// The two- and three-band variants expect duct labels `X`, `Ka` (and
/// `opt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// Single duct only.
    Default,
    /// Critical traffic on X band, bulky science types on the optical
    /// link, the rest on Ka band.
    Criticality,
    /// Biomedical and voice on X band, bulky science types on the optical
    /// link, the rest on Ka band.
    DataType,
}

/// Data types that go over the optical link when three bands are present.
const OPTICAL_TYPES: [&str; 3] = ["pao hd video", "sci hd video", "science"];

impl Selector {
    /// Pick the duct for `bundle` among the ducts towards one neighbor.
    pub fn select<'a>(
        &self,
        ducts: &'a BTreeMap<String, DuctPair>,
        bundle: &Bundle,
    ) -> Option<&'a DuctPair> {
        if ducts.len() == 1 {
            return ducts.values().next();
        }
        let band = match self {
            Selector::Default => return None,
            Selector::Criticality => {
                if bundle.critical {
                    "X"
                } else if ducts.len() >= 3
                    && OPTICAL_TYPES.contains(&bundle.data_type.to_lowercase().as_str())
                {
                    "opt"
                } else {
                    "Ka"
                }
            }
            Selector::DataType => {
                let dt = bundle.data_type.to_lowercase();
                if dt == "biomedical" || dt == "voice" {
                    "X"
                } else if ducts.len() >= 3 && OPTICAL_TYPES.contains(&dt.as_str()) {
                    "opt"
                } else {
                    "Ka"
                }
            }
        };
        ducts.get(band)
    }
}

/// One DTN node.
#[derive(Debug)]
pub struct Node {
    /// Arena id.
    pub id: NodeId,
    /// Configuration name.
    pub name: String,
    /// Bundles waiting for a forwarding decision, with their first-time
    /// flag.
    pub in_queue: Fifo<(Bundle, bool)>,
    /// Bundles deferred for re-routing.
    pub limbo_queue: Fifo<Bundle>,
    /// Batch period of the limbo in seconds; infinite drains on demand.
    pub limbo_wait: f64,
    /// The router.
    pub router: Router,
    /// The duct selector.
    pub selector: Selector,
    /// Neighbor managers by neighbor.
    pub managers: BTreeMap<NodeId, MgrId>,
    /// The opportunistic manager, for opportunistic routers.
    pub epidemic: Option<EpiId>,
    /// Ducts towards each neighbor, by duct label.
    pub ducts: BTreeMap<NodeId, BTreeMap<String, DuctPair>>,
    /// Endpoints by id.
    pub endpoints: BTreeMap<EndpointId, Endpoint>,
    /// Generators running on this node.
    pub generators: Vec<GenId>,
    /// Radios by configuration label.
    pub radios: BTreeMap<String, RadioId>,
    /// Bundles dropped at this node.
    pub dropped: Vec<Bundle>,
    /// Name of the governing mobility model.
    pub mobility_model: String,
}

impl Simulation {
    /// Enqueue a bundle for a forwarding decision. Used both for fresh
    /// bundles and for bundles arriving from a peer.
    pub(crate) fn node_forward(&mut self, node: NodeId, bundle: Bundle) {
        let _ = self.nodes[node.index()].in_queue.try_put((bundle, true));
        self.clock.wake(Waker::NodeIngress(node));
    }

    /// Drain one bundle from the ingress queue. Routing decisions are
    /// serialized: one bundle at a time, in arrival order.
    pub(crate) fn handle_node_ingress(&mut self, node: NodeId) {
        let Some(((bundle, first_time), _)) = self.nodes[node.index()].in_queue.try_get() else {
            return;
        };
        self.process_bundle(node, bundle, first_time);
    }

    /// The forwarding decision chain for one bundle.
    fn process_bundle(&mut self, node: NodeId, mut bundle: Bundle, first_time: bool) {
        let now = self.clock.now();
        if bundle.has_errors {
            return self.drop_bundle(node, bundle, DropReason::Error);
        }
        if bundle.expired(now) {
            return self.drop_bundle(node, bundle, DropReason::Ttl);
        }
        if first_time {
            // must happen before routing so the router can exclude routes
            // through nodes already visited
            bundle.visited.push(node);
            bundle.excluded.clear();
        }
        if bundle.dest == node {
            return self.arrive(node, bundle);
        }

        let verdict = {
            let Simulation { nodes, managers, plan, schedules, .. } = self;
            let Node { router, managers: mgr_map, .. } = &mut nodes[node.index()];
            let ctx = RouterCtx {
                now,
                nid: node,
                plan: &*plan,
                managers: managers.as_slice(),
                mgr_map: &*mgr_map,
                schedules: &*schedules,
            };
            router.find_routes(&ctx, &bundle, first_time)
        };

        match verdict {
            RouterVerdict::Limbo { exclude } => self.node_limbo(node, bundle, exclude),
            RouterVerdict::Drop => self.drop_bundle(node, bundle, DropReason::RouterDrops),
            RouterVerdict::Forward { records, exclude } => {
                if records.is_empty() && exclude.is_empty() {
                    return self.drop_bundle(node, bundle, DropReason::Unroutable);
                }
                if records.is_empty() {
                    return self.node_limbo(node, bundle, exclude);
                }
                // a critical bundle seen for the first time is flooded:
                // one independent copy per selected neighbor
                let mut copies = Vec::with_capacity(records.len());
                for _ in 1..records.len() {
                    copies.push(self.counters.copy_of(&bundle));
                }
                copies.push(bundle);
                for (choice, copy) in records.into_iter().zip(copies.into_iter().rev()) {
                    debug!("{} routed towards {:?}", copy, choice.next_hop);
                    self.store_routed_bundle(node, RtRecord::new(copy, choice));
                }
            }
        }
    }

    /// Hand a routed record to the right queue manager, accounting its
    /// admission into the contact.
    fn store_routed_bundle(&mut self, node: NodeId, record: RtRecord) {
        if let Some(contact) = record.contact {
            self.plan.admit(contact.cid, record.bundle.data_vol);
        }
        match record.next_hop {
            NextHop::Neighbor(neighbor) => {
                match self.nodes[node.index()].managers.get(&neighbor).copied() {
                    Some(mgr) => self.mgr_put(mgr, record),
                    None => {
                        error!("node {} has no manager for neighbor {}", node, neighbor);
                        self.drop_bundle(node, record.bundle, DropReason::Unroutable);
                    }
                }
            }
            NextHop::Opportunistic => match self.nodes[node.index()].epidemic {
                Some(epi) => self.epi_put(epi, record),
                None => {
                    error!("node {} routed opportunistically but has no manager", node);
                    self.drop_bundle(node, record.bundle, DropReason::Unroutable);
                }
            },
        }
    }

    /// Defer a bundle for re-routing, excluding the given contacts.
    pub(crate) fn node_limbo(
        &mut self,
        node: NodeId,
        mut bundle: Bundle,
        exclude: impl IntoIterator<Item = ContactId>,
    ) {
        bundle.excluded.extend(exclude);
        let n = &mut self.nodes[node.index()];
        debug!("{} enters the limbo of node {}", bundle, n.name);
        if n.limbo_wait.is_infinite() {
            // re-examining at the same instant would loop forever; give the
            // network a second to change
            self.clock
                .schedule_in(1.0, Event::LimboDeferred { node, bundle: Box::new(bundle) });
        } else {
            let _ = n.limbo_queue.try_put(bundle);
        }
    }

    /// A deferred bundle re-enters the ingress queue (infinite
    /// `limbo_wait`).
    pub(crate) fn handle_limbo_deferred(&mut self, node: NodeId, bundle: Bundle) {
        let _ = self.nodes[node.index()].in_queue.try_put((bundle, false));
        self.clock.wake(Waker::NodeIngress(node));
    }

    /// Periodic limbo drain (finite `limbo_wait`): re-enqueue the whole
    /// batch into the ingress queue.
    pub(crate) fn handle_limbo_tick(&mut self, node: NodeId) {
        let n = &mut self.nodes[node.index()];
        let (batch, _) = n.limbo_queue.get_all();
        let wait = n.limbo_wait;
        for bundle in batch {
            let _ = self.nodes[node.index()].in_queue.try_put((bundle, false));
            self.clock.wake(Waker::NodeIngress(node));
        }
        if wait.is_finite() {
            self.clock.schedule_in(wait, Event::NodeLimboTick { node });
        }
    }

    /// The bundle reached its destination: mark arrival and hand it to the
    /// addressed endpoint.
    fn arrive(&mut self, node: NodeId, mut bundle: Bundle) {
        let now = self.clock.now();
        debug!("{} arrives at destination {}", bundle, self.nodes[node.index()].name);
        bundle.arrived = true;
        bundle.arrival_time = Some(now);

        let eid = bundle.eid;
        match self.nodes[node.index()].endpoints.get_mut(&eid) {
            Some(Endpoint::Default { data }) => data.push(bundle),
            Some(Endpoint::Queue) => match eid {
                SUMMARY_EID => self.epi_receive_summary(node, bundle),
                REQUEST_EID => self.epi_receive_request(node, bundle),
                _ => warn!("queue endpoint {} has no protocol handler", eid),
            },
            None => match self.nodes[node.index()].endpoints.get_mut(&0) {
                Some(Endpoint::Default { data }) => data.push(bundle),
                _ => warn!("node {} has no endpoint for eid {}", node, eid),
            },
        }
    }

    /// Drop a bundle copy, recording the reason.
    pub(crate) fn drop_bundle(&mut self, node: NodeId, mut bundle: Bundle, reason: DropReason) {
        let n = &mut self.nodes[node.index()];
        debug!("{} dropped at node {} ({})", bundle, n.name, reason);
        bundle.dropped = true;
        bundle.drop_reason = Some(reason);
        n.dropped.push(bundle);
    }

    /// A bundle leaves a neighbor manager: pick the duct towards the
    /// neighbor and hand the bundle to the convergence layer.
    pub(crate) fn forward_to_outduct(&mut self, node: NodeId, neighbor: NodeId, record: RtRecord) {
        let now = self.clock.now();
        if record.bundle.expired(now) {
            return self.drop_bundle(node, record.bundle, DropReason::Ttl);
        }
        let n = &self.nodes[node.index()];
        let out = n
            .ducts
            .get(&neighbor)
            .and_then(|ducts| n.selector.select(ducts, &record.bundle))
            .map(|pair| pair.out);
        match out {
            Some(out) => self.duct_send(out, record.bundle),
            None => {
                error!("node {} has no duct towards {} for {}", n.name, neighbor, record.bundle);
                self.drop_bundle(node, record.bundle, DropReason::Unroutable);
            }
        }
    }
}
