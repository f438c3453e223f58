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

//! The bundle data model and the simulation-local id counters.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::types::{
    BundleId, BundleTag, ContactId, CopyId, DropReason, EndpointId, FlowId, NodeId,
    BULK_PRIORITY, CRITICAL_PRIORITY,
};

/// A bundle: the unit of application data routed through the network.
///
/// Bundles are value types. A copy of a critical bundle is a clone with a
/// fresh [`CopyId`] (see [`IdCounters::copy_of`]); the `(bid, cid)` pair
/// identifies exactly one copy throughout its lifecycle, which ends in
/// exactly one of three terminal states: arrived, dropped, or still stored
/// somewhere when the simulation shuts down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    /// Unique bundle id, immutable after creation.
    pub bid: BundleId,
    /// Copy id, `0` for the original.
    pub cid: CopyId,
    /// Flow this bundle belongs to.
    pub fid: FlowId,
    /// Node that created the bundle.
    pub orig: NodeId,
    /// Final destination node.
    pub dest: NodeId,
    /// Endpoint at the destination (`0` is the default application sink).
    pub eid: EndpointId,
    /// Application data type tag (e.g. `"voice"`, `"file"`).
    pub data_type: String,
    /// Data volume in bits.
    pub data_vol: f64,
    /// Allowable latency in seconds, as requested by the application.
    pub allowable_lat: f64,
    /// Time-to-live in seconds, measured from `creation_time`.
    pub ttl: f64,
    /// Whether this bundle is critical (flooded over up to `max_crit`
    /// neighbors and allowed to pre-empt bulk traffic).
    pub critical: bool,
    /// Simulation time at which the bundle was created.
    pub creation_time: f64,
    /// Nodes this copy has visited, in order. Never repeats a node before
    /// arrival.
    pub visited: Vec<NodeId>,
    /// Contacts this copy must not be routed through again.
    pub excluded: BTreeSet<ContactId>,
    /// Terminal flag: delivered at the destination endpoint.
    pub arrived: bool,
    /// Time of arrival, if `arrived`.
    pub arrival_time: Option<f64>,
    /// Terminal flag: dropped.
    pub dropped: bool,
    /// Why the bundle was dropped, if `dropped`.
    pub drop_reason: Option<DropReason>,
    /// Total propagation delay accumulated in transit.
    pub prop_delay: f64,
    /// Set when a transmission corrupted the bundle.
    pub has_errors: bool,
    /// Explicit route carried in the bundle, used by the source router.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_route: Option<Vec<NodeId>>,
    /// Summary vector carried by opportunistic handshake bundles. Empty for
    /// regular traffic.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manifest: Vec<BundleTag>,
}

impl Bundle {
    /// The `(bid, cid)` pair identifying this copy.
    pub fn tag(&self) -> BundleTag {
        (self.bid, self.cid)
    }

    /// Priority lane of this bundle: [`CRITICAL_PRIORITY`] if critical,
    /// [`BULK_PRIORITY`] otherwise.
    pub fn priority(&self) -> u8 {
        if self.critical {
            CRITICAL_PRIORITY
        } else {
            BULK_PRIORITY
        }
    }

    /// End-to-end latency, available once the bundle arrived.
    pub fn latency(&self) -> Option<f64> {
        self.arrival_time.map(|t| t - self.creation_time)
    }

    /// Whether the bundle's time-to-live is exceeded at time `now`.
    pub fn expired(&self, now: f64) -> bool {
        now - self.creation_time >= self.ttl
    }

    /// Number of bits this bundle occupies on the wire.
    pub fn num_bits(&self) -> f64 {
        self.data_vol
    }
}

impl std::fmt::Display for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bundle ({}, {})", self.bid.0, self.cid.0)
    }
}

/// Parameters describing a bundle to create. The simulation fills in the ids
/// and the creation time (see [`crate::simulation::Simulation`]).
#[derive(Debug, Clone)]
pub struct NewBundle {
    /// Origin node.
    pub orig: NodeId,
    /// Destination node.
    pub dest: NodeId,
    /// Destination endpoint.
    pub eid: EndpointId,
    /// Data type tag.
    pub data_type: String,
    /// Data volume in bits.
    pub data_vol: f64,
    /// Allowable latency in seconds.
    pub allowable_lat: f64,
    /// Time-to-live in seconds.
    pub ttl: f64,
    /// Critical flag.
    pub critical: bool,
    /// Flow to account the bundle under, if the generator owns one.
    pub fid: Option<FlowId>,
}

impl NewBundle {
    /// Create the parameters for a plain bulk bundle with infinite TTL.
    pub fn new(orig: NodeId, dest: NodeId, data_type: impl Into<String>, data_vol: f64) -> Self {
        Self {
            orig,
            dest,
            eid: 0,
            data_type: data_type.into(),
            data_vol,
            allowable_lat: f64::INFINITY,
            ttl: f64::INFINITY,
            critical: false,
            fid: None,
        }
    }
}

/// Simulation-local id counters.
///
/// Deliberately not globals: they are owned by the simulation instance and
/// reset with it, which keeps independent runs reproducible.
#[derive(Debug, Default, Clone)]
pub(crate) struct IdCounters {
    next_bid: u64,
    next_fid: u32,
    copies: HashMap<BundleId, u32>,
}

impl IdCounters {
    /// Allocate a fresh flow id.
    pub(crate) fn new_fid(&mut self) -> FlowId {
        self.next_fid += 1;
        FlowId(self.next_fid)
    }

    /// Materialize a bundle from its parameters at time `now`.
    pub(crate) fn new_bundle(&mut self, spec: NewBundle, now: f64) -> Bundle {
        self.next_bid += 1;
        let bid = BundleId(self.next_bid);
        self.copies.insert(bid, 0);
        let fid = spec.fid.unwrap_or_else(|| {
            self.next_fid += 1;
            FlowId(self.next_fid)
        });
        Bundle {
            bid,
            cid: CopyId(0),
            fid,
            orig: spec.orig,
            dest: spec.dest,
            eid: spec.eid,
            data_type: spec.data_type,
            data_vol: spec.data_vol,
            allowable_lat: spec.allowable_lat,
            ttl: spec.ttl,
            critical: spec.critical,
            creation_time: now,
            visited: Vec::new(),
            excluded: BTreeSet::new(),
            arrived: false,
            arrival_time: None,
            dropped: false,
            drop_reason: None,
            prop_delay: 0.0,
            has_errors: false,
            source_route: None,
            manifest: Vec::new(),
        }
    }

    /// Clone `bundle` into a new copy with the next copy id for its bid.
    pub(crate) fn copy_of(&mut self, bundle: &Bundle) -> Bundle {
        let counter = self.copies.entry(bundle.bid).or_insert(0);
        *counter += 1;
        let mut copy = bundle.clone();
        copy.cid = CopyId(*counter);
        copy
    }
}

