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

//! Module containing all type definitions shared across the simulator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) type IndexType = u32;

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize,
        )]
        pub struct $name(pub(crate) IndexType);

        impl $name {
            /// Index into the arena holding this component.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<usize> for $name {
            fn from(x: usize) -> Self {
                Self(x as IndexType)
            }
        }
    };
}

arena_id!(
    /// Identifier of a DTN node.
    NodeId
);
arena_id!(
    /// Identifier of a connection between two nodes.
    ConnId
);
arena_id!(
    /// Identifier of one half of a convergence-layer channel.
    DuctId
);
arena_id!(
    /// Identifier of a radio.
    RadioId
);
arena_id!(
    /// Identifier of a per-neighbor queue manager.
    MgrId
);
arena_id!(
    /// Identifier of an opportunistic (epidemic) queue manager.
    EpiId
);
arena_id!(
    /// Identifier of a traffic generator.
    GenId
);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Identifier of a contact in the contact plan.
///
/// Real contacts have non-negative ids. The two negative values are reserved
/// for the synthetic source and sink vertices of the contact graph.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContactId(pub i32);

impl ContactId {
    /// The synthetic source vertex of the contact graph.
    pub const SOURCE: ContactId = ContactId(-1);
    /// The synthetic sink vertex of the contact graph.
    pub const SINK: ContactId = ContactId(-2);

    /// Returns `true` for a contact from the contact plan (not a synthetic
    /// graph vertex).
    pub fn is_real(self) -> bool {
        self.0 >= 0
    }
}

impl std::fmt::Display for ContactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

impl From<i32> for ContactId {
    fn from(x: i32) -> Self {
        Self(x)
    }
}

/// Globally unique bundle identifier (within one simulation).
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BundleId(pub u64);

/// Copy identifier of a bundle. Copies of a critical bundle share the
/// [`BundleId`] and are told apart by this id.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CopyId(pub u32);

/// Flow identifier. All bundles emitted by one generator flow share it.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FlowId(pub u32);

/// LTP session identifier.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Endpoint identifier within a node. Endpoint `0` is the default
/// application sink.
pub type EndpointId = u32;

/// The `(bid, cid)` pair that uniquely identifies one bundle copy.
pub type BundleTag = (BundleId, CopyId);

/// Bundle priority. Lower is more urgent.
///
/// The simulator only distinguishes critical traffic (priority lane 0, may
/// pre-empt bulk traffic in overbookable queues) from bulk traffic (lane 1).
pub const CRITICAL_PRIORITY: u8 = 0;
/// Priority lane of all non-critical traffic.
pub const BULK_PRIORITY: u8 = 1;

/// Direction of a transmission through a connection.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Direction {
    /// Forward direction: delivered to the peer duct's `send` entry point.
    Fwd,
    /// Reverse direction: delivered to the peer duct's `ack` entry point
    /// (e.g. an LTP Report Segment going back to an outduct).
    Ack,
}

/// Reason why a bundle copy was dropped.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub enum DropReason {
    /// The bundle arrived at a node with transmission errors.
    Error,
    /// The bundle exceeded its time-to-live.
    Ttl,
    /// The router found neither a route nor contacts to exclude.
    Unroutable,
    /// The router explicitly requested the drop.
    RouterDrops,
    /// The node was no longer alive when the bundle arrived.
    DeadNode,
    /// The opportunistic queue was full and evicted this bundle.
    OpportunisticQueueFull,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::Error => write!(f, "error"),
            DropReason::Ttl => write!(f, "TTL"),
            DropReason::Unroutable => write!(f, "unroutable"),
            DropReason::RouterDrops => write!(f, "router_drops"),
            DropReason::DeadNode => write!(f, "dead_node"),
            DropReason::OpportunisticQueueFull => write!(f, "opportunistic queue full"),
        }
    }
}

/// Reason why a bundle was sent back to the node's limbo for re-routing.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum RerouteReason {
    /// Displaced from an overbookable queue by critical traffic, or rejected
    /// on admission for lack of capacity.
    Overbooked,
    /// Detected at send time: the bundle cannot finish propagating before the
    /// route becomes unusable.
    TransmitOverdue,
    /// The LTP session transmitting the bundle's block was cancelled.
    SessionCancelled,
}

impl std::fmt::Display for RerouteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RerouteReason::Overbooked => write!(f, "overbooked"),
            RerouteReason::TransmitOverdue => write!(f, "transmit overdue"),
            RerouteReason::SessionCancelled => write!(f, "session cancelled"),
        }
    }
}

/// Speed of light, in meters per second. Ranges in contact plans are already
/// expressed in light-seconds, so this constant only converts distances from
/// distance-gated mobility tables.
pub const LIGHT_SPEED: f64 = 299_792_458.0;

/// Simulation error.
#[derive(Error, Debug, PartialEq)]
pub enum SimError {
    /// A configuration section references a node that is not defined.
    #[error("unknown node: {0}")]
    UnknownNode(String),
    /// A node or duct references a radio that is not defined.
    #[error("unknown radio: {0}")]
    UnknownRadio(String),
    /// A connection references a duct that is not defined.
    #[error("unknown duct: {0}")]
    UnknownDuct(String),
    /// A node references a router that is not defined.
    #[error("unknown router: {0}")]
    UnknownRouter(String),
    /// A node references a generator that is not defined.
    #[error("unknown generator: {0}")]
    UnknownGenerator(String),
    /// A node or connection references a mobility model that is not defined.
    #[error("unknown mobility model: {0}")]
    UnknownMobilityModel(String),
    /// The contact plan violates a validity constraint.
    #[error("invalid contact plan: {0}")]
    InvalidContactPlan(String),
    /// The configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A duct selector could not pick a duct for a bundle.
    #[error("no duct from {node} towards {neighbor} matches the selector")]
    NoDuct {
        /// The sending node.
        node: String,
        /// The neighbor the bundle was routed towards.
        neighbor: String,
    },
    /// An LTP duct could not produce a unique session id.
    #[error("cannot create unique LTP session id at duct {0}")]
    SessionIdCollision(String),
    /// Failure while decoding an external table (contact plan, route
    /// schedule, traffic file, rate profile).
    #[error("cannot decode input table: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for SimError {
    fn from(e: serde_json::Error) -> Self {
        SimError::Decode(e.to_string())
    }
}
