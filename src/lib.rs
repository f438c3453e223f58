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

#![deny(missing_docs, missing_debug_implementations)]

//! # DtnSim
//!
//! This is a library for simulating end-to-end bundle delivery across
//! delay/disruption-tolerant networks (DTNs) with scheduled, distance-gated,
//! or static links.
//!
//! ## Main Concepts
//!
//! The [`simulation::Simulation`] is the main datastructure to operate on. It
//! owns every component of a scenario (nodes, connections, radios, ducts,
//! neighbor managers, generators) in flat arenas addressed by copyable ids,
//! and drives them from a single virtual-time event loop (see
//! [`kernel::EventQueue`]). Every process is an explicit state machine
//! whose suspension points are scheduled [`kernel::Event`]s and whose blocking
//! queue operations go through the waker-carrying resources in
//! [`kernel::resources`].
//!
//! Traffic is generated as [`bundle::Bundle`]s, routed by contact-graph
//! routing ([`router::cgr`]) or one of the simpler routers, queued per
//! neighbor in an overbookable priority queue ([`queue`]), and shipped over a
//! convergence layer ([`duct`]) which may run the Licklider Transmission
//! Protocol (LTP) in single-band, multi-band, or parallel flavors. The
//! physical layer is modeled by [`radio`] (serialization delay, bit errors,
//! energy) and [`connection`] (propagation, contact windows, losses).
//!
//! A scenario is described by a validated [`config::SimConfig`]; after
//! [`simulation::Simulation::run`] finishes, [`report`] collects the
//! per-bundle lifecycle tables and [`report::validation`] checks the
//! conservation and data-volume invariants.
//!
//! ## Example usage
//!
//! The following example simulates a constant-bit-rate flow over a single
//! static link between two nodes:
//!
//! ```
//! use dtnsim::prelude::*;
//!
//! fn main() -> Result<(), SimError> {
//!     let config = two_node_scenario();
//!     let mut sim = Simulation::build(&config)?;
//!     sim.run()?;
//!
//!     let results = sim.collect_results();
//!     assert!(!results.table("arrived").is_empty());
//!     Ok(())
//! }
//!
//! fn two_node_scenario() -> SimConfig {
//!     // nodes N1 -> N2, one basic duct over a static connection
//!     let mut config = SimConfig::default();
//!     config.scenario.until = Some(100.0);
//!     config.radios.insert(
//!         "radio".into(),
//!         RadioConfig::Basic { rate: 1e6, ber: 0.0, j_bit: 0.0 },
//!     );
//!     config.ducts.insert("duct".into(), DuctConfig::Basic { radio: "radio".into() });
//!     config.mobility.insert("static".into(), MobilityConfig::Static { prop_delay: 1.0 });
//!     config.routers.insert(
//!         "router".into(),
//!         RouterConfig::Static {
//!             routes: maplit::btreemap! {
//!                 "N1".into() => maplit::btreemap! { "N2".into() => "N2".into() },
//!             },
//!         },
//!     );
//!     config.generators.insert(
//!         "cbr".into(),
//!         GeneratorConfig::ConstantBitRate {
//!             rate: 1e5,
//!             until: 10.0,
//!             tstart: 0.0,
//!             bundle_size: 1e4,
//!             bundle_ttl: f64::INFINITY,
//!             data_type: "voice".into(),
//!             critical: false,
//!             destination: Some("N2".into()),
//!         },
//!     );
//!     let mut n1 = NodeConfig::new("router", "static");
//!     n1.generators.push("cbr".into());
//!     n1.radios.push("radio".into());
//!     let mut n2 = NodeConfig::new("router", "static");
//!     n2.radios.push("radio".into());
//!     config.nodes.insert("N1".into(), n1);
//!     config.nodes.insert("N2".into(), n2);
//!     config.connections.push(ConnectionConfig::both_ways(
//!         "N1",
//!         "N2",
//!         ConnectionKindConfig::Static { prop_delay: Some(1.0) },
//!         maplit::btreemap! { "duct".into() => "duct".into() },
//!         "static",
//!     ));
//!     config
//! }
//! ```

pub mod bundle;
pub mod config;
pub mod connection;
pub mod duct;
pub mod endpoint;
pub mod generator;
pub mod kernel;
pub mod message;
pub mod mobility;
pub mod neighbor;
pub mod node;
pub mod prelude;
pub mod queue;
pub mod radio;
pub mod report;
pub mod router;
pub mod segment;
pub mod simulation;
pub mod types;

#[cfg(test)]
mod test;
