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

//! The validated configuration surface of the simulator.
//!
//! Parsing and validating a scenario file into these structures is the job
//! of an external frontend; the core only consumes them (and they derive
//! `Deserialize`, so a JSON frontend is one `serde_json::from_str` away).
//! Components reference each other by name; [`crate::simulation::Simulation::build`]
//! resolves the names and fails with a [`crate::types::SimError`] on any
//! dangling reference.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::mobility::{ContactRecord, RandomWaypointParams};

/// Global bookkeeping options. The core itself only reads `monitor` and
/// `validate`; the remaining fields describe file locations for frontends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalsConfig {
    /// Identifier of this run.
    pub id: String,
    /// Input directory for auxiliary tables.
    pub indir: String,
    /// Output directory for result tables.
    pub outdir: String,
    /// Output file name.
    pub outfile: String,
    /// Log file name.
    pub logfile: String,
    /// Whether to emit per-event log messages.
    pub log: bool,
    /// Whether to collect per-bundle monitoring data.
    pub monitor: bool,
    /// Whether to track queue occupancy over time.
    pub track: bool,
    /// Sampling period for tracking, in seconds.
    pub track_dt: f64,
    /// Whether to run the validation checks after the simulation.
    pub validate: bool,
}

impl Default for GlobalsConfig {
    fn default() -> Self {
        Self {
            id: "sim".to_string(),
            indir: ".".to_string(),
            outdir: ".".to_string(),
            outfile: "results".to_string(),
            logfile: "sim.log".to_string(),
            log: false,
            monitor: true,
            track: false,
            track_dt: 1.0,
            validate: true,
        }
    }
}

/// Scenario-level options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Simulation epoch, seconds. Contact plans with absolute timestamps
    /// are shifted by this amount.
    pub epoch: f64,
    /// Seed for all randomness (BER draws included). `None` seeds from the
    /// default value `0`.
    pub seed: Option<u64>,
    /// Stop time. `None` runs to event exhaustion.
    pub until: Option<f64>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self { epoch: 0.0, seed: None, until: None }
    }
}

/// Which nodes may serve as relays for routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Relays {
    /// Every node may relay.
    All,
    /// Only the named nodes may relay.
    Only(Vec<String>),
}

impl Default for Relays {
    fn default() -> Self {
        Relays::All
    }
}

/// Routing algorithm used to build a route schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteAlgorithm {
    /// Contact-graph routing with anchored alternate-route search.
    Cgr,
    /// Exhaustive enumeration of simple paths by iterative deepening.
    Bfs,
}

/// One row of a precomputed route schedule table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteScheduleRecord {
    /// Origin node name.
    pub orig: String,
    /// Destination node name.
    pub dest: String,
    /// Traversed nodes, origin first.
    pub route: Vec<String>,
    /// Traversed contact ids, in order.
    pub contacts: Vec<i32>,
    /// Time from which the route is usable.
    pub tstart: f64,
    /// Time after which the route is unusable.
    pub tend: f64,
    /// Earliest arrival time along the route.
    pub eat: f64,
    /// Number of hops.
    pub nhops: usize,
}

/// Router specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RouterConfig {
    /// Online CGR: one best route per query, no anchoring.
    CgrBasic {
        /// Relay policy.
        #[serde(default)]
        relays: Relays,
    },
    /// Route-schedule lookup router.
    Lookup {
        /// Relay policy.
        #[serde(default)]
        relays: Relays,
        /// How many neighbors a critical bundle is flooded to. `None`
        /// floods to every proximate neighbor.
        #[serde(default)]
        max_crit: Option<usize>,
        /// Maximum number of relay hops for routes between non-relays.
        #[serde(default = "default_max_relay_hops")]
        max_relay_hops: usize,
        /// Node sub-paths that invalidate a route when contained in it.
        #[serde(default)]
        excluded_routes: Vec<Vec<String>>,
        /// Precomputed route schedule. When present and `recompute_routes`
        /// is false, it replaces online route generation.
        #[serde(default)]
        route_schedule: Option<Vec<RouteScheduleRecord>>,
        /// Force recomputation even if a schedule is provided.
        #[serde(default)]
        recompute_routes: bool,
        /// Algorithm for route generation.
        #[serde(default = "default_algorithm")]
        algorithm: RouteAlgorithm,
        /// Hop bound for route generation.
        #[serde(default = "default_max_hops")]
        max_hops: usize,
    },
    /// Static next-hop tables, per node.
    Static {
        /// `node → (destination → next hop)`. The special destination key
        /// `"default"` matches everything.
        routes: BTreeMap<String, BTreeMap<String, String>>,
    },
    /// The route is carried inside each bundle.
    Source,
    /// No contact plan: flood through the opportunistic manager.
    Opportunistic {
        /// Buffer bound of the opportunistic queue, in bits.
        #[serde(default = "default_buffer_size")]
        max_buffer_size: f64,
    },
}

fn default_max_relay_hops() -> usize {
    10
}

fn default_algorithm() -> RouteAlgorithm {
    RouteAlgorithm::Cgr
}

fn default_max_hops() -> usize {
    6
}

fn default_buffer_size() -> f64 {
    f64::INFINITY
}

/// Duct selector specification: how a node picks among multiple ducts
/// towards the same neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorConfig {
    /// Single duct only.
    Default,
    /// Critical data on `X`, the rest on `Ka` (and bulky science types on
    /// `opt` with three bands).
    Criticality,
    /// Biomedical and voice on `X`, science types on `opt`, rest on `Ka`.
    DataType,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        SelectorConfig::Default
    }
}

/// Endpoint specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointConfig {
    /// Store delivered bundles; marks arrival.
    Default,
    /// Feed delivered bundles into the opportunistic handshake queue.
    Queue,
}

/// Node specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name of the router specification to use.
    pub router: String,
    /// Names of the generators running on this node.
    #[serde(default)]
    pub generators: Vec<String>,
    /// Duct selector.
    #[serde(default)]
    pub selector: SelectorConfig,
    /// Names of the radios owned by this node.
    #[serde(default)]
    pub radios: Vec<String>,
    /// Name of the mobility model governing this node's contacts.
    pub mobility_model: String,
    /// Extra endpoints by id. Endpoint `0` always exists and defaults to
    /// [`EndpointConfig::Default`].
    #[serde(default)]
    pub endpoints: BTreeMap<u32, EndpointConfig>,
    /// Batch period of the limbo queue in seconds; `inf` drains on demand.
    #[serde(default = "default_limbo_wait")]
    pub limbo_wait: f64,
}

fn default_limbo_wait() -> f64 {
    f64::INFINITY
}

impl NodeConfig {
    /// Create a node specification with the given router and mobility model
    /// and no generators or radios.
    pub fn new(router: impl Into<String>, mobility_model: impl Into<String>) -> Self {
        Self {
            router: router.into(),
            generators: Vec::new(),
            selector: SelectorConfig::Default,
            radios: Vec::new(),
            mobility_model: mobility_model.into(),
            endpoints: BTreeMap::new(),
            limbo_wait: f64::INFINITY,
        }
    }
}

/// Kind of a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConnectionKindConfig {
    /// Always open.
    Static {
        /// Propagation delay in seconds; falls back to the mobility model's
        /// delay when `None`.
        prop_delay: Option<f64>,
    },
    /// Open/closed according to the contact plan.
    Scheduled,
    /// Open while the pair distance stays below a bound.
    Distance {
        /// Maximum distance in meters at which the link holds.
        max_distance: f64,
    },
    /// One instance per origin; destinations come in and out of view per
    /// the contact plan.
    ScheduledBroadcast,
}

/// Connection specification. One entry creates the connection in both
/// directions (each direction is its own instance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Origin node name.
    pub origin: String,
    /// Destination node name.
    pub destination: String,
    /// Kind of connection.
    pub kind: ConnectionKindConfig,
    /// Ducts running over this connection: duct label → duct spec name.
    pub ducts: BTreeMap<String, String>,
    /// Mobility model for contacts/distances of this connection.
    pub mobility_model: String,
    /// Create only the `origin → destination` direction.
    #[serde(default)]
    pub one_way: bool,
}

impl ConnectionConfig {
    /// Create a bidirectional connection specification.
    pub fn both_ways(
        origin: impl Into<String>,
        destination: impl Into<String>,
        kind: ConnectionKindConfig,
        ducts: BTreeMap<String, String>,
        mobility_model: impl Into<String>,
    ) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            kind,
            ducts,
            mobility_model: mobility_model.into(),
            one_way: false,
        }
    }
}

/// Duct specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DuctConfig {
    /// Plain pass-through convergence layer.
    Basic {
        /// Radio to transmit with.
        radio: String,
    },
    /// Licklider Transmission Protocol over a single band.
    Ltp {
        /// Radio to transmit with.
        radio: String,
        /// Block aggregation limit in bits.
        #[serde(default = "default_agg_size_limit")]
        agg_size_limit: f64,
        /// Block aggregation limit in seconds.
        #[serde(default = "default_agg_time_limit")]
        agg_time_limit: f64,
        /// Size of a data segment in bits.
        #[serde(default = "default_segment_size")]
        segment_size: f64,
        /// Seconds to wait for a report before re-sending a checkpoint.
        #[serde(default = "default_timer")]
        checkpoint_timer: f64,
        /// Seconds to wait for a report ack before re-sending a report.
        #[serde(default = "default_timer")]
        report_timer: f64,
    },
    /// Multi-band LTP: every segment duplicated across all bands.
    Mbltp {
        /// Band label → radio name.
        bands: BTreeMap<String, String>,
        /// Block aggregation limit in bits.
        #[serde(default = "default_agg_size_limit")]
        agg_size_limit: f64,
        /// Block aggregation limit in seconds.
        #[serde(default = "default_agg_time_limit")]
        agg_time_limit: f64,
        /// Size of a data segment in bits.
        #[serde(default = "default_segment_size")]
        segment_size: f64,
        /// Seconds to wait for a report before re-sending a checkpoint.
        #[serde(default = "default_timer")]
        checkpoint_timer: f64,
        /// Seconds to wait for a report ack before re-sending a report.
        #[serde(default = "default_timer")]
        report_timer: f64,
    },
    /// Parallel LTP: N independent LTP engines per bundle.
    ParallelLtp {
        /// Engine label → LTP duct spec name.
        engines: BTreeMap<String, String>,
    },
}

fn default_agg_size_limit() -> f64 {
    1e9
}

fn default_agg_time_limit() -> f64 {
    1e9
}

fn default_segment_size() -> f64 {
    8e6
}

fn default_timer() -> f64 {
    1e10
}

/// Radio specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RadioConfig {
    /// Constant rate and bit error rate.
    Basic {
        /// Data rate in bits per second.
        rate: f64,
        /// Bit error rate.
        #[serde(default)]
        ber: f64,
        /// Transmit energy in joules per bit.
        #[serde(default)]
        j_bit: f64,
    },
    /// Constant frame error rate at a given framing; the equivalent BER is
    /// derived per message.
    Coded {
        /// Data rate in bits per second.
        rate: f64,
        /// Frame error rate.
        fer: f64,
        /// Frame size in bits.
        frame_size: f64,
        /// Code rate (0, 1].
        code_rate: f64,
        /// Transmit energy in joules per bit.
        #[serde(default)]
        j_bit: f64,
    },
    /// Time-varying per-destination data rates.
    Variable {
        /// Destination node name → `(time, rate)` steps. The rate holds
        /// from its time until the next step; zero means inactive.
        profiles: BTreeMap<String, Vec<(f64, f64)>>,
        /// Transmit energy in joules per bit.
        #[serde(default)]
        j_bit: f64,
    },
}

/// Latency class of a Markov traffic flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LatencyClass {
    /// Latency requirement on the order of seconds.
    Seconds,
    /// Latency requirement on the order of minutes.
    Minutes,
    /// Latency requirement on the order of hours.
    Hours,
}

/// One flow of a Markov traffic table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficFlowConfig {
    /// Origin node name.
    pub origin: String,
    /// Destination node name.
    pub destination: String,
    /// Data type tag.
    pub data_type: String,
    /// Latency class; maps to seconds through the fixed lookup table.
    pub latency_class: LatencyClass,
    /// Emission rate while on, in bits per second.
    pub rate: f64,
    /// Fraction of time the flow is on, in `[0, 1]`.
    pub duty_cycle: f64,
    /// Mean duration of an on phase, in seconds.
    pub on_duration: f64,
    /// Time the flow starts existing.
    pub start: f64,
    /// Time the flow stops existing.
    pub end: f64,
    /// Whether the flow's bundles are critical.
    pub critical: bool,
    /// Size of each emitted bundle in bits.
    #[serde(default = "default_segment_size")]
    pub bundle_size: f64,
}

/// Generator specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeneratorConfig {
    /// Emit fixed-size bundles at a constant bit rate.
    ConstantBitRate {
        /// Rate in bits per second.
        rate: f64,
        /// Emission duration in seconds.
        until: f64,
        /// Start time in seconds.
        #[serde(default)]
        tstart: f64,
        /// Size of each bundle in bits.
        bundle_size: f64,
        /// Bundle time-to-live in seconds.
        #[serde(default = "default_ttl")]
        bundle_ttl: f64,
        /// Data type tag.
        data_type: String,
        /// Whether the bundles are critical.
        #[serde(default)]
        critical: bool,
        /// Destination node; `None` picks a random node per bundle.
        #[serde(default)]
        destination: Option<String>,
    },
    /// Emit a file as a burst of bundles.
    File {
        /// File size in bits.
        size: f64,
        /// Start time in seconds.
        #[serde(default)]
        tstart: f64,
        /// Size of each bundle in bits.
        bundle_size: f64,
        /// Bundle time-to-live in seconds.
        #[serde(default = "default_ttl")]
        bundle_ttl: f64,
        /// Data type tag.
        data_type: String,
        /// Whether the bundles are critical.
        #[serde(default)]
        critical: bool,
        /// Destination node; `None` picks a random node per repetition.
        #[serde(default)]
        destination: Option<String>,
        /// How many times to send the file.
        #[serde(default = "default_repeat")]
        repeat: u32,
        /// Pause between repetitions in seconds.
        #[serde(default)]
        wait: f64,
    },
    /// Emit a file to every other node (DTN has no multicast routing, so
    /// one copy per destination).
    FileBroadcaster {
        /// File size in bits.
        size: f64,
        /// Start time in seconds.
        #[serde(default)]
        tstart: f64,
        /// Size of each bundle in bits.
        bundle_size: f64,
        /// Bundle time-to-live in seconds.
        #[serde(default = "default_ttl")]
        bundle_ttl: f64,
        /// Data type tag.
        data_type: String,
        /// Whether the bundles are critical.
        #[serde(default)]
        critical: bool,
        /// How many times to send the file.
        #[serde(default = "default_repeat")]
        repeat: u32,
        /// Pause between repetitions in seconds.
        #[serde(default)]
        wait: f64,
    },
    /// On/off Markov flows from a traffic table.
    Markov {
        /// The flows originating at this generator's node.
        flows: Vec<TrafficFlowConfig>,
    },
}

fn default_ttl() -> f64 {
    f64::INFINITY
}

fn default_repeat() -> u32 {
    1
}

/// Mobility model specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MobilityConfig {
    /// Contacts from a contact plan table.
    Scheduled {
        /// The contact records.
        contacts: Vec<ContactRecord>,
        /// Whether the record timestamps are absolute (epoch-based) and
        /// must be shifted by the scenario epoch.
        #[serde(default)]
        absolute_times: bool,
    },
    /// All links permanently up.
    Static {
        /// Propagation delay of every link in seconds.
        prop_delay: f64,
    },
    /// Random-waypoint motion.
    RandomWaypoint {
        /// Model parameters.
        params: RandomWaypointParams,
    },
}

/// A full, validated scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Global bookkeeping options.
    pub globals: GlobalsConfig,
    /// Scenario options.
    pub scenario: ScenarioConfig,
    /// Nodes by name.
    pub nodes: BTreeMap<String, NodeConfig>,
    /// Connections.
    pub connections: Vec<ConnectionConfig>,
    /// Mobility models by name.
    pub mobility: BTreeMap<String, MobilityConfig>,
    /// Radios by name.
    pub radios: BTreeMap<String, RadioConfig>,
    /// Ducts by name.
    pub ducts: BTreeMap<String, DuctConfig>,
    /// Routers by name.
    pub routers: BTreeMap<String, RouterConfig>,
    /// Generators by name.
    pub generators: BTreeMap<String, GeneratorConfig>,
    /// Report aliases to collect; empty collects all.
    pub reports: Vec<String>,
}

impl SimConfig {
    /// Decode a scenario from JSON.
    pub fn from_json(json: &str) -> Result<Self, crate::types::SimError> {
        Ok(serde_json::from_str(json)?)
    }
}
