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

//! # The simulation environment
//!
//! [`Simulation`] owns every component of a scenario in flat arenas and
//! drives them from the virtual-time event loop. It is built from a
//! validated [`SimConfig`]; dangling references between configuration
//! sections surface as [`SimError`]s here, before any event runs.

use std::collections::BTreeMap;

use log::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::bundle::IdCounters;
use crate::config::{
    ConnectionKindConfig, DuctConfig, GeneratorConfig, MobilityConfig, RadioConfig, Relays,
    RouterConfig, SelectorConfig, SimConfig,
};
use crate::connection::{union_view_intervals, ConnKind, Connection};
use crate::duct::{
    BasicInduct, BasicOutduct, Duct, DuctKind, DuctParent, LtpInduct, LtpOutduct, MbltpInduct,
    MbltpOutduct, ParallelInduct, ParallelOutduct,
};
use crate::endpoint::Endpoint;
use crate::generator::{latency_seconds, GenKind, Generator, MarkovFlow};
use crate::kernel::resources::{Fifo, Semaphore};
use crate::kernel::{Event, EventQueue, Waker};
use crate::mobility::{random_waypoint_table, ContactPlan, MobilityModel};
use crate::neighbor::{EpidemicManager, NeighborManager, REQUEST_EID, SUMMARY_EID};
use crate::node::{DuctPair, Node, Selector};
use crate::radio::{Radio, RadioKind, RateProfile};
use crate::router::{
    CgrBasicRouter, LookupRouter, OpportunisticRouter, RouteSchedule, Router, SourceRouter,
    StaticRouter,
};
use crate::types::{
    ConnId, DuctId, EpiId, GenId, MgrId, NodeId, RadioId, SimError,
};

/// The simulation environment: all components, the event loop, and the
/// simulation-local counters.
#[derive(Debug)]
pub struct Simulation {
    /// Virtual clock and event heap.
    pub(crate) clock: EventQueue,
    /// Stop time, if any.
    pub(crate) until: Option<f64>,
    /// Scenario epoch in seconds.
    pub(crate) epoch: f64,
    /// The one source of randomness (BER draws, random destinations,
    /// waypoint motion, Markov dwells).
    pub(crate) rng: StdRng,
    /// Node arena.
    pub(crate) nodes: Vec<Node>,
    /// Node name → id.
    pub(crate) node_names: BTreeMap<String, NodeId>,
    /// Connection arena.
    pub(crate) conns: Vec<Connection>,
    /// `(orig, dest)` → connection.
    pub(crate) conn_index: BTreeMap<(NodeId, NodeId), ConnId>,
    /// Duct arena.
    pub(crate) ducts: Vec<Duct>,
    /// Radio arena.
    pub(crate) radios: Vec<Radio>,
    /// Neighbor manager arena.
    pub(crate) managers: Vec<NeighborManager>,
    /// Opportunistic manager arena.
    pub(crate) epidemics: Vec<EpidemicManager>,
    /// Generator arena.
    pub(crate) generators: Vec<Generator>,
    /// The global contact plan with residual capacities.
    pub(crate) plan: ContactPlan,
    /// Mobility models by name.
    pub(crate) models: BTreeMap<String, MobilityModel>,
    /// Validated route schedules by router name.
    pub(crate) schedules: BTreeMap<String, RouteSchedule>,
    /// Simulation-local id counters.
    pub(crate) counters: IdCounters,
    /// LTP segments lost on closed connections.
    pub(crate) lost_segments: u64,
    /// Whether per-bundle monitoring is on.
    pub(crate) monitor: bool,
    /// Report aliases to collect; empty collects all.
    pub(crate) reports: Vec<String>,
}

impl Simulation {
    /// Current virtual time.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// The scenario epoch.
    pub fn epoch(&self) -> f64 {
        self.epoch
    }

    /// Resolve a node name.
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.node_names.get(name).copied()
    }

    /// The name of a node.
    pub fn node_name(&self, node: NodeId) -> &str {
        &self.nodes[node.index()].name
    }

    /// The contact plan.
    pub fn contact_plan(&self) -> &ContactPlan {
        &self.plan
    }

    /// Number of pending events.
    pub fn pending_events(&self) -> usize {
        self.clock.len()
    }

    /// Run the simulation until the configured stop time, or until no
    /// event is pending.
    pub fn run(&mut self) -> Result<(), SimError> {
        let until = self.until;
        info!(
            "running simulation ({} nodes, {} contacts, until {:?})",
            self.nodes.len(),
            self.plan.len(),
            until
        );
        while let Some(event) = self.clock.pop(until) {
            self.dispatch(event);
        }
        info!("simulation finished at t={:.3}", self.clock.now());
        Ok(())
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Wake(Waker::NodeIngress(node)) => self.handle_node_ingress(node),
            Event::Wake(Waker::NodeLimbo(node)) => self.handle_limbo_tick(node),
            Event::Wake(Waker::DuctIngress(duct)) => self.handle_duct_ingress(duct),
            Event::Wake(Waker::TryExtract(mgr)) => self.handle_try_extract(mgr),
            Event::Wake(Waker::RadioKick(radio)) => self.try_start_radio(radio),
            Event::CbrTick { gen } => self.handle_cbr_tick(gen),
            Event::FileEmit { gen, repetition } => self.handle_file_emit(gen, repetition),
            Event::MarkovPhase { gen, flow, on } => self.handle_markov_phase(gen, flow, on),
            Event::MarkovTick { gen, flow, phase } => self.handle_markov_tick(gen, flow, phase),
            Event::NodeLimboTick { node } => self.handle_limbo_tick(node),
            Event::LimboDeferred { node, bundle } => self.handle_limbo_deferred(node, *bundle),
            Event::MgrContactOpen { mgr, index } => self.handle_mgr_contact_open(mgr, index),
            Event::MgrContactClose { mgr, index } => self.handle_mgr_contact_close(mgr, index),
            Event::ExtractorResume { mgr } => self.handle_extractor_resume(mgr),
            Event::ConnOpen { conn, index } => self.handle_conn_open(conn, index),
            Event::ConnClose { conn, index } => self.handle_conn_close(conn, index),
            Event::BroadcastOpen { conn, dest, index } => {
                self.handle_broadcast_open(conn, dest, index)
            }
            Event::BroadcastClose { conn, dest, index } => {
                self.handle_broadcast_close(conn, dest, index)
            }
            Event::Deliver { conn, duct, msg, dir, ber, view_epoch } => {
                self.handle_deliver(conn, duct, *msg, dir, ber, view_epoch)
            }
            Event::RadioTxDone { radio } => self.handle_radio_tx_done(radio),
            Event::RadioProfileStep { radio, dest, index } => {
                self.handle_radio_profile_step(radio, dest, index)
            }
            Event::CheckpointTimer { duct, sid, ckpt } => {
                self.handle_checkpoint_timer(duct, sid, ckpt)
            }
            Event::ReportTimer { duct, sid, rid } => self.handle_report_timer(duct, sid, rid),
            Event::SessionTimer { duct, sid } => self.handle_session_timer(duct, sid),
        }
    }

    /// Build a simulation from a validated configuration.
    pub fn build(config: &SimConfig) -> Result<Self, SimError> {
        let mut sim = Simulation {
            clock: EventQueue::new(),
            until: config.scenario.until,
            epoch: config.scenario.epoch,
            rng: StdRng::seed_from_u64(config.scenario.seed.unwrap_or(0)),
            nodes: Vec::new(),
            node_names: BTreeMap::new(),
            conns: Vec::new(),
            conn_index: BTreeMap::new(),
            ducts: Vec::new(),
            radios: Vec::new(),
            managers: Vec::new(),
            epidemics: Vec::new(),
            generators: Vec::new(),
            plan: ContactPlan::new(),
            models: BTreeMap::new(),
            schedules: BTreeMap::new(),
            counters: IdCounters::default(),
            lost_segments: 0,
            monitor: config.globals.monitor,
            reports: config.reports.clone(),
        };
        sim.build_nodes(config)?;
        sim.build_radios(config)?;
        sim.build_mobility(config)?;
        sim.build_connections(config)?;
        sim.build_static_contacts()?;
        sim.build_managers();
        sim.build_routers(config)?;
        sim.build_generators(config)?;
        Ok(sim)
    }

    fn build_nodes(&mut self, config: &SimConfig) -> Result<(), SimError> {
        for (name, ncfg) in &config.nodes {
            if !config.mobility.contains_key(&ncfg.mobility_model) {
                return Err(SimError::UnknownMobilityModel(ncfg.mobility_model.clone()));
            }
            if !config.routers.contains_key(&ncfg.router) {
                return Err(SimError::UnknownRouter(ncfg.router.clone()));
            }
            for gen in &ncfg.generators {
                if !config.generators.contains_key(gen) {
                    return Err(SimError::UnknownGenerator(gen.clone()));
                }
            }
            let id = NodeId::from(self.nodes.len());
            let mut endpoints = BTreeMap::new();
            endpoints.insert(0, Endpoint::default_sink());
            for (&eid, ecfg) in &ncfg.endpoints {
                let ep = match ecfg {
                    crate::config::EndpointConfig::Default => Endpoint::default_sink(),
                    crate::config::EndpointConfig::Queue => Endpoint::Queue,
                };
                endpoints.insert(eid, ep);
            }
            let selector = match ncfg.selector {
                SelectorConfig::Default => Selector::Default,
                SelectorConfig::Criticality => Selector::Criticality,
                SelectorConfig::DataType => Selector::DataType,
            };
            self.node_names.insert(name.clone(), id);
            self.nodes.push(Node {
                id,
                name: name.clone(),
                in_queue: Fifo::new(),
                limbo_queue: Fifo::new(),
                limbo_wait: ncfg.limbo_wait,
                router: Router::Source(SourceRouter::new()),
                selector,
                managers: BTreeMap::new(),
                epidemic: None,
                ducts: BTreeMap::new(),
                endpoints,
                generators: Vec::new(),
                radios: BTreeMap::new(),
                dropped: Vec::new(),
                mobility_model: ncfg.mobility_model.clone(),
            });
        }
        Ok(())
    }

    fn build_radios(&mut self, config: &SimConfig) -> Result<(), SimError> {
        for (name, ncfg) in &config.nodes {
            let node = self.node_names[name];
            for label in &ncfg.radios {
                let rcfg = config
                    .radios
                    .get(label)
                    .ok_or_else(|| SimError::UnknownRadio(label.clone()))?;
                let id = RadioId::from(self.radios.len());
                let kind = match rcfg {
                    RadioConfig::Basic { rate, ber, j_bit } => {
                        RadioKind::Basic { rate: *rate, ber: *ber, j_bit: *j_bit }
                    }
                    RadioConfig::Coded { rate, fer, frame_size, code_rate, j_bit } => {
                        RadioKind::Coded {
                            rate: *rate,
                            fer: *fer,
                            frame_size: *frame_size,
                            code_rate: *code_rate,
                            j_bit: *j_bit,
                        }
                    }
                    RadioConfig::Variable { profiles, j_bit } => {
                        let mut resolved = BTreeMap::new();
                        let mut active = BTreeMap::new();
                        for (dest_name, steps) in profiles {
                            let dest = self
                                .node_names
                                .get(dest_name)
                                .copied()
                                .ok_or_else(|| SimError::UnknownNode(dest_name.clone()))?;
                            let profile = RateProfile::new(steps.clone());
                            for (index, &(t, _)) in profile.steps.iter().enumerate() {
                                if t.is_finite() {
                                    self.clock.schedule_at(
                                        t,
                                        Event::RadioProfileStep { radio: id, dest, index },
                                    );
                                }
                            }
                            active.insert(dest, Semaphore::new(profile.rate_at(0.0) > 0.0));
                            resolved.insert(dest, profile);
                        }
                        RadioKind::Variable { profiles: resolved, active, j_bit: *j_bit }
                    }
                };
                self.radios.push(Radio {
                    id,
                    node,
                    label: label.clone(),
                    queue: Fifo::new(),
                    current: None,
                    energy: 0.0,
                    kind,
                });
                self.nodes[node.index()].radios.insert(label.clone(), id);
            }
        }
        Ok(())
    }

    fn build_mobility(&mut self, config: &SimConfig) -> Result<(), SimError> {
        for (name, mcfg) in &config.mobility {
            let model = match mcfg {
                MobilityConfig::Scheduled { contacts, absolute_times } => {
                    let mut cids = Vec::with_capacity(contacts.len());
                    for rec in contacts {
                        let orig = self.resolve_node(&rec.orig)?;
                        let dest = self.resolve_node(&rec.dest)?;
                        let shift = if *absolute_times { self.epoch } else { 0.0 };
                        cids.push(self.plan.add_contact(
                            orig,
                            dest,
                            rec.tstart - shift,
                            rec.tend - shift,
                            rec.rate,
                            rec.range,
                        )?);
                    }
                    MobilityModel::Scheduled { contacts: cids }
                }
                MobilityConfig::Static { prop_delay } => {
                    MobilityModel::Static { prop_delay: *prop_delay, contacts: Vec::new() }
                }
                MobilityConfig::RandomWaypoint { params } => {
                    let users: Vec<NodeId> = config
                        .nodes
                        .iter()
                        .filter(|(_, n)| &n.mobility_model == name)
                        .map(|(n, _)| self.node_names[n])
                        .collect();
                    let table = random_waypoint_table(&users, params, &mut self.rng);
                    MobilityModel::RandomWaypoint { table }
                }
            };
            self.models.insert(name.clone(), model);
        }
        Ok(())
    }

    fn resolve_node(&self, name: &str) -> Result<NodeId, SimError> {
        self.node_names.get(name).copied().ok_or_else(|| SimError::UnknownNode(name.to_string()))
    }

    fn node_radio(&self, node: NodeId, label: &str) -> Result<RadioId, SimError> {
        self.nodes[node.index()]
            .radios
            .get(label)
            .copied()
            .ok_or_else(|| SimError::UnknownRadio(label.to_string()))
    }

    fn build_connections(&mut self, config: &SimConfig) -> Result<(), SimError> {
        let mut broadcast_by_origin: BTreeMap<NodeId, ConnId> = BTreeMap::new();

        for ccfg in &config.connections {
            let orig = self.resolve_node(&ccfg.origin)?;
            let dest = self.resolve_node(&ccfg.destination)?;
            let model = self
                .models
                .get(&ccfg.mobility_model)
                .ok_or_else(|| SimError::UnknownMobilityModel(ccfg.mobility_model.clone()))?
                .clone();

            let mut directions = vec![(orig, dest)];
            if !ccfg.one_way {
                directions.push((dest, orig));
            }
            for (src, dst) in directions {
                // one duct pair per configured label
                for (label, duct_name) in &ccfg.ducts {
                    let dcfg = config
                        .ducts
                        .get(duct_name)
                        .ok_or_else(|| SimError::UnknownDuct(duct_name.clone()))?;
                    let pair = self.create_duct_pair(config, src, dst, label, dcfg, None)?;
                    self.nodes[src.index()]
                        .ducts
                        .entry(dst)
                        .or_default()
                        .insert(label.clone(), pair);
                }

                match &ccfg.kind {
                    ConnectionKindConfig::ScheduledBroadcast => {
                        let conn = match broadcast_by_origin.get(&src) {
                            Some(&conn) => conn,
                            None => {
                                let conn = ConnId::from(self.conns.len());
                                self.conns.push(Connection {
                                    id: conn,
                                    orig: src,
                                    dest: src,
                                    active: false,
                                    prop_delay: 0.0,
                                    lost: Vec::new(),
                                    kind: ConnKind::Broadcast {
                                        intervals: BTreeMap::new(),
                                        in_view: Default::default(),
                                        epoch: BTreeMap::new(),
                                        delay: BTreeMap::new(),
                                    },
                                });
                                broadcast_by_origin.insert(src, conn);
                                conn
                            }
                        };
                        let windows = union_view_intervals(&self.plan.pair_plan(src, dst));
                        for (index, &(ts, te, _)) in windows.iter().enumerate() {
                            if ts.is_finite() {
                                self.clock.schedule_at(
                                    ts,
                                    Event::BroadcastOpen { conn, dest: dst, index },
                                );
                            }
                            if te.is_finite() {
                                self.clock.schedule_at(
                                    te,
                                    Event::BroadcastClose { conn, dest: dst, index },
                                );
                            }
                        }
                        if let ConnKind::Broadcast { intervals, .. } =
                            &mut self.conns[conn.index()].kind
                        {
                            intervals.insert(dst, windows);
                        }
                        self.conn_index.insert((src, dst), conn);
                    }
                    kind => {
                        let conn = ConnId::from(self.conns.len());
                        let (active, prop_delay, ckind) = match kind {
                            ConnectionKindConfig::Static { prop_delay } => {
                                let delay = (*prop_delay)
                                    .or_else(|| model.static_prop_delay())
                                    .unwrap_or(0.0);
                                (true, delay, ConnKind::Static)
                            }
                            ConnectionKindConfig::Scheduled => {
                                let plan = self.plan.pair_plan(src, dst);
                                for (index, c) in plan.iter().enumerate() {
                                    if c.tstart.is_finite() {
                                        self.clock
                                            .schedule_at(c.tstart, Event::ConnOpen { conn, index });
                                    }
                                    if c.tend.is_finite() {
                                        self.clock
                                            .schedule_at(c.tend, Event::ConnClose { conn, index });
                                    }
                                }
                                (false, 0.0, ConnKind::Scheduled { plan })
                            }
                            ConnectionKindConfig::Distance { max_distance } => {
                                let table = model.distance_table().ok_or_else(|| {
                                    SimError::InvalidConfig(format!(
                                        "connection {} -> {} is distance-gated but model {} \
                                         has no distance table",
                                        ccfg.origin, ccfg.destination, ccfg.mobility_model
                                    ))
                                })?;
                                let intervals = table.open_intervals(src, dst, *max_distance);
                                for (index, &(ts, te, _)) in intervals.iter().enumerate() {
                                    if ts.is_finite() {
                                        self.clock.schedule_at(ts, Event::ConnOpen { conn, index });
                                    }
                                    if te.is_finite() {
                                        self.clock
                                            .schedule_at(te, Event::ConnClose { conn, index });
                                    }
                                }
                                (false, 0.0, ConnKind::Distance { intervals })
                            }
                            ConnectionKindConfig::ScheduledBroadcast => unreachable!(),
                        };
                        self.conns.push(Connection {
                            id: conn,
                            orig: src,
                            dest: dst,
                            active,
                            prop_delay,
                            lost: Vec::new(),
                            kind: ckind,
                        });
                        self.conn_index.insert((src, dst), conn);
                    }
                }
            }
        }
        Ok(())
    }

    /// Create an outduct on `src` and its peer induct on `dst`.
    fn create_duct_pair(
        &mut self,
        config: &SimConfig,
        src: NodeId,
        dst: NodeId,
        label: &str,
        dcfg: &DuctConfig,
        parent: Option<(DuctId, DuctId)>,
    ) -> Result<DuctPair, SimError> {
        let out = DuctId::from(self.ducts.len());
        let inn = DuctId::from(self.ducts.len() + 1);
        let (out_parent, in_parent) = match parent {
            Some((po, pi)) => (DuctParent::Duct(po), DuctParent::Duct(pi)),
            None => (DuctParent::Node(src), DuctParent::Node(dst)),
        };

        let (out_kind, in_kind) = match dcfg {
            DuctConfig::Basic { radio } => (
                DuctKind::BasicOut(BasicOutduct { radio: self.node_radio(src, radio)? }),
                DuctKind::BasicIn(BasicInduct {}),
            ),
            DuctConfig::Ltp {
                radio,
                agg_size_limit,
                agg_time_limit,
                segment_size,
                checkpoint_timer,
                report_timer,
            } => (
                DuctKind::LtpOut(LtpOutduct::new(
                    self.node_radio(src, radio)?,
                    *agg_size_limit,
                    *agg_time_limit,
                    *segment_size,
                    *checkpoint_timer,
                )),
                DuctKind::LtpIn(LtpInduct::new(self.node_radio(dst, radio)?, *report_timer)),
            ),
            DuctConfig::Mbltp {
                bands,
                agg_size_limit,
                agg_time_limit,
                segment_size,
                checkpoint_timer,
                report_timer,
            } => {
                let mut out_radios = Vec::with_capacity(bands.len());
                let mut in_radios = Vec::with_capacity(bands.len());
                for radio in bands.values() {
                    out_radios.push(self.node_radio(src, radio)?);
                    in_radios.push(self.node_radio(dst, radio)?);
                }
                (
                    DuctKind::MbltpOut(MbltpOutduct::new(
                        out_radios,
                        *agg_size_limit,
                        *agg_time_limit,
                        *segment_size,
                        *checkpoint_timer,
                    )),
                    DuctKind::MbltpIn(MbltpInduct::new(in_radios, *report_timer)),
                )
            }
            DuctConfig::ParallelLtp { engines } => {
                // the parallel pair is created first so the engines can
                // point at it; engines follow right after
                self.ducts.push(Duct {
                    id: out,
                    label: label.to_string(),
                    node: src,
                    neighbor: dst,
                    parent: out_parent,
                    peer: inn,
                    in_queue: Fifo::new(),
                    kind: DuctKind::ParOut(ParallelOutduct {
                        engines: Vec::new(),
                        status: BTreeMap::new(),
                    }),
                });
                self.ducts.push(Duct {
                    id: inn,
                    label: label.to_string(),
                    node: dst,
                    neighbor: src,
                    parent: in_parent,
                    peer: out,
                    in_queue: Fifo::new(),
                    kind: DuctKind::ParIn(ParallelInduct {
                        engines: Vec::new(),
                        handlers: BTreeMap::new(),
                    }),
                });

                let mut engine_outs = Vec::with_capacity(engines.len());
                let mut engine_ins = Vec::with_capacity(engines.len());
                for (engine_label, engine_duct) in engines {
                    let ecfg = config
                        .ducts
                        .get(engine_duct)
                        .ok_or_else(|| SimError::UnknownDuct(engine_duct.clone()))?;
                    if !matches!(ecfg, DuctConfig::Ltp { .. }) {
                        return Err(SimError::InvalidConfig(format!(
                            "parallel LTP engine {} must be an LTP duct",
                            engine_duct
                        )));
                    }
                    let engine =
                        self.create_duct_pair(config, src, dst, engine_label, ecfg, Some((out, inn)))?;
                    engine_outs.push(engine.out);
                    engine_ins.push(engine.inn);
                }
                if let DuctKind::ParOut(state) = &mut self.ducts[out.index()].kind {
                    state.engines = engine_outs;
                }
                if let DuctKind::ParIn(state) = &mut self.ducts[inn.index()].kind {
                    state.engines = engine_ins;
                }
                return Ok(DuctPair { out, inn });
            }
        };

        self.ducts.push(Duct {
            id: out,
            label: label.to_string(),
            node: src,
            neighbor: dst,
            parent: out_parent,
            peer: inn,
            in_queue: Fifo::new(),
            kind: out_kind,
        });
        self.ducts.push(Duct {
            id: inn,
            label: label.to_string(),
            node: dst,
            neighbor: src,
            parent: in_parent,
            peer: out,
            in_queue: Fifo::new(),
            kind: in_kind,
        });
        Ok(DuctPair { out, inn })
    }

    /// The nominal transmit rate of a duct towards its neighbor.
    fn duct_datarate(&self, duct: DuctId) -> f64 {
        let d = &self.ducts[duct.index()];
        match &d.kind {
            DuctKind::BasicOut(s) => self.radios[s.radio.index()].datarate(d.neighbor),
            DuctKind::LtpOut(s) => self.radios[s.radio.index()].datarate(d.neighbor),
            DuctKind::MbltpOut(s) => {
                s.radios.iter().map(|r| self.radios[r.index()].datarate(d.neighbor)).sum()
            }
            DuctKind::ParOut(s) => s.engines.iter().map(|&e| self.duct_datarate(e)).sum(),
            _ => 0.0,
        }
    }

    /// Synthesize the infinite contacts of static mobility models, now
    /// that ducts exist and link rates are known.
    fn build_static_contacts(&mut self) -> Result<(), SimError> {
        let mut new_contacts: Vec<(String, NodeId, NodeId, f64, f64)> = Vec::new();
        for (&(src, dst), &conn) in &self.conn_index {
            if !matches!(self.conns[conn.index()].kind, ConnKind::Static) {
                continue;
            }
            let model_name = self.nodes[src.index()].mobility_model.clone();
            let Some(MobilityModel::Static { prop_delay, .. }) = self.models.get(&model_name)
            else {
                continue;
            };
            let rate: f64 = self.nodes[src.index()]
                .ducts
                .get(&dst)
                .map(|pairs| pairs.values().map(|p| self.duct_datarate(p.out)).sum())
                .unwrap_or(0.0);
            new_contacts.push((model_name, src, dst, rate, *prop_delay));
        }
        for (model_name, src, dst, rate, range) in new_contacts {
            let cid = self.plan.add_contact(src, dst, 0.0, f64::INFINITY, rate, range)?;
            if let Some(MobilityModel::Static { contacts, .. }) = self.models.get_mut(&model_name)
            {
                contacts.push(cid);
            }
        }
        Ok(())
    }

    /// Create the per-neighbor managers and schedule their contact
    /// open/close events.
    fn build_managers(&mut self) {
        let pairs: Vec<(NodeId, NodeId)> = self.conn_index.keys().copied().collect();
        for (src, dst) in pairs {
            if src == dst || self.nodes[src.index()].managers.contains_key(&dst) {
                continue;
            }
            let id = MgrId::from(self.managers.len());
            let plan = self.plan.pair_plan(src, dst);
            for (index, c) in plan.iter().enumerate() {
                if c.tstart.is_finite() {
                    self.clock.schedule_at(c.tstart, Event::MgrContactOpen { mgr: id, index });
                }
                if c.tend.is_finite() {
                    self.clock.schedule_at(c.tend, Event::MgrContactClose { mgr: id, index });
                }
            }
            self.managers.push(NeighborManager::new(id, src, dst, plan));
            self.nodes[src.index()].managers.insert(dst, id);
        }
    }

    fn build_routers(&mut self, config: &SimConfig) -> Result<(), SimError> {
        let all_nodes: Vec<NodeId> = (0..self.nodes.len()).map(NodeId::from).collect();
        for (name, ncfg) in &config.nodes {
            let node = self.node_names[name];
            let rcfg = config
                .routers
                .get(&ncfg.router)
                .ok_or_else(|| SimError::UnknownRouter(ncfg.router.clone()))?;

            let router = match rcfg {
                RouterConfig::CgrBasic { relays } => {
                    let relays = self.resolve_relays(relays)?;
                    Router::CgrBasic(CgrBasicRouter::new(&self.plan, relays))
                }
                RouterConfig::Lookup {
                    relays,
                    max_crit,
                    max_relay_hops,
                    excluded_routes,
                    route_schedule,
                    recompute_routes,
                    algorithm,
                    max_hops,
                } => {
                    if !self.schedules.contains_key(&ncfg.router) {
                        let relay_set = self.resolve_relays(relays)?;
                        let mut schedule = match (route_schedule, recompute_routes) {
                            (Some(records), false) => {
                                let names = &self.node_names;
                                RouteSchedule::from_records(records, &|n| {
                                    names.get(n).copied()
                                })?
                            }
                            _ => RouteSchedule::build(
                                &self.plan,
                                &all_nodes,
                                *algorithm,
                                relay_set.as_ref(),
                                *max_hops,
                            ),
                        };
                        let excluded: Vec<Vec<NodeId>> = excluded_routes
                            .iter()
                            .map(|path| {
                                path.iter().map(|n| self.resolve_node(n)).collect()
                            })
                            .collect::<Result<_, _>>()?;
                        schedule.validate(relay_set.as_ref(), *max_relay_hops, &excluded);
                        debug!(
                            "router {} holds {} validated routes",
                            ncfg.router,
                            schedule.len()
                        );
                        self.schedules.insert(ncfg.router.clone(), schedule);
                    }
                    Router::Lookup(LookupRouter::new(ncfg.router.clone(), *max_crit))
                }
                RouterConfig::Static { routes } => {
                    let mut table = BTreeMap::new();
                    let mut default = None;
                    if let Some(entries) = routes.get(name) {
                        for (dest, hop) in entries {
                            let hop = self.resolve_node(hop)?;
                            if dest == "default" {
                                default = Some(hop);
                            } else {
                                table.insert(self.resolve_node(dest)?, hop);
                            }
                        }
                    }
                    Router::Static(StaticRouter::new(table, default))
                }
                RouterConfig::Source => Router::Source(SourceRouter::new()),
                RouterConfig::Opportunistic { max_buffer_size } => {
                    let epi = EpiId::from(self.epidemics.len());
                    self.epidemics.push(EpidemicManager::new(epi, node, *max_buffer_size));
                    let n = &mut self.nodes[node.index()];
                    n.epidemic = Some(epi);
                    n.endpoints.entry(SUMMARY_EID).or_insert(Endpoint::Queue);
                    n.endpoints.entry(REQUEST_EID).or_insert(Endpoint::Queue);
                    Router::Opportunistic(OpportunisticRouter::new())
                }
            };
            self.nodes[node.index()].router = router;
        }
        Ok(())
    }

    fn resolve_relays(
        &self,
        relays: &Relays,
    ) -> Result<Option<std::collections::BTreeSet<NodeId>>, SimError> {
        match relays {
            Relays::All => Ok(None),
            Relays::Only(names) => {
                Ok(Some(names.iter().map(|n| self.resolve_node(n)).collect::<Result<_, _>>()?))
            }
        }
    }

    fn build_generators(&mut self, config: &SimConfig) -> Result<(), SimError> {
        for (name, ncfg) in &config.nodes {
            let node = self.node_names[name];
            for label in &ncfg.generators {
                let gcfg = config
                    .generators
                    .get(label)
                    .ok_or_else(|| SimError::UnknownGenerator(label.clone()))?;
                let id = GenId::from(self.generators.len());
                let kind = match gcfg {
                    GeneratorConfig::ConstantBitRate {
                        rate,
                        until,
                        tstart,
                        bundle_size,
                        bundle_ttl,
                        data_type,
                        critical,
                        destination,
                    } => {
                        let dest = destination
                            .as_ref()
                            .map(|d| self.resolve_node(d))
                            .transpose()?;
                        self.clock.schedule_at(*tstart, Event::CbrTick { gen: id });
                        GenKind::Cbr {
                            rate: *rate,
                            until: *until,
                            tstart: *tstart,
                            bundle_size: *bundle_size,
                            ttl: *bundle_ttl,
                            data_type: data_type.clone(),
                            critical: *critical,
                            dest,
                            fid: self.counters.new_fid(),
                        }
                    }
                    GeneratorConfig::File {
                        size,
                        tstart,
                        bundle_size,
                        bundle_ttl,
                        data_type,
                        critical,
                        destination,
                        repeat,
                        wait,
                    } => {
                        let dest = destination
                            .as_ref()
                            .map(|d| self.resolve_node(d))
                            .transpose()?;
                        self.clock
                            .schedule_at(*tstart, Event::FileEmit { gen: id, repetition: 0 });
                        GenKind::File {
                            nbnd: (size / bundle_size).ceil() as u32,
                            bundle_size: *bundle_size,
                            ttl: *bundle_ttl,
                            data_type: data_type.clone(),
                            critical: *critical,
                            dest,
                            repeat: *repeat,
                            wait: *wait,
                            fid: self.counters.new_fid(),
                            broadcast: false,
                        }
                    }
                    GeneratorConfig::FileBroadcaster {
                        size,
                        tstart,
                        bundle_size,
                        bundle_ttl,
                        data_type,
                        critical,
                        repeat,
                        wait,
                    } => {
                        self.clock
                            .schedule_at(*tstart, Event::FileEmit { gen: id, repetition: 0 });
                        GenKind::File {
                            nbnd: (size / bundle_size).ceil() as u32,
                            bundle_size: *bundle_size,
                            ttl: *bundle_ttl,
                            data_type: data_type.clone(),
                            critical: *critical,
                            dest: None,
                            repeat: *repeat,
                            wait: *wait,
                            fid: self.counters.new_fid(),
                            broadcast: true,
                        }
                    }
                    GeneratorConfig::Markov { flows } => {
                        let mut resolved = Vec::with_capacity(flows.len());
                        for (idx, f) in flows.iter().enumerate() {
                            let dest = self.resolve_node(&f.destination)?;
                            let ttl = latency_seconds(&f.data_type, f.latency_class);
                            let duty = f.duty_cycle.clamp(0.0, 1.0);
                            let off_mean = if duty > 0.0 {
                                f.on_duration * (1.0 - duty) / duty
                            } else {
                                f64::INFINITY
                            };
                            self.clock.schedule_at(
                                f.start,
                                Event::MarkovPhase { gen: id, flow: idx, on: true },
                            );
                            resolved.push(MarkovFlow {
                                fid: self.counters.new_fid(),
                                dest,
                                data_type: f.data_type.clone(),
                                rate: f.rate,
                                on_mean: f.on_duration,
                                off_mean,
                                tstart: f.start,
                                tend: f.end,
                                critical: f.critical,
                                bundle_size: f.bundle_size,
                                ttl,
                            });
                        }
                        let n = resolved.len();
                        GenKind::Markov { flows: resolved, on: vec![false; n], phase: vec![0; n] }
                    }
                };
                self.generators.push(Generator {
                    id,
                    node,
                    label: label.clone(),
                    sent: Vec::new(),
                    kind,
                });
                self.nodes[node.index()].generators.push(id);
            }
            if ncfg.limbo_wait.is_finite() {
                self.clock
                    .schedule_in(ncfg.limbo_wait, Event::NodeLimboTick { node });
            }
        }
        Ok(())
    }
}
