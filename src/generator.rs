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

//! Traffic sources: constant bit rate, file, file broadcast, and Markov
//! on/off flows.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use log::*;
use rand::seq::SliceRandom;
use rand_distr::{Distribution, Exp};

use crate::bundle::{Bundle, NewBundle};
use crate::config::LatencyClass;
use crate::kernel::Event;
use crate::simulation::Simulation;
use crate::types::{FlowId, GenId, NodeId};

lazy_static! {
    /// The fixed `(data type × latency class) → seconds` mapping used to
    /// derive bundle latency requirements from traffic tables.
    static ref LATENCY_TABLE: BTreeMap<(&'static str, LatencyClass), f64> = {
        let mut t = BTreeMap::new();
        t.insert(("biomedical", LatencyClass::Seconds), 5.0);
        t.insert(("voice", LatencyClass::Seconds), 10.0);
        t.insert(("caution and warning", LatencyClass::Seconds), 5.0);
        t.insert(("command", LatencyClass::Seconds), 5.0);
        t.insert(("telemetry", LatencyClass::Seconds), 30.0);
        t.insert(("telemetry", LatencyClass::Minutes), 900.0);
        t.insert(("science", LatencyClass::Hours), 43200.0);
        t
    };
}

/// The latency requirement in seconds for a `(data type, class)` pair.
/// Unlisted pairs fall back to the class default (one minute, one hour, or
/// half a day).
pub fn latency_seconds(data_type: &str, class: LatencyClass) -> f64 {
    let key = (data_type.to_lowercase(), class);
    LATENCY_TABLE
        .iter()
        .find(|((dt, c), _)| *dt == key.0 && *c == class)
        .map(|(_, &s)| s)
        .unwrap_or(match class {
            LatencyClass::Seconds => 60.0,
            LatencyClass::Minutes => 3600.0,
            LatencyClass::Hours => 43200.0,
        })
}

/// One on/off flow of a Markov generator.
#[derive(Debug, Clone)]
pub struct MarkovFlow {
    /// Flow id.
    pub fid: FlowId,
    /// Destination node.
    pub dest: NodeId,
    /// Data type tag.
    pub data_type: String,
    /// Emission rate while on, in bits per second.
    pub rate: f64,
    /// Mean on-phase duration in seconds.
    pub on_mean: f64,
    /// Mean off-phase duration in seconds, derived from the duty cycle.
    pub off_mean: f64,
    /// Time the flow starts existing.
    pub tstart: f64,
    /// Time the flow stops existing.
    pub tend: f64,
    /// Whether the flow's bundles are critical.
    pub critical: bool,
    /// Size of each emitted bundle in bits.
    pub bundle_size: f64,
    /// Bundle time-to-live in seconds.
    pub ttl: f64,
}

/// Kind-specific generator state.
#[derive(Debug, Clone)]
pub enum GenKind {
    /// Fixed-size bundles at a constant bit rate.
    Cbr {
        /// Rate in bits per second.
        rate: f64,
        /// Emission duration in seconds.
        until: f64,
        /// Start time in seconds.
        tstart: f64,
        /// Bundle size in bits.
        bundle_size: f64,
        /// Bundle time-to-live in seconds.
        ttl: f64,
        /// Data type tag.
        data_type: String,
        /// Critical flag.
        critical: bool,
        /// Destination, or `None` for a random one per bundle.
        dest: Option<NodeId>,
        /// Flow id.
        fid: FlowId,
    },
    /// A file sent as a burst of bundles, possibly repeated.
    File {
        /// Number of bundles per repetition.
        nbnd: u32,
        /// Bundle size in bits.
        bundle_size: f64,
        /// Bundle time-to-live in seconds.
        ttl: f64,
        /// Data type tag.
        data_type: String,
        /// Critical flag.
        critical: bool,
        /// Destination, or `None` for a random one per repetition.
        dest: Option<NodeId>,
        /// Number of repetitions.
        repeat: u32,
        /// Pause between repetitions in seconds.
        wait: f64,
        /// Flow id.
        fid: FlowId,
        /// One copy of the file per other node instead of a single
        /// destination.
        broadcast: bool,
    },
    /// On/off Markov flows from a traffic table.
    Markov {
        /// The flows.
        flows: Vec<MarkovFlow>,
        /// Whether each flow is currently on.
        on: Vec<bool>,
        /// Phase counter per flow; stale emission ticks are discarded.
        phase: Vec<u32>,
    },
}

/// A traffic source attached to a node.
#[derive(Debug, Clone)]
pub struct Generator {
    /// Arena id.
    pub id: GenId,
    /// Owning node.
    pub node: NodeId,
    /// Configuration label.
    pub label: String,
    /// Creation-time snapshots of every emitted bundle.
    pub sent: Vec<Bundle>,
    /// Kind-specific state.
    pub kind: GenKind,
}

impl Generator {
    /// The data volume this generator is expected to emit over the run, in
    /// bits.
    pub fn predicted_data_vol(&self, num_nodes: usize) -> f64 {
        match &self.kind {
            GenKind::Cbr { rate, until, .. } => rate * until,
            GenKind::File { nbnd, bundle_size, repeat, broadcast, .. } => {
                let per_file = *nbnd as f64 * bundle_size * *repeat as f64;
                if *broadcast {
                    per_file * (num_nodes.saturating_sub(1)) as f64
                } else {
                    per_file
                }
            }
            GenKind::Markov { flows, .. } => flows
                .iter()
                .map(|f| f.rate * (f.tend - f.tstart) * f.on_mean / (f.on_mean + f.off_mean))
                .sum(),
        }
    }

    /// The data volume actually emitted, in bits.
    pub fn generated_data_vol(&self) -> f64 {
        self.sent.iter().map(|b| b.data_vol).sum()
    }
}

impl Simulation {
    /// Create a bundle at a generator's node, snapshot it for the `sent`
    /// table, and enqueue it for routing.
    fn emit_bundle(&mut self, gen: GenId, spec: NewBundle) {
        let now = self.clock.now();
        let node = self.generators[gen.index()].node;
        let bundle = self.counters.new_bundle(spec, now);
        debug!("{} created at node {}", bundle, self.nodes[node.index()].name);
        if self.monitor {
            self.generators[gen.index()].sent.push(bundle.clone());
        }
        self.node_forward(node, bundle);
    }

    /// Pick a random destination other than `node`.
    fn random_destination(&mut self, node: NodeId) -> Option<NodeId> {
        let candidates: Vec<NodeId> =
            (0..self.nodes.len()).map(NodeId::from).filter(|&n| n != node).collect();
        candidates.choose(&mut self.rng).copied()
    }

    /// Emission tick of a constant-bit-rate generator.
    pub(crate) fn handle_cbr_tick(&mut self, gen: GenId) {
        let now = self.clock.now();
        let g = &self.generators[gen.index()];
        let node = g.node;
        let GenKind::Cbr {
            rate,
            until,
            tstart,
            bundle_size,
            ttl,
            ref data_type,
            critical,
            dest,
            fid,
        } = g.kind
        else {
            return;
        };
        let data_type = data_type.clone();
        let dest = match dest {
            Some(d) => d,
            None => match self.random_destination(node) {
                Some(d) => d,
                None => return,
            },
        };

        let mut spec = NewBundle::new(node, dest, data_type, bundle_size);
        spec.ttl = ttl;
        spec.allowable_lat = ttl;
        spec.critical = critical;
        spec.fid = Some(fid);
        self.emit_bundle(gen, spec);

        let next = now + bundle_size / rate;
        if next < tstart + until {
            self.clock.schedule_at(next, Event::CbrTick { gen });
        }
    }

    /// One file repetition of a file generator or broadcaster.
    pub(crate) fn handle_file_emit(&mut self, gen: GenId, repetition: u32) {
        let g = &self.generators[gen.index()];
        let node = g.node;
        let GenKind::File {
            nbnd,
            bundle_size,
            ttl,
            ref data_type,
            critical,
            dest,
            repeat,
            wait,
            fid,
            broadcast,
        } = g.kind
        else {
            return;
        };
        let data_type = data_type.clone();

        let dests: Vec<NodeId> = if broadcast {
            (0..self.nodes.len()).map(NodeId::from).filter(|&n| n != node).collect()
        } else {
            match dest.or_else(|| self.random_destination(node)) {
                Some(d) => vec![d],
                None => return,
            }
        };
        for dest in dests {
            for _ in 0..nbnd {
                let mut spec = NewBundle::new(node, dest, data_type.clone(), bundle_size);
                spec.ttl = ttl;
                spec.allowable_lat = ttl;
                spec.critical = critical;
                spec.fid = Some(fid);
                self.emit_bundle(gen, spec);
            }
        }
        if repetition + 1 < repeat {
            self.clock
                .schedule_in(wait, Event::FileEmit { gen, repetition: repetition + 1 });
        }
    }

    /// A Markov flow switches phase.
    pub(crate) fn handle_markov_phase(&mut self, gen: GenId, flow: usize, on: bool) {
        let now = self.clock.now();
        let g = &mut self.generators[gen.index()];
        let GenKind::Markov { flows, on: states, phase } = &mut g.kind else { return };
        let Some(f) = flows.get(flow) else { return };
        if now >= f.tend {
            states[flow] = false;
            return;
        }

        states[flow] = on;
        let (dwell_mean, tick) = if on {
            phase[flow] += 1;
            (f.on_mean, true)
        } else {
            (f.off_mean, false)
        };
        let dwell = if dwell_mean > 0.0 && dwell_mean.is_finite() {
            Exp::new(1.0 / dwell_mean).map(|d| d.sample(&mut self.rng)).unwrap_or(dwell_mean)
        } else {
            dwell_mean.max(0.0)
        };
        let p = phase[flow];
        self.clock.schedule_in(dwell, Event::MarkovPhase { gen, flow, on: !on });
        if tick {
            self.clock.schedule_in(0.0, Event::MarkovTick { gen, flow, phase: p });
        }
    }

    /// Emission tick of a Markov flow in its on phase.
    pub(crate) fn handle_markov_tick(&mut self, gen: GenId, flow: usize, tick_phase: u32) {
        let now = self.clock.now();
        let g = &self.generators[gen.index()];
        let node = g.node;
        let GenKind::Markov { ref flows, ref on, ref phase } = g.kind else { return };
        let Some(f) = flows.get(flow) else { return };
        if !on[flow] || phase[flow] != tick_phase || now >= f.tend {
            return;
        }
        let (dest, data_type, bundle_size, ttl, critical, fid, rate) = (
            f.dest,
            f.data_type.clone(),
            f.bundle_size,
            f.ttl,
            f.critical,
            f.fid,
            f.rate,
        );

        let mut spec = NewBundle::new(node, dest, data_type, bundle_size);
        spec.ttl = ttl;
        spec.allowable_lat = ttl;
        spec.critical = critical;
        spec.fid = Some(fid);
        self.emit_bundle(gen, spec);

        self.clock
            .schedule_in(bundle_size / rate, Event::MarkovTick { gen, flow, phase: tick_phase });
    }
}
