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

//! Post-run result collection and validation.
//!
//! The collector turns the final state of the simulation into a set of
//! named tables with stable aliases (`sent`, `arrived`, `dropped`, `lost`,
//! `stored`, `in_radio`, `in_outduct`, `in_limbo`, `node_in_queue`,
//! `routing_calls`, `energy`). Exporting them to a specific file format is
//! the job of an external frontend; every row is serializable.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::bundle::Bundle;
use crate::duct::DuctKind;
use crate::kernel::Event;
use crate::message::Message;
use crate::simulation::Simulation;
use crate::types::NodeId;

/// One row of a bundle lifecycle table.
#[derive(Debug, Clone, Serialize)]
pub struct BundleRow {
    /// Node the row was recorded at.
    pub node: String,
    /// Finer location within the node (queue, duct, radio, transit).
    pub location: String,
    /// Flow id.
    pub fid: u32,
    /// Bundle id.
    pub bid: u64,
    /// Copy id.
    pub cid: u32,
    /// Origin node name.
    pub orig: String,
    /// Destination node name.
    pub dest: String,
    /// Data type tag.
    pub data_type: String,
    /// Data volume in bits.
    pub data_vol: f64,
    /// Critical flag.
    pub critical: bool,
    /// Priority lane.
    pub priority: u8,
    /// Names of the visited nodes, in order.
    pub visited: Vec<String>,
    /// Whether the copy arrived.
    pub arrived: bool,
    /// Whether the copy was dropped.
    pub dropped: bool,
    /// Drop reason, if dropped.
    pub drop_reason: Option<String>,
    /// Creation time.
    pub creation_time: f64,
    /// Arrival time, if arrived.
    pub arrival_time: Option<f64>,
    /// End-to-end latency, if arrived.
    pub latency: Option<f64>,
    /// Allowable latency from the traffic definition.
    pub allowable_lat: f64,
    /// Accumulated propagation delay.
    pub prop_delay: f64,
}

/// One row of the `routing_calls` table.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingCallsRow {
    /// Node name.
    pub node: String,
    /// Number of routing procedure invocations.
    pub calls: u64,
}

/// One row of the `energy` table.
#[derive(Debug, Clone, Serialize)]
pub struct EnergyRow {
    /// Node name.
    pub node: String,
    /// Radio label.
    pub radio: String,
    /// Transmit energy spent, in joules.
    pub joules: f64,
}

/// The collected result tables of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultSet {
    tables: BTreeMap<String, Vec<BundleRow>>,
    /// Routing invocations per node.
    pub routing_calls: Vec<RoutingCallsRow>,
    /// Transmit energy per radio.
    pub energy: Vec<EnergyRow>,
    /// Number of LTP segments lost on closed connections (segment losses
    /// recover through LTP timers and are not bundle rows).
    pub lost_segments: u64,
}

impl ResultSet {
    /// The rows of the table with the given alias (empty if absent).
    pub fn table(&self, alias: &str) -> &[BundleRow] {
        self.tables.get(alias).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Aliases of all collected tables.
    pub fn aliases(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }
}

impl Simulation {
    fn bundle_row(&self, node: NodeId, location: &str, b: &Bundle) -> BundleRow {
        let name = |n: NodeId| self.nodes[n.index()].name.clone();
        BundleRow {
            node: name(node),
            location: location.to_string(),
            fid: b.fid.0,
            bid: b.bid.0,
            cid: b.cid.0,
            orig: name(b.orig),
            dest: name(b.dest),
            data_type: b.data_type.clone(),
            data_vol: b.data_vol,
            critical: b.critical,
            priority: b.priority(),
            visited: b.visited.iter().map(|&n| name(n)).collect(),
            arrived: b.arrived,
            dropped: b.dropped,
            drop_reason: b.drop_reason.as_ref().map(|r| r.to_string()),
            creation_time: b.creation_time,
            arrival_time: b.arrival_time,
            latency: b.latency(),
            allowable_lat: b.allowable_lat,
            prop_delay: b.prop_delay,
        }
    }

    /// Collect the result tables from the final simulation state. A
    /// non-empty report list in the scenario restricts the output to the
    /// named aliases.
    pub fn collect_results(&self) -> ResultSet {
        let mut tables: BTreeMap<String, Vec<BundleRow>> = BTreeMap::new();
        let mut push = |tables: &mut BTreeMap<String, Vec<BundleRow>>, alias: &str, row| {
            tables.entry(alias.to_string()).or_default().push(row);
        };

        for gen in &self.generators {
            for b in &gen.sent {
                push(&mut tables, "sent", self.bundle_row(gen.node, &gen.label, b));
            }
        }
        for node in &self.nodes {
            if let Some(ep) = node.endpoints.get(&0) {
                for b in ep.data() {
                    push(&mut tables, "arrived", self.bundle_row(node.id, "endpoint", b));
                }
            }
            for b in &node.dropped {
                push(&mut tables, "dropped", self.bundle_row(node.id, "dropped", b));
            }
            for (b, _) in node.in_queue.iter() {
                push(&mut tables, "node_in_queue", self.bundle_row(node.id, "ingress", b));
            }
            for b in node.limbo_queue.iter() {
                push(&mut tables, "in_limbo", self.bundle_row(node.id, "limbo", b));
            }
        }
        for conn in &self.conns {
            for msg in &conn.lost {
                if let Message::Bundle(b) = msg {
                    push(&mut tables, "lost", self.bundle_row(conn.orig, "connection", b));
                }
            }
        }
        for radio in &self.radios {
            let in_radio: Vec<&Bundle> = radio
                .queue
                .iter()
                .chain(radio.current.iter())
                .filter_map(|item| item.msg.as_bundle())
                .collect();
            for b in in_radio {
                push(&mut tables, "in_radio", self.bundle_row(radio.node, &radio.label, b));
            }
        }
        for duct in &self.ducts {
            for msg in duct.in_queue.iter() {
                if let Message::Bundle(b) = msg {
                    push(&mut tables, "in_outduct", self.bundle_row(duct.node, &duct.label, b));
                }
            }
            match &duct.kind {
                DuctKind::LtpOut(s) => {
                    for b in s.cur_block.iter().chain(s.sessions.values().flat_map(|x| &x.block))
                    {
                        push(
                            &mut tables,
                            "in_outduct",
                            self.bundle_row(duct.node, &duct.label, b),
                        );
                    }
                }
                DuctKind::MbltpOut(s) => {
                    for b in s.cur_block.iter().chain(s.sessions.values().flat_map(|x| &x.block))
                    {
                        push(
                            &mut tables,
                            "in_outduct",
                            self.bundle_row(duct.node, &duct.label, b),
                        );
                    }
                }
                _ => {}
            }
        }
        for mgr in &self.managers {
            for rec in mgr.queue.iter().chain(mgr.future.values().flatten()) {
                push(
                    &mut tables,
                    "neighbor_queue",
                    self.bundle_row(mgr.node, "neighbor_queue", &rec.bundle),
                );
            }
        }
        for epi in &self.epidemics {
            for rec in epi.queue.iter() {
                push(
                    &mut tables,
                    "neighbor_queue",
                    self.bundle_row(epi.node, "opportunistic_queue", &rec.bundle),
                );
            }
        }
        // bundles still propagating, or waiting out the limbo deferral, at
        // shutdown
        for event in self.clock.iter_pending() {
            match event {
                Event::Deliver { msg, conn, .. } => {
                    if let Message::Bundle(b) = msg.as_ref() {
                        let node = self.conns[conn.index()].orig;
                        push(&mut tables, "in_transit", self.bundle_row(node, "transit", b));
                    }
                }
                Event::LimboDeferred { node, bundle } => {
                    push(&mut tables, "in_limbo", self.bundle_row(*node, "limbo", bundle));
                }
                _ => {}
            }
        }

        // `stored` aggregates every copy that is neither terminal nor lost
        let stored: Vec<BundleRow> = [
            "node_in_queue",
            "in_limbo",
            "neighbor_queue",
            "in_outduct",
            "in_radio",
            "in_transit",
        ]
        .iter()
        .flat_map(|alias| tables.get(*alias).cloned().unwrap_or_default())
        .collect();
        tables.insert("stored".to_string(), stored);

        let mut routing_calls: Vec<RoutingCallsRow> = self
            .nodes
            .iter()
            .map(|n| RoutingCallsRow { node: n.name.clone(), calls: n.router.calls() })
            .collect();
        let mut energy: Vec<EnergyRow> = self
            .radios
            .iter()
            .map(|r| EnergyRow {
                node: self.nodes[r.node.index()].name.clone(),
                radio: r.label.clone(),
                joules: r.energy,
            })
            .collect();

        // an explicit report list keeps only the named aliases
        if !self.reports.is_empty() {
            let wanted = |alias: &str| self.reports.iter().any(|r| r == alias);
            tables.retain(|alias, _| wanted(alias));
            if !wanted("routing_calls") {
                routing_calls.clear();
            }
            if !wanted("energy") {
                energy.clear();
            }
        }

        ResultSet { tables, routing_calls, energy, lost_segments: self.lost_segments }
    }
}

/// Post-run validation of the universal simulator invariants.
pub mod validation {
    use std::collections::{BTreeMap, BTreeSet};

    use super::ResultSet;

    /// One failed validation check.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ValidationFailure {
        /// Name of the check.
        pub check: &'static str,
        /// Human-readable details.
        pub detail: String,
    }

    fn fail(check: &'static str, detail: String) -> ValidationFailure {
        ValidationFailure { check, detail }
    }

    /// Run all checks; an empty result means the run is consistent.
    pub fn validate(results: &ResultSet) -> Vec<ValidationFailure> {
        let mut failures = Vec::new();

        let sent = results.table("sent");
        if sent.is_empty() {
            failures.push(fail("sent", "no bundles were ever sent".to_string()));
            return failures;
        }

        // conservation: every emitted copy must end up in exactly one of
        // arrived / dropped / lost / stored, and no terminal copy may
        // appear out of thin air
        let sent_bids: BTreeSet<u64> = sent.iter().map(|r| r.bid).collect();
        let mut terminal_tags: BTreeSet<(u64, u32)> = BTreeSet::new();
        for alias in ["arrived", "dropped", "lost", "stored"] {
            for row in results.table(alias) {
                terminal_tags.insert((row.bid, row.cid));
                if !sent_bids.contains(&row.bid) && row.data_type != "handshake" {
                    failures.push(fail(
                        "conservation",
                        format!("bundle {} in '{}' was never sent", row.bid, alias),
                    ));
                }
            }
        }
        for row in sent {
            let covered = terminal_tags.iter().any(|&(bid, _)| bid == row.bid);
            if !covered {
                failures.push(fail(
                    "conservation",
                    format!("bundle {} has no terminal state", row.bid),
                ));
            }
        }

        // non-critical flows: received volume equals sent volume
        let volumes = |rows: &[super::BundleRow], critical: bool| -> BTreeMap<u32, f64> {
            let mut m: BTreeMap<u32, f64> = BTreeMap::new();
            for r in rows.iter().filter(|r| r.critical == critical) {
                *m.entry(r.fid).or_insert(0.0) += r.data_vol;
            }
            m
        };
        let tx = volumes(sent, false);
        let rx = volumes(results.table("arrived"), false);
        let stored_vol = volumes(results.table("stored"), false);
        for (fid, &sent_vol) in &tx {
            let arrived_vol = rx.get(fid).copied().unwrap_or(0.0);
            let in_flight = stored_vol.get(fid).copied().unwrap_or(0.0);
            let diff = (sent_vol - arrived_vol - in_flight).abs();
            if diff > 1e-8 + 1e-3 * sent_vol {
                failures.push(fail(
                    "flow_volume",
                    format!(
                        "flow {} sent {} bits but {} arrived and {} remain in the network",
                        fid, sent_vol, arrived_vol, in_flight
                    ),
                ));
            }
        }

        // critical flows: received volume at least the sent volume (copies
        // still in the network count towards it on truncated runs)
        let tx_crit = volumes(sent, true);
        let rx_crit = volumes(results.table("arrived"), true);
        let stored_crit = volumes(results.table("stored"), true);
        for (fid, &sent_vol) in &tx_crit {
            let arrived_vol = rx_crit.get(fid).copied().unwrap_or(0.0)
                + stored_crit.get(fid).copied().unwrap_or(0.0);
            if arrived_vol + 1e-8 < sent_vol {
                failures.push(fail(
                    "critical_volume",
                    format!("critical flow {} received {arrived_vol} of {sent_vol} bits", fid),
                ));
            }
        }

        // arrived bundles never revisit a node
        for row in results.table("arrived") {
            let unique: BTreeSet<&String> = row.visited.iter().collect();
            if unique.len() != row.visited.len() {
                failures.push(fail(
                    "visited",
                    format!("bundle {} revisited a node: {:?}", row.bid, row.visited),
                ));
            }
        }

        failures
    }
}
