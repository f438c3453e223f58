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

//! Contacts, the contact plan, and the mobility models that produce them.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{ContactId, NodeId, SimError, LIGHT_SPEED};

/// A scheduled interval during which a directed link between two nodes is
/// available at a given rate and range.
///
/// Immutable during the simulation; the residual capacity lives in the
/// [`ContactPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    /// Contact id, the index into the contact plan.
    pub cid: ContactId,
    /// Transmitting node.
    pub orig: NodeId,
    /// Receiving node.
    pub dest: NodeId,
    /// Start of the contact, seconds since the simulation epoch.
    pub tstart: f64,
    /// End of the contact.
    pub tend: f64,
    /// Data rate in bits per second.
    pub rate: f64,
    /// One-way light time in seconds.
    pub range: f64,
}

impl Contact {
    /// Duration of the contact in seconds.
    pub fn duration(&self) -> f64 {
        self.tend - self.tstart
    }

    /// Total capacity of the contact in bits (`duration × rate`).
    pub fn capacity(&self) -> f64 {
        self.duration() * self.rate
    }
}

/// One row of a contact plan input table, with nodes referenced by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    /// Name of the transmitting node.
    pub orig: String,
    /// Name of the receiving node.
    pub dest: String,
    /// Start time in seconds (relative to the epoch, unless the table
    /// carries absolute timestamps).
    pub tstart: f64,
    /// End time in seconds.
    pub tend: f64,
    /// Data rate in bits per second.
    pub rate: f64,
    /// One-way light time in seconds.
    pub range: f64,
}

impl ContactRecord {
    /// Build a record.
    pub fn new(
        orig: impl Into<String>,
        dest: impl Into<String>,
        tstart: f64,
        tend: f64,
        rate: f64,
        range: f64,
    ) -> Self {
        Self { orig: orig.into(), dest: dest.into(), tstart, tend, rate, range }
    }
}

/// The normalized list of all contacts over the simulation horizon, plus
/// their residual capacities.
///
/// Capacity is the only mutable part: it is decremented when a bundle is
/// admitted into a contact and credited back when the bundle is displaced by
/// overbooking, found transmit-overdue, or otherwise re-routed.
#[derive(Debug, Clone, Default)]
pub struct ContactPlan {
    contacts: Vec<Contact>,
    residual: Vec<f64>,
}

impl ContactPlan {
    /// Create an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a contact and return its id.
    pub fn add_contact(
        &mut self,
        orig: NodeId,
        dest: NodeId,
        tstart: f64,
        tend: f64,
        rate: f64,
        range: f64,
    ) -> Result<ContactId, SimError> {
        if orig == dest {
            return Err(SimError::InvalidContactPlan(format!(
                "contact from {orig} to itself"
            )));
        }
        if !(tstart >= 0.0) {
            return Err(SimError::InvalidContactPlan(format!(
                "contact starts at {tstart} < 0; check the scenario epoch"
            )));
        }
        if tend < tstart {
            return Err(SimError::InvalidContactPlan(format!(
                "contact ends at {tend} before it starts at {tstart}"
            )));
        }
        if rate < 0.0 {
            return Err(SimError::InvalidContactPlan(format!("negative rate {rate}")));
        }
        if range < 0.0 {
            return Err(SimError::InvalidContactPlan(format!("negative range {range}")));
        }
        let cid = ContactId(self.contacts.len() as i32);
        let contact = Contact { cid, orig, dest, tstart, tend, rate, range };
        self.residual.push(contact.capacity());
        self.contacts.push(contact);
        Ok(cid)
    }

    /// Look up a contact.
    pub fn get(&self, cid: ContactId) -> Option<&Contact> {
        if cid.is_real() {
            self.contacts.get(cid.0 as usize)
        } else {
            None
        }
    }

    /// Iterate over all contacts in id order.
    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.iter()
    }

    /// All contacts from `orig` to `dest`, sorted by start time.
    pub fn pair_plan(&self, orig: NodeId, dest: NodeId) -> Vec<Contact> {
        let mut plan: Vec<Contact> = self
            .contacts
            .iter()
            .filter(|c| c.orig == orig && c.dest == dest)
            .copied()
            .collect();
        plan.sort_by(|a, b| a.tstart.total_cmp(&b.tstart).then(a.cid.cmp(&b.cid)));
        plan
    }

    /// Residual capacity of a contact in bits. Synthetic contacts report
    /// infinite capacity.
    pub fn residual(&self, cid: ContactId) -> f64 {
        if cid.is_real() {
            self.residual.get(cid.0 as usize).copied().unwrap_or(0.0)
        } else {
            f64::INFINITY
        }
    }

    /// Account the admission of `data_vol` bits into a contact. The residual
    /// capacity never becomes negative.
    pub fn admit(&mut self, cid: ContactId, data_vol: f64) {
        if let Some(r) = cid.is_real().then(|| self.residual.get_mut(cid.0 as usize)).flatten() {
            *r = (*r - data_vol).max(0.0);
        }
    }

    /// Credit `data_vol` bits back to a contact, bounded by its total
    /// capacity.
    pub fn credit(&mut self, cid: ContactId, data_vol: f64) {
        if let Some(c) = self.get(cid).copied() {
            let r = &mut self.residual[cid.0 as usize];
            *r = (*r + data_vol).min(c.capacity());
        }
    }

    /// Number of contacts.
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// Whether the plan has no contacts.
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}

/// A time-vs-distance table for a set of node pairs, sampled on a common
/// time grid. Produced by mobility models and consumed by distance-gated
/// connections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistanceTable {
    /// Sampling instants, strictly increasing.
    pub times: Vec<f64>,
    /// Distance in meters per sampled instant, per directed node pair.
    pub dist: BTreeMap<(NodeId, NodeId), Vec<f64>>,
}

impl DistanceTable {
    /// Distance series for a pair, in either direction.
    pub fn series(&self, a: NodeId, b: NodeId) -> Option<&Vec<f64>> {
        self.dist.get(&(a, b)).or_else(|| self.dist.get(&(b, a)))
    }

    /// Maximal runs of samples during which `distance ≤ max_dist` for the
    /// pair, as `(tstart, tend, prop_delay)` with the propagation delay set
    /// to the mean distance over the run divided by the speed of light.
    pub fn open_intervals(&self, a: NodeId, b: NodeId, max_dist: f64) -> Vec<(f64, f64, f64)> {
        let Some(series) = self.series(a, b) else { return Vec::new() };
        let mut intervals = Vec::new();
        let mut run: Option<usize> = None;
        for i in 0..=series.len() {
            let open = i < series.len() && series[i] <= max_dist;
            match (run, open) {
                (None, true) => run = Some(i),
                (Some(s), false) => {
                    let e = i - 1;
                    let mean = series[s..=e].iter().sum::<f64>() / (e - s + 1) as f64;
                    intervals.push((self.times[s], self.times[e], mean / LIGHT_SPEED));
                    run = None;
                }
                _ => {}
            }
        }
        intervals
    }
}

/// Parameters of the random-waypoint mobility model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomWaypointParams {
    /// Width of the motion area in meters.
    pub width: f64,
    /// Height of the motion area in meters.
    pub height: f64,
    /// Minimum node speed in meters per second.
    pub min_speed: f64,
    /// Maximum node speed in meters per second.
    pub max_speed: f64,
    /// Pause at each waypoint in seconds.
    pub pause: f64,
    /// Sampling step in seconds.
    pub dt: f64,
    /// Horizon over which to synthesize motion, in seconds.
    pub duration: f64,
}

/// Synthesize a [`DistanceTable`] by moving `nodes` through a rectangle with
/// the random-waypoint model: pick a waypoint uniformly, travel to it at a
/// uniform speed, pause, repeat.
pub fn random_waypoint_table(
    nodes: &[NodeId],
    params: &RandomWaypointParams,
    rng: &mut impl Rng,
) -> DistanceTable {
    let steps = (params.duration / params.dt).ceil() as usize + 1;
    let times: Vec<f64> = (0..steps).map(|i| i as f64 * params.dt).collect();

    // sample one trajectory per node
    let mut tracks: BTreeMap<NodeId, Vec<(f64, f64)>> = BTreeMap::new();
    for &node in nodes {
        let mut track = Vec::with_capacity(steps);
        let mut pos = (rng.gen::<f64>() * params.width, rng.gen::<f64>() * params.height);
        let mut target = pos;
        let mut speed = 0.0;
        let mut pause_left: f64 = 0.0;
        for _ in 0..steps {
            track.push(pos);
            let mut left = params.dt;
            while left > 0.0 {
                if pause_left > 0.0 {
                    let wait = pause_left.min(left);
                    pause_left -= wait;
                    left -= wait;
                    continue;
                }
                let (dx, dy) = (target.0 - pos.0, target.1 - pos.1);
                let dist = (dx * dx + dy * dy).sqrt();
                if dist < 1e-9 {
                    target =
                        (rng.gen::<f64>() * params.width, rng.gen::<f64>() * params.height);
                    speed = params.min_speed
                        + rng.gen::<f64>() * (params.max_speed - params.min_speed);
                    pause_left = params.pause;
                    continue;
                }
                let travel = (speed * left).min(dist);
                pos = (pos.0 + dx / dist * travel, pos.1 + dy / dist * travel);
                left -= if speed > 0.0 { travel / speed } else { left };
            }
        }
        tracks.insert(node, track);
    }

    // derive pairwise distances
    let mut dist = BTreeMap::new();
    for (i, &a) in nodes.iter().enumerate() {
        for &b in nodes.iter().skip(i + 1) {
            let (ta, tb) = (&tracks[&a], &tracks[&b]);
            let series = (0..steps)
                .map(|k| {
                    let (dx, dy) = (ta[k].0 - tb[k].0, ta[k].1 - tb[k].1);
                    (dx * dx + dy * dy).sqrt()
                })
                .collect();
            dist.insert((a, b), series);
        }
    }
    DistanceTable { times, dist }
}

/// A mobility model instantiated for one simulation.
#[derive(Debug, Clone)]
pub enum MobilityModel {
    /// Contacts loaded from a contact plan table.
    Scheduled {
        /// The contacts contributed to the global [`ContactPlan`].
        contacts: Vec<ContactId>,
    },
    /// All links permanently up; a synthetic infinite contact per
    /// connection is contributed to the plan once the link rates are known.
    Static {
        /// Propagation delay of every link in seconds.
        prop_delay: f64,
        /// The synthesized contacts.
        contacts: Vec<ContactId>,
    },
    /// Random-waypoint motion: no scheduled contacts, only a distance table
    /// for distance-gated connections.
    RandomWaypoint {
        /// The synthesized time-vs-distance table.
        table: DistanceTable,
    },
}

impl MobilityModel {
    /// The distance table of the model, if it has one.
    pub fn distance_table(&self) -> Option<&DistanceTable> {
        match self {
            MobilityModel::RandomWaypoint { table } => Some(table),
            _ => None,
        }
    }

    /// The propagation delay for static models.
    pub fn static_prop_delay(&self) -> Option<f64> {
        match self {
            MobilityModel::Static { prop_delay, .. } => Some(*prop_delay),
            _ => None,
        }
    }
}
