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

//! The parallel LTP duct: N independent LTP engines per bundle.
//!
//! On send, the bundle is replicated into every engine. The outduct keeps a
//! per-bundle success/failure tally: one engine success is enough; only
//! when all engines fail does the bundle go to the node's limbo. The induct
//! runs a per-bundle handler that forwards exactly one copy to the node no
//! matter how many engines deliver it.

use std::collections::BTreeMap;

use log::*;

use super::DuctParent;
use crate::bundle::Bundle;
use crate::simulation::Simulation;
use crate::types::{BundleTag, DuctId};

/// The parallel LTP outduct.
#[derive(Debug)]
pub struct ParallelOutduct {
    /// The engine outducts, in engine-label order.
    pub engines: Vec<DuctId>,
    /// Per-bundle `(successes, failures)` tally.
    pub status: BTreeMap<BundleTag, (u32, u32)>,
}

/// The parallel LTP induct.
#[derive(Debug)]
pub struct ParallelInduct {
    /// The engine inducts, in engine-label order.
    pub engines: Vec<DuctId>,
    /// Per-bundle delivery counter.
    pub handlers: BTreeMap<BundleTag, u32>,
}

impl Simulation {
    /// Parallel outduct ingress: replicate the bundle into every engine and
    /// open its status record.
    pub(crate) fn par_out_ingress(&mut self, duct: DuctId, bundle: Bundle) {
        let super::DuctKind::ParOut(state) = &mut self.ducts[duct.index()].kind else { return };
        state.status.insert(bundle.tag(), (0, 0));
        let engines = state.engines.clone();
        debug!("{} replicated over {} LTP engines", bundle, engines.len());
        for engine in engines {
            self.duct_send(engine, bundle.clone());
        }
    }

    /// An engine outduct delivered `bundle` successfully.
    pub(crate) fn par_out_success(&mut self, duct: DuctId, bundle: Bundle) {
        let super::DuctKind::ParOut(state) = &mut self.ducts[duct.index()].kind else { return };
        let n = state.engines.len() as u32;
        let tag = bundle.tag();
        let entry = state.status.entry(tag).or_insert((0, 0));
        entry.0 += 1;
        if entry.0 + entry.1 == n {
            state.status.remove(&tag);
        }
    }

    /// An engine outduct failed to deliver `bundle`. Only when every engine
    /// has failed does the bundle go to the node's limbo.
    pub(crate) fn par_out_fail(&mut self, duct: DuctId, bundle: Bundle) {
        let super::DuctKind::ParOut(state) = &mut self.ducts[duct.index()].kind else { return };
        let n = state.engines.len() as u32;
        let tag = bundle.tag();
        let entry = state.status.entry(tag).or_insert((0, 0));
        entry.1 += 1;
        let (s, f) = *entry;
        if s + f == n {
            state.status.remove(&tag);
        }
        if s == 0 && f == n {
            debug!("{} failed on all {} engines", bundle, n);
            self.duct_notify_fail_at_node(duct, bundle);
        }
    }

    /// Route a bundle that failed on all engines to the node's limbo.
    fn duct_notify_fail_at_node(&mut self, duct: DuctId, bundle: Bundle) {
        let neighbor = self.ducts[duct.index()].neighbor;
        if let DuctParent::Node(node) = self.ducts[duct.index()].parent {
            let cid = self.nodes[node.index()]
                .managers
                .get(&neighbor)
                .and_then(|&m| self.managers[m.index()].current_cid());
            self.node_limbo(node, bundle, cid);
        }
    }

    /// An engine induct delivered `bundle`: forward the first copy to the
    /// node, swallow the rest, and drop the handler once every engine
    /// reported in.
    pub(crate) fn par_in_receive(&mut self, duct: DuctId, bundle: Bundle) {
        let parent = self.ducts[duct.index()].parent;
        let super::DuctKind::ParIn(state) = &mut self.ducts[duct.index()].kind else { return };
        let n = state.engines.len() as u32;
        let tag = bundle.tag();
        let count = state.handlers.entry(tag).or_insert(0);
        *count += 1;
        let first = *count == 1;
        if *count == n {
            state.handlers.remove(&tag);
        }
        if first {
            if let DuctParent::Node(node) = parent {
                self.node_forward(node, bundle);
            }
        }
    }
}
