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

//! The basic (pass-through) duct: no aggregation, no reliability.

use log::*;

use crate::bundle::Bundle;
use crate::message::Message;
use crate::radio::RadioItem;
use crate::simulation::Simulation;
use crate::types::{DuctId, RadioId};

/// Outduct that hands each bundle straight to its radio.
#[derive(Debug, Clone)]
pub struct BasicOutduct {
    /// The radio transmitting for this duct.
    pub radio: RadioId,
}

/// Induct that forwards each received bundle to the node's routing layer.
#[derive(Debug, Clone, Default)]
pub struct BasicInduct {}

impl Simulation {
    /// Basic outduct ingress: send the bundle through the radio and signal
    /// success right away (there is no acknowledgement at this layer).
    pub(crate) fn basic_out_ingress(&mut self, duct: DuctId, bundle: Bundle) {
        let d = &self.ducts[duct.index()];
        let crate::duct::DuctKind::BasicOut(state) = &d.kind else { return };
        debug!("{} starts transmission at duct {}", bundle, d.label);
        let item = RadioItem {
            neighbor: d.neighbor,
            msg: Message::Bundle(bundle.clone()),
            peer: d.peer,
            dir: d.transmit_mode(),
        };
        let radio = state.radio;
        self.radio_put(radio, item);
        self.duct_notify_success(duct, bundle);
    }
}
