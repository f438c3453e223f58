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

//! Bundle sinks within a node.

use crate::bundle::Bundle;

/// An endpoint of a node, addressed by the bundle's endpoint id.
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// The default application sink: stores every delivered bundle.
    Default {
        /// The delivered bundles.
        data: Vec<Bundle>,
    },
    /// Feeds delivered bundles into the opportunistic handshake protocol
    /// (summary and request bundles).
    Queue,
}

impl Endpoint {
    /// A fresh default endpoint.
    pub fn default_sink() -> Self {
        Endpoint::Default { data: Vec::new() }
    }

    /// The bundles stored in a default endpoint.
    pub fn data(&self) -> &[Bundle] {
        match self {
            Endpoint::Default { data } => data,
            Endpoint::Queue => &[],
        }
    }
}
