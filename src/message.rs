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

//! The unit of transmission through radios and connections.

use serde::{Deserialize, Serialize};

use crate::bundle::Bundle;
use crate::segment::LtpSegment;

/// Anything that can travel through a radio and a connection: a whole bundle
/// (basic ducts) or an LTP segment (LTP-family ducts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// A bundle travelling as-is.
    Bundle(Bundle),
    /// An LTP segment.
    Segment(LtpSegment),
}

impl Message {
    /// Size of the message on the wire, in bits.
    pub fn num_bits(&self) -> f64 {
        match self {
            Message::Bundle(b) => b.num_bits(),
            Message::Segment(s) => s.num_bits(),
        }
    }

    /// Whether the message was corrupted in transit.
    pub fn has_errors(&self) -> bool {
        match self {
            Message::Bundle(b) => b.has_errors,
            Message::Segment(s) => s.has_errors(),
        }
    }

    /// Set or clear the corruption flag.
    pub fn mark_errors(&mut self, value: bool) {
        match self {
            Message::Bundle(b) => b.has_errors = value,
            Message::Segment(s) => s.mark_errors(value),
        }
    }

    /// Account `dt` seconds of propagation delay. Only bundles track the
    /// accumulated delay; it is part of their lifecycle record.
    pub fn add_prop_delay(&mut self, dt: f64) {
        if let Message::Bundle(b) = self {
            b.prop_delay += dt;
        }
    }

    /// The contained bundle, if this is a bundle message.
    pub fn as_bundle(&self) -> Option<&Bundle> {
        match self {
            Message::Bundle(b) => Some(b),
            Message::Segment(_) => None,
        }
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Bundle(b) => b.fmt(f),
            Message::Segment(s) => s.fmt(f),
        }
    }
}

impl From<Bundle> for Message {
    fn from(b: Bundle) -> Self {
        Message::Bundle(b)
    }
}

impl From<LtpSegment> for Message {
    fn from(s: LtpSegment) -> Self {
        Message::Segment(s)
    }
}
