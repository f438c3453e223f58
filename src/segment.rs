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

//! LTP segments (see RFC 5326 for the protocol these model).

use serde::{Deserialize, Serialize};

use crate::types::SessionId;

/// Protocol overhead of a data segment, in bits.
pub const DATA_SEGMENT_OVERHEAD: f64 = 10.0;
/// Size of a report segment, in bits.
pub const REPORT_SEGMENT_SIZE: f64 = 25.0;
/// Size of a report acknowledgement segment, in bits.
pub const REPORT_ACK_SIZE: f64 = 10.0;
/// Size of a cancel-session segment, in bits.
pub const CANCEL_SEGMENT_SIZE: f64 = 10.0;

/// A reception claim: `(offset, length)` in bits from the start of the block.
///
/// Unlike RFC 5326, offsets are relative to the block start rather than to
/// the report's lower bound.
pub type Claim = (f64, f64);

/// An LTP segment. All variants carry the id of the session they belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LtpSegment {
    /// A data segment carrying a slice of the block.
    Data(DataSegment),
    /// A report segment acknowledging received slices.
    Report(ReportSegment),
    /// Acknowledgement of a report segment.
    ReportAck(ReportAckSegment),
    /// Session cancellation. Not the full RFC 5326 exchange: a synthetic
    /// in-simulator signal that makes the session state machine terminate
    /// and route its block to the limbo.
    Cancel(CancelSegment),
}

impl LtpSegment {
    /// Session this segment belongs to.
    pub fn session_id(&self) -> SessionId {
        match self {
            LtpSegment::Data(s) => s.sid,
            LtpSegment::Report(s) => s.sid,
            LtpSegment::ReportAck(s) => s.sid,
            LtpSegment::Cancel(s) => s.sid,
        }
    }

    /// Size of this segment on the wire, in bits.
    pub fn num_bits(&self) -> f64 {
        match self {
            LtpSegment::Data(s) => s.length + DATA_SEGMENT_OVERHEAD,
            LtpSegment::Report(_) => REPORT_SEGMENT_SIZE,
            LtpSegment::ReportAck(_) => REPORT_ACK_SIZE,
            LtpSegment::Cancel(_) => CANCEL_SEGMENT_SIZE,
        }
    }

    /// Whether the segment was corrupted in transit.
    pub fn has_errors(&self) -> bool {
        match self {
            LtpSegment::Data(s) => s.has_errors,
            LtpSegment::Report(s) => s.has_errors,
            LtpSegment::ReportAck(s) => s.has_errors,
            LtpSegment::Cancel(s) => s.has_errors,
        }
    }

    /// Set or clear the error flag.
    pub fn mark_errors(&mut self, value: bool) {
        match self {
            LtpSegment::Data(s) => s.has_errors = value,
            LtpSegment::Report(s) => s.has_errors = value,
            LtpSegment::ReportAck(s) => s.has_errors = value,
            LtpSegment::Cancel(s) => s.has_errors = value,
        }
    }
}

impl std::fmt::Display for LtpSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LtpSegment::Data(s) => {
                write!(f, "DS {} ({}, {}, {:?})", s.sid, s.offset, s.length, s.checkpoint)
            }
            LtpSegment::Report(s) => {
                write!(f, "RS {} #{} (lb={}, ub={})", s.sid, s.id, s.lower_bnd, s.upper_bnd)
            }
            LtpSegment::ReportAck(s) => write!(f, "RA {} #{}", s.sid, s.report_id),
            LtpSegment::Cancel(s) => write!(f, "CS {}", s.sid),
        }
    }
}

/// An LTP data segment (page 16, RFC 5326).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSegment {
    /// Session id.
    pub sid: SessionId,
    /// Offset from the start of the block, in bits.
    pub offset: f64,
    /// Length of the data carried by this segment, in bits.
    pub length: f64,
    /// Checkpoint serial number, set iff this segment is a checkpoint.
    pub checkpoint: Option<u32>,
    /// Serial number of the report segment this segment responds to, if any.
    pub report: Option<u32>,
    /// Corruption flag.
    pub has_errors: bool,
}

impl DataSegment {
    /// Create a data segment for `[offset, offset + length)`.
    pub fn new(sid: SessionId, offset: f64, length: f64) -> Self {
        Self { sid, offset, length, checkpoint: None, report: None, has_errors: false }
    }

    /// Whether this segment is a checkpoint.
    pub fn is_checkpoint(&self) -> bool {
        self.checkpoint.is_some()
    }
}

/// An LTP report segment (page 17, RFC 5326).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSegment {
    /// Session id.
    pub sid: SessionId,
    /// Report serial number, unique within the session.
    pub id: u32,
    /// Checkpoint this report responds to.
    pub checkpoint: u32,
    /// Lower bound of the reported scope, in bits from the block start.
    pub lower_bnd: f64,
    /// Upper bound of the reported scope, in bits from the block start.
    pub upper_bnd: f64,
    /// Reception claims.
    pub claims: Vec<Claim>,
    /// Corruption flag.
    pub has_errors: bool,
}

impl ReportSegment {
    /// Total volume claimed by this report, in bits.
    pub fn claimed(&self) -> f64 {
        self.claims.iter().map(|(_, len)| len).sum()
    }
}

/// Acknowledgement of a report segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportAckSegment {
    /// Session id.
    pub sid: SessionId,
    /// Serial number of the acknowledged report.
    pub report_id: u32,
    /// Corruption flag.
    pub has_errors: bool,
}

/// Session cancellation signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelSegment {
    /// Session id.
    pub sid: SessionId,
    /// Corruption flag.
    pub has_errors: bool,
}

impl CancelSegment {
    /// Create a cancel segment for `sid`.
    pub fn new(sid: SessionId) -> Self {
        Self { sid, has_errors: false }
    }
}
