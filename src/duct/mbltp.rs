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

//! The multi-band LTP duct.
//!
//! Session logic follows the single-band duct with two differences:
//! session ids are sequential (so stale segments for finished sessions can
//! be rejected by comparison), and every outbound segment is duplicated
//! across all configured bands, each band with its own radio. Reports carry
//! claims post-union, so the outduct computes missing data as
//! `xor([0, to_receive], claims)`. The induct may deliver the block early,
//! before the closing checkpoint arrives.

use std::collections::{BTreeMap, BTreeSet};

use log::*;

use super::ltp::LtpTxSession;
use super::{claims_to_intervals, intervals_to_claims, union_intervals, xor_intervals};
use crate::bundle::Bundle;
use crate::kernel::resources::MultiFifo;
use crate::kernel::Event;
use crate::message::Message;
use crate::radio::RadioItem;
use crate::segment::{DataSegment, LtpSegment, ReportAckSegment, ReportSegment};
use crate::simulation::Simulation;
use crate::types::{DuctId, RadioId, SessionId};

/// The multi-band LTP outduct. Transmit sessions reuse [`LtpTxSession`].
#[derive(Debug)]
pub struct MbltpOutduct {
    /// One radio per band.
    pub radios: Vec<RadioId>,
    /// Block aggregation size limit in bits.
    pub agg_size_limit: f64,
    /// Block aggregation time limit in seconds.
    pub agg_time_limit: f64,
    /// Data segment size in bits.
    pub segment_size: f64,
    /// Checkpoint retransmission timer in seconds.
    pub checkpoint_timer: f64,
    /// The block being aggregated.
    pub cur_block: Vec<Bundle>,
    /// Size of the aggregating block in bits.
    pub cur_size: f64,
    /// Time the aggregating block was started.
    pub block_start: f64,
    /// Live sessions by id.
    pub sessions: BTreeMap<SessionId, LtpTxSession>,
    /// Sequential session id counter.
    pub sid_counter: u64,
}

impl MbltpOutduct {
    /// Create an outduct with the given parameters.
    pub fn new(
        radios: Vec<RadioId>,
        agg_size_limit: f64,
        agg_time_limit: f64,
        segment_size: f64,
        checkpoint_timer: f64,
    ) -> Self {
        Self {
            radios,
            agg_size_limit,
            agg_time_limit,
            segment_size,
            checkpoint_timer,
            cur_block: Vec::new(),
            cur_size: 0.0,
            block_start: 0.0,
            sessions: BTreeMap::new(),
            sid_counter: 0,
        }
    }
}

/// State of one induct (receive-side) multi-band session.
#[derive(Debug, Clone)]
pub struct MbRxSession {
    /// Block size (padded to whole segments), learned from the first
    /// checkpoint.
    pub to_receive: Option<f64>,
    /// Union of the received `(start, end)` intervals.
    pub coverage: Vec<(f64, f64)>,
    /// Checkpoint serials already answered.
    pub rx_checkpoints: BTreeSet<u32>,
    /// Report serial counter.
    pub report_counter: u32,
    /// Emitted reports still waiting for their acknowledgement.
    pub pending_ack: BTreeMap<u32, ReportSegment>,
    /// Whether the block was delivered.
    pub success: bool,
    /// Volume claimed by the most recent report.
    pub last_rs_claimed: Option<f64>,
    /// Ingress queue for data/ack/cancel segments.
    pub queue: MultiFifo<LtpSegment>,
}

impl Default for MbRxSession {
    fn default() -> Self {
        Self {
            to_receive: None,
            coverage: Vec::new(),
            rx_checkpoints: BTreeSet::new(),
            report_counter: 0,
            pending_ack: BTreeMap::new(),
            success: false,
            last_rs_claimed: None,
            queue: MultiFifo::new(),
        }
    }
}

/// The multi-band LTP induct.
#[derive(Debug)]
pub struct MbltpInduct {
    /// One radio per band.
    pub radios: Vec<RadioId>,
    /// Report retransmission timer in seconds.
    pub report_timer: f64,
    /// Live sessions by id.
    pub sessions: BTreeMap<SessionId, MbRxSession>,
    /// Largest session id ever opened; anything at or below it without a
    /// live session is stale and dropped.
    pub last_sid: Option<SessionId>,
}

impl MbltpInduct {
    /// Create an induct with the given report timer.
    pub fn new(radios: Vec<RadioId>, report_timer: f64) -> Self {
        Self { radios, report_timer, sessions: BTreeMap::new(), last_sid: None }
    }
}

/// Initial segments of a block: whole `segment_size` slices, the last one a
/// fresh checkpoint (the padded tail is part of the modeled volume).
fn mb_initial_segments(
    sid: SessionId,
    size: f64,
    segment_size: f64,
    ckpt_counter: &mut u32,
) -> Vec<DataSegment> {
    let n = (size / segment_size).ceil().max(1.0) as usize;
    let mut segments: Vec<DataSegment> = (0..n)
        .map(|i| DataSegment::new(sid, i as f64 * segment_size, segment_size))
        .collect();
    let last = segments.last_mut().unwrap();
    last.checkpoint = Some(*ckpt_counter);
    *ckpt_counter += 1;
    segments
}

impl Simulation {
    /// Duplicate a segment across all bands of a multi-band duct.
    pub(crate) fn mbltp_send_through_all(&mut self, duct: DuctId, segment: LtpSegment) {
        let d = &self.ducts[duct.index()];
        let (neighbor, peer, mode) = (d.neighbor, d.peer, d.transmit_mode());
        let radios: Vec<RadioId> = match &d.kind {
            super::DuctKind::MbltpOut(s) => s.radios.clone(),
            super::DuctKind::MbltpIn(s) => s.radios.clone(),
            _ => return,
        };
        for radio in radios {
            self.radio_put(
                radio,
                RadioItem { neighbor, msg: Message::Segment(segment.clone()), peer, dir: mode },
            );
        }
    }

    /// Multi-band outduct ingress: aggregate and open sessions like the
    /// single-band duct, but with sequential session ids.
    pub(crate) fn mbltp_out_ingress(&mut self, duct: DuctId, bundle: Bundle) {
        let now = self.clock.now();
        let d = &mut self.ducts[duct.index()];
        let super::DuctKind::MbltpOut(state) = &mut d.kind else { return };

        if state.cur_block.is_empty() {
            state.block_start = now;
        }
        state.cur_size += bundle.data_vol;
        state.cur_block.push(bundle);
        if state.cur_size < state.agg_size_limit && now - state.block_start < state.agg_time_limit
        {
            return;
        }

        let block = std::mem::take(&mut state.cur_block);
        let size = std::mem::replace(&mut state.cur_size, 0.0);
        state.sid_counter += 1;
        let sid = SessionId(state.sid_counter);

        debug!(
            "duct {} opens MBLTP session {} ({} bundles, {} bits)",
            d.label,
            sid,
            block.len(),
            size
        );
        let mut session = LtpTxSession {
            block,
            size,
            acked: 0.0,
            reports_seen: BTreeSet::new(),
            ckpt_counter: 0,
            current_ckpt: None,
            queue: MultiFifo::new(),
        };
        let segments =
            mb_initial_segments(sid, size, state.segment_size, &mut session.ckpt_counter);
        session.current_ckpt = segments.last().cloned();
        let ckpt = segments.last().unwrap().checkpoint.unwrap();
        let ckpt_timer = state.checkpoint_timer;
        state.sessions.insert(sid, session);

        for seg in segments {
            self.mbltp_send_through_all(duct, LtpSegment::Data(seg));
        }
        self.clock.schedule_in(ckpt_timer, Event::CheckpointTimer { duct, sid, ckpt });
        self.clock
            .schedule_in(super::ltp::SESSION_WALL, Event::SessionTimer { duct, sid });
    }

    /// A segment reaches the multi-band outduct through the ack path.
    pub(crate) fn mbltp_out_segment(&mut self, duct: DuctId, segment: LtpSegment) {
        let sid = segment.session_id();
        let known = match &self.ducts[duct.index()].kind {
            super::DuctKind::MbltpOut(state) => state.sessions.contains_key(&sid),
            _ => return,
        };
        if !known {
            if let LtpSegment::Report(rs) = &segment {
                let ack = LtpSegment::ReportAck(ReportAckSegment {
                    sid,
                    report_id: rs.id,
                    has_errors: false,
                });
                self.mbltp_send_through_all(duct, ack);
            }
            return;
        }
        let super::DuctKind::MbltpOut(state) = &mut self.ducts[duct.index()].kind else {
            return;
        };
        let session = state.sessions.get_mut(&sid).unwrap();
        let priority = if matches!(segment, LtpSegment::Cancel(_)) { 0 } else { 1 };
        let _ = session.queue.try_put(segment, priority);
        self.mbltp_out_drain(duct, sid);
    }

    /// Process the queued segments of a multi-band transmit session.
    fn mbltp_out_drain(&mut self, duct: DuctId, sid: SessionId) {
        let super::DuctKind::MbltpOut(state) = &mut self.ducts[duct.index()].kind else {
            return;
        };
        let Some(mut session) = state.sessions.remove(&sid) else { return };
        let (segment_size, ckpt_timer) = (state.segment_size, state.checkpoint_timer);

        let mut outbox: Vec<LtpSegment> = Vec::new();
        let mut timers: Vec<u32> = Vec::new();
        let mut outcome: Option<bool> = None;

        while let Some((segment, _)) = session.queue.try_get() {
            if segment.has_errors() {
                continue;
            }
            match segment {
                LtpSegment::Cancel(_) => {
                    outcome = Some(false);
                    break;
                }
                LtpSegment::Report(rs) => {
                    outbox.push(LtpSegment::ReportAck(ReportAckSegment {
                        sid,
                        report_id: rs.id,
                        has_errors: false,
                    }));
                    if !session.reports_seen.insert(rs.id) {
                        continue;
                    }
                    // claims come post-union from the induct; a later report
                    // can still ack less than an earlier one
                    session.acked = session.acked.max(rs.claimed());
                    if session.acked >= session.size {
                        outcome = Some(true);
                        break;
                    }
                    let covered = union_intervals(claims_to_intervals(&rs.claims));
                    let missing = xor_intervals(rs.lower_bnd, rs.upper_bnd, &covered);
                    let mut segments = Vec::new();
                    for (s, e) in missing {
                        let n = ((e - s) / segment_size).ceil().max(1.0) as usize;
                        for i in 0..n {
                            let mut seg =
                                DataSegment::new(sid, s + i as f64 * segment_size, segment_size);
                            seg.report = Some(rs.id);
                            segments.push(seg);
                        }
                    }
                    if segments.is_empty() {
                        continue;
                    }
                    let last = segments.last_mut().unwrap();
                    last.checkpoint = Some(session.ckpt_counter);
                    session.ckpt_counter += 1;
                    session.current_ckpt = segments.last().cloned();
                    timers.push(segments.last().unwrap().checkpoint.unwrap());
                    outbox.extend(segments.into_iter().map(LtpSegment::Data));
                }
                _ => {}
            }
        }

        match outcome {
            None => {
                state.sessions.insert(sid, session);
            }
            Some(success) => {
                debug!(
                    "MBLTP session {} ends ({})",
                    sid,
                    if success { "success" } else { "cancelled" }
                );
                for bundle in session.block {
                    if success {
                        self.duct_notify_success(duct, bundle);
                    } else {
                        self.duct_notify_fail(duct, bundle);
                    }
                }
            }
        }
        for segment in outbox {
            self.mbltp_send_through_all(duct, segment);
        }
        for ckpt in timers {
            self.clock.schedule_in(ckpt_timer, Event::CheckpointTimer { duct, sid, ckpt });
        }
    }

    /// A segment arrives at the multi-band induct through the forward path.
    /// Sequential session ids let the induct drop segments of sessions that
    /// already finished.
    pub(crate) fn mbltp_in_segment(&mut self, duct: DuctId, segment: LtpSegment) {
        let sid = segment.session_id();
        let super::DuctKind::MbltpIn(state) = &mut self.ducts[duct.index()].kind else {
            return;
        };

        if !state.sessions.contains_key(&sid) {
            let fresh = state.last_sid.map_or(true, |last| sid > last);
            if !fresh || !matches!(segment, LtpSegment::Data(_)) {
                trace!("dropping stale segment for MBLTP session {}", sid);
                return;
            }
            state.sessions.insert(sid, MbRxSession::default());
            state.last_sid = Some(state.last_sid.map_or(sid, |last| last.max(sid)));
        }
        let session = state.sessions.get_mut(&sid).unwrap();
        let priority = if matches!(segment, LtpSegment::Cancel(_)) { 0 } else { 1 };
        let _ = session.queue.try_put(segment, priority);
        self.mbltp_in_drain(duct, sid);
    }

    /// Process the queued segments of a multi-band receive session.
    fn mbltp_in_drain(&mut self, duct: DuctId, sid: SessionId) {
        let super::DuctKind::MbltpIn(state) = &mut self.ducts[duct.index()].kind else {
            return;
        };
        let Some(mut session) = state.sessions.remove(&sid) else { return };
        let report_timer = state.report_timer;

        let mut outbox: Vec<LtpSegment> = Vec::new();
        let mut timers: Vec<u32> = Vec::new();
        let mut deliveries = 0usize;
        let mut finalize = false;

        let fully_received = |s: &MbRxSession| -> bool {
            match s.to_receive {
                Some(total) => {
                    s.coverage.len() == 1 && (s.coverage[0].1 - s.coverage[0].0) >= total
                }
                None => false,
            }
        };

        while let Some((segment, _)) = session.queue.try_get() {
            if segment.has_errors() {
                continue;
            }
            match segment {
                LtpSegment::Cancel(_) => {
                    finalize = true;
                    break;
                }
                LtpSegment::ReportAck(ra) => {
                    session.pending_ack.remove(&ra.report_id);
                    if !session.pending_ack.is_empty() {
                        continue;
                    }
                    // do not exit before a report acknowledged the whole
                    // block, or the peer outduct would linger forever
                    let total = session.to_receive.unwrap_or(f64::INFINITY);
                    if session.last_rs_claimed.map_or(false, |v| v >= total) {
                        finalize = true;
                        break;
                    }
                }
                LtpSegment::Data(ds) => {
                    if !session.success {
                        let mut cov = std::mem::take(&mut session.coverage);
                        cov.push((ds.offset, ds.offset + ds.length));
                        session.coverage = union_intervals(cov);
                    }
                    // the whole block may be covered before the closing
                    // checkpoint arrives: deliver early
                    if !session.success && fully_received(&session) {
                        session.success = true;
                        deliveries += 1;
                    }
                    let Some(ckpt) = ds.checkpoint else { continue };
                    if !session.rx_checkpoints.insert(ckpt) {
                        continue;
                    }
                    if session.to_receive.is_none() {
                        session.to_receive = Some(ds.offset + ds.length);
                    }
                    session.report_counter += 1;
                    let claims = intervals_to_claims(&session.coverage);
                    let rs = ReportSegment {
                        sid,
                        id: session.report_counter,
                        checkpoint: ckpt,
                        lower_bnd: 0.0,
                        upper_bnd: session.to_receive.unwrap(),
                        claims,
                        has_errors: false,
                    };
                    session.last_rs_claimed = Some(rs.claimed());
                    session.pending_ack.insert(rs.id, rs.clone());
                    timers.push(rs.id);
                    outbox.push(LtpSegment::Report(rs));

                    if !session.success && fully_received(&session) {
                        session.success = true;
                        deliveries += 1;
                    }
                }
                LtpSegment::Report(_) => {}
            }
        }

        if !finalize {
            state.sessions.insert(sid, session);
        } else {
            debug!("MBLTP receive session {} ends", sid);
        }
        for _ in 0..deliveries {
            self.ltp_deliver_block(duct, sid);
        }
        for segment in outbox {
            self.mbltp_send_through_all(duct, segment);
        }
        for rid in timers {
            self.clock.schedule_in(report_timer, Event::ReportTimer { duct, sid, rid });
        }
    }
}
