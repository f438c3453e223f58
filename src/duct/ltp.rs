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

//! The single-band LTP duct: block aggregation and deferred-ack sessions.
//!
//! A session moves one block of bundles. The outduct emits data segments
//! with the last one marked as a checkpoint, then waits for Report
//! Segments; the induct accumulates reception claims and answers every new
//! checkpoint with a report. Timers are never cancelled: on expiry they
//! check whether they are still relevant and no-op otherwise.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use log::*;

use super::{claims_to_intervals, interval_volume, union_intervals};
use crate::bundle::Bundle;
use crate::kernel::resources::MultiFifo;
use crate::kernel::Event;
use crate::message::Message;
use crate::radio::RadioItem;
use crate::segment::{DataSegment, LtpSegment, ReportAckSegment, ReportSegment};
use crate::simulation::Simulation;
use crate::types::{DuctId, RadioId, SessionId};

/// Simulated-time wall after which an open outduct session is force
/// cancelled, in seconds.
pub const SESSION_WALL: f64 = 24.0 * 60.0 * 60.0;

/// State of one outduct (transmit-side) LTP session.
#[derive(Debug, Clone)]
pub struct LtpTxSession {
    /// The bundles forming the block.
    pub block: Vec<Bundle>,
    /// Total block size in bits.
    pub size: f64,
    /// Bits acknowledged so far.
    pub acked: f64,
    /// Report serials already processed.
    pub reports_seen: BTreeSet<u32>,
    /// Checkpoint serial counter.
    pub ckpt_counter: u32,
    /// The checkpoint currently in flight, for timer retransmission.
    pub current_ckpt: Option<DataSegment>,
    /// Ingress queue for report/cancel segments (cancel is expedited).
    pub queue: MultiFifo<LtpSegment>,
}

impl LtpTxSession {
    fn new(block: Vec<Bundle>, size: f64) -> Self {
        Self {
            block,
            size,
            acked: 0.0,
            reports_seen: BTreeSet::new(),
            ckpt_counter: 0,
            current_ckpt: None,
            queue: MultiFifo::new(),
        }
    }
}

/// State of one induct (receive-side) LTP session.
#[derive(Debug, Clone)]
pub struct LtpRxSession {
    /// Block size, learned from the first checkpoint (deferred-ack mode).
    pub to_receive: Option<f64>,
    /// Bits received so far (raw sum over accepted data segments).
    pub received: f64,
    /// Claims accumulated since the last report.
    pub batch_claims: Vec<(f64, f64)>,
    /// Smallest offset seen since the last report.
    pub lower_bnd: f64,
    /// Checkpoint serials already answered.
    pub rx_checkpoints: BTreeSet<u32>,
    /// Report serial counter.
    pub report_counter: u32,
    /// Emitted reports still waiting for their acknowledgement.
    pub pending_ack: BTreeMap<u32, ReportSegment>,
    /// Whether the block was fully received and delivered.
    pub success: bool,
    /// Ingress queue for data/ack/cancel segments.
    pub queue: MultiFifo<LtpSegment>,
}

impl Default for LtpRxSession {
    fn default() -> Self {
        Self {
            to_receive: None,
            received: 0.0,
            batch_claims: Vec::new(),
            lower_bnd: f64::INFINITY,
            rx_checkpoints: BTreeSet::new(),
            report_counter: 0,
            pending_ack: BTreeMap::new(),
            success: false,
            queue: MultiFifo::new(),
        }
    }
}

/// The LTP outduct.
#[derive(Debug)]
pub struct LtpOutduct {
    /// The radio transmitting for this duct.
    pub radio: RadioId,
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
    /// Salt for session-id collision resolution.
    pub salt: u64,
}

impl LtpOutduct {
    /// Create an outduct with the given parameters.
    pub fn new(
        radio: RadioId,
        agg_size_limit: f64,
        agg_time_limit: f64,
        segment_size: f64,
        checkpoint_timer: f64,
    ) -> Self {
        Self {
            radio,
            agg_size_limit,
            agg_time_limit,
            segment_size,
            checkpoint_timer,
            cur_block: Vec::new(),
            cur_size: 0.0,
            block_start: 0.0,
            sessions: BTreeMap::new(),
            salt: 0,
        }
    }

    /// Unique session id for a block: the hash of its bundle tags, salted
    /// on collision (the stand-in for hashing the block's memory identity).
    fn session_id(&mut self, block: &[Bundle]) -> SessionId {
        for _ in 0..2 {
            let mut hasher = DefaultHasher::new();
            self.salt.hash(&mut hasher);
            for b in block {
                b.tag().hash(&mut hasher);
            }
            let sid = SessionId(hasher.finish());
            if !self.sessions.contains_key(&sid) {
                return sid;
            }
            self.salt += 1;
        }
        unreachable!("two salted hashes collided");
    }
}

/// The LTP induct.
#[derive(Debug)]
pub struct LtpInduct {
    /// The radio transmitting reports for this duct.
    pub radio: RadioId,
    /// Report retransmission timer in seconds.
    pub report_timer: f64,
    /// Live sessions by id.
    pub sessions: BTreeMap<SessionId, LtpRxSession>,
}

impl LtpInduct {
    /// Create an induct with the given report timer.
    pub fn new(radio: RadioId, report_timer: f64) -> Self {
        Self { radio, report_timer, sessions: BTreeMap::new() }
    }
}

/// Build the data segments covering `total` bits in `segment_size` slices,
/// the last one marked as a fresh checkpoint.
pub(crate) fn build_segments(
    sid: SessionId,
    total: f64,
    segment_size: f64,
    ckpt_counter: &mut u32,
    report: Option<u32>,
) -> Vec<DataSegment> {
    let n = (total / segment_size).ceil().max(1.0) as usize;
    let mut remaining = total;
    let mut segments = Vec::with_capacity(n);
    for i in 0..n {
        let length = remaining.min(segment_size);
        let mut seg = DataSegment::new(sid, i as f64 * segment_size, length);
        seg.report = report;
        remaining -= length;
        segments.push(seg);
    }
    let last = segments.last_mut().unwrap();
    last.checkpoint = Some(*ckpt_counter);
    *ckpt_counter += 1;
    segments
}

impl Simulation {
    /// LTP outduct ingress: aggregate the bundle into the current block and
    /// open a session once a limit is reached.
    pub(crate) fn ltp_out_ingress(&mut self, duct: DuctId, bundle: Bundle) {
        let now = self.clock.now();
        let d = &mut self.ducts[duct.index()];
        let super::DuctKind::LtpOut(state) = &mut d.kind else { return };

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
        let sid = state.session_id(&block);
        self.ltp_start_session(duct, sid, block, size);
    }

    /// Open a transmit session for a sealed block: emit all data segments,
    /// arm the checkpoint timer, and start the session wall timer.
    pub(crate) fn ltp_start_session(
        &mut self,
        duct: DuctId,
        sid: SessionId,
        block: Vec<Bundle>,
        size: f64,
    ) {
        let d = &mut self.ducts[duct.index()];
        let (neighbor, peer, mode) = (d.neighbor, d.peer, d.transmit_mode());
        let super::DuctKind::LtpOut(state) = &mut d.kind else { return };

        debug!(
            "duct {} opens LTP session {} ({} bundles, {} bits)",
            d.label,
            sid,
            block.len(),
            size
        );
        let mut session = LtpTxSession::new(block, size);
        let segments =
            build_segments(sid, size, state.segment_size, &mut session.ckpt_counter, None);
        session.current_ckpt = segments.last().cloned();
        let ckpt = session.current_ckpt.as_ref().unwrap().checkpoint.unwrap();
        let (radio, ckpt_timer) = (state.radio, state.checkpoint_timer);
        state.sessions.insert(sid, session);

        for seg in segments {
            self.radio_put(
                radio,
                RadioItem { neighbor, msg: Message::Segment(LtpSegment::Data(seg)), peer, dir: mode },
            );
        }
        self.clock.schedule_in(ckpt_timer, Event::CheckpointTimer { duct, sid, ckpt });
        self.clock.schedule_in(SESSION_WALL, Event::SessionTimer { duct, sid });
    }

    /// A segment reaches the outduct through the ack path (or a synthetic
    /// cancel). Late reports for finished sessions are acknowledged
    /// directly: a re-sent report means the original ack was lost.
    pub(crate) fn ltp_out_segment(&mut self, duct: DuctId, segment: LtpSegment) {
        let sid = segment.session_id();
        let d = &mut self.ducts[duct.index()];
        let (neighbor, peer, mode) = (d.neighbor, d.peer, d.transmit_mode());
        let super::DuctKind::LtpOut(state) = &mut d.kind else { return };

        let Some(session) = state.sessions.get_mut(&sid) else {
            if let LtpSegment::Report(rs) = &segment {
                let ack = LtpSegment::ReportAck(ReportAckSegment {
                    sid,
                    report_id: rs.id,
                    has_errors: false,
                });
                let radio = state.radio;
                self.radio_put(
                    radio,
                    RadioItem { neighbor, msg: Message::Segment(ack), peer, dir: mode },
                );
            }
            return;
        };
        let priority = if matches!(segment, LtpSegment::Cancel(_)) { 0 } else { 1 };
        let _ = session.queue.try_put(segment, priority);
        self.ltp_out_drain(duct, sid);
    }

    /// Process the queued segments of a transmit session.
    fn ltp_out_drain(&mut self, duct: DuctId, sid: SessionId) {
        let d = &mut self.ducts[duct.index()];
        let (neighbor, peer, mode) = (d.neighbor, d.peer, d.transmit_mode());
        let super::DuctKind::LtpOut(state) = &mut d.kind else { return };
        let Some(mut session) = state.sessions.remove(&sid) else { return };
        let (radio, segment_size, ckpt_timer) =
            (state.radio, state.segment_size, state.checkpoint_timer);

        let mut outbox: Vec<RadioItem> = Vec::new();
        let mut timers: Vec<u32> = Vec::new();
        // None: still running; Some(success): session over
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
                    // always ack: a repeated report means the ack was lost
                    let ack = LtpSegment::ReportAck(ReportAckSegment {
                        sid,
                        report_id: rs.id,
                        has_errors: false,
                    });
                    outbox.push(RadioItem {
                        neighbor,
                        msg: Message::Segment(ack),
                        peer,
                        dir: mode,
                    });
                    if !session.reports_seen.insert(rs.id) {
                        continue;
                    }
                    let claimed = claimed_volume(&rs);
                    session.acked += claimed;
                    if session.acked >= session.size {
                        outcome = Some(true);
                        break;
                    }
                    // re-emit the still-missing volume, closed by a fresh
                    // checkpoint answering this report
                    let missing = session.size - session.acked;
                    let segments = build_segments(
                        sid,
                        missing,
                        segment_size,
                        &mut session.ckpt_counter,
                        Some(rs.id),
                    );
                    session.current_ckpt = segments.last().cloned();
                    timers.push(segments.last().unwrap().checkpoint.unwrap());
                    for seg in segments {
                        outbox.push(RadioItem {
                            neighbor,
                            msg: Message::Segment(LtpSegment::Data(seg)),
                            peer,
                            dir: mode,
                        });
                    }
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
                    "LTP session {} ends ({})",
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
        for item in outbox {
            self.radio_put(radio, item);
        }
        for ckpt in timers {
            self.clock.schedule_in(ckpt_timer, Event::CheckpointTimer { duct, sid, ckpt });
        }
    }

    /// Checkpoint timer: if the checkpoint is still the current one,
    /// retransmit it and re-arm.
    pub(crate) fn handle_checkpoint_timer(&mut self, duct: DuctId, sid: SessionId, ckpt: u32) {
        // single-band ducts go through their one radio, multi-band ducts
        // duplicate across all bands
        let plan: Option<(Option<RadioId>, f64, DataSegment)> =
            match &self.ducts[duct.index()].kind {
                super::DuctKind::LtpOut(state) => state
                    .sessions
                    .get(&sid)
                    .and_then(|s| s.current_ckpt.as_ref())
                    .filter(|cur| cur.checkpoint == Some(ckpt))
                    .map(|cur| (Some(state.radio), state.checkpoint_timer, cur.clone())),
                super::DuctKind::MbltpOut(state) => state
                    .sessions
                    .get(&sid)
                    .and_then(|s| s.current_ckpt.as_ref())
                    .filter(|cur| cur.checkpoint == Some(ckpt))
                    .map(|cur| (None, state.checkpoint_timer, cur.clone())),
                _ => None,
            };
        let Some((radio, timer, mut segment)) = plan else { return };
        trace!("checkpoint timer fires for session {}, re-sending checkpoint {}", sid, ckpt);
        segment.has_errors = false;
        match radio {
            Some(radio) => {
                let d = &self.ducts[duct.index()];
                let item = RadioItem {
                    neighbor: d.neighbor,
                    msg: Message::Segment(LtpSegment::Data(segment)),
                    peer: d.peer,
                    dir: d.transmit_mode(),
                };
                self.radio_put(radio, item);
            }
            None => self.mbltp_send_through_all(duct, LtpSegment::Data(segment)),
        }
        self.clock.schedule_in(timer, Event::CheckpointTimer { duct, sid, ckpt });
    }

    /// Session wall timer: force cancel a session still open after 24h.
    pub(crate) fn handle_session_timer(&mut self, duct: DuctId, sid: SessionId) {
        let live = match &self.ducts[duct.index()].kind {
            super::DuctKind::LtpOut(state) => state.sessions.contains_key(&sid),
            super::DuctKind::MbltpOut(state) => state.sessions.contains_key(&sid),
            _ => false,
        };
        if live {
            warn!("LTP session {} still open after 24h, cancelling", sid);
            self.duct_cancel_session(duct, sid);
        }
    }

    /// A segment arrives at the induct through the forward path.
    pub(crate) fn ltp_in_segment(&mut self, duct: DuctId, segment: LtpSegment) {
        let sid = segment.session_id();
        let d = &mut self.ducts[duct.index()];
        let super::DuctKind::LtpIn(state) = &mut d.kind else { return };

        if !state.sessions.contains_key(&sid) {
            // only a data segment opens a session; late acks and cancels
            // for finished sessions are dropped
            if !matches!(segment, LtpSegment::Data(_)) {
                return;
            }
            state.sessions.insert(sid, LtpRxSession::default());
        }
        let session = state.sessions.get_mut(&sid).unwrap();
        let priority = if matches!(segment, LtpSegment::Cancel(_)) { 0 } else { 1 };
        let _ = session.queue.try_put(segment, priority);
        self.ltp_in_drain(duct, sid);
    }

    /// Process the queued segments of a receive session.
    fn ltp_in_drain(&mut self, duct: DuctId, sid: SessionId) {
        let d = &mut self.ducts[duct.index()];
        let (neighbor, peer, mode) = (d.neighbor, d.peer, d.transmit_mode());
        let super::DuctKind::LtpIn(state) = &mut d.kind else { return };
        let Some(mut session) = state.sessions.remove(&sid) else { return };
        let (radio, report_timer) = (state.radio, state.report_timer);

        let mut outbox: Vec<RadioItem> = Vec::new();
        let mut timers: Vec<u32> = Vec::new();
        let mut deliver = false;
        let mut finalize = false;

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
                    if session.pending_ack.is_empty() && session.success {
                        finalize = true;
                        break;
                    }
                }
                LtpSegment::Data(ds) => {
                    // after full reception only the final acks matter
                    if session.success {
                        continue;
                    }
                    // a checkpoint re-sent by the peer's timer must not be
                    // answered twice
                    if let Some(ckpt) = ds.checkpoint {
                        if session.rx_checkpoints.contains(&ckpt) {
                            continue;
                        }
                    }
                    session.batch_claims.push((ds.offset, ds.length));
                    session.lower_bnd = session.lower_bnd.min(ds.offset);
                    session.received += ds.length;

                    let Some(ckpt) = ds.checkpoint else { continue };
                    session.rx_checkpoints.insert(ckpt);
                    if session.to_receive.is_none() {
                        // deferred-ack mode: the first checkpoint closes the
                        // block, so it tells us the block size
                        session.to_receive = Some(ds.offset + ds.length);
                    }

                    session.report_counter += 1;
                    let rs = ReportSegment {
                        sid,
                        id: session.report_counter,
                        checkpoint: ckpt,
                        lower_bnd: if session.lower_bnd.is_finite() {
                            session.lower_bnd
                        } else {
                            ds.offset
                        },
                        upper_bnd: ds.offset + ds.length,
                        claims: std::mem::take(&mut session.batch_claims),
                        has_errors: false,
                    };
                    session.lower_bnd = f64::INFINITY;
                    session.pending_ack.insert(rs.id, rs.clone());
                    timers.push(rs.id);
                    outbox.push(RadioItem {
                        neighbor,
                        msg: Message::Segment(LtpSegment::Report(rs)),
                        peer,
                        dir: mode,
                    });

                    if session.received >= session.to_receive.unwrap() {
                        session.success = true;
                        deliver = true;
                    }
                }
                LtpSegment::Report(_) => {}
            }
        }

        if !finalize {
            state.sessions.insert(sid, session);
        } else {
            debug!("LTP receive session {} ends", sid);
        }
        if deliver {
            self.ltp_deliver_block(duct, sid);
        }
        for item in outbox {
            self.radio_put(radio, item);
        }
        for rid in timers {
            self.clock.schedule_in(report_timer, Event::ReportTimer { duct, sid, rid });
        }
    }

    /// Report timer: if the report is still unacknowledged, retransmit it
    /// and re-arm.
    pub(crate) fn handle_report_timer(&mut self, duct: DuctId, sid: SessionId, rid: u32) {
        let plan: Option<(Option<RadioId>, f64, ReportSegment)> =
            match &self.ducts[duct.index()].kind {
                super::DuctKind::LtpIn(state) => state
                    .sessions
                    .get(&sid)
                    .and_then(|s| s.pending_ack.get(&rid))
                    .map(|rs| (Some(state.radio), state.report_timer, rs.clone())),
                super::DuctKind::MbltpIn(state) => state
                    .sessions
                    .get(&sid)
                    .and_then(|s| s.pending_ack.get(&rid))
                    .map(|rs| (None, state.report_timer, rs.clone())),
                _ => None,
            };
        let Some((radio, timer, mut rs)) = plan else { return };
        trace!("report timer fires for session {}, re-sending report {}", sid, rid);
        rs.has_errors = false;
        match radio {
            Some(radio) => {
                let d = &self.ducts[duct.index()];
                let item = RadioItem {
                    neighbor: d.neighbor,
                    msg: Message::Segment(LtpSegment::Report(rs)),
                    peer: d.peer,
                    dir: d.transmit_mode(),
                };
                self.radio_put(radio, item);
            }
            None => self.mbltp_send_through_all(duct, LtpSegment::Report(rs)),
        }
        self.clock.schedule_in(timer, Event::ReportTimer { duct, sid, rid });
    }

    /// Deliver the block of session `sid` to the node: the block is cloned
    /// out of the peer outduct's session table (the simulation shortcut for
    /// carrying payloads in segments).
    pub(crate) fn ltp_deliver_block(&mut self, duct: DuctId, sid: SessionId) {
        let peer = self.ducts[duct.index()].peer;
        let block = match &self.ducts[peer.index()].kind {
            super::DuctKind::LtpOut(state) => {
                state.sessions.get(&sid).map(|s| s.block.clone())
            }
            super::DuctKind::MbltpOut(state) => {
                state.sessions.get(&sid).map(|s| s.block.clone())
            }
            _ => None,
        };
        match block {
            Some(block) => {
                debug!("session {} delivers {} bundles", sid, block.len());
                for bundle in block {
                    self.induct_deliver(duct, bundle);
                }
            }
            // the peer already closed the session: the block was delivered
            // through the early-delivery path
            None => trace!("session {} block no longer at the peer", sid),
        }
    }
}

/// Volume acknowledged by a report: the union of its claims clipped to
/// `[lower_bnd, upper_bnd]`.
pub(crate) fn claimed_volume(rs: &ReportSegment) -> f64 {
    let union = union_intervals(claims_to_intervals(&rs.claims));
    let clipped: Vec<(f64, f64)> = union
        .into_iter()
        .map(|(s, e)| (s.max(rs.lower_bnd), e.min(rs.upper_bnd)))
        .filter(|(s, e)| e > s)
        .collect();
    interval_volume(&clipped)
}
