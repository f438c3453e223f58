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

//! Tests for the LTP family: interval math, segmentation, and the duct
//! state machines driven end to end.

use maplit::btreemap;
use pretty_assertions::assert_eq;

use super::{arrived_volume, assert_valid, basic_radio, file_generator, two_node_config};
use crate::config::{DuctConfig, RadioConfig};
use crate::duct::{
    claims_to_intervals, interval_volume, intervals_to_claims, union_intervals, xor_intervals,
    DuctKind,
};
use crate::radio::{coded_equivalent_ber, RateProfile};
use crate::segment::ReportSegment;
use crate::simulation::Simulation;
use crate::types::SessionId;

fn ltp_duct(agg_size_limit: f64, segment_size: f64, timer: f64) -> DuctConfig {
    DuctConfig::Ltp {
        radio: "radio".into(),
        agg_size_limit,
        agg_time_limit: 1e9,
        segment_size,
        checkpoint_timer: timer,
        report_timer: timer,
    }
}

#[test]
fn interval_union_and_xor() {
    let union = union_intervals(vec![(1.0, 10.0), (2.0, 11.0), (15.0, 20.0)]);
    assert_eq!(union, vec![(1.0, 11.0), (15.0, 20.0)]);
    assert_eq!(interval_volume(&union), 15.0);

    // adjacent intervals merge, empty ones vanish
    let union = union_intervals(vec![(0.0, 5.0), (5.0, 8.0), (9.0, 9.0)]);
    assert_eq!(union, vec![(0.0, 8.0)]);

    let missing = xor_intervals(0.0, 10.0, &[(2.0, 3.0), (5.0, 8.0)]);
    assert_eq!(missing, vec![(0.0, 2.0), (3.0, 5.0), (8.0, 10.0)]);
    assert!(xor_intervals(0.0, 10.0, &[(0.0, 10.0)]).is_empty());
    assert_eq!(xor_intervals(0.0, 10.0, &[]), vec![(0.0, 10.0)]);

    let claims = intervals_to_claims(&[(2.0, 5.0)]);
    assert_eq!(claims, vec![(2.0, 3.0)]);
    assert_eq!(claims_to_intervals(&claims), vec![(2.0, 5.0)]);
}

#[test]
fn report_claims_are_clipped_to_the_bounds() {
    let rs = ReportSegment {
        sid: SessionId(1),
        id: 1,
        checkpoint: 0,
        lower_bnd: 2.0,
        upper_bnd: 10.0,
        claims: vec![(0.0, 4.0), (3.0, 2.0), (8.0, 5.0)],
        has_errors: false,
    };
    // union is [0, 5) u [8, 13); clipped to [2, 10) that is 3 + 2 bits
    assert_eq!(crate::duct::ltp::claimed_volume(&rs), 5.0);
}

#[test]
fn data_segmentation_marks_the_last_segment_as_checkpoint() {
    let mut counter = 0;
    let segs = crate::duct::ltp::build_segments(SessionId(9), 4.5e5, 1e5, &mut counter, Some(3));
    assert_eq!(segs.len(), 5);
    assert_eq!(segs[0].offset, 0.0);
    assert_eq!(segs[4].offset, 4e5);
    assert_eq!(segs[4].length, 5e4);
    assert!(segs[..4].iter().all(|s| !s.is_checkpoint() && s.length == 1e5));
    assert_eq!(segs[4].checkpoint, Some(0));
    assert!(segs.iter().all(|s| s.report == Some(3)));
    assert_eq!(counter, 1);
}

#[test]
fn coded_radio_derives_a_meaningful_equivalent_ber() {
    assert_eq!(coded_equivalent_ber(1e6, 0.0, 1e3, 0.5), 0.0);
    let low = coded_equivalent_ber(1e6, 1e-4, 1e3, 0.5);
    let high = coded_equivalent_ber(1e6, 1e-2, 1e3, 0.5);
    assert!(low > 0.0 && high < 1.0);
    assert!(low < high);
}

#[test]
fn variable_rate_profile_integrates_across_steps() {
    let profile = RateProfile::new(vec![(0.0, 0.0), (10.0, 5.0), (20.0, 0.0), (30.0, 10.0)]);
    assert_eq!(profile.rate_at(5.0), 0.0);
    assert_eq!(profile.rate_at(15.0), 5.0);
    assert_eq!(profile.peak_rate(), 10.0);

    // 25 bits: 10s of waiting, then 5s at rate 5
    assert_eq!(profile.tx_time(25.0, 0.0), Some(15.0));
    // 60 bits: 50 sent in [10, 20), the rest after the gap at rate 10
    assert_eq!(profile.tx_time(60.0, 0.0), Some(31.0));
    // starting mid-step only the remaining step capacity counts
    assert_eq!(profile.tx_time(10.0, 18.0), Some(2.0));

    // a profile that ends inactive can never move the bits
    let dead = RateProfile::new(vec![(0.0, 1.0), (10.0, 0.0)]);
    assert_eq!(dead.tx_time(100.0, 0.0), None);
}

#[test]
fn ltp_delivers_a_file_and_closes_all_sessions() {
    // 12 bundles of 1e5 bits, aggregated into 3 blocks of 4e5
    let mut config = two_node_config(basic_radio(1e6), ltp_duct(4e5, 1e5, 1e3));
    config
        .generators
        .insert("file".into(), file_generator(1.2e6, 1e5, "N2"));
    config.nodes.get_mut("N1").unwrap().generators.push("file".into());

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    assert_eq!(results.table("arrived").len(), 12);
    assert_eq!(arrived_volume(&results, "file"), 1.2e6);
    assert_valid(&results);

    // every LTP session wound down
    for duct in &sim.ducts {
        match &duct.kind {
            DuctKind::LtpOut(s) => {
                assert!(s.sessions.is_empty(), "open transmit session left behind");
                assert!(s.cur_block.is_empty());
            }
            DuctKind::LtpIn(s) => {
                assert!(s.sessions.is_empty(), "open receive session left behind");
            }
            _ => {}
        }
    }
}

#[test]
fn ltp_trailing_unclosed_block_stays_stored() {
    // 13 bundles: three full blocks of 4e5 bits ship, the last bundle never
    // fills a block and stays aggregating at shutdown
    let mut config = two_node_config(basic_radio(1e6), ltp_duct(4e5, 1e5, 1e3));
    config
        .generators
        .insert("file".into(), file_generator(1.3e6, 1e5, "N2"));
    config.nodes.get_mut("N1").unwrap().generators.push("file".into());

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    assert_eq!(arrived_volume(&results, "file"), 1.2e6);
    let in_outduct = results.table("in_outduct");
    assert_eq!(in_outduct.len(), 1);
    assert_eq!(in_outduct[0].data_vol, 1e5);
    assert_valid(&results);
}

#[test]
fn ltp_retransmits_through_bit_errors() {
    // BER high enough that most blocks need several report rounds
    let mut config = two_node_config(
        RadioConfig::Basic { rate: 1e6, ber: 1e-5, j_bit: 0.0 },
        ltp_duct(1e6, 1e5, 10.0),
    );
    config
        .generators
        .insert("file".into(), file_generator(1e7, 1e6, "N2"));
    config.nodes.get_mut("N1").unwrap().generators.push("file".into());

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    // LTP recovers every bit despite the lossy link
    assert_eq!(arrived_volume(&results, "file"), 1e7);
    assert_valid(&results);
    // the retransmission rounds show up as extra latency beyond the
    // loss-free serialization + propagation time
    let latencies: Vec<f64> = results.table("arrived").iter().map(|r| r.latency.unwrap()).collect();
    let mean = latencies.iter().sum::<f64>() / latencies.len() as f64;
    assert!(mean > 2.0, "mean latency {mean} is below the loss-free bound");
}

#[test]
fn mbltp_duplicates_segments_across_bands() {
    let mut config = two_node_config(
        basic_radio(5e5),
        DuctConfig::Mbltp {
            bands: btreemap! { "Ka".into() => "radio_ka".into(), "X".into() => "radio".into() },
            agg_size_limit: 4e5,
            agg_time_limit: 1e9,
            segment_size: 1e5,
            checkpoint_timer: 1e3,
            report_timer: 1e3,
        },
    );
    config.radios.insert("radio_ka".into(), basic_radio(5e5));
    for node in ["N1", "N2"] {
        config.nodes.get_mut(node).unwrap().radios.push("radio_ka".into());
    }
    config
        .generators
        .insert("file".into(), file_generator(1.2e6, 1e5, "N2"));
    config.nodes.get_mut("N1").unwrap().generators.push("file".into());

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    assert_eq!(arrived_volume(&results, "file"), 1.2e6);
    // exactly one copy of every bundle is delivered despite the per-band
    // duplication of all segments
    assert_eq!(results.table("arrived").len(), 12);
    assert_valid(&results);

    for duct in &sim.ducts {
        match &duct.kind {
            DuctKind::MbltpOut(s) => assert!(s.sessions.is_empty()),
            DuctKind::MbltpIn(s) => assert!(s.sessions.is_empty()),
            _ => {}
        }
    }
}

#[test]
fn parallel_ltp_delivers_every_bundle_exactly_once() {
    let mut config = two_node_config(
        basic_radio(1e6),
        DuctConfig::ParallelLtp {
            engines: btreemap! {
                "e1".into() => "engine".into(),
                "e2".into() => "engine".into(),
            },
        },
    );
    config.ducts.insert("engine".into(), ltp_duct(1e5, 1e5, 1e3));
    config
        .generators
        .insert("file".into(), file_generator(5e5, 1e5, "N2"));
    config.nodes.get_mut("N1").unwrap().generators.push("file".into());

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    let arrived = results.table("arrived");
    assert_eq!(arrived.len(), 5);
    assert_eq!(arrived_volume(&results, "file"), 5e5);
    // exactly-once: no duplicate (bid, cid) even with two engines
    let mut tags: Vec<(u64, u32)> = arrived.iter().map(|r| (r.bid, r.cid)).collect();
    tags.sort();
    tags.dedup();
    assert_eq!(tags.len(), 5);
    assert_valid(&results);

    // the per-bundle tallies at the parallel ducts are gone
    for duct in &sim.ducts {
        match &duct.kind {
            DuctKind::ParOut(s) => assert!(s.status.is_empty()),
            DuctKind::ParIn(s) => assert!(s.handlers.is_empty()),
            _ => {}
        }
    }
}
