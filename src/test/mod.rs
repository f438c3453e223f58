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

use maplit::btreemap;

use crate::config::{
    ConnectionConfig, ConnectionKindConfig, DuctConfig, GeneratorConfig, MobilityConfig,
    NodeConfig, RadioConfig, RouterConfig, SimConfig,
};
use crate::report::ResultSet;

mod test_cgr;
mod test_kernel;
mod test_lookup;
mod test_ltp;
mod test_mobility;
mod test_network;
mod test_queue;

/// `N1 <-> N2` over one static connection (1s propagation) with the given
/// radio and duct, and static next-hop routers on both ends.
pub(crate) fn two_node_config(radio: RadioConfig, duct: DuctConfig) -> SimConfig {
    let mut config = SimConfig::default();
    config.radios.insert("radio".into(), radio);
    config.ducts.insert("duct".into(), duct);
    config.mobility.insert("static".into(), MobilityConfig::Static { prop_delay: 1.0 });
    config.routers.insert(
        "router".into(),
        RouterConfig::Static {
            routes: btreemap! {
                "N1".into() => btreemap! { "N2".into() => "N2".into() },
                "N2".into() => btreemap! { "N1".into() => "N1".into() },
            },
        },
    );
    let mut n1 = NodeConfig::new("router", "static");
    n1.radios.push("radio".into());
    let mut n2 = NodeConfig::new("router", "static");
    n2.radios.push("radio".into());
    config.nodes.insert("N1".into(), n1);
    config.nodes.insert("N2".into(), n2);
    config.connections.push(ConnectionConfig::both_ways(
        "N1",
        "N2",
        ConnectionKindConfig::Static { prop_delay: Some(1.0) },
        btreemap! { "duct".into() => "duct".into() },
        "static",
    ));
    config
}

/// A basic radio with the given rate, no errors, no energy accounting.
pub(crate) fn basic_radio(rate: f64) -> RadioConfig {
    RadioConfig::Basic { rate, ber: 0.0, j_bit: 0.0 }
}

/// A constant-bit-rate voice generator towards `dest`.
pub(crate) fn cbr_generator(rate: f64, until: f64, bundle_size: f64, dest: &str) -> GeneratorConfig {
    GeneratorConfig::ConstantBitRate {
        rate,
        until,
        tstart: 0.0,
        bundle_size,
        bundle_ttl: f64::INFINITY,
        data_type: "voice".into(),
        critical: false,
        destination: Some(dest.into()),
    }
}

/// A file generator towards `dest`.
pub(crate) fn file_generator(size: f64, bundle_size: f64, dest: &str) -> GeneratorConfig {
    GeneratorConfig::File {
        size,
        tstart: 0.0,
        bundle_size,
        bundle_ttl: f64::INFINITY,
        data_type: "file".into(),
        critical: false,
        destination: Some(dest.into()),
        repeat: 1,
        wait: 0.0,
    }
}

/// Total arrived volume of a data type, in bits.
pub(crate) fn arrived_volume(results: &ResultSet, data_type: &str) -> f64 {
    results
        .table("arrived")
        .iter()
        .filter(|r| r.data_type == data_type)
        .map(|r| r.data_vol)
        .sum()
}

/// Assert that the run passes all validation checks.
pub(crate) fn assert_valid(results: &ResultSet) {
    let failures = crate::report::validation::validate(results);
    assert!(failures.is_empty(), "validation failed: {:?}", failures);
}
