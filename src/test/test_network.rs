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

//! End-to-end scenarios exercising the full stack.

use maplit::btreemap;
use pretty_assertions::assert_eq;

use super::{
    arrived_volume, assert_valid, basic_radio, cbr_generator, file_generator, two_node_config,
};
use crate::config::{
    ConnectionConfig, ConnectionKindConfig, DuctConfig, GeneratorConfig, MobilityConfig,
    NodeConfig, RadioConfig, Relays, RouterConfig, SimConfig,
};
use crate::mobility::{ContactRecord, RandomWaypointParams};
use crate::simulation::Simulation;
use crate::types::DropReason;

fn scheduled_line_config() -> SimConfig {
    // N1 -> N2 -> N3 over scheduled contacts, lookup routing
    let mut config = SimConfig::default();
    config.radios.insert("radio".into(), basic_radio(1e6));
    config.ducts.insert("duct".into(), DuctConfig::Basic { radio: "radio".into() });
    config.mobility.insert(
        "plan".into(),
        MobilityConfig::Scheduled {
            contacts: vec![
                ContactRecord::new("N1", "N2", 0.0, 100.0, 1e6, 1.0),
                ContactRecord::new("N2", "N3", 0.0, 100.0, 1e6, 1.0),
            ],
            absolute_times: false,
        },
    );
    config.routers.insert(
        "router".into(),
        RouterConfig::Lookup {
            relays: Relays::All,
            max_crit: Some(2),
            max_relay_hops: 10,
            excluded_routes: vec![],
            route_schedule: None,
            recompute_routes: false,
            algorithm: crate::config::RouteAlgorithm::Cgr,
            max_hops: 4,
        },
    );
    for name in ["N1", "N2", "N3"] {
        let mut node = NodeConfig::new("router", "plan");
        node.radios.push("radio".into());
        config.nodes.insert(name.into(), node);
    }
    for (a, b) in [("N1", "N2"), ("N2", "N3")] {
        config.connections.push(ConnectionConfig::both_ways(
            a,
            b,
            ConnectionKindConfig::Scheduled,
            btreemap! { "duct".into() => "duct".into() },
            "plan",
        ));
    }
    config
}

#[test]
fn single_link_carries_two_generators() {
    // Test 1: one static link, a CBR voice flow and a file transfer
    let mut config =
        two_node_config(RadioConfig::Basic { rate: 1e6, ber: 0.0, j_bit: 1e-9 }, DuctConfig::Basic {
            radio: "radio".into(),
        });
    config.generators.insert("voice".into(), cbr_generator(1e5, 10.0, 1e4, "N2"));
    config.generators.insert("file".into(), file_generator(1e6, 1e5, "N2"));
    let n1 = config.nodes.get_mut("N1").unwrap();
    n1.generators.push("voice".into());
    n1.generators.push("file".into());

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    assert!((arrived_volume(&results, "voice") - 1e6).abs() < 1e-6);
    assert!((arrived_volume(&results, "file") - 1e6).abs() < 1e-6);
    assert_eq!(results.table("dropped").len(), 0);
    assert_eq!(results.table("lost").len(), 0);
    assert_valid(&results);

    // the transmit energy matches the volume pushed through the radio
    let total_energy: f64 = results.energy.iter().map(|r| r.joules).sum();
    assert!((total_energy - 2e6 * 1e-9).abs() < 1e-12);
    // every bundle needed exactly one routing decision
    let calls: u64 = results.routing_calls.iter().map(|r| r.calls).sum();
    assert_eq!(calls, 110);
}

#[test]
fn static_routers_deliver_along_next_hop_tables() {
    let mut config = SimConfig::default();
    config.radios.insert("radio".into(), basic_radio(1e6));
    config.ducts.insert("duct".into(), DuctConfig::Basic { radio: "radio".into() });
    config.mobility.insert("static".into(), MobilityConfig::Static { prop_delay: 1.0 });
    config.routers.insert(
        "router".into(),
        RouterConfig::Static {
            routes: btreemap! {
                "N1".into() => btreemap! {
                    "N3".into() => "N2".into(),
                    "N2".into() => "N2".into(),
                },
                "N2".into() => btreemap! { "N3".into() => "N3".into() },
                "N4".into() => btreemap! { "N1".into() => "N1".into() },
            },
        },
    );
    for name in ["N1", "N2", "N3", "N4"] {
        let mut node = NodeConfig::new("router", "static");
        node.radios.push("radio".into());
        config.nodes.insert(name.into(), node);
    }
    for (a, b) in [("N1", "N2"), ("N2", "N3"), ("N4", "N1")] {
        config.connections.push(ConnectionConfig::both_ways(
            a,
            b,
            ConnectionKindConfig::Static { prop_delay: Some(1.0) },
            btreemap! { "duct".into() => "duct".into() },
            "static",
        ));
    }
    config.generators.insert("voice".into(), cbr_generator(1e5, 10.0, 1e4, "N3"));
    config.generators.insert("file_a".into(), file_generator(1e6, 1e5, "N2"));
    config.generators.insert("file_b".into(), file_generator(5e5, 1e5, "N1"));
    config.nodes.get_mut("N1").unwrap().generators.extend(["voice".into(), "file_a".into()]);
    config.nodes.get_mut("N4").unwrap().generators.push("file_b".into());

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    let volume = |orig: &str, dest: &str, dt: &str| -> f64 {
        results
            .table("arrived")
            .iter()
            .filter(|r| r.orig == orig && r.dest == dest && r.data_type == dt)
            .map(|r| r.data_vol)
            .sum()
    };
    assert!((volume("N1", "N3", "voice") - 1e6).abs() < 1e-6);
    assert!((volume("N1", "N2", "file") - 1e6).abs() < 1e-6);
    assert!((volume("N4", "N1", "file") - 5e5).abs() < 1e-6);
    assert_valid(&results);

    // the relayed flow crossed exactly N1 -> N2 -> N3
    let relayed = results
        .table("arrived")
        .iter()
        .find(|r| r.dest == "N3")
        .expect("nothing arrived at N3");
    assert_eq!(relayed.visited, vec!["N1", "N2", "N3"]);
}

#[test]
fn lookup_router_relays_over_scheduled_contacts() {
    let mut config = scheduled_line_config();
    config.generators.insert("voice".into(), cbr_generator(1e5, 5.0, 1e4, "N3"));
    config.nodes.get_mut("N1").unwrap().generators.push("voice".into());

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    assert!((arrived_volume(&results, "voice") - 5e5).abs() < 1e-6);
    assert_valid(&results);
    for row in results.table("arrived") {
        assert_eq!(row.visited, vec!["N1", "N2", "N3"]);
    }
}

#[test]
fn cgr_basic_router_relays_over_scheduled_contacts() {
    let mut config = scheduled_line_config();
    config
        .routers
        .insert("router".into(), RouterConfig::CgrBasic { relays: Relays::All });
    config.generators.insert("voice".into(), cbr_generator(1e5, 5.0, 1e4, "N3"));
    config.nodes.get_mut("N1").unwrap().generators.push("voice".into());

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    assert!((arrived_volume(&results, "voice") - 5e5).abs() < 1e-6);
    assert_valid(&results);
}

#[test]
fn critical_bundles_flood_over_disjoint_first_hops() {
    // N1 reaches N2 over two relays A and B; a critical bundle uses both
    let mut config = SimConfig::default();
    config.radios.insert("radio".into(), basic_radio(1e6));
    config.ducts.insert("duct".into(), DuctConfig::Basic { radio: "radio".into() });
    config.mobility.insert(
        "plan".into(),
        MobilityConfig::Scheduled {
            contacts: vec![
                ContactRecord::new("N1", "A", 0.0, 1000.0, 1e6, 1.0),
                ContactRecord::new("A", "N2", 0.0, 1000.0, 1e6, 1.0),
                ContactRecord::new("N1", "B", 0.0, 1000.0, 1e6, 5.0),
                ContactRecord::new("B", "N2", 0.0, 1000.0, 1e6, 5.0),
            ],
            absolute_times: false,
        },
    );
    config.routers.insert(
        "router".into(),
        RouterConfig::Lookup {
            relays: Relays::All,
            max_crit: Some(2),
            max_relay_hops: 10,
            excluded_routes: vec![],
            route_schedule: None,
            recompute_routes: false,
            algorithm: crate::config::RouteAlgorithm::Cgr,
            max_hops: 4,
        },
    );
    for name in ["N1", "A", "B", "N2"] {
        let mut node = NodeConfig::new("router", "plan");
        node.radios.push("radio".into());
        config.nodes.insert(name.into(), node);
    }
    for (a, b) in [("N1", "A"), ("A", "N2"), ("N1", "B"), ("B", "N2")] {
        config.connections.push(ConnectionConfig::both_ways(
            a,
            b,
            ConnectionKindConfig::Scheduled,
            btreemap! { "duct".into() => "duct".into() },
            "plan",
        ));
    }
    config.generators.insert(
        "critical".into(),
        GeneratorConfig::File {
            size: 1e5,
            tstart: 0.0,
            bundle_size: 1e5,
            bundle_ttl: f64::INFINITY,
            data_type: "command".into(),
            critical: true,
            destination: Some("N2".into()),
            repeat: 1,
            wait: 0.0,
        },
    );
    config.nodes.get_mut("N1").unwrap().generators.push("critical".into());

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    let arrived = results.table("arrived");
    // one copy over each first hop
    assert_eq!(arrived.len(), 2);
    assert_eq!(arrived[0].bid, arrived[1].bid);
    assert_ne!(arrived[0].cid, arrived[1].cid);
    let mut mid_hops: Vec<&str> =
        arrived.iter().map(|r| r.visited[1].as_str()).collect();
    mid_hops.sort_unstable();
    assert_eq!(mid_hops, vec!["A", "B"]);
    assert_valid(&results);
}

#[test]
fn overbooked_bulk_traffic_is_displaced_to_the_limbo() {
    // fill the contact with bulk traffic, then inject a critical bundle of
    // half the contact capacity
    let mut config = SimConfig::default();
    config.radios.insert("radio".into(), basic_radio(1e6));
    config.ducts.insert("duct".into(), DuctConfig::Basic { radio: "radio".into() });
    config.mobility.insert(
        "plan".into(),
        MobilityConfig::Scheduled {
            contacts: vec![ContactRecord::new("N1", "N2", 0.0, 110.0, 1e4, 1.0)],
            absolute_times: false,
        },
    );
    config.routers.insert(
        "router".into(),
        RouterConfig::Lookup {
            relays: Relays::All,
            max_crit: None,
            max_relay_hops: 10,
            excluded_routes: vec![],
            route_schedule: None,
            recompute_routes: false,
            algorithm: crate::config::RouteAlgorithm::Cgr,
            max_hops: 4,
        },
    );
    for name in ["N1", "N2"] {
        let mut node = NodeConfig::new("router", "plan");
        node.radios.push("radio".into());
        node.limbo_wait = 30.0;
        config.nodes.insert(name.into(), node);
    }
    config.connections.push(ConnectionConfig::both_ways(
        "N1",
        "N2",
        ConnectionKindConfig::Scheduled,
        btreemap! { "duct".into() => "duct".into() },
        "plan",
    ));
    // 10 bulk bundles of 1e5 bits fill the 1.1e6 bit contact
    config.generators.insert("bulk".into(), file_generator(1e6, 1e5, "N2"));
    config.generators.insert(
        "critical".into(),
        GeneratorConfig::File {
            size: 5e5,
            tstart: 0.0,
            bundle_size: 5e5,
            bundle_ttl: f64::INFINITY,
            data_type: "command".into(),
            critical: true,
            destination: Some("N2".into()),
            repeat: 1,
            wait: 0.0,
        },
    );
    let n1 = config.nodes.get_mut("N1").unwrap();
    n1.generators.push("bulk".into());
    n1.generators.push("critical".into());
    config.scenario.until = Some(5.0);

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    // ceil(5e5 / 1e5) bulk bundles were displaced into the limbo
    let limbo = results.table("in_limbo");
    assert_eq!(limbo.len(), 5);
    assert!(limbo.iter().all(|r| !r.critical && r.data_type == "file"));
    // the critical bundle sits in the neighbor queue
    assert!(results.table("neighbor_queue").iter().any(|r| r.critical));
    assert_valid(&results);
}

#[test]
fn expired_bundles_are_dropped_with_ttl() {
    let mut config =
        two_node_config(basic_radio(1e6), DuctConfig::Basic { radio: "radio".into() });
    config.generators.insert(
        "short".into(),
        GeneratorConfig::File {
            size: 1e4,
            tstart: 0.0,
            bundle_size: 1e4,
            bundle_ttl: 0.5,
            data_type: "file".into(),
            critical: false,
            destination: Some("N2".into()),
            repeat: 1,
            wait: 0.0,
        },
    );
    config.nodes.get_mut("N1").unwrap().generators.push("short".into());

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    assert_eq!(results.table("arrived").len(), 0);
    let dropped = results.table("dropped");
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].drop_reason.as_deref(), Some(DropReason::Ttl.to_string().as_str()));
}

#[test]
fn epidemic_managers_flood_over_repeated_contacts() {
    let mut config = SimConfig::default();
    config.radios.insert("radio".into(), basic_radio(1e6));
    config.ducts.insert("duct".into(), DuctConfig::Basic { radio: "radio".into() });
    config.mobility.insert(
        "plan".into(),
        MobilityConfig::Scheduled {
            contacts: vec![
                ContactRecord::new("N1", "N2", 5.0, 10.0, 1e6, 1.0),
                ContactRecord::new("N2", "N1", 5.0, 10.0, 1e6, 1.0),
                ContactRecord::new("N1", "N2", 20.0, 30.0, 1e6, 1.0),
                ContactRecord::new("N2", "N1", 20.0, 30.0, 1e6, 1.0),
            ],
            absolute_times: false,
        },
    );
    config.routers.insert(
        "router".into(),
        RouterConfig::Opportunistic { max_buffer_size: f64::INFINITY },
    );
    for name in ["N1", "N2"] {
        let mut node = NodeConfig::new("router", "plan");
        node.radios.push("radio".into());
        config.nodes.insert(name.into(), node);
    }
    config.connections.push(ConnectionConfig::both_ways(
        "N1",
        "N2",
        ConnectionKindConfig::Scheduled,
        btreemap! { "duct".into() => "duct".into() },
        "plan",
    ));
    // one batch before the first contact, one between the contacts
    config.generators.insert("batch1".into(), file_generator(3e4, 1e4, "N2"));
    config.generators.insert(
        "batch2".into(),
        GeneratorConfig::File {
            size: 2e4,
            tstart: 15.0,
            bundle_size: 1e4,
            bundle_ttl: f64::INFINITY,
            data_type: "file".into(),
            critical: false,
            destination: Some("N2".into()),
            repeat: 1,
            wait: 0.0,
        },
    );
    let n1 = config.nodes.get_mut("N1").unwrap();
    n1.generators.extend(["batch1".into(), "batch2".into()]);

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    // the first contact flushes batch 1, the second batch 2
    assert_eq!(results.table("arrived").len(), 5);
    assert!((arrived_volume(&results, "file") - 5e4).abs() < 1e-6);
    for row in results.table("arrived") {
        assert!(row.arrival_time.unwrap() > 5.0);
    }
}

#[test]
fn distance_gated_connections_run_on_waypoint_mobility() {
    // a tiny motion area keeps the pair permanently within range; the run
    // must stay consistent even though delivery depends on the handshake
    let mut config = SimConfig::default();
    config.radios.insert("radio".into(), basic_radio(1e6));
    config.ducts.insert("duct".into(), DuctConfig::Basic { radio: "radio".into() });
    config.mobility.insert(
        "waypoint".into(),
        MobilityConfig::RandomWaypoint {
            params: RandomWaypointParams {
                width: 10.0,
                height: 10.0,
                min_speed: 1.0,
                max_speed: 2.0,
                pause: 1.0,
                dt: 1.0,
                duration: 100.0,
            },
        },
    );
    config.routers.insert(
        "router".into(),
        RouterConfig::Opportunistic { max_buffer_size: f64::INFINITY },
    );
    for name in ["N1", "N2"] {
        let mut node = NodeConfig::new("router", "waypoint");
        node.radios.push("radio".into());
        config.nodes.insert(name.into(), node);
    }
    config.connections.push(ConnectionConfig::both_ways(
        "N1",
        "N2",
        ConnectionKindConfig::Distance { max_distance: 1e3 },
        btreemap! { "duct".into() => "duct".into() },
        "waypoint",
    ));
    config.generators.insert("file".into(), file_generator(3e4, 1e4, "N2"));
    config.nodes.get_mut("N1").unwrap().generators.push("file".into());
    config.scenario.until = Some(200.0);
    config.scenario.seed = Some(42);

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    // everything sent is accounted for somewhere
    assert_eq!(results.table("sent").len(), 3);
    assert_valid(&results);
}

#[test]
fn variable_rate_radio_waits_for_its_active_window() {
    let mut config = two_node_config(
        RadioConfig::Variable {
            profiles: btreemap! {
                "N2".into() => vec![(0.0, 0.0), (10.0, 1e6)],
                "N1".into() => vec![(0.0, 1e6)],
            },
            j_bit: 0.0,
        },
        DuctConfig::Basic { radio: "radio".into() },
    );
    config.generators.insert("file".into(), file_generator(1e4, 1e4, "N2"));
    config.nodes.get_mut("N1").unwrap().generators.push("file".into());

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    let arrived = results.table("arrived");
    assert_eq!(arrived.len(), 1);
    // the bundle had to wait for the rate profile to turn active at t=10
    assert!(arrived[0].arrival_time.unwrap() > 10.0);
    assert_valid(&results);
}

#[test]
fn coded_radio_without_frame_errors_behaves_like_basic() {
    let mut config = two_node_config(
        RadioConfig::Coded { rate: 1e6, fer: 0.0, frame_size: 1e3, code_rate: 0.5, j_bit: 0.0 },
        DuctConfig::Basic { radio: "radio".into() },
    );
    config.generators.insert("file".into(), file_generator(1e5, 1e4, "N2"));
    config.nodes.get_mut("N1").unwrap().generators.push("file".into());

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    assert!((arrived_volume(&results, "file") - 1e5).abs() < 1e-6);
    assert_valid(&results);
}

#[test]
fn source_routed_bundles_follow_their_embedded_route() {
    let mut config = SimConfig::default();
    config.radios.insert("radio".into(), basic_radio(1e6));
    config.ducts.insert("duct".into(), DuctConfig::Basic { radio: "radio".into() });
    config.mobility.insert("static".into(), MobilityConfig::Static { prop_delay: 1.0 });
    config.routers.insert("router".into(), RouterConfig::Source);
    for name in ["N1", "N2", "N3"] {
        let mut node = NodeConfig::new("router", "static");
        node.radios.push("radio".into());
        config.nodes.insert(name.into(), node);
    }
    for (a, b) in [("N1", "N2"), ("N2", "N3")] {
        config.connections.push(ConnectionConfig::both_ways(
            a,
            b,
            ConnectionKindConfig::Static { prop_delay: Some(1.0) },
            btreemap! { "duct".into() => "duct".into() },
            "static",
        ));
    }

    let mut sim = Simulation::build(&config).unwrap();
    let (n1, n2, n3) =
        (sim.node_id("N1").unwrap(), sim.node_id("N2").unwrap(), sim.node_id("N3").unwrap());
    let mut bundle = sim
        .counters
        .new_bundle(crate::bundle::NewBundle::new(n1, n3, "file", 1e5), 0.0);
    bundle.source_route = Some(vec![n1, n2, n3]);
    sim.node_forward(n1, bundle);
    sim.run().unwrap();

    let results = sim.collect_results();
    let arrived = results.table("arrived");
    assert_eq!(arrived.len(), 1);
    assert_eq!(arrived[0].visited, ["N1", "N2", "N3"]);
}

#[test]
fn markov_flows_emit_while_on() {
    let mut config =
        two_node_config(basic_radio(1e6), DuctConfig::Basic { radio: "radio".into() });
    config.generators.insert(
        "markov".into(),
        GeneratorConfig::Markov {
            flows: vec![crate::config::TrafficFlowConfig {
                origin: "N1".into(),
                destination: "N2".into(),
                data_type: "telemetry".into(),
                latency_class: crate::config::LatencyClass::Seconds,
                rate: 1e5,
                duty_cycle: 0.5,
                on_duration: 10.0,
                start: 0.0,
                end: 50.0,
                critical: false,
                bundle_size: 1e4,
            }],
        },
    );
    config.nodes.get_mut("N1").unwrap().generators.push("markov".into());
    config.scenario.seed = Some(3);

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    let sent = results.table("sent").len();
    assert!(sent > 0, "the flow never turned on");
    assert_eq!(results.table("arrived").len(), sent);
    // the telemetry/seconds latency class maps to a 30s TTL; nothing on
    // this fast link comes close
    assert!(results.table("arrived").iter().all(|r| r.latency.unwrap() < 30.0));
    assert_valid(&results);
}

#[test]
fn file_broadcaster_reaches_every_other_node() {
    let mut config = SimConfig::default();
    config.radios.insert("radio".into(), basic_radio(1e6));
    config.ducts.insert("duct".into(), DuctConfig::Basic { radio: "radio".into() });
    config.mobility.insert("static".into(), MobilityConfig::Static { prop_delay: 1.0 });
    config.routers.insert(
        "router".into(),
        RouterConfig::Static {
            routes: btreemap! {
                "N1".into() => btreemap! {
                    "N2".into() => "N2".into(),
                    "N3".into() => "N3".into(),
                },
            },
        },
    );
    for name in ["N1", "N2", "N3"] {
        let mut node = NodeConfig::new("router", "static");
        node.radios.push("radio".into());
        config.nodes.insert(name.into(), node);
    }
    for peer in ["N2", "N3"] {
        config.connections.push(ConnectionConfig::both_ways(
            "N1",
            peer,
            ConnectionKindConfig::Static { prop_delay: Some(1.0) },
            btreemap! { "duct".into() => "duct".into() },
            "static",
        ));
    }
    config.generators.insert(
        "broadcast".into(),
        GeneratorConfig::FileBroadcaster {
            size: 3e4,
            tstart: 0.0,
            bundle_size: 1e4,
            bundle_ttl: f64::INFINITY,
            data_type: "file".into(),
            critical: false,
            repeat: 1,
            wait: 0.0,
        },
    );
    config.nodes.get_mut("N1").unwrap().generators.push("broadcast".into());

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    // one full copy of the file per other node
    assert_eq!(results.table("sent").len(), 6);
    assert_eq!(results.table("arrived").len(), 6);
    for dest in ["N2", "N3"] {
        let volume: f64 = results
            .table("arrived")
            .iter()
            .filter(|r| r.dest == dest)
            .map(|r| r.data_vol)
            .sum();
        assert!((volume - 3e4).abs() < 1e-6);
    }
    assert_valid(&results);
}

#[test]
fn scheduled_broadcast_serves_all_destinations_in_view() {
    let mut config = SimConfig::default();
    config.radios.insert("radio".into(), basic_radio(1e6));
    config.ducts.insert("duct".into(), DuctConfig::Basic { radio: "radio".into() });
    config.mobility.insert(
        "plan".into(),
        MobilityConfig::Scheduled {
            contacts: vec![
                ContactRecord::new("N1", "N2", 0.0, 100.0, 1e6, 1.0),
                ContactRecord::new("N1", "N3", 0.0, 100.0, 1e6, 2.0),
            ],
            absolute_times: false,
        },
    );
    config.routers.insert(
        "router".into(),
        RouterConfig::Static {
            routes: btreemap! {
                "N1".into() => btreemap! {
                    "N2".into() => "N2".into(),
                    "N3".into() => "N3".into(),
                },
            },
        },
    );
    for name in ["N1", "N2", "N3"] {
        let mut node = NodeConfig::new("router", "plan");
        node.radios.push("radio".into());
        config.nodes.insert(name.into(), node);
    }
    for peer in ["N2", "N3"] {
        let mut conn = ConnectionConfig::both_ways(
            "N1",
            peer,
            ConnectionKindConfig::ScheduledBroadcast,
            btreemap! { "duct".into() => "duct".into() },
            "plan",
        );
        conn.one_way = true;
        config.connections.push(conn);
    }
    config.generators.insert("to_n2".into(), file_generator(2e4, 1e4, "N2"));
    config.generators.insert("to_n3".into(), file_generator(3e4, 1e4, "N3"));
    let n1 = config.nodes.get_mut("N1").unwrap();
    n1.generators.extend(["to_n2".into(), "to_n3".into()]);

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    let volume_to = |dest: &str| -> f64 {
        results
            .table("arrived")
            .iter()
            .filter(|r| r.dest == dest)
            .map(|r| r.data_vol)
            .sum()
    };
    assert!((volume_to("N2") - 2e4).abs() < 1e-6);
    assert!((volume_to("N3") - 3e4).abs() < 1e-6);
    assert_valid(&results);
}

#[test]
fn report_list_restricts_the_collected_tables() {
    let mut config =
        two_node_config(basic_radio(1e6), DuctConfig::Basic { radio: "radio".into() });
    config.generators.insert("file".into(), file_generator(1e5, 1e4, "N2"));
    config.nodes.get_mut("N1").unwrap().generators.push("file".into());
    config.reports = vec!["arrived".into(), "energy".into()];

    let mut sim = Simulation::build(&config).unwrap();
    sim.run().unwrap();

    let results = sim.collect_results();
    assert_eq!(results.table("arrived").len(), 10);
    assert_eq!(results.aliases(), vec!["arrived"]);
    assert!(results.table("sent").is_empty());
    assert!(results.routing_calls.is_empty());
    // energy rows survive the filter (one per radio, even at zero joules)
    assert_eq!(results.energy.len(), 2);
}

#[test]
fn dangling_references_fail_the_build() {
    let mut config = two_node_config(basic_radio(1e6), DuctConfig::Basic { radio: "radio".into() });
    config.nodes.get_mut("N1").unwrap().router = "nope".into();
    assert!(Simulation::build(&config).is_err());

    let mut config = two_node_config(basic_radio(1e6), DuctConfig::Basic { radio: "radio".into() });
    config.nodes.get_mut("N1").unwrap().radios.push("missing".into());
    assert!(Simulation::build(&config).is_err());

    let mut config = two_node_config(basic_radio(1e6), DuctConfig::Basic { radio: "radio".into() });
    config.connections[0].ducts.insert("x".into(), "missing-duct".into());
    assert!(Simulation::build(&config).is_err());

    let mut config = two_node_config(basic_radio(1e6), DuctConfig::Basic { radio: "radio".into() });
    config.nodes.get_mut("N2").unwrap().mobility_model = "missing".into();
    assert!(Simulation::build(&config).is_err());
}
