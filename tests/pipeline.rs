//! End-to-end pipeline behavior over an in-memory database

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use packeteye::alert::{AlertConfig, AlertDispatcher};
use packeteye::batch::BatchConfig;
use packeteye::config::Config;
use packeteye::core::{IpProtocol, PacketRecord};
use packeteye::database::Database;
use packeteye::detect::boost::{BoostClassifier, BoostNode, BoostTree};
use packeteye::detect::forest::{IsolationForest, IsolationTree, Node};
use packeteye::detect::labels::LabelMap;
use packeteye::detect::scaler::ScalerParams;
use packeteye::detect::ArtifactBundle;
use packeteye::flow::NUM_FEATURES;
use packeteye::pipeline::Pipeline;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn addr(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
}

fn tcp_packet(src: IpAddr, dst: IpAddr, raw_len: u32) -> PacketRecord {
    let mut pkt = PacketRecord::new(src, dst, IpProtocol::Tcp);
    pkt.dst_port = 80;
    pkt.tcp_flags = Some(0x02);
    pkt.raw_len = raw_len;
    pkt
}

/// Forest splitting on the raw packet length column (Total Length of Fwd
/// Packets, index 4): single big packets land in the singleton leaf.
fn length_forest() -> IsolationForest {
    let tree = IsolationTree {
        root: Node::Split {
            feature_idx: 4,
            threshold: 10_000.0,
            left: Box::new(Node::Leaf { size: 255 }),
            right: Box::new(Node::Leaf { size: 1 }),
        },
    };
    IsolationForest::from_parts(vec![tree], 256, 0.6, NUM_FEATURES)
}

/// Classifier that always attributes DDoS with ~0.95 confidence
fn ddos_classifier() -> BoostClassifier {
    // softmax([0, x, 0]) gives p for class 1 when x = ln(2p / (1 - p))
    let x = (2.0f32 * 0.95 / 0.05).ln();
    BoostClassifier {
        n_classes: 3,
        n_features: NUM_FEATURES,
        base_scores: vec![0.0; 3],
        learning_rate: 1.0,
        rounds: vec![vec![
            BoostTree { root: BoostNode::Leaf { value: 0.0 } },
            BoostTree { root: BoostNode::Leaf { value: x } },
            BoostTree { root: BoostNode::Leaf { value: 0.0 } },
        ]],
    }
}

fn test_artifacts() -> Arc<ArtifactBundle> {
    let map: HashMap<String, usize> = [("BENIGN", 0usize), ("DDoS", 1), ("PortScan", 2)]
        .into_iter()
        .map(|(l, i)| (l.to_string(), i))
        .collect();

    let bundle = ArtifactBundle {
        version: 1,
        forest: length_forest(),
        classifier: ddos_classifier(),
        scaler: ScalerParams::identity(NUM_FEATURES),
        labels: LabelMap::from_map(map).unwrap(),
        thresholds: None,
        selected_features: None,
    };
    bundle.validate().unwrap();
    Arc::new(bundle)
}

fn test_config() -> Config {
    Config {
        batch: BatchConfig { max_size: 10, max_age_secs: 600.0 },
        ..Default::default()
    }
}

#[test]
fn test_batch_of_ten_persists_every_row() {
    init_tracing();
    let config = test_config();
    let db = Database::open_memory().unwrap();
    let (dispatcher, alerts) = AlertDispatcher::with_channel(&config.alerts);
    let mut pipeline = Pipeline::with_dispatcher(&config, test_artifacts(), db, dispatcher);

    // Nine small flows and one oversized one; distinct endpoint pairs so each
    // packet is the first of its flow.
    for i in 1..=9u8 {
        pipeline.handle_packet(&tcp_packet(addr(i), addr(100), 64));
    }
    pipeline.handle_packet(&tcp_packet(addr(99), addr(100), 50_000));

    assert_eq!(pipeline.writer().count_packets().unwrap(), 10);

    let anomalies = pipeline.writer().recent_anomalies(10).unwrap();
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].attack_type, "DDoS");
    assert_eq!(anomalies[0].src_ip, "10.0.0.99");
    assert_eq!(anomalies[0].reason, "Classified as DDoS");

    // Exactly one alert for the confirmed anomaly
    let received: Vec<_> = alerts.try_iter().collect();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].attack_type, "DDoS");
    assert_eq!(received[0].src_ip, addr(99));

    let stats = pipeline.stats();
    assert_eq!(stats.packets_seen, 10);
    assert_eq!(stats.batches_scored, 1);
    assert_eq!(stats.anomalies_confirmed, 1);
    assert_eq!(stats.alerts_sent, 1);
    assert_eq!(stats.rows_persisted, 10);
}

#[test]
fn test_nothing_persisted_before_flush() {
    init_tracing();
    let config = test_config();
    let db = Database::open_memory().unwrap();
    let (dispatcher, _alerts) = AlertDispatcher::with_channel(&config.alerts);
    let mut pipeline = Pipeline::with_dispatcher(&config, test_artifacts(), db, dispatcher);

    for i in 1..=5u8 {
        pipeline.handle_packet(&tcp_packet(addr(i), addr(100), 64));
    }
    assert_eq!(pipeline.writer().count_packets().unwrap(), 0);

    pipeline.flush_now();
    assert_eq!(pipeline.writer().count_packets().unwrap(), 5);
}

#[test]
fn test_non_ip_packets_never_reach_storage() {
    init_tracing();
    let config = test_config();
    let db = Database::open_memory().unwrap();
    let (dispatcher, _alerts) = AlertDispatcher::with_channel(&config.alerts);
    let mut pipeline = Pipeline::with_dispatcher(&config, test_artifacts(), db, dispatcher);

    pipeline.handle_packet(&PacketRecord::without_ip_layer());
    pipeline.handle_packet(&tcp_packet(addr(1), addr(2), 64));
    pipeline.flush_now();

    assert_eq!(pipeline.writer().count_packets().unwrap(), 1);
    assert_eq!(pipeline.tracker().stats().non_ip_dropped, 1);
    assert_eq!(pipeline.stats().non_ip_dropped, 1);
    assert_eq!(pipeline.stats().packets_seen, 2);
}

#[test]
fn test_benign_traffic_produces_no_alerts() {
    init_tracing();
    let config = test_config();
    let db = Database::open_memory().unwrap();
    let (dispatcher, alerts) = AlertDispatcher::with_channel(&config.alerts);
    let mut pipeline = Pipeline::with_dispatcher(&config, test_artifacts(), db, dispatcher);

    for i in 1..=10u8 {
        pipeline.handle_packet(&tcp_packet(addr(i), addr(100), 64));
    }

    assert_eq!(pipeline.writer().count_packets().unwrap(), 10);
    assert!(alerts.try_recv().is_err());
    assert_eq!(pipeline.stats().anomalies_confirmed, 0);
}
