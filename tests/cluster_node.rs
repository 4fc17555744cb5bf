//! Node behavior against real sockets: joins, leave notification, reload,
//! and retry-join exhaustion.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;

use meshd::cluster::node::Pool;
use meshd::cluster::{Cluster, JoinError, LeaveError, Node, ReloadError};
use meshd::config::AgentConfig;

fn node_config(name: &str) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.node.name = name.to_string();
    config.network.bind_address = "127.0.0.1:0".to_string();
    config
}

async fn started_node(name: &str) -> (Node, meshd::cluster::ClusterEvents) {
    let (mut node, events) = Node::new(node_config(name), None, StdRng::seed_from_u64(1));
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    node.start(cancel_rx).await.unwrap();
    (node, events)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn join_contacts_a_running_peer() {
    let (peer, _peer_events) = started_node("peer").await;
    let peer_addr = peer.local_addr().unwrap().to_string();

    let (node, _events) = started_node("joiner").await;
    let contacted = node.join_lan(&[peer_addr]).await.unwrap();

    assert_eq!(contacted, 1);
    assert_eq!(node.peer_count(Pool::Lan), 1);
    wait_until(|| peer.peer_count(Pool::Lan) == 1).await;
}

#[tokio::test]
async fn join_counts_only_reachable_peers() {
    let (peer, _peer_events) = started_node("peer").await;
    let peer_addr = peer.local_addr().unwrap().to_string();

    let (node, _events) = started_node("joiner").await;
    let contacted = node
        .join_lan(&[peer_addr, "127.0.0.1:1".to_string()])
        .await
        .unwrap();

    assert_eq!(contacted, 1);
}

#[tokio::test]
async fn join_with_no_reachable_peer_errors() {
    let (node, _events) = started_node("joiner").await;
    let result = node.join_lan(&["127.0.0.1:1".to_string()]).await;

    assert!(matches!(result, Err(JoinError::NoPeers { attempted: 1, .. })));
}

#[tokio::test]
async fn join_before_start_errors() {
    let (node, _events) = Node::new(node_config("cold"), None, StdRng::seed_from_u64(1));
    let result = node.join_lan(&["127.0.0.1:1".to_string()]).await;

    assert!(matches!(result, Err(JoinError::NotStarted)));
}

#[tokio::test]
async fn wan_and_lan_pools_are_tracked_separately() {
    let (peer, _peer_events) = started_node("peer").await;
    let peer_addr = peer.local_addr().unwrap().to_string();

    let (node, _events) = started_node("joiner").await;
    node.join_wan(&[peer_addr]).await.unwrap();

    assert_eq!(node.peer_count(Pool::Wan), 1);
    assert_eq!(node.peer_count(Pool::Lan), 0);
    wait_until(|| peer.peer_count(Pool::Wan) == 1).await;
}

#[tokio::test]
async fn leave_notifies_peers_and_is_not_repeatable() {
    let (peer, _peer_events) = started_node("peer").await;
    let peer_addr = peer.local_addr().unwrap().to_string();

    let (node, _events) = started_node("leaver").await;
    node.join_lan(&[peer_addr]).await.unwrap();
    wait_until(|| peer.peer_count(Pool::Lan) == 1).await;

    node.leave().await.unwrap();
    wait_until(|| peer.peer_count(Pool::Lan) == 0).await;

    assert!(matches!(node.leave().await, Err(LeaveError::AlreadyLeft)));
}

#[tokio::test]
async fn leave_before_start_errors() {
    let (node, _events) = Node::new(node_config("cold"), None, StdRng::seed_from_u64(1));
    assert!(matches!(node.leave().await, Err(LeaveError::NotStarted)));
}

#[tokio::test]
async fn leave_emits_the_shutdown_event() {
    let (node, mut events) = started_node("leaver").await;
    node.leave().await.unwrap();

    let notified = tokio::time::timeout(Duration::from_secs(1), events.shutdown.recv()).await;
    assert_eq!(notified.unwrap(), Some(()));
}

#[tokio::test]
async fn reload_without_a_config_file_errors() {
    let (node, _events) = started_node("fixed").await;
    assert!(matches!(
        node.reload_config().await,
        Err(ReloadError::NoConfigSource)
    ));
}

#[tokio::test]
async fn reload_swaps_the_snapshot_but_keeps_identity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meshd.toml");
    std::fs::write(
        &path,
        "[node]\nname = \"original\"\n\n[network]\nbind_address = \"127.0.0.1:0\"\n",
    )
    .unwrap();

    let config = meshd::config::load_config(&path).unwrap();
    let original_id = config.node.id;
    let (mut node, _events) = Node::new(config, Some(path.clone()), StdRng::seed_from_u64(1));
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    node.start(cancel_rx).await.unwrap();

    std::fs::write(
        &path,
        "[node]\nname = \"renamed\"\ndatacenter = \"dc9\"\n\n[network]\nbind_address = \"127.0.0.1:0\"\n",
    )
    .unwrap();
    node.reload_config().await.unwrap();

    let reloaded = node.config();
    assert_eq!(reloaded.node.datacenter, "dc9");
    // Identity does not change while the process runs.
    assert_eq!(reloaded.node.name, "original");
    assert_eq!(reloaded.node.id, original_id);
}

#[tokio::test]
async fn failed_reload_keeps_the_previous_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meshd.toml");
    std::fs::write(
        &path,
        "[node]\nname = \"original\"\n\n[network]\nbind_address = \"127.0.0.1:0\"\n",
    )
    .unwrap();

    let config = meshd::config::load_config(&path).unwrap();
    let (mut node, _events) = Node::new(config, Some(path.clone()), StdRng::seed_from_u64(1));
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    node.start(cancel_rx).await.unwrap();

    std::fs::write(&path, "[node\nname = ").unwrap();
    assert!(node.reload_config().await.is_err());

    assert_eq!(node.config().node.name, "original");
}

#[tokio::test]
async fn cancelled_start_aborts() {
    let (mut node, _events) = Node::new(node_config("aborted"), None, StdRng::seed_from_u64(1));
    let (cancel_tx, cancel_rx) = watch::channel(false);
    cancel_tx.send(true).unwrap();

    let result = node.start(cancel_rx).await;
    assert!(matches!(result, Err(meshd::cluster::StartError::Aborted)));
}

#[tokio::test]
async fn second_start_errors() {
    let (mut node, _events) = started_node("twice").await;
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    assert!(matches!(
        node.start(cancel_rx).await,
        Err(meshd::cluster::StartError::AlreadyStarted)
    ));
}

#[tokio::test]
async fn retry_join_exhaustion_reports_a_fatal_event() {
    let mut config = node_config("retrier");
    config.join.retry_join = vec!["127.0.0.1:1".to_string()];
    config.join.retry_max = 2;
    config.join.retry_interval_ms = 10;
    config.join.retry_max_delay_ms = 20;

    let (mut node, mut events) = Node::new(config, None, StdRng::seed_from_u64(1));
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    node.start(cancel_rx).await.unwrap();

    let reported = tokio::time::timeout(Duration::from_secs(5), events.retry_join_failed.recv())
        .await
        .unwrap();
    assert!(matches!(
        reported,
        Some(JoinError::RetriesExhausted { attempts: 2, .. })
    ));
}

#[tokio::test]
async fn retry_join_stops_after_success() {
    let (peer, _peer_events) = started_node("peer").await;
    let peer_addr = peer.local_addr().unwrap().to_string();

    let mut config = node_config("retrier");
    config.join.retry_join = vec![peer_addr];
    config.join.retry_max = 3;
    config.join.retry_interval_ms = 10;
    config.join.retry_max_delay_ms = 20;

    let (mut node, mut events) = Node::new(config, None, StdRng::seed_from_u64(1));
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    node.start(cancel_rx).await.unwrap();

    wait_until(|| node.peer_count(Pool::Lan) == 1).await;
    let raced = tokio::time::timeout(Duration::from_millis(200), events.retry_join_failed.recv());
    assert!(raced.await.is_err(), "no exhaustion event expected");
}
