mod common;

use std::time::{Duration, Instant};

use common::{spawn_cluster_endpoint, ClusterBehavior};
use lb_failover::cluster::{ClusterProber, ProbeError};
use lb_failover::config::Mapping;

fn mapping(endpoints: Vec<String>, timeout_secs: u64) -> Mapping {
    Mapping {
        cluster_name: "pg-cluster".into(),
        node_to_target: vec!["pg-1:dc1".parse().unwrap(), "pg-2:dc2".parse().unwrap()],
        default_switch_target: None,
        probe_endpoints: endpoints,
        probe_port: 8008,
        probe_timeout_secs: timeout_secs,
    }
}

fn prober() -> ClusterProber {
    ClusterProber::new(reqwest::Client::new())
}

#[tokio::test]
async fn test_single_healthy_endpoint_wins_race() {
    let slow = spawn_cluster_endpoint(ClusterBehavior::Slow(Duration::from_secs(30), "pg-1")).await;
    let broken = spawn_cluster_endpoint(ClusterBehavior::Status(503)).await;
    let garbage = spawn_cluster_endpoint(ClusterBehavior::Garbage).await;
    let healthy = spawn_cluster_endpoint(ClusterBehavior::Leader("pg-2")).await;

    let m = mapping(vec![slow, broken, garbage, healthy], 3);
    let started = Instant::now();
    let primary = prober().probe_primary(&m).await.unwrap();

    assert_eq!(primary, "pg-2");
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_completion_order_does_not_matter() {
    // The failing endpoint answers last.
    let healthy = spawn_cluster_endpoint(ClusterBehavior::Leader("pg-2")).await;
    let late_failure = spawn_cluster_endpoint(ClusterBehavior::Slow(Duration::from_millis(300), "")).await;

    let m = mapping(vec![late_failure, healthy], 3);
    assert_eq!(prober().probe_primary(&m).await.unwrap(), "pg-2");
}

#[tokio::test]
async fn test_all_failures_are_aggregated() {
    let broken = spawn_cluster_endpoint(ClusterBehavior::Status(500)).await;
    let garbage = spawn_cluster_endpoint(ClusterBehavior::Garbage).await;
    let closed = "http://127.0.0.1:1".to_string();

    let m = mapping(vec![broken.clone(), garbage.clone(), closed.clone()], 3);
    let err = prober().probe_primary(&m).await.unwrap_err();

    assert!(matches!(err, ProbeError::AllFailed { ref failures, .. } if failures.len() == 3));
    let text = err.to_string();
    for endpoint in [&broken, &garbage, &closed] {
        assert!(text.contains(endpoint.as_str()), "{} missing from: {}", endpoint, text);
    }
    assert!(text.contains("500"), "status missing from: {}", text);
}

#[tokio::test]
async fn test_shared_timeout() {
    let slow_a = spawn_cluster_endpoint(ClusterBehavior::Slow(Duration::from_secs(30), "pg-1")).await;
    let slow_b = spawn_cluster_endpoint(ClusterBehavior::Slow(Duration::from_secs(30), "pg-2")).await;

    let m = mapping(vec![slow_a, slow_b], 1);
    let started = Instant::now();
    let err = prober().probe_primary(&m).await.unwrap_err();

    assert!(matches!(err, ProbeError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_unnamed_leader_is_a_failure() {
    let unnamed = spawn_cluster_endpoint(ClusterBehavior::Leader("")).await;
    let m = mapping(vec![unnamed.clone()], 2);

    let err = prober().probe_primary(&m).await.unwrap_err();
    assert!(err.to_string().contains(&unnamed));

    // The full member list is still available.
    let status = prober().probe_status(&m).await.unwrap();
    assert_eq!(status.members.len(), 2);
    assert_eq!(status.scope, "pg-cluster");
}
