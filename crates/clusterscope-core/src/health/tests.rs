use super::*;

fn ok() -> ProbeOutcome {
    ProbeOutcome::Success { auth_suspect: false }
}

fn fail(message: &str) -> ProbeOutcome {
    ProbeOutcome::Failure(message.into())
}

fn run(outcomes: &[ProbeOutcome]) -> (HealthState, Vec<ClusterStatus>) {
    let mut state = HealthState::default();
    let mut trail = Vec::new();
    for outcome in outcomes {
        state.apply(outcome, Thresholds::default(), Timestamp::now());
        assert_eq!(state.consecutive_failures * state.consecutive_successes, 0);
        trail.push(state.status);
    }
    (state, trail)
}

#[test]
fn classifies_auth_network_and_other() {
    assert_eq!(classify_error("Unauthorized"), FailureKind::Auth);
    assert_eq!(classify_error("ApiError: forbidden: User cannot list"), FailureKind::Auth);
    assert_eq!(classify_error("exec plugin: invalid apiVersion"), FailureKind::Auth);
    assert_eq!(classify_error("dial tcp 10.0.0.1:443: connection refused"), FailureKind::Network);
    assert_eq!(classify_error("timeout after 5s"), FailureKind::Network);
    assert_eq!(classify_error("x509: certificate signed by unknown authority"), FailureKind::Network);
    assert_eq!(classify_error("something odd happened"), FailureKind::Other);
}

#[test]
fn initial_state_is_unknown() {
    let tracker = HealthTracker::new(Thresholds::default());
    let state = tracker.snapshot();
    assert_eq!(state.status, ClusterStatus::Unknown);
    assert!(state.last_checked.is_none());
}

#[test]
fn two_successes_reach_connected() {
    let (state, trail) = run(&[ok(), ok()]);
    assert_eq!(trail, vec![ClusterStatus::Connecting, ClusterStatus::Connected]);
    assert_eq!(state.consecutive_successes, 2);
    assert!(state.last_checked.is_some());
}

#[test]
fn connected_degrades_through_connecting_to_disconnected() {
    let (state, trail) = run(&[ok(), ok(), fail("timeout after 5s"), fail("timeout after 5s"), fail("timeout after 5s")]);
    assert_eq!(
        trail,
        vec![
            ClusterStatus::Connecting,
            ClusterStatus::Connected,
            ClusterStatus::Connecting,
            ClusterStatus::Connecting,
            ClusterStatus::Disconnected,
        ]
    );
    assert_eq!(state.consecutive_failures, 3);
    assert_eq!(state.last_error.as_deref(), Some("timeout after 5s"));
}

#[test]
fn auth_failures_end_in_auth_error() {
    let (state, trail) = run(&[fail("Unauthorized"), fail("Unauthorized"), fail("Unauthorized")]);
    assert_eq!(trail, vec![ClusterStatus::Connecting, ClusterStatus::Connecting, ClusterStatus::AuthError]);
    assert_eq!(state.status, ClusterStatus::AuthError);
}

#[test]
fn healthz_auth_suspect_routes_next_threshold_crossing_to_auth_error() {
    let suspect = ProbeOutcome::Success { auth_suspect: true };
    let (state, _) = run(&[suspect, fail("connection refused"), fail("connection refused"), fail("connection refused")]);
    assert_eq!(state.status, ClusterStatus::AuthError);
}

#[test]
fn recovery_from_disconnected_needs_two_successes() {
    let (_, trail) = run(&[fail("no such host"), fail("no such host"), fail("no such host"), ok(), ok()]);
    assert_eq!(
        &trail[2..],
        &[ClusterStatus::Disconnected, ClusterStatus::Connecting, ClusterStatus::Connected]
    );
}

#[test]
fn a_single_success_interrupts_failure_streak() {
    let (state, trail) = run(&[fail("tls handshake"), fail("tls handshake"), ok(), fail("tls handshake")]);
    assert!(!trail.contains(&ClusterStatus::Disconnected));
    assert_eq!(state.consecutive_failures, 1);
}

#[test]
fn thresholds_come_from_config() {
    let config = HealthConfig { failure_threshold: 5, success_threshold: 0, ..HealthConfig::default() };
    let thresholds = Thresholds::from(&config);
    assert_eq!(thresholds.failures, 5);
    assert_eq!(thresholds.successes, 1);
}

#[tokio::test]
async fn probe_loop_marks_unreachable_cluster_disconnected() {
    let dir = tempfile::tempdir().unwrap();
    let path = crate::fixtures::write_kubeconfig(dir.path(), "config", &[("offline", crate::fixtures::UNREACHABLE_SERVER)]);
    let kubeconfig = kube::config::Kubeconfig::read_from(&path).unwrap();
    let client = ClusterClient::from_kubeconfig(kubeconfig, "offline").await.unwrap();

    let config = HealthConfig { probe_interval_ms: 20, probe_timeout_ms: 500, ..HealthConfig::default() };
    let tracker = Arc::new(HealthTracker::new(Thresholds::from(&config)));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_probe_loop(tracker.clone(), client, config, cancel.clone()));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tracker.status() != ClusterStatus::Disconnected && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cancel.cancel();
    handle.await.unwrap();

    let state = tracker.snapshot();
    assert_eq!(state.status, ClusterStatus::Disconnected);
    assert_eq!(state.consecutive_successes, 0);
    assert!(state.last_error.is_some());
}
