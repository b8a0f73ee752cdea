use super::*;

use std::os::unix::process::ExitStatusExt;
use std::time::Duration;

use crate::config::RunConfig;
use crate::prober::HttpProbeClient;

fn test_supervisor() -> Supervisor {
    Supervisor::new(
        RunConfig::for_tests(8080),
        "credential".to_string(),
        CancellationToken::new(),
    )
}

// ========================================================================
// State machine
// ========================================================================

#[test]
fn states_advance_monotonically() {
    assert!(SupervisorState::Spawning < SupervisorState::AwaitingReady);
    assert!(SupervisorState::AwaitingReady < SupervisorState::Probing);
    assert!(SupervisorState::Probing < SupervisorState::Terminating);
    assert!(SupervisorState::Terminating < SupervisorState::Terminated);
}

#[test]
fn note_stop_records_only_the_first_reason() {
    let mut sup = test_supervisor();
    sup.state = SupervisorState::Probing;

    assert!(sup.note_stop(StopReason::ProbeFailed));
    assert!(!sup.note_stop(StopReason::Interrupted));
    assert!(!sup.note_stop(StopReason::WindowElapsed));

    assert_eq!(sup.state, SupervisorState::Terminating);
    assert_eq!(sup.reason, Some(StopReason::ProbeFailed));
}

#[test]
fn note_stop_is_reachable_from_every_earlier_state() {
    for state in [
        SupervisorState::Spawning,
        SupervisorState::AwaitingReady,
        SupervisorState::Probing,
    ] {
        let mut sup = test_supervisor();
        sup.state = state;
        assert!(sup.note_stop(StopReason::Interrupted), "from {state:?}");
    }
}

// ========================================================================
// Line handling
// ========================================================================

/// Lines before any marker are held in arrival order and replayed (exactly
/// once) when the unit fails to start.
#[tokio::test]
async fn held_lines_replay_on_a_failed_start() {
    let mut sup = test_supervisor();
    sup.state = SupervisorState::AwaitingReady;
    let (tx, mut rx) = mpsc::channel(4);
    let mut client: Option<HttpProbeClient> = None;

    sup.handle_line("one".to_string(), &mut client, &tx).await;
    sup.handle_line("two".to_string(), &mut client, &tx).await;
    sup.handle_line("three".to_string(), &mut client, &tx).await;
    assert_eq!(
        sup.held.as_deref(),
        Some(
            &[
                "one".to_string(),
                "two".to_string(),
                "three".to_string()
            ][..]
        )
    );

    sup.handle_line(
        "Job for probe-test.service failed to start.".to_string(),
        &mut client,
        &tx,
    )
    .await;

    assert!(sup.held.is_none(), "held lines were replayed");
    assert_eq!(rx.recv().await, Some(StopReason::ServiceFailed));
}

/// The details hint carries no information and is never held.
#[tokio::test]
async fn details_hint_is_dropped() {
    let mut sup = test_supervisor();
    sup.state = SupervisorState::AwaitingReady;
    let (tx, _rx) = mpsc::channel(4);
    let mut client: Option<HttpProbeClient> = None;

    sup.handle_line(
        r#"See "systemctl status x.service" and "journalctl -xeu x.service" for details."#
            .to_string(),
        &mut client,
        &tx,
    )
    .await;

    assert_eq!(sup.held.as_deref(), Some(&[][..]));
}

/// The live marker records the unit name and switches to pass-through; a
/// second marker is ordinary output and changes nothing.
#[tokio::test]
async fn live_marker_is_acted_on_exactly_once() {
    let mut sup = test_supervisor();
    sup.state = SupervisorState::AwaitingReady;
    // Stop the spawned follower immediately; this test only watches the
    // supervisor's own bookkeeping.
    sup.follow_scope.cancel();
    let (tx, _rx) = mpsc::channel(4);
    let mut client: Option<HttpProbeClient> = None;

    sup.handle_line(
        "Running as unit: run-u1.service".to_string(),
        &mut client,
        &tx,
    )
    .await;
    assert_eq!(sup.unit.as_deref(), Some("run-u1.service"));
    assert!(sup.held.is_none(), "buffer flushed on readiness");

    sup.handle_line(
        "Running as unit: run-u2.service".to_string(),
        &mut client,
        &tx,
    )
    .await;
    assert_eq!(sup.unit.as_deref(), Some("run-u1.service"));
}

/// Readiness takes the probe client and moves the state machine to Probing.
#[tokio::test]
async fn live_marker_schedules_probing() {
    let mut sup = test_supervisor();
    sup.state = SupervisorState::AwaitingReady;
    sup.follow_scope.cancel();
    // Keep the scheduled probe task inert.
    sup.probe_scope.cancel();
    let (tx, _rx) = mpsc::channel(4);
    let mut client = Some(HttpProbeClient::new(&RunConfig::for_tests(8080), "x").unwrap());

    sup.handle_line(
        "Running as unit: run-u1.service".to_string(),
        &mut client,
        &tx,
    )
    .await;

    assert!(client.is_none(), "probe client consumed");
    assert_eq!(sup.state, SupervisorState::Probing);
}

// ========================================================================
// Termination
// ========================================================================

/// With no discovered unit, termination signals the launcher directly, and a
/// second trigger is a silent no-op.
#[tokio::test]
async fn direct_signal_termination_is_idempotent() {
    let mut sup = test_supervisor();
    sup.state = SupervisorState::Probing;

    let mut child = tokio::process::Command::new("sleep")
        .arg("30")
        .spawn()
        .unwrap();

    sup.begin_termination(StopReason::ProbeFailed, &mut child);
    sup.begin_termination(StopReason::Interrupted, &mut child);

    assert_eq!(sup.reason, Some(StopReason::ProbeFailed));
    assert!(sup.probe_scope.is_cancelled());

    let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
        .await
        .expect("child reaps promptly")
        .unwrap();
    assert_eq!(status.signal(), Some(15));
}

/// Root cancellation fans out to the scopes the supervisor derived.
#[test]
fn root_cancellation_reaches_all_scopes() {
    let root = CancellationToken::new();
    let sup = Supervisor::new(RunConfig::for_tests(8080), "c".to_string(), root.clone());

    root.cancel();

    assert!(sup.probe_scope.is_cancelled());
    assert!(sup.follow_scope.is_cancelled());
}

/// Cancelling a scope never propagates upward or sideways.
#[test]
fn scope_cancellation_stays_scoped() {
    let root = CancellationToken::new();
    let sup = Supervisor::new(RunConfig::for_tests(8080), "c".to_string(), root.clone());

    sup.probe_scope.cancel();

    assert!(!root.is_cancelled());
    assert!(!sup.follow_scope.is_cancelled());
}

// ========================================================================
// Final accounting
// ========================================================================

#[tokio::test]
async fn finish_translates_the_exit_status() {
    let status = tokio::process::Command::new("sh")
        .args(["-c", "exit 7"])
        .status()
        .await
        .unwrap();

    let mut sup = test_supervisor();
    sup.state = SupervisorState::AwaitingReady;
    sup.hold("late line".to_string());

    let code = sup.finish(Ok(status));

    assert_eq!(code, 7);
    assert_eq!(sup.state, SupervisorState::Terminated);
    assert_eq!(sup.reason, Some(StopReason::ServiceExited));
    assert!(sup.held.is_none(), "held lines drained before exit");
    assert!(sup.follow_scope.is_cancelled());
}

#[tokio::test]
async fn finish_keeps_the_first_recorded_reason() {
    let status = tokio::process::Command::new("true").status().await.unwrap();

    let mut sup = test_supervisor();
    sup.state = SupervisorState::Probing;
    sup.note_stop(StopReason::WindowElapsed);

    let code = sup.finish(Ok(status));

    assert_eq!(code, 0);
    assert_eq!(sup.reason, Some(StopReason::WindowElapsed));
}

#[test]
fn finish_reports_a_wait_error_as_failure() {
    let mut sup = test_supervisor();
    let code = sup.finish(Err(std::io::Error::other("boom")));
    assert_eq!(code, 1);
    assert_eq!(sup.state, SupervisorState::Terminated);
}
