//! Subprocess context end-to-end tests
//!
//! Uses `sh` children speaking the worker protocol by hand

#![cfg(unix)]

use offload_core::application::{CoordinatorConfig, ExecutionCoordinator};
use offload_core::domain::{FailureKind, Outcome, Payload};
use offload_infra_system::{SubprocessConfig, SubprocessContext};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn sh(script: &str, config: CoordinatorConfig) -> ExecutionCoordinator {
    let subprocess = SubprocessConfig::new("sh", vec!["-c".to_string(), script.to_string()])
        .with_graceful_kill_timeout(Duration::from_millis(500));
    ExecutionCoordinator::new(Arc::new(SubprocessContext::new(subprocess)), config)
}

/// The child receives the payload on stdin and echoes a result derived from it
#[tokio::test]
async fn test_payload_round_trip_through_child() {
    let script = r#"read req; case "$req" in *'"payload":"hello"'*) echo '{"type":"result","value":"hello worker"}';; *) exit 4;; esac"#;

    let outcome = sh(script, CoordinatorConfig::default())
        .run("greet", Payload::from("hello"))
        .await;

    assert_eq!(outcome, Outcome::success(json!("hello worker")));
}

#[tokio::test]
async fn test_error_response_then_nonzero_exit_keeps_error() {
    let script = r#"echo '{"type":"error","message":"out of memory"}'; exit 3"#;

    let failure = sh(script, CoordinatorConfig::default())
        .run("any", Payload::default())
        .await
        .into_result()
        .unwrap_err();

    assert_eq!(failure.kind, FailureKind::ComputationFailure);
    assert_eq!(failure.message, "out of memory");
}

/// Killed externally with code 1
#[tokio::test]
async fn test_exit_code_one_message() {
    let failure = sh("exit 1", CoordinatorConfig::default())
        .run("any", Payload::default())
        .await
        .into_result()
        .unwrap_err();

    assert_eq!(failure.kind, FailureKind::AbnormalTermination);
    assert_eq!(failure.message, "Worker stopped with exit code 1");
}

#[tokio::test]
async fn test_clean_exit_without_output_is_protocol_violation() {
    let outcome = sh("cat > /dev/null", CoordinatorConfig::default())
        .run("any", Payload::default())
        .await;

    assert_eq!(outcome.failure_kind(), Some(FailureKind::ProtocolViolation));
}

#[tokio::test]
async fn test_terminate_kills_child() {
    let coord = sh("exec sleep 30", CoordinatorConfig::default());
    let handle = coord.spawn("any", Payload::default()).await;
    assert!(handle.pid().is_some());

    let terminator = handle.terminator();
    let waiter = tokio::spawn(handle.join());
    tokio::time::sleep(Duration::from_millis(50)).await;
    terminator.terminate();

    let report = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.outcome.failure_kind(), Some(FailureKind::Terminated));
}

#[tokio::test]
async fn test_timeout_kills_child() {
    let config = CoordinatorConfig::default().with_timeout(Duration::from_millis(100));
    let failure = sh("exec sleep 30", config)
        .run("any", Payload::default())
        .await
        .into_result()
        .unwrap_err();

    assert_eq!(failure.kind, FailureKind::TimedOut);
}
