//! Integration tests for the headless snapshot protocol.
//!
//! These run whole headless sessions against the scripted fleet API and
//! check the emitted JSON lines:
//! 1. Sequence numbers grow by exactly one across all frame kinds
//! 2. Retry notices become their own frames ahead of the snapshot
//! 3. Failed loads degrade into a snapshot instead of ending the session

use std::sync::Arc;
use std::time::Duration;

use fleetdeck_api::{ApiError, Resource, ScriptedFleetApi};
use fleetdeck_core::TuiConfig;
use fleetdeck_core::config::RetrySettings;
use fleetdeck_tui::{ConnectionState, HeadlessOptions, ScreenId, SessionContext, run_headless};
use serde_json::Value;

fn fast_config() -> TuiConfig {
    TuiConfig {
        retry: RetrySettings {
            max_attempts: 3,
            backoff_ms: 1,
        },
        ..TuiConfig::default()
    }
}

fn context(api: Arc<ScriptedFleetApi>) -> SessionContext {
    SessionContext::new(api, Some("acme".into()), fast_config()).with_reduced_motion(true)
}

fn parse_frames(out: &[u8]) -> Vec<Value> {
    String::from_utf8(out.to_vec())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn frame_kind(frame: &Value) -> &str {
    frame["meta"]["frameKind"].as_str().unwrap()
}

fn one_shot(screen: ScreenId) -> HeadlessOptions {
    HeadlessOptions {
        screen,
        ..HeadlessOptions::default()
    }
}

#[tokio::test]
async fn test_one_shot_emits_startup_then_snapshot() {
    let api = Arc::new(ScriptedFleetApi::demo());
    let mut out = Vec::new();

    let summary = run_headless(context(api), one_shot(ScreenId::Devices), &mut out)
        .await
        .unwrap();

    let frames = parse_frames(&out);
    assert_eq!(frames.len(), 2);
    assert_eq!(summary.frames, 2);
    assert_eq!(summary.snapshots, 1);
    assert_eq!(summary.last_state, ConnectionState::Connected);

    assert_eq!(frame_kind(&frames[0]), "startup");
    assert!(frames[0]["panels"].as_array().unwrap().is_empty());

    let snapshot = &frames[1];
    assert_eq!(frame_kind(snapshot), "snapshot");
    assert_eq!(snapshot["schemaVersion"], 1);
    assert_eq!(snapshot["screen"], "devices");
    assert_eq!(snapshot["tenantId"], "acme");
    assert_eq!(snapshot["motion"]["reducedMotion"], true);
    assert_eq!(snapshot["meta"]["connectionState"], "connected");
    assert_eq!(snapshot["meta"]["refreshOutcome"], "completed");
    assert_eq!(snapshot["meta"]["renderFallback"], false);
    assert!(snapshot["meta"].get("error").is_none());
    assert!(snapshot.to_string().contains("lobby-display"));
}

#[tokio::test]
async fn test_follow_sequence_is_contiguous() {
    let api = Arc::new(ScriptedFleetApi::demo());
    let mut out = Vec::new();
    let options = HeadlessOptions {
        screen: ScreenId::Dashboard,
        follow: true,
        interval: Duration::from_millis(5),
        max_frames: Some(3),
    };

    let summary = run_headless(context(api.clone()), options, &mut out).await.unwrap();

    let frames = parse_frames(&out);
    assert_eq!(summary.snapshots, 3);
    assert_eq!(frames.len() as u64, summary.frames);

    let session_id = frames[0]["sessionId"].as_str().unwrap();
    for (index, frame) in frames.iter().enumerate() {
        assert_eq!(frame["sequence"].as_u64().unwrap(), index as u64 + 1);
        assert_eq!(frame["sessionId"], session_id);
    }
    let snapshots: Vec<&Value> = frames.iter().filter(|f| frame_kind(f) == "snapshot").collect();
    assert_eq!(snapshots.len(), 3);
    assert!(snapshots.iter().all(|f| f["meta"]["follow"] == true));
    assert_eq!(api.calls(Resource::Devices), 3);
}

#[tokio::test]
async fn test_transient_failure_emits_retry_frame() {
    let api = Arc::new(ScriptedFleetApi::demo());
    api.fail_next(Resource::Devices, ApiError::Network("connection reset".into()));
    let mut out = Vec::new();

    let summary = run_headless(context(api.clone()), one_shot(ScreenId::Devices), &mut out)
        .await
        .unwrap();

    let frames = parse_frames(&out);
    let kinds: Vec<&str> = frames.iter().map(frame_kind).collect();
    assert_eq!(kinds, vec!["startup", "retry", "snapshot"]);
    assert_eq!(summary.retries, 1);

    let retry = &frames[1];
    assert_eq!(retry["meta"]["label"], "devices");
    assert_eq!(retry["meta"]["attempt"], 1);
    assert_eq!(retry["meta"]["maxAttempts"], 3);
    assert_eq!(retry["meta"]["connectionState"], "network_error");
    assert_eq!(retry["meta"]["error"]["class"], "network");

    let snapshot = &frames[2];
    assert_eq!(snapshot["meta"]["connectionState"], "connected");
    assert_eq!(snapshot["meta"]["retryAttempts"], 2);
    assert_eq!(api.calls(Resource::Devices), 2);
}

#[tokio::test]
async fn test_exhausted_retries_degrade_snapshot() {
    let api = Arc::new(ScriptedFleetApi::demo());
    for _ in 0..3 {
        api.fail_next(Resource::Devices, ApiError::Timeout(10));
    }
    let mut out = Vec::new();

    let summary = run_headless(context(api.clone()), one_shot(ScreenId::Devices), &mut out)
        .await
        .unwrap();

    let frames = parse_frames(&out);
    let kinds: Vec<&str> = frames.iter().map(frame_kind).collect();
    assert_eq!(kinds, vec!["startup", "retry", "retry", "snapshot"]);
    assert_eq!(summary.last_state, ConnectionState::Timeout);

    let snapshot = frames.last().unwrap();
    assert_eq!(snapshot["meta"]["connectionState"], "timeout");
    assert_eq!(snapshot["meta"]["refreshOutcome"], "failed");
    assert_eq!(snapshot["meta"]["refresh"]["state"], "error");
    assert_eq!(snapshot["meta"]["error"]["state"], "timeout");
    assert_eq!(snapshot["meta"]["retryAttempts"], 3);
    assert_eq!(api.calls(Resource::Devices), 3);
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let api = Arc::new(ScriptedFleetApi::demo());
    api.fail_next(Resource::Devices, ApiError::Auth("token expired".into()));
    let mut out = Vec::new();

    let summary = run_headless(context(api.clone()), one_shot(ScreenId::Devices), &mut out)
        .await
        .unwrap();

    let frames = parse_frames(&out);
    assert_eq!(summary.retries, 0);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1]["meta"]["connectionState"], "auth_required");
    assert_eq!(api.calls(Resource::Devices), 1);
}
