// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end delivery tests against a real loopback callback receiver.
//!
//! The receiver records every hit (path, headers, body, arrival time) and
//! answers with a scripted status sequence, so retry behavior and signing
//! are observable from the agent's side of the wire.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use switchboard::config::RouterConfig;
use switchboard::envelope::RawEnvelope;
use switchboard::ingest::{self, PublishResult};
use switchboard::registry::RegisterRequest;
use switchboard::state::RouterState;

#[derive(Debug, Clone)]
struct Hit {
    path: String,
    headers: HeaderMap,
    body: Vec<u8>,
    at: Instant,
}

#[derive(Clone, Default)]
struct Recorder {
    hits: Arc<Mutex<Vec<Hit>>>,
    /// Status codes to answer with, in order; 200 once exhausted.
    script: Arc<Mutex<VecDeque<u16>>>,
}

impl Recorder {
    async fn push_script(&self, statuses: &[u16]) {
        self.script.lock().await.extend(statuses.iter().copied());
    }

    async fn hits(&self) -> Vec<Hit> {
        self.hits.lock().await.clone()
    }
}

async fn capture(
    State(rec): State<Recorder>,
    axum::extract::Path(path): axum::extract::Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> StatusCode {
    rec.hits.lock().await.push(Hit {
        path,
        headers,
        body: body.to_vec(),
        at: Instant::now(),
    });
    let status = rec.script.lock().await.pop_front().unwrap_or(200);
    StatusCode::from_u16(status).unwrap_or(StatusCode::OK)
}

/// Bind a receiver on a free loopback port; returns its base URL.
async fn spawn_receiver(rec: Recorder) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new().route("/cb/{path}", post(capture)).with_state(rec);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

fn test_config(audit_dir: &std::path::Path, base_delay_ms: u64, max_retries: u32) -> RouterConfig {
    RouterConfig {
        host: "127.0.0.1".into(),
        port: 0,
        loop_max_per_minute: 100,
        loop_delay_default_ms: 50,
        loop_delay_burst_ms: None,
        delivery_max_retries: max_retries,
        delivery_base_delay_ms: base_delay_ms,
        delivery_timeout_ms: 2000,
        admin_password: None,
        audit_dir: audit_dir.to_path_buf(),
    }
}

async fn approve_agent(
    state: &RouterState,
    agent_id: &str,
    callback_url: &str,
    callback_secret: Option<&str>,
    session_key: &str,
) -> anyhow::Result<()> {
    let req = RegisterRequest {
        agent_id: Some(agent_id.to_owned()),
        display_name: None,
        callback_url: Some(callback_url.to_owned()),
        callback_secret: callback_secret.map(str::to_owned),
        requested_session_keys: vec![session_key.to_owned()],
    };
    state
        .registry
        .register(req)
        .await
        .map_err(|fields| anyhow::anyhow!("registration failed: {fields:?}"))?;
    state
        .registry
        .approve(agent_id, vec![session_key.to_owned()])
        .await
        .map_err(|e| anyhow::anyhow!("approval failed: {e}"))?;
    Ok(())
}

fn agent_publish(trace: &str, session: &str, agent: &str, text: &str) -> RawEnvelope {
    RawEnvelope {
        trace_id: Some(trace.to_owned()),
        session_key: Some(session.to_owned()),
        origin_actor_type: Some("agent".to_owned()),
        origin_actor_id: Some(agent.to_owned()),
        text: Some(text.to_owned()),
        ..RawEnvelope::default()
    }
}

async fn publish_accepted(
    state: &Arc<RouterState>,
    raw: RawEnvelope,
) -> anyhow::Result<String> {
    match ingest::publish(state, raw).await {
        PublishResult::Accepted { event_id, .. } => Ok(event_id),
        other => anyhow::bail!("expected acceptance, got {other:?}"),
    }
}

async fn wait_for_hits(rec: &Recorder, count: usize, timeout: Duration) -> Vec<Hit> {
    let deadline = Instant::now() + timeout;
    loop {
        let hits = rec.hits().await;
        if hits.len() >= count || Instant::now() > deadline {
            return hits;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn header<'a>(hit: &'a Hit, name: &str) -> Option<&'a str> {
    hit.headers.get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn fan_out_excludes_the_publisher() -> anyhow::Result<()> {
    switchboard::ensure_crypto();
    let tmp = tempfile::tempdir()?;
    let rec = Recorder::default();
    let base = spawn_receiver(rec.clone()).await?;

    let state = Arc::new(RouterState::new(test_config(tmp.path(), 50, 1), CancellationToken::new())?);
    approve_agent(&state, "agent-a", &format!("{base}/cb/a"), None, "s1").await?;
    approve_agent(&state, "agent-b", &format!("{base}/cb/b"), None, "s1").await?;

    let event_id = publish_accepted(&state, agent_publish("t1", "s1", "agent-a", "hello")).await?;

    let hits = wait_for_hits(&rec, 1, Duration::from_secs(2)).await;
    assert_eq!(hits.len(), 1, "exactly one delivery expected (to agent-b)");
    let hit = &hits[0];
    assert_eq!(hit.path, "b");
    assert_eq!(header(hit, "x-router-agent-id"), Some("agent-b"));
    assert_eq!(header(hit, "x-router-event-id"), Some(event_id.as_str()));
    assert_eq!(header(hit, "x-router-attempt"), Some("1"));
    assert_eq!(header(hit, "content-type"), Some("application/json"));
    // No secret, no signature headers.
    assert_eq!(header(hit, "x-router-signature"), None);
    assert_eq!(header(hit, "x-router-signature-alg"), None);

    let payload: serde_json::Value = serde_json::from_slice(&hit.body)?;
    assert_eq!(payload["type"], "router.event");
    assert_eq!(payload["event"]["eventId"], event_id.as_str());
    assert_eq!(payload["event"]["text"], "hello");
    assert!(payload["deliveryId"].as_str().is_some_and(|s| !s.is_empty()));
    Ok(())
}

#[tokio::test]
async fn human_events_reach_every_recipient() -> anyhow::Result<()> {
    switchboard::ensure_crypto();
    let tmp = tempfile::tempdir()?;
    let rec = Recorder::default();
    let base = spawn_receiver(rec.clone()).await?;

    let state = Arc::new(RouterState::new(test_config(tmp.path(), 50, 1), CancellationToken::new())?);
    approve_agent(&state, "agent-a", &format!("{base}/cb/a"), None, "s1").await?;
    approve_agent(&state, "agent-b", &format!("{base}/cb/b"), None, "s1").await?;

    let mut raw = agent_publish("t1", "s1", "user-1", "from the human");
    raw.origin_actor_type = Some("human".to_owned());
    publish_accepted(&state, raw).await?;

    let hits = wait_for_hits(&rec, 2, Duration::from_secs(2)).await;
    let mut paths: Vec<String> = hits.iter().map(|h| h.path.clone()).collect();
    paths.sort();
    assert_eq!(paths, vec!["a", "b"]);
    Ok(())
}

#[tokio::test]
async fn signed_callback_carries_hmac_over_exact_body() -> anyhow::Result<()> {
    switchboard::ensure_crypto();
    let tmp = tempfile::tempdir()?;
    let rec = Recorder::default();
    let base = spawn_receiver(rec.clone()).await?;

    let state = Arc::new(RouterState::new(test_config(tmp.path(), 50, 1), CancellationToken::new())?);
    approve_agent(&state, "agent-a", &format!("{base}/cb/a"), None, "s1").await?;
    approve_agent(&state, "agent-b", &format!("{base}/cb/b"), Some("s3cret!!"), "s1").await?;

    publish_accepted(&state, agent_publish("t1", "s1", "agent-a", "signed hello")).await?;

    let hits = wait_for_hits(&rec, 1, Duration::from_secs(2)).await;
    assert_eq!(hits.len(), 1);
    let hit = &hits[0];
    assert_eq!(header(hit, "x-router-signature-alg"), Some("hmac-sha256"));
    let signature =
        header(hit, "x-router-signature").ok_or_else(|| anyhow::anyhow!("missing signature"))?;
    let expected = switchboard::delivery::sign("s3cret!!", &hit.body)
        .ok_or_else(|| anyhow::anyhow!("signing failed"))?;
    assert_eq!(signature, expected);
    Ok(())
}

#[tokio::test]
async fn retries_follow_the_backoff_schedule_then_succeed() -> anyhow::Result<()> {
    switchboard::ensure_crypto();
    let tmp = tempfile::tempdir()?;
    let rec = Recorder::default();
    rec.push_script(&[500, 500]).await;
    let base = spawn_receiver(rec.clone()).await?;

    let state =
        Arc::new(RouterState::new(test_config(tmp.path(), 200, 3), CancellationToken::new())?);
    approve_agent(&state, "agent-a", &format!("{base}/cb/a"), None, "s1").await?;
    approve_agent(&state, "agent-b", &format!("{base}/cb/b"), Some("s3cret!!"), "s1").await?;

    publish_accepted(&state, agent_publish("t1", "s1", "agent-a", "retry me")).await?;

    let hits = wait_for_hits(&rec, 3, Duration::from_secs(5)).await;
    // Let the final success audit land before inspecting the trail.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(hits.len(), 3, "two failures then a success");
    assert_eq!(header(&hits[0], "x-router-attempt"), Some("1"));
    assert_eq!(header(&hits[1], "x-router-attempt"), Some("2"));
    assert_eq!(header(&hits[2], "x-router-attempt"), Some("3"));

    // t, t+base, t+base*3 with generous tolerance for scheduling jitter.
    let gap1 = hits[1].at.duration_since(hits[0].at);
    let gap2 = hits[2].at.duration_since(hits[1].at);
    assert!(gap1 >= Duration::from_millis(150), "first retry too early: {gap1:?}");
    assert!(gap1 < Duration::from_millis(400), "first retry too late: {gap1:?}");
    assert!(gap2 >= Duration::from_millis(350), "second retry too early: {gap2:?}");
    assert!(gap2 < Duration::from_millis(800), "second retry too late: {gap2:?}");

    // Retries reuse the deliveryId and the signed body bytes.
    let first: serde_json::Value = serde_json::from_slice(&hits[0].body)?;
    let last: serde_json::Value = serde_json::from_slice(&hits[2].body)?;
    assert_eq!(first["deliveryId"], last["deliveryId"]);
    assert_eq!(hits[0].body, hits[2].body);
    assert_eq!(
        header(&hits[0], "x-router-signature"),
        header(&hits[2], "x-router-signature")
    );

    // Audit trail: retry, retry, success sharing one deliveryId.
    let records = state.audit.recent_deliveries(10);
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].status, switchboard::audit::DeliveryStatus::Retry);
    assert_eq!(records[0].attempt, 1);
    assert_eq!(records[1].status, switchboard::audit::DeliveryStatus::Retry);
    assert_eq!(records[1].attempt, 2);
    assert_eq!(records[2].status, switchboard::audit::DeliveryStatus::Success);
    assert_eq!(records[2].attempt, 3);
    assert_eq!(records[0].delivery_id, records[2].delivery_id);
    assert_eq!(records[0].target_agent_id, "agent-b");
    Ok(())
}

#[tokio::test]
async fn retry_budget_exhaustion_is_terminal() -> anyhow::Result<()> {
    switchboard::ensure_crypto();
    let tmp = tempfile::tempdir()?;
    let rec = Recorder::default();
    rec.push_script(&[500, 500, 500]).await;
    let base = spawn_receiver(rec.clone()).await?;

    let state =
        Arc::new(RouterState::new(test_config(tmp.path(), 50, 3), CancellationToken::new())?);
    approve_agent(&state, "agent-a", &format!("{base}/cb/a"), None, "s1").await?;
    approve_agent(&state, "agent-b", &format!("{base}/cb/b"), None, "s1").await?;

    publish_accepted(&state, agent_publish("t1", "s1", "agent-a", "doomed")).await?;

    let hits = wait_for_hits(&rec, 3, Duration::from_secs(3)).await;
    assert_eq!(hits.len(), 3);

    // Give the terminal audit a moment to land, then confirm no 4th attempt.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(rec.hits().await.len(), 3);

    let records = state.audit.recent_deliveries(10);
    assert_eq!(records.len(), 3);
    assert_eq!(records[2].status, switchboard::audit::DeliveryStatus::Failed);
    assert_eq!(records[2].attempt, 3);
    assert!(records[2].error.as_deref().is_some_and(|e| e.contains("500")));
    Ok(())
}

#[tokio::test]
async fn unreachable_callback_never_fails_the_publish() -> anyhow::Result<()> {
    switchboard::ensure_crypto();
    let tmp = tempfile::tempdir()?;
    let state =
        Arc::new(RouterState::new(test_config(tmp.path(), 50, 2), CancellationToken::new())?);
    approve_agent(&state, "agent-a", "http://127.0.0.1:9/cb/a", None, "s1").await?;
    approve_agent(&state, "agent-b", "http://127.0.0.1:9/cb/b", None, "s1").await?;

    // Publish succeeds even though every callback is unreachable.
    publish_accepted(&state, agent_publish("t1", "s1", "agent-a", "hello")).await?;
    assert_eq!(state.store.list("s1").await.len(), 1);

    // The failure lands in the audit trail, not the response.
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        let records = state.audit.recent_deliveries(10);
        if records.iter().any(|r| r.status == switchboard::audit::DeliveryStatus::Failed) {
            break;
        }
        if Instant::now() > deadline {
            anyhow::bail!("no terminal failure audit recorded");
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    Ok(())
}
