// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary smoke tests: spawn the real router and drive it over HTTP.

use std::time::Duration;

use switchboard_specs::RouterProcess;

#[tokio::test]
async fn health_responds() -> anyhow::Result<()> {
    let router = RouterProcess::start(&[])?;
    router.wait_healthy(Duration::from_secs(10)).await?;

    let body: serde_json::Value =
        reqwest::get(format!("{}/health", router.base_url())).await?.json().await?;
    assert_eq!(body["status"], "running");
    Ok(())
}

#[tokio::test]
async fn register_approve_publish_round_trip() -> anyhow::Result<()> {
    let router = RouterProcess::start(&[])?;
    router.wait_healthy(Duration::from_secs(10)).await?;
    let base = router.base_url();
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/agents/register"))
        .json(&serde_json::json!({
            "agentId": "agent-alpha",
            "callbackUrl": "http://127.0.0.1:9/cb",
            "requestedSessionKeys": ["s1"],
        }))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 202);

    // No ADMIN_PASSWORD configured: the admin surface is open.
    let resp = client
        .post(format!("{base}/admin/agents/approve"))
        .json(&serde_json::json!({ "agentId": "agent-alpha", "sessionKeys": ["s1"] }))
        .send()
        .await?;
    assert!(resp.status().is_success());

    let publish: serde_json::Value = client
        .post(format!("{base}/mcp/events/publish"))
        .json(&serde_json::json!({
            "traceId": "trace-1",
            "sessionKey": "s1",
            "originActorType": "agent",
            "originActorId": "agent-alpha",
            "text": "hello from the smoke test",
        }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(publish["accepted"], true);
    assert_eq!(publish["delayed"], false);

    let pulled: serde_json::Value = client
        .get(format!("{base}/mcp/sessions/s1/events"))
        .query(&[("agentId", "agent-alpha")])
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(pulled["events"].as_array().map(Vec::len), Some(1));
    assert_eq!(pulled["events"][0]["text"], "hello from the smoke test");
    Ok(())
}

#[tokio::test]
async fn loop_guard_config_comes_from_env() -> anyhow::Result<()> {
    let router = RouterProcess::start(&[("LOOP_MAX_PER_MINUTE", "1")])?;
    router.wait_healthy(Duration::from_secs(10)).await?;
    let base = router.base_url();
    let client = reqwest::Client::new();

    let publish = |text: &str| {
        let client = client.clone();
        let base = base.clone();
        let text = text.to_owned();
        async move {
            let resp = client
                .post(format!("{base}/mcp/events/publish"))
                .json(&serde_json::json!({
                    "traceId": "trace-env",
                    "sessionKey": "s1",
                    "originActorType": "human",
                    "originActorId": "user-1",
                    "text": text,
                }))
                .send()
                .await?;
            anyhow::Ok(resp.json::<serde_json::Value>().await?)
        }
    };

    let first = publish("one").await?;
    assert_eq!(first["accepted"], true);

    // The cap of 1 trips immediately on the second event.
    let second = publish("two").await?;
    assert_eq!(second["accepted"], false);
    assert_eq!(second["stopped"], true);
    assert_eq!(second["decision"]["confidence"], 0.95);
    Ok(())
}
