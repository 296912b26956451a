// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fan-out delivery engine: signed HTTP callbacks with retry.
//!
//! Each recipient of an appended event gets its own delivery task. The
//! payload is serialized once; its bytes (and the HMAC over them) are
//! reused across retries, while `x-router-attempt` counts up. Retries
//! back off as `base * 2^(attempt-1)` and are sequential within a task,
//! so a recipient never sees two attempts in flight at once.

use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crate::audit::{AuditSink, DeliveryRecord, DeliveryStatus};
use crate::envelope::{ActorType, Envelope};
use crate::registry::Registration;
use crate::state::epoch_ms;

/// Wire payload POSTed to an agent's callback URL.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub delivery_id: &'a str,
    pub delivered_at: u64,
    pub event: &'a Envelope,
}

/// Delivery engine shared by all publish requests.
pub struct DeliveryEngine {
    client: reqwest::Client,
    max_retries: u32,
    base_delay: Duration,
    audit: Arc<AuditSink>,
}

impl DeliveryEngine {
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        attempt_timeout: Duration,
        audit: Arc<AuditSink>,
    ) -> Self {
        let client = reqwest::Client::builder().timeout(attempt_timeout).build().unwrap_or_default();
        Self { client, max_retries, base_delay, audit }
    }

    /// Schedule delivery of `event` to one recipient.
    ///
    /// Skips the recipient when the event is the agent's own (same-hop
    /// self delivery). Returns the `deliveryId` when a task was spawned.
    pub fn dispatch(&self, event: &Envelope, recipient: &Registration) -> Option<String> {
        if event.origin_actor_type == ActorType::Agent
            && event.origin_actor_id == recipient.agent_id
        {
            tracing::debug!(
                agent = %recipient.agent_id,
                event = %event.event_id,
                "skipping self delivery"
            );
            return None;
        }

        let delivery_id = uuid::Uuid::new_v4().to_string();
        let payload = CallbackPayload {
            kind: "router.event",
            delivery_id: &delivery_id,
            delivered_at: epoch_ms(),
            event,
        };
        let Ok(body) = serde_json::to_vec(&payload) else {
            tracing::error!(event = %event.event_id, "failed to serialize callback payload");
            return None;
        };
        let signature = recipient.callback_secret.as_deref().and_then(|s| sign(s, &body));

        let job = DeliveryJob {
            client: self.client.clone(),
            audit: Arc::clone(&self.audit),
            max_retries: self.max_retries,
            base_delay: self.base_delay,
            delivery_id: delivery_id.clone(),
            event_id: event.event_id.clone(),
            session_key: event.session_key.clone(),
            agent_id: recipient.agent_id.clone(),
            callback_url: recipient.callback_url.clone(),
            body,
            signature,
        };
        tokio::spawn(job.run());
        Some(delivery_id)
    }
}

struct DeliveryJob {
    client: reqwest::Client,
    audit: Arc<AuditSink>,
    max_retries: u32,
    base_delay: Duration,
    delivery_id: String,
    event_id: String,
    session_key: String,
    agent_id: String,
    callback_url: String,
    body: Vec<u8>,
    signature: Option<String>,
}

impl DeliveryJob {
    async fn run(self) {
        let mut attempt = 1u32;
        loop {
            match self.attempt(attempt).await {
                Ok(()) => {
                    tracing::debug!(
                        agent = %self.agent_id,
                        event = %self.event_id,
                        attempt,
                        "callback delivered"
                    );
                    self.record(DeliveryStatus::Success, attempt, None);
                    return;
                }
                Err(error) => {
                    if attempt >= self.max_retries {
                        tracing::warn!(
                            agent = %self.agent_id,
                            event = %self.event_id,
                            attempt,
                            err = %error,
                            "callback failed, retry budget exhausted"
                        );
                        self.record(DeliveryStatus::Failed, attempt, Some(error));
                        return;
                    }
                    tracing::debug!(
                        agent = %self.agent_id,
                        event = %self.event_id,
                        attempt,
                        err = %error,
                        "callback failed, retrying"
                    );
                    self.record(DeliveryStatus::Retry, attempt, Some(error));
                    tokio::time::sleep(backoff_delay(self.base_delay, attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(&self, attempt: u32) -> Result<(), String> {
        let mut req = self
            .client
            .post(&self.callback_url)
            .header("content-type", "application/json")
            .header("x-router-agent-id", &self.agent_id)
            .header("x-router-event-id", &self.event_id)
            .header("x-router-attempt", attempt.to_string());
        if let Some(ref signature) = self.signature {
            req = req
                .header("x-router-signature", signature)
                .header("x-router-signature-alg", "hmac-sha256");
        }

        let resp = req.body(self.body.clone()).send().await.map_err(|e| e.to_string())?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(format!("callback returned {}", resp.status()))
        }
    }

    fn record(&self, status: DeliveryStatus, attempt: u32, error: Option<String>) {
        self.audit.record_delivery(&DeliveryRecord {
            delivery_id: self.delivery_id.clone(),
            event_id: self.event_id.clone(),
            session_key: self.session_key.clone(),
            target_agent_id: self.agent_id.clone(),
            status,
            attempt,
            error,
            recorded_at: epoch_ms(),
        });
    }
}

/// Delay before the attempt after `failed_attempt`: base * 2^(n-1).
pub fn backoff_delay(base: Duration, failed_attempt: u32) -> Duration {
    base * 2u32.saturating_pow(failed_attempt.saturating_sub(1))
}

/// HMAC-SHA256 of `body` as lowercase hex.
pub fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
#[path = "delivery_tests.rs"]
mod tests;
