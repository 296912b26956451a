// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Publish pipeline: validate -> authorize -> echo-check -> classify ->
//! (maybe delay) -> append -> fan-out.
//!
//! The pipeline answers the publisher as soon as the decision is made;
//! the append + fan-out closure runs inline for undelayed events and on a
//! timer otherwise. Delivery failures never surface here.

use std::sync::Arc;

use crate::envelope::{self, ActorType, Envelope, RawEnvelope};
use crate::error::FieldError;
use crate::guard::{self, Decision, PolicyAction};
use crate::state::RouterState;

/// What a publish request resolves to, before HTTP shaping.
#[derive(Debug)]
pub enum PublishResult {
    /// Envelope failed validation (HTTP 400).
    Invalid(Vec<FieldError>),
    /// Agent publisher without a grant for the session (HTTP 403).
    Forbidden,
    /// Duplicate `emittedEventId` (HTTP 200, accepted:false).
    DuplicateEmitted,
    /// Loop guard stopped the event (HTTP 200, accepted:false).
    Stopped { decision: Decision },
    /// Event admitted; append + fan-out run inline or after `delay_ms`.
    Accepted { event_id: String, delay_ms: u64, decision: Decision },
}

/// Run the ingest pipeline for one publish body.
pub async fn publish(state: &Arc<RouterState>, raw: RawEnvelope) -> PublishResult {
    let evt = match envelope::validate(raw) {
        Ok(evt) => evt,
        Err(fields) => return PublishResult::Invalid(fields),
    };

    if evt.origin_actor_type == ActorType::Agent
        && !state.registry.can_access(&evt.origin_actor_id, &evt.session_key).await
    {
        tracing::debug!(
            agent = %evt.origin_actor_id,
            session = %evt.session_key,
            "publish rejected: no session grant"
        );
        return PublishResult::Forbidden;
    }

    if let Some(ref emitted_event_id) = evt.emitted_event_id {
        if !state.registry.record_emitted_event_id(emitted_event_id).await {
            tracing::debug!(
                emitted_event_id = %emitted_event_id,
                "publish rejected: duplicate emittedEventId"
            );
            return PublishResult::DuplicateEmitted;
        }
    }

    let (delay_ms, decision) = state.guard.classify(&state.store, &evt).await;
    let action = guard::action_for(&decision);
    state.audit.record_decision(&evt, &decision, action.as_str());

    if action == PolicyAction::Stop {
        tracing::info!(
            event = %evt.event_id,
            trace = %evt.trace_id,
            reason = %decision.reason,
            "loop guard stopped event"
        );
        return PublishResult::Stopped { decision };
    }

    let mut outbound = evt;
    if action == PolicyAction::Warn {
        tracing::info!(
            event = %outbound.event_id,
            trace = %outbound.trace_id,
            confidence = decision.confidence,
            "loop guard warning attached"
        );
        outbound.text = guard::apply_warning(&outbound.text, decision.confidence);
    }

    let event_id = outbound.event_id.clone();
    if delay_ms > 0 {
        let state = Arc::clone(state);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            run_admission(&state, outbound).await;
        });
    } else {
        run_admission(state, outbound).await;
    }

    PublishResult::Accepted { event_id, delay_ms, decision }
}

/// The deferred half of the pipeline: idempotent append, event audit,
/// fan-out to every other approved agent in the session.
async fn run_admission(state: &Arc<RouterState>, evt: Envelope) {
    if !state.store.append(&evt).await {
        tracing::debug!(event = %evt.event_id, "append skipped: duplicate eventId");
        return;
    }
    state.audit.record_event(&evt);

    let recipients = state.registry.recipients_for(&evt.session_key).await;
    for recipient in &recipients {
        state.delivery.dispatch(&evt, recipient);
    }
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod tests;
