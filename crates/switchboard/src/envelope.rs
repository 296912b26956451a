// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event envelope model and validator.
//!
//! Incoming publish bodies deserialize into [`RawEnvelope`] (every field
//! optional) so that validation, not serde, produces the field-level
//! diagnostics. [`validate`] normalizes a raw body into an immutable
//! [`Envelope`], assigning `eventId` and `createdAt` server-side.

use serde::{Deserialize, Serialize};

use crate::error::FieldError;
use crate::state::epoch_ms;

/// Who produced the event at its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    Human,
    Agent,
    System,
}

impl ActorType {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "human" => Some(Self::Human),
            "agent" => Some(Self::Agent),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// The unit of routing. Immutable once appended to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub event_id: String,
    pub trace_id: String,
    pub session_key: String,
    #[serde(default)]
    pub source_channel: String,
    #[serde(default)]
    pub source_chat_id: String,
    #[serde(default)]
    pub source_thread_id: String,
    #[serde(default)]
    pub source_message_id: String,
    pub origin_actor_type: ActorType,
    pub origin_actor_id: String,
    pub text: String,
    pub hop_count: u32,
    #[serde(default)]
    pub seen_agents: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emitted_by_agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emitted_event_id: Option<String>,
    pub created_at: u64,
}

/// Wire shape of an incoming publish body. Everything optional; the
/// validator decides what is missing. Client-supplied `createdAt` is
/// accepted syntactically but never trusted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEnvelope {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default)]
    pub source_channel: Option<String>,
    #[serde(default)]
    pub source_chat_id: Option<String>,
    #[serde(default)]
    pub source_thread_id: Option<String>,
    #[serde(default)]
    pub source_message_id: Option<String>,
    #[serde(default)]
    pub origin_actor_type: Option<String>,
    #[serde(default)]
    pub origin_actor_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub hop_count: Option<i64>,
    #[serde(default)]
    pub seen_agents: Option<Vec<String>>,
    #[serde(default)]
    pub emitted_by_agent_id: Option<String>,
    #[serde(default)]
    pub emitted_event_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

fn require<'a>(
    value: &'a Option<String>,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<&'a str> {
    match value.as_deref() {
        Some(s) if !s.is_empty() => Some(s),
        _ => {
            errors.push(FieldError {
                field: field.to_owned(),
                message: "must be a non-empty string".to_owned(),
            });
            None
        }
    }
}

/// Validate and normalize a raw body into an [`Envelope`].
///
/// Returns every failed field at once rather than stopping at the first.
pub fn validate(raw: RawEnvelope) -> Result<Envelope, Vec<FieldError>> {
    let mut errors = Vec::new();

    let trace_id = require(&raw.trace_id, "traceId", &mut errors);
    let session_key = require(&raw.session_key, "sessionKey", &mut errors);
    let origin_actor_id = require(&raw.origin_actor_id, "originActorId", &mut errors);
    let text = require(&raw.text, "text", &mut errors);

    let origin_actor_type = match raw.origin_actor_type.as_deref() {
        Some(s) => match ActorType::from_str(s) {
            Some(t) => Some(t),
            None => {
                errors.push(FieldError {
                    field: "originActorType".to_owned(),
                    message: "must be one of \"human\", \"agent\", \"system\"".to_owned(),
                });
                None
            }
        },
        None => {
            errors.push(FieldError {
                field: "originActorType".to_owned(),
                message: "is required".to_owned(),
            });
            None
        }
    };

    let hop_count = match raw.hop_count {
        None => 0,
        Some(n) if n >= 0 => n as u32,
        Some(_) => {
            errors.push(FieldError {
                field: "hopCount".to_owned(),
                message: "must be a non-negative integer".to_owned(),
            });
            0
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    // All four `require`s and the actor type succeeded if we got here.
    let (Some(trace_id), Some(session_key), Some(origin_actor_id), Some(text), Some(actor_type)) =
        (trace_id, session_key, origin_actor_id, text, origin_actor_type)
    else {
        return Err(vec![FieldError {
            field: "body".to_owned(),
            message: "envelope failed validation".to_owned(),
        }]);
    };

    let event_id = match raw.event_id {
        Some(id) if !id.is_empty() => id,
        _ => uuid::Uuid::new_v4().to_string(),
    };

    Ok(Envelope {
        event_id,
        trace_id: trace_id.to_owned(),
        session_key: session_key.to_owned(),
        source_channel: raw.source_channel.unwrap_or_default(),
        source_chat_id: raw.source_chat_id.unwrap_or_default(),
        source_thread_id: raw.source_thread_id.unwrap_or_default(),
        source_message_id: raw.source_message_id.unwrap_or_default(),
        origin_actor_type: actor_type,
        origin_actor_id: origin_actor_id.to_owned(),
        text: text.to_owned(),
        hop_count,
        seen_agents: raw.seen_agents.unwrap_or_default(),
        emitted_by_agent_id: raw.emitted_by_agent_id.filter(|s| !s.is_empty()),
        emitted_event_id: raw.emitted_event_id.filter(|s| !s.is_empty()),
        // Router-assigned; a client-supplied value is ignored.
        created_at: epoch_ms(),
    })
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
