// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent whitelist and registration lifecycle.
//!
//! Agents register as pending; an admin approves them with an explicit set
//! of session grants or rejects them. Only approved agents with a matching
//! grant can publish to or pull from a session, and only they receive
//! fan-out deliveries.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{FieldError, RouterError};
use crate::state::epoch_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    Rejected,
}

/// A registered agent and its callback metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub callback_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_secret: Option<String>,
    pub requested_session_keys: Vec<String>,
    pub registered_at: u64,
    pub status: RegistrationStatus,
}

/// Incoming registration payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub callback_secret: Option<String>,
    #[serde(default)]
    pub requested_session_keys: Vec<String>,
}

#[derive(Default)]
struct RegistryInner {
    registrations: HashMap<String, Registration>,
    approved: HashSet<String>,
    sessions_by_agent: HashMap<String, HashSet<String>>,
    seen_emitted_event_ids: HashSet<String>,
}

/// Whitelist state. All mutations go through the single write lock so a
/// request observes a consistent snapshot.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a pending registration.
    ///
    /// Re-registering an approved agent demotes it to pending and clears
    /// its grants: the approval vouched for the previous callback
    /// metadata.
    pub async fn register(&self, req: RegisterRequest) -> Result<Registration, Vec<FieldError>> {
        let mut errors = Vec::new();
        let agent_id = match req.agent_id.as_deref() {
            Some(s) if !s.is_empty() => s.to_owned(),
            _ => {
                errors.push(FieldError {
                    field: "agentId".to_owned(),
                    message: "must be a non-empty string".to_owned(),
                });
                String::new()
            }
        };
        let callback_url = match req.callback_url.as_deref() {
            Some(s) if !s.is_empty() => s.to_owned(),
            _ => {
                errors.push(FieldError {
                    field: "callbackUrl".to_owned(),
                    message: "must be a non-empty string".to_owned(),
                });
                String::new()
            }
        };
        if let Some(ref secret) = req.callback_secret {
            if secret.len() < 8 {
                errors.push(FieldError {
                    field: "callbackSecret".to_owned(),
                    message: "must be at least 8 characters when present".to_owned(),
                });
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let registration = Registration {
            agent_id: agent_id.clone(),
            display_name: req.display_name.filter(|s| !s.is_empty()),
            callback_url,
            callback_secret: req.callback_secret,
            requested_session_keys: req.requested_session_keys,
            registered_at: epoch_ms(),
            status: RegistrationStatus::Pending,
        };

        let mut inner = self.inner.write().await;
        inner.approved.remove(&agent_id);
        inner.sessions_by_agent.remove(&agent_id);
        inner.registrations.insert(agent_id, registration.clone());
        Ok(registration)
    }

    /// Approve an agent, replacing its session grants with exactly
    /// `session_keys`.
    pub async fn approve(
        &self,
        agent_id: &str,
        session_keys: Vec<String>,
    ) -> Result<Registration, RouterError> {
        let mut inner = self.inner.write().await;
        let Some(registration) = inner.registrations.get_mut(agent_id) else {
            return Err(RouterError::AgentNotFound);
        };
        registration.status = RegistrationStatus::Approved;
        let registration = registration.clone();
        inner.approved.insert(agent_id.to_owned());
        inner.sessions_by_agent.insert(agent_id.to_owned(), session_keys.into_iter().collect());
        Ok(registration)
    }

    /// Reject an agent: removes approval and all session grants.
    pub async fn reject(&self, agent_id: &str) -> Result<Registration, RouterError> {
        let mut inner = self.inner.write().await;
        let Some(registration) = inner.registrations.get_mut(agent_id) else {
            return Err(RouterError::AgentNotFound);
        };
        registration.status = RegistrationStatus::Rejected;
        let registration = registration.clone();
        inner.approved.remove(agent_id);
        inner.sessions_by_agent.remove(agent_id);
        Ok(registration)
    }

    /// True iff the agent is approved and granted `session_key`.
    pub async fn can_access(&self, agent_id: &str, session_key: &str) -> bool {
        let inner = self.inner.read().await;
        inner.approved.contains(agent_id)
            && inner
                .sessions_by_agent
                .get(agent_id)
                .is_some_and(|keys| keys.contains(session_key))
    }

    /// Approved registrations whose grants include `session_key`, in
    /// deterministic (registeredAt, agentId) order.
    ///
    /// Status is re-checked on the registration itself so stale
    /// membership never leaks a non-approved recipient.
    pub async fn recipients_for(&self, session_key: &str) -> Vec<Registration> {
        let inner = self.inner.read().await;
        let mut recipients: Vec<Registration> = inner
            .approved
            .iter()
            .filter(|id| {
                inner
                    .sessions_by_agent
                    .get(*id)
                    .is_some_and(|keys| keys.contains(session_key))
            })
            .filter_map(|id| inner.registrations.get(id))
            .filter(|r| r.status == RegistrationStatus::Approved)
            .cloned()
            .collect();
        recipients.sort_by(|a, b| {
            a.registered_at.cmp(&b.registered_at).then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        recipients
    }

    /// Atomically record an `emittedEventId`. Returns `false` iff it was
    /// already seen; exactly one concurrent publisher wins.
    pub async fn record_emitted_event_id(&self, emitted_event_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        inner.seen_emitted_event_ids.insert(emitted_event_id.to_owned())
    }

    pub async fn pending(&self) -> Vec<Registration> {
        self.by_status(RegistrationStatus::Pending).await
    }

    pub async fn approved(&self) -> Vec<Registration> {
        self.by_status(RegistrationStatus::Approved).await
    }

    async fn by_status(&self, status: RegistrationStatus) -> Vec<Registration> {
        let inner = self.inner.read().await;
        let mut list: Vec<Registration> =
            inner.registrations.values().filter(|r| r.status == status).cloned().collect();
        list.sort_by(|a, b| {
            a.registered_at.cmp(&b.registered_at).then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        list
    }

    /// Session grants for an agent (admin reporting).
    pub async fn grants_for(&self, agent_id: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut grants: Vec<String> = inner
            .sessions_by_agent
            .get(agent_id)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        grants.sort();
        grants
    }

    pub async fn approved_count(&self) -> usize {
        self.inner.read().await.approved.len()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
