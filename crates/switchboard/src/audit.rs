// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed append-only audit sink.
//!
//! Three JSONL streams in the audit directory: accepted events, loop
//! decisions, and delivery attempts. Records are appended as single
//! lines and never truncated; reporting queries re-read the files, so
//! everything written survives restart.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::envelope::{ActorType, Envelope};
use crate::guard::Decision;
use crate::state::epoch_ms;

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Retry,
    Failed,
}

/// Audit record for an accepted (appended) event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub event_id: String,
    pub session_key: String,
    pub trace_id: String,
    pub origin_actor_type: ActorType,
    pub origin_actor_id: String,
    pub created_at: u64,
    pub recorded_at: u64,
}

/// Audit record for a loop-guard decision and the action taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    pub event_id: String,
    pub session_key: String,
    pub trace_id: String,
    pub is_error_loop: bool,
    pub reason: String,
    pub confidence: f64,
    pub action: String,
    pub recorded_at: u64,
}

/// Audit record for one delivery attempt. Retries share `deliveryId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub delivery_id: String,
    pub event_id: String,
    pub session_key: String,
    pub target_agent_id: String,
    pub status: DeliveryStatus,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub recorded_at: u64,
}

/// Aggregate counters for the admin metrics route.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditTotals {
    pub events: u64,
    pub decisions: u64,
    pub loops_flagged: u64,
    pub loops_stopped: u64,
    pub deliveries: u64,
    pub delivery_success: u64,
    pub delivery_retry: u64,
    pub delivery_failed: u64,
}

/// Per-session rollup row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRollup {
    pub session_key: String,
    pub events: u64,
    pub last_created_at: u64,
}

#[derive(Default)]
struct Dedup {
    events: HashSet<String>,
    decisions: HashSet<String>,
    deliveries: HashSet<(String, u32)>,
}

/// Append-only audit sink. The dedup mutex doubles as the writer lock so
/// concurrent handlers never interleave partial lines.
pub struct AuditSink {
    events_path: PathBuf,
    decisions_path: PathBuf,
    deliveries_path: PathBuf,
    dedup: Mutex<Dedup>,
}

impl AuditSink {
    /// Open (or create) the sink under `dir`.
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            events_path: dir.join("events.jsonl"),
            decisions_path: dir.join("decisions.jsonl"),
            deliveries_path: dir.join("deliveries.jsonl"),
            dedup: Mutex::new(Dedup::default()),
        })
    }

    /// Record an accepted event. Idempotent per `eventId`.
    pub fn record_event(&self, evt: &Envelope) {
        let record = EventRecord {
            event_id: evt.event_id.clone(),
            session_key: evt.session_key.clone(),
            trace_id: evt.trace_id.clone(),
            origin_actor_type: evt.origin_actor_type,
            origin_actor_id: evt.origin_actor_id.clone(),
            created_at: evt.created_at,
            recorded_at: epoch_ms(),
        };
        let Ok(mut dedup) = self.dedup.lock() else {
            return;
        };
        if !dedup.events.insert(record.event_id.clone()) {
            return;
        }
        append_line(&self.events_path, &record);
    }

    /// Record a loop decision and the policy action taken. Idempotent per
    /// `eventId`.
    pub fn record_decision(&self, evt: &Envelope, decision: &Decision, action: &str) {
        let record = DecisionRecord {
            event_id: evt.event_id.clone(),
            session_key: evt.session_key.clone(),
            trace_id: evt.trace_id.clone(),
            is_error_loop: decision.is_error_loop,
            reason: decision.reason.clone(),
            confidence: decision.confidence,
            action: action.to_owned(),
            recorded_at: epoch_ms(),
        };
        let Ok(mut dedup) = self.dedup.lock() else {
            return;
        };
        if !dedup.decisions.insert(record.event_id.clone()) {
            return;
        }
        append_line(&self.decisions_path, &record);
    }

    /// Record one delivery attempt. Idempotent per (`deliveryId`,
    /// `attempt`) — each attempt yields exactly one terminal line.
    pub fn record_delivery(&self, record: &DeliveryRecord) {
        let Ok(mut dedup) = self.dedup.lock() else {
            return;
        };
        if !dedup.deliveries.insert((record.delivery_id.clone(), record.attempt)) {
            return;
        }
        append_line(&self.deliveries_path, record);
    }

    /// Aggregate counters across all three streams.
    pub fn totals(&self) -> AuditTotals {
        let mut totals = AuditTotals::default();
        totals.events = read_stream::<EventRecord>(&self.events_path).len() as u64;
        for record in read_stream::<DecisionRecord>(&self.decisions_path) {
            totals.decisions += 1;
            if record.is_error_loop {
                totals.loops_flagged += 1;
            }
            if record.action == "stop" {
                totals.loops_stopped += 1;
            }
        }
        for record in read_stream::<DeliveryRecord>(&self.deliveries_path) {
            totals.deliveries += 1;
            match record.status {
                DeliveryStatus::Success => totals.delivery_success += 1,
                DeliveryStatus::Retry => totals.delivery_retry += 1,
                DeliveryStatus::Failed => totals.delivery_failed += 1,
            }
        }
        totals
    }

    /// Most recent loop decisions, newest last.
    pub fn recent_decisions(&self, limit: usize) -> Vec<DecisionRecord> {
        tail(read_stream(&self.decisions_path), limit)
    }

    /// Most recent delivery attempts, newest last.
    pub fn recent_deliveries(&self, limit: usize) -> Vec<DeliveryRecord> {
        tail(read_stream(&self.deliveries_path), limit)
    }

    /// Event counts per session, sorted by most recent activity.
    pub fn session_rollup(&self) -> Vec<SessionRollup> {
        let mut by_session: HashMap<String, SessionRollup> = HashMap::new();
        for record in read_stream::<EventRecord>(&self.events_path) {
            let entry = by_session.entry(record.session_key.clone()).or_insert(SessionRollup {
                session_key: record.session_key,
                events: 0,
                last_created_at: 0,
            });
            entry.events += 1;
            entry.last_created_at = entry.last_created_at.max(record.created_at);
        }
        let mut rollup: Vec<SessionRollup> = by_session.into_values().collect();
        rollup.sort_by(|a, b| b.last_created_at.cmp(&a.last_created_at));
        rollup
    }
}

fn append_line<T: Serialize>(path: &Path, record: &T) {
    let Ok(mut line) = serde_json::to_string(record) else {
        return;
    };
    line.push('\n');
    let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(path) else {
        return;
    };
    let _ = file.write_all(line.as_bytes());
}

fn read_stream<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return vec![];
    };
    contents.lines().filter_map(|line| serde_json::from_str(line).ok()).collect()
}

fn tail<T>(mut records: Vec<T>, limit: usize) -> Vec<T> {
    if records.len() > limit {
        records.drain(..records.len() - limit);
    }
    records
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;
