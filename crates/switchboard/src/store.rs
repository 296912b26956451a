// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory session store: per-session append logs plus the global
//! `eventId` dedupe set that makes appends at-most-once.
//!
//! A per-trace index serves the loop guard's sliding window; it is pruned
//! to [`TRACE_WINDOW_MS`] on append so only the session logs themselves
//! grow with process lifetime.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use crate::envelope::Envelope;
use crate::state::epoch_ms;

/// Horizon the loop guard looks back over. Trace-index entries older than
/// this are dropped on the next append to that trace.
pub const TRACE_WINDOW_MS: u64 = 60_000;

#[derive(Default)]
struct StoreInner {
    sessions: HashMap<String, Vec<Envelope>>,
    seen_event_ids: HashSet<String>,
    by_trace: HashMap<String, Vec<Envelope>>,
    event_count: u64,
}

/// Session-keyed event log with global `eventId` dedupe.
#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<StoreInner>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to its session log.
    ///
    /// Returns `false` iff the `eventId` was already seen; the dedupe set
    /// is the sole source of truth, so concurrent duplicates race for a
    /// single `true`.
    pub async fn append(&self, evt: &Envelope) -> bool {
        let mut inner = self.inner.write().await;
        if !inner.seen_event_ids.insert(evt.event_id.clone()) {
            return false;
        }
        inner.sessions.entry(evt.session_key.clone()).or_default().push(evt.clone());
        inner.event_count += 1;

        let horizon = epoch_ms().saturating_sub(TRACE_WINDOW_MS);
        let trace = inner.by_trace.entry(evt.trace_id.clone()).or_default();
        trace.retain(|e| e.created_at >= horizon);
        trace.push(evt.clone());
        true
    }

    /// Snapshot of a session's events in append order.
    pub async fn list(&self, session_key: &str) -> Vec<Envelope> {
        let inner = self.inner.read().await;
        inner.sessions.get(session_key).cloned().unwrap_or_default()
    }

    /// Events on `trace_id` whose `createdAt` is within the last
    /// `within_ms`, across all sessions, sorted by `createdAt`.
    pub async fn recent_by_trace(&self, trace_id: &str, within_ms: u64) -> Vec<Envelope> {
        let cutoff = epoch_ms().saturating_sub(within_ms);
        let inner = self.inner.read().await;
        let mut events: Vec<Envelope> = inner
            .by_trace
            .get(trace_id)
            .map(|v| v.iter().filter(|e| e.created_at >= cutoff).cloned().collect())
            .unwrap_or_default();
        events.sort_by_key(|e| e.created_at);
        events
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn event_count(&self) -> u64 {
        self.inner.read().await.event_count
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
