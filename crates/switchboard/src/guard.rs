// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loop guard: classifies a candidate event as part of an error loop
//! (uncontrolled repetition) or not, from its trace history.
//!
//! Two deterministic signals, first match wins: a per-trace rate cap over
//! the 60 s window, then lexical near-repetition against the last few
//! events on the trace. The guard only classifies; the ingest pipeline
//! maps the decision onto stop/warn/normal.

use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;
use crate::store::{SessionStore, TRACE_WINDOW_MS};

/// Classifier verdict, visible on the wire in publish responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub is_error_loop: bool,
    pub reason: String,
    pub confidence: f64,
}

/// What the ingest pipeline does with a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    Stop,
    Warn,
    Normal,
}

impl PolicyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Warn => "warn",
            Self::Normal => "normal",
        }
    }
}

/// Map a decision onto its policy action.
pub fn action_for(decision: &Decision) -> PolicyAction {
    if !decision.is_error_loop {
        return PolicyAction::Normal;
    }
    if decision.confidence >= 0.95 {
        PolicyAction::Stop
    } else if decision.confidence > 0.7 {
        PolicyAction::Warn
    } else {
        PolicyAction::Normal
    }
}

/// Append the loop warning to an outbound text. Format is part of the
/// wire contract: two newlines, the bracketed tag, confidence to two
/// decimals, then the sentence.
pub fn apply_warning(text: &str, confidence: f64) -> String {
    format!(
        "{text}\n\n[LOOP_GUARD_NOTE] Possible error loop detected (confidence={confidence:.2}). \
         Please evaluate and stop if erroneous."
    )
}

/// Loop classifier over a trace's recent history.
pub struct LoopGuard {
    max_per_minute: usize,
    default_delay_ms: u64,
    burst_delay_ms: u64,
}

impl LoopGuard {
    pub fn new(max_per_minute: usize, default_delay_ms: u64, burst_delay_ms: u64) -> Self {
        Self { max_per_minute, default_delay_ms, burst_delay_ms }
    }

    /// Classify a candidate event. Returns the delay to apply before the
    /// append/fan-out runs, and the decision.
    pub async fn classify(&self, store: &SessionStore, candidate: &Envelope) -> (u64, Decision) {
        let recent = store.recent_by_trace(&candidate.trace_id, TRACE_WINDOW_MS).await;

        if recent.len() >= self.max_per_minute {
            return (
                self.burst_delay_ms,
                Decision {
                    is_error_loop: true,
                    reason: format!(
                        "max {} loop events per minute exceeded; delaying",
                        self.max_per_minute
                    ),
                    confidence: 0.95,
                },
            );
        }

        let tail = &recent[recent.len().saturating_sub(4)..];
        if tail.len() >= 3 {
            let near_identical = tail
                .iter()
                .filter(|e| jaccard(&e.text, &candidate.text) >= 0.95)
                .count();
            if near_identical >= 2 {
                return (
                    self.default_delay_ms,
                    Decision {
                        is_error_loop: true,
                        reason: "near-identical repeated outputs detected; delayed for safety"
                            .to_owned(),
                        confidence: 0.8,
                    },
                );
            }
        }

        (0, Decision { is_error_loop: false, reason: "accepted".to_owned(), confidence: 0.6 })
    }
}

/// Jaccard similarity over whitespace-split token sets, lowercased.
/// Defined as 0 when the union is empty.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let tokens = |s: &str| -> std::collections::HashSet<String> {
        s.to_lowercase().split_whitespace().map(str::to_owned).collect()
    };
    let a = tokens(a);
    let b = tokens(b);
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(&b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
