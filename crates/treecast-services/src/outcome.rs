//! Rendered results of correlated exchanges.
//!
//! A correlator turns every matched response into exactly one `Outcome` and
//! hands it to an `OutcomeSink`. The daemon uses `OutcomeLog`, which keeps
//! outcomes in memory for the HTTP API and logs each one.

use std::sync::{Arc, Mutex};

use chrono::Local;
use serde::Serialize;
use treecast_core::wire::{Family, TIMESTAMP_FORMAT};

/// One user-visible result.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub family: Family,
    /// `identity:serial` of the request this outcome closes.
    pub request: String,
    /// Identity of the peer that answered.
    pub responder: String,
    pub success: bool,
    pub summary: String,
    /// Local time the outcome was rendered.
    pub at: String,
}

impl Outcome {
    pub fn new(
        family: Family,
        request: impl Into<String>,
        responder: impl Into<String>,
        success: bool,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            family,
            request: request.into(),
            responder: responder.into(),
            success,
            summary: summary.into(),
            at: Local::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// Destination for rendered outcomes.
pub trait OutcomeSink: Send + Sync {
    fn present(&self, outcome: Outcome);
}

/// In-memory outcome history.
#[derive(Clone, Default)]
pub struct OutcomeLog {
    entries: Arc<Mutex<Vec<Outcome>>>,
}

impl OutcomeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All outcomes, oldest first.
    pub fn all(&self) -> Vec<Outcome> {
        self.lock().clone()
    }

    /// Outcomes after the first `skip`, for incremental polling.
    pub fn since(&self, skip: usize) -> Vec<Outcome> {
        self.lock().iter().skip(skip).cloned().collect()
    }

    /// Outcomes closing the request with this key.
    pub fn for_request(&self, request: &str) -> Vec<Outcome> {
        self.lock()
            .iter()
            .filter(|o| o.request == request)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Outcome>> {
        // Entries are append-only, so a poisoned lock still holds a valid Vec.
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl OutcomeSink for OutcomeLog {
    fn present(&self, outcome: Outcome) {
        tracing::info!(
            family = %outcome.family,
            request = %outcome.request,
            responder = %outcome.responder,
            success = outcome.success,
            "{}",
            outcome.summary
        );
        self.lock().push(outcome);
    }
}
