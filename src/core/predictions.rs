//! Completion-ordered prediction log.

use crate::core::windowing::Window;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Why an inference call produced no prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Attempt exceeded the configured timeout
    Timeout,
    /// Connection or IO failure
    Transport,
    /// Service answered with a non-success status
    Server,
    /// Response body had no usable prediction
    MalformedResponse,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Transport => "transport",
            FailureKind::Server => "server",
            FailureKind::MalformedResponse => "malformed_response",
        };
        f.write_str(s)
    }
}

/// Error tag attached to a failed prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Attempts made before giving up
    pub attempts: u32,
}

/// Result of one inference call over one window.
///
/// Exactly one of `prediction` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub window_id: u64,
    pub first_seq: u64,
    pub last_seq: u64,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub dispatched_at: DateTime<Utc>,
    /// Completion time, restamped when the result is logged so the log
    /// stays ordered by this field
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prediction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<DispatchFailure>,
}

impl Prediction {
    /// A successful prediction for `window`, completed now.
    pub fn success(window: &Window, dispatched_at: DateTime<Utc>, score: f64) -> Self {
        Self::completed(window, dispatched_at, Some(score), None)
    }

    /// A failed prediction for `window`, completed now.
    pub fn failure(window: &Window, dispatched_at: DateTime<Utc>, error: DispatchFailure) -> Self {
        Self::completed(window, dispatched_at, None, Some(error))
    }

    fn completed(
        window: &Window,
        dispatched_at: DateTime<Utc>,
        prediction: Option<f64>,
        error: Option<DispatchFailure>,
    ) -> Self {
        Self {
            window_id: window.id,
            first_seq: window.first_seq(),
            last_seq: window.last_seq(),
            window_start: window.start(),
            window_end: window.end(),
            dispatched_at,
            timestamp: Utc::now(),
            prediction,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.prediction.is_some()
    }

    /// Round-trip latency of the call in milliseconds.
    pub fn latency_ms(&self) -> i64 {
        (self.timestamp - self.dispatched_at).num_milliseconds()
    }
}

/// Append-only log ordered by completion.
#[derive(Debug, Default)]
pub struct PredictionLog {
    entries: RwLock<Vec<Prediction>>,
}

impl PredictionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed prediction or failure.
    pub fn record(&self, prediction: Prediction) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prediction);
    }

    /// Most recently completed successful prediction.
    pub fn latest(&self) -> Option<Prediction> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|p| p.is_success())
            .cloned()
    }

    /// Copy of every entry in completion order.
    pub fn all(&self) -> Vec<Prediction> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of error-tagged entries.
    pub fn failures(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|p| !p.is_success())
            .count()
    }
}

/// Thread-safe shared prediction log.
pub type SharedPredictionLog = Arc<PredictionLog>;
