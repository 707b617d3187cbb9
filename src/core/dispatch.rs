//! Non-blocking prediction dispatch.
//!
//! Each ready window is moved into its own task on the tokio runtime. The
//! task calls the predictor with a per-attempt timeout, retries if configured,
//! and sends exactly one [`Prediction`] (success or error-tagged) on the
//! completion channel. Ingestion never waits on a dispatch.

use crate::core::predictions::{DispatchFailure, FailureKind, Prediction};
use crate::core::windowing::Window;
use crate::inference::Predictor;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Timeout and retry policy for inference calls.
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    /// Limit for a single attempt
    pub timeout: Duration,
    /// Extra attempts after the first failure
    pub max_retries: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 0,
        }
    }
}

/// Identity of a dispatched window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchHandle {
    pub window_id: u64,
    pub dispatched_at: DateTime<Utc>,
}

/// Outcome of draining in-flight calls at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Calls that finished within the grace period
    pub completed: usize,
    /// Calls aborted when the grace period ran out
    pub cancelled: usize,
}

/// Spawns inference calls and tracks them until they finish.
pub struct PredictionDispatcher {
    predictor: Arc<dyn Predictor>,
    settings: DispatchSettings,
    runtime: Handle,
    completions: Option<UnboundedSender<Prediction>>,
    in_flight: Vec<(u64, JoinHandle<()>)>,
}

impl PredictionDispatcher {
    /// Create a dispatcher sending completions to `completions`.
    pub fn new(
        predictor: Arc<dyn Predictor>,
        settings: DispatchSettings,
        runtime: Handle,
        completions: UnboundedSender<Prediction>,
    ) -> Self {
        Self {
            predictor,
            settings,
            runtime,
            completions: Some(completions),
            in_flight: Vec::new(),
        }
    }

    /// Start an inference call for `window` without waiting for it.
    ///
    /// Returns `None` once the dispatcher has been shut down.
    pub fn dispatch(&mut self, window: Window) -> Option<DispatchHandle> {
        let completions = self.completions.as_ref()?.clone();

        // Forget calls that already delivered their result.
        self.in_flight.retain(|(_, task)| !task.is_finished());

        let dispatched_at = Utc::now();
        let handle = DispatchHandle {
            window_id: window.id,
            dispatched_at,
        };

        tracing::debug!(
            window_id = window.id,
            first_seq = window.first_seq(),
            last_seq = window.last_seq(),
            in_flight = self.in_flight.len(),
            "Dispatching window"
        );

        let predictor = self.predictor.clone();
        let settings = self.settings;
        let task = self.runtime.spawn(async move {
            let prediction = run_prediction(predictor.as_ref(), &window, settings, dispatched_at).await;
            // The reconciler is gone only after shutdown; the result is dropped.
            let _ = completions.send(prediction);
        });

        self.in_flight.push((handle.window_id, task));
        Some(handle)
    }

    /// Calls still running.
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .iter()
            .filter(|(_, task)| !task.is_finished())
            .count()
    }

    pub fn settings(&self) -> DispatchSettings {
        self.settings
    }

    /// Stop accepting windows, wait up to `grace` for in-flight calls, then
    /// abort whatever is left.
    pub async fn shutdown(&mut self, grace: Duration) -> DrainReport {
        self.completions = None;

        // A grace too large to represent means waiting for every call.
        let deadline = tokio::time::Instant::now().checked_add(grace);
        let mut report = DrainReport::default();

        for (window_id, mut task) in std::mem::take(&mut self.in_flight) {
            let finished = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, &mut task).await.is_ok(),
                None => {
                    let _ = (&mut task).await;
                    true
                }
            };

            if finished {
                report.completed += 1;
            } else {
                task.abort();
                // Wait for the abort so the task's channel sender is dropped.
                let _ = task.await;
                tracing::warn!(window_id, "Cancelled in-flight prediction at shutdown");
                report.cancelled += 1;
            }
        }

        report
    }
}

/// Call the predictor for one window, retrying per `settings`.
async fn run_prediction(
    predictor: &dyn Predictor,
    window: &Window,
    settings: DispatchSettings,
    dispatched_at: DateTime<Utc>,
) -> Prediction {
    let values = window.values();
    let max_attempts = settings.max_retries.saturating_add(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let failure = match tokio::time::timeout(settings.timeout, predictor.predict(values.clone()))
            .await
        {
            Ok(Ok(score)) => return Prediction::success(window, dispatched_at, score),
            Ok(Err(e)) => DispatchFailure {
                kind: e.kind(),
                message: e.to_string(),
                attempts: attempt,
            },
            Err(_) => DispatchFailure {
                kind: FailureKind::Timeout,
                message: format!("no response within {}ms", settings.timeout.as_millis()),
                attempts: attempt,
            },
        };

        if attempt >= max_attempts {
            tracing::warn!(
                window_id = window.id,
                kind = %failure.kind,
                attempts = attempt,
                "Prediction failed: {}",
                failure.message
            );
            return Prediction::failure(window, dispatched_at, failure);
        }

        tracing::debug!(
            window_id = window.id,
            attempt,
            "Retrying prediction after {}: {}",
            failure.kind,
            failure.message
        );
    }
}
