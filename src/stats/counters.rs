//! Pipeline counters.
//!
//! Tracks what the agent has ingested and dispatched. Counters are atomic so
//! the ingestion loop, the reconciler and readers can share one instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current session.
#[derive(Debug)]
pub struct PipelineStats {
    /// Samples accepted into the pipeline
    samples_ingested: AtomicU64,
    /// Feed lines dropped because they did not parse
    malformed_dropped: AtomicU64,
    /// Word events recorded
    word_events: AtomicU64,
    /// Windows handed to the dispatcher
    windows_dispatched: AtomicU64,
    /// Predictions recorded with a value
    predictions_succeeded: AtomicU64,
    /// Predictions recorded with an error tag
    predictions_failed: AtomicU64,
    /// Export documents written
    exports_written: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            samples_ingested: AtomicU64::new(0),
            malformed_dropped: AtomicU64::new(0),
            word_events: AtomicU64::new(0),
            windows_dispatched: AtomicU64::new(0),
            predictions_succeeded: AtomicU64::new(0),
            predictions_failed: AtomicU64::new(0),
            exports_written: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create stats that accumulate on top of a previous session's file.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!("Could not load previous pipeline stats: {}", e);
        }

        stats
    }

    pub fn record_sample(&self) {
        self.samples_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_word_event(&self) {
        self.word_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_window_dispatched(&self) {
        self.windows_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prediction(&self, success: bool) {
        if success {
            self.predictions_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.predictions_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_export(&self) {
        self.exports_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_ingested: self.samples_ingested.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            word_events: self.word_events.load(Ordering::Relaxed),
            windows_dispatched: self.windows_dispatched.load(Ordering::Relaxed),
            predictions_succeeded: self.predictions_succeeded.load(Ordering::Relaxed),
            predictions_failed: self.predictions_failed.load(Ordering::Relaxed),
            exports_written: self.exports_written.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Session Statistics:\n\
             - Samples ingested: {}\n\
             - Malformed samples dropped: {}\n\
             - Word events: {}\n\
             - Windows dispatched: {}\n\
             - Predictions succeeded: {}\n\
             - Predictions failed: {}\n\
             - Exports written: {}\n\
             - Session duration: {} seconds",
            stats.samples_ingested,
            stats.malformed_dropped,
            stats.word_events,
            stats.windows_dispatched,
            stats.predictions_succeeded,
            stats.predictions_failed,
            stats.exports_written,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.snapshot();
            let persisted = PersistedStats {
                samples_ingested: stats.samples_ingested,
                malformed_dropped: stats.malformed_dropped,
                word_events: stats.word_events,
                windows_dispatched: stats.windows_dispatched,
                predictions_succeeded: stats.predictions_succeeded,
                predictions_failed: stats.predictions_failed,
                exports_written: stats.exports_written,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let persisted = PersistedStats::read(path)?;

                self.samples_ingested
                    .store(persisted.samples_ingested, Ordering::Relaxed);
                self.malformed_dropped
                    .store(persisted.malformed_dropped, Ordering::Relaxed);
                self.word_events
                    .store(persisted.word_events, Ordering::Relaxed);
                self.windows_dispatched
                    .store(persisted.windows_dispatched, Ordering::Relaxed);
                self.predictions_succeeded
                    .store(persisted.predictions_succeeded, Ordering::Relaxed);
                self.predictions_failed
                    .store(persisted.predictions_failed, Ordering::Relaxed);
                self.exports_written
                    .store(persisted.exports_written, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.samples_ingested.store(0, Ordering::Relaxed);
        self.malformed_dropped.store(0, Ordering::Relaxed);
        self.word_events.store(0, Ordering::Relaxed);
        self.windows_dispatched.store(0, Ordering::Relaxed);
        self.predictions_succeeded.store(0, Ordering::Relaxed);
        self.predictions_failed.store(0, Ordering::Relaxed);
        self.exports_written.store(0, Ordering::Relaxed);
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub samples_ingested: u64,
    pub malformed_dropped: u64,
    pub word_events: u64,
    pub windows_dispatched: u64,
    pub predictions_succeeded: u64,
    pub predictions_failed: u64,
    pub exports_written: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedStats {
    pub samples_ingested: u64,
    pub malformed_dropped: u64,
    pub word_events: u64,
    pub windows_dispatched: u64,
    pub predictions_succeeded: u64,
    pub predictions_failed: u64,
    pub exports_written: u64,
    pub last_updated: DateTime<Utc>,
}

impl PersistedStats {
    /// Read a stats file written by [`PipelineStats::save`].
    pub fn read(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(std::io::Error::other)
    }
}

/// Thread-safe shared stats.
pub type SharedStats = Arc<PipelineStats>;

/// Create new shared stats.
pub fn create_shared_stats() -> SharedStats {
    Arc::new(PipelineStats::new())
}

/// Create new shared stats with persistence.
pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedStats {
    Arc::new(PipelineStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = PipelineStats::new();

        stats.record_sample();
        stats.record_sample();
        stats.record_malformed();
        stats.record_prediction(true);
        stats.record_prediction(false);
        stats.record_prediction(false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.samples_ingested, 2);
        assert_eq!(snapshot.malformed_dropped, 1);
        assert_eq!(snapshot.predictions_succeeded, 1);
        assert_eq!(snapshot.predictions_failed, 2);
    }

    #[test]
    fn test_reset() {
        let stats = PipelineStats::new();
        stats.record_window_dispatched();
        stats.record_word_event();
        stats.reset();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.windows_dispatched, 0);
        assert_eq!(snapshot.word_events, 0);
    }

    #[test]
    fn test_persistence_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats").join("pipeline_stats.json");

        let first = PipelineStats::with_persistence(path.clone());
        first.record_sample();
        first.record_export();
        first.save().unwrap();

        let second = PipelineStats::with_persistence(path.clone());
        second.record_sample();
        let snapshot = second.snapshot();
        assert_eq!(snapshot.samples_ingested, 2);
        assert_eq!(snapshot.exports_written, 1);

        let on_disk = PersistedStats::read(&path).unwrap();
        assert_eq!(on_disk.samples_ingested, 1);
    }

    #[test]
    fn test_summary_format() {
        let summary = PipelineStats::new().summary();
        assert!(summary.contains("Samples ingested"));
        assert!(summary.contains("Predictions failed"));
    }
}
