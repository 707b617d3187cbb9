//! Session statistics for the EMG Predict Agent.
//!
//! Counts ingested samples, dropped input and prediction outcomes so a
//! running session can be inspected and compared across restarts.

pub mod counters;

// Re-export commonly used types
pub use counters::{
    create_shared_stats, create_shared_stats_with_persistence, PersistedStats, PipelineStats,
    SharedStats, StatsSnapshot,
};
