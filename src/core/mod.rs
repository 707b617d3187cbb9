//! Core functionality for the EMG Predict Agent.
//!
//! This module contains:
//! - The display history and the sliding-window extractor
//! - Non-blocking prediction dispatch and the completion-ordered log
//! - Word correlation, highlighting and session export
//! - The pipeline tying them together

pub mod dispatch;
pub mod export;
pub mod highlight;
pub mod history;
pub mod pipeline;
pub mod predictions;
pub mod windowing;

// Re-export commonly used types
pub use dispatch::{DispatchHandle, DispatchSettings, DrainReport, PredictionDispatcher};
pub use export::{ExportDocument, ExportError, EXPORT_VERSION, PRODUCER_NAME};
pub use highlight::{current_highlight, SharedWordLog, WordLog};
pub use history::{SampleBuffer, SharedSampleBuffer};
pub use pipeline::{Pipeline, PipelineSettings, PipelineView};
pub use predictions::{
    DispatchFailure, FailureKind, Prediction, PredictionLog, SharedPredictionLog,
};
pub use windowing::{Window, WindowExtractor};
