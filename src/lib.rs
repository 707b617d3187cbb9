//! EMG Predict Agent - sliding-window EMG ingestion and prediction dispatch.
//!
//! This library buffers a stream of scalar EMG readings, cuts it into
//! overlapping fixed-length windows, and sends each window to an external
//! inference service without ever blocking ingestion. Results are logged in
//! completion order and correlated with word events to decide which word to
//! highlight.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        EMG Predict Agent                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────────┐   ┌──────────────┐              │
//! │  │   Feed   │──▶│ SampleBuffer │   │  Prediction  │   inference  │
//! │  │ (tcp/in) │   │  (display)   │   │  Dispatcher  │──▶ service   │
//! │  └──────────┘   └──────────────┘   └──────────────┘              │
//! │       │                                   ▲   │                  │
//! │       ▼                                   │   ▼ (channel)        │
//! │  ┌──────────────┐  window ready           │  ┌──────────────┐    │
//! │  │   Window     │─────────────────────────┘  │  Prediction  │    │
//! │  │  Extractor   │                            │     Log      │    │
//! │  └──────────────┘                            └──────────────┘    │
//! │                                                     │            │
//! │  word events ──▶ WordLog ──▶ highlight ◀────────────┘            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use emg_predict_agent::{
//!     core::{Pipeline, PipelineSettings},
//!     inference::{HttpPredictor, InferenceConfig},
//!     stats::create_shared_stats,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let predictor = HttpPredictor::new(InferenceConfig::default())?;
//! let mut pipeline = Pipeline::new(
//!     PipelineSettings::default(),
//!     Arc::new(predictor),
//!     create_shared_stats(),
//!     tokio::runtime::Handle::current(),
//! )?;
//!
//! pipeline.ingest_raw("512.0");
//! let view = pipeline.view();
//! pipeline.shutdown(Duration::from_secs(2)).await;
//! println!("{} predictions", view.predictions().len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod feed;
pub mod inference;
pub mod logging;
pub mod stats;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, FeedSource};
pub use crate::core::{
    ExportDocument, Pipeline, PipelineSettings, PipelineView, Prediction, PredictionLog,
    SampleBuffer, Window, WindowExtractor,
};
pub use feed::{FeedEvent, Sample, SampleFeed, WordEvent};
pub use inference::{HttpPredictor, InferenceConfig, InferenceError, Predictor};
pub use stats::{PipelineStats, SharedStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
