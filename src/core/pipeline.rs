//! Sample-to-prediction pipeline.
//!
//! Per arrival: stamp the sample, push it to the display history, push it to
//! the working buffer, and if a window is ready dispatch it and slide. The
//! call returns without waiting for the prediction. Completed predictions
//! arrive over a channel at a single reconciler task, which is the only
//! writer of the prediction log.

use crate::config::{Config, ConfigError};
use crate::core::dispatch::{DispatchHandle, DispatchSettings, DrainReport, PredictionDispatcher};
use crate::core::export::{
    ExportDocument, ExportParameters, ExportProducer, EXPORT_VERSION, PRODUCER_NAME,
};
use crate::core::highlight::{current_highlight, SharedWordLog, WordLog};
use crate::core::history::{SampleBuffer, SharedSampleBuffer};
use crate::core::predictions::{Prediction, PredictionLog, SharedPredictionLog};
use crate::core::windowing::WindowExtractor;
use crate::feed::{parse_line, parse_value, FeedEvent, Sample, WordEvent};
use crate::inference::Predictor;
use crate::stats::SharedStats;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Parameters the pipeline runs with.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub window_size: usize,
    pub stride: usize,
    pub history_capacity: Option<usize>,
    pub dispatch: DispatchSettings,
    pub highlight_threshold: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            window_size: 25,
            stride: 12,
            history_capacity: Some(100),
            dispatch: DispatchSettings::default(),
            highlight_threshold: 0.5,
        }
    }
}

impl PipelineSettings {
    /// Validated settings from the agent configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            window_size: config.window_size,
            stride: config.stride,
            history_capacity: config.history_capacity,
            dispatch: DispatchSettings {
                timeout: config.inference_timeout,
                max_retries: config.max_retries,
            },
            highlight_threshold: config.highlight_threshold,
        })
    }
}

/// Owns the buffers, the dispatcher and the reconciler.
pub struct Pipeline {
    settings: PipelineSettings,
    instance_id: Uuid,
    next_seq: u64,
    history: SharedSampleBuffer,
    extractor: WindowExtractor,
    dispatcher: PredictionDispatcher,
    predictions: SharedPredictionLog,
    words: SharedWordLog,
    stats: SharedStats,
    reconciler: JoinHandle<()>,
}

impl Pipeline {
    /// Build a pipeline whose dispatches and reconciler run on `runtime`.
    ///
    /// Fails on invalid window parameters.
    pub fn new(
        settings: PipelineSettings,
        predictor: Arc<dyn Predictor>,
        stats: SharedStats,
        runtime: Handle,
    ) -> Result<Self, ConfigError> {
        if settings.history_capacity == Some(0) {
            return Err(ConfigError::Invalid(
                "history capacity must be positive".to_string(),
            ));
        }
        let extractor = WindowExtractor::new(settings.window_size, settings.stride)?;

        let history = Arc::new(SampleBuffer::new(settings.history_capacity));
        let predictions = Arc::new(PredictionLog::new());
        let words = Arc::new(WordLog::new());

        let (tx, rx) = mpsc::unbounded_channel();
        let reconciler = runtime.spawn(reconcile(rx, predictions.clone(), stats.clone()));
        let dispatcher = PredictionDispatcher::new(predictor, settings.dispatch, runtime, tx);

        let instance_id = Uuid::new_v4();
        tracing::info!(
            %instance_id,
            window_size = settings.window_size,
            stride = settings.stride,
            "Pipeline started"
        );

        Ok(Self {
            settings,
            instance_id,
            next_seq: 1,
            history,
            extractor,
            dispatcher,
            predictions,
            words,
            stats,
            reconciler,
        })
    }

    /// Handle one feed line: a sample, a word event, or junk to drop.
    pub fn ingest_line(&mut self, line: &str) -> Option<DispatchHandle> {
        match parse_line(line) {
            Ok(FeedEvent::Sample(value)) => self.ingest_value(value),
            Ok(FeedEvent::Word(event)) => {
                self.record_word(event);
                None
            }
            Err(e) => {
                self.stats.record_malformed();
                tracing::debug!("Dropping feed line: {}", e);
                None
            }
        }
    }

    /// Parse a raw numeric reading and ingest it; malformed input is dropped.
    pub fn ingest_raw(&mut self, raw: &str) -> Option<DispatchHandle> {
        match parse_value(raw) {
            Ok(value) => self.ingest_value(value),
            Err(e) => {
                self.stats.record_malformed();
                tracing::debug!("Dropping sample: {}", e);
                None
            }
        }
    }

    /// Ingest a reading stamped with the current time.
    pub fn ingest_value(&mut self, value: f64) -> Option<DispatchHandle> {
        self.ingest_at(value, Utc::now())
    }

    /// Ingest a reading that arrived at `timestamp`.
    ///
    /// Returns the dispatch started by this arrival, if any. At most one
    /// window is extracted per arrival.
    pub fn ingest_at(&mut self, value: f64, timestamp: DateTime<Utc>) -> Option<DispatchHandle> {
        if !value.is_finite() {
            self.stats.record_malformed();
            tracing::debug!("Dropping non-finite sample {}", value);
            return None;
        }

        let sample = Sample::new(self.next_seq, value, timestamp);
        self.next_seq += 1;
        self.stats.record_sample();

        self.history.push(sample);
        self.extractor.push(sample);

        let window = self.extractor.try_extract()?;
        let handle = self.dispatcher.dispatch(window);
        self.extractor.slide();

        if handle.is_some() {
            self.stats.record_window_dispatched();
        }
        handle
    }

    /// Store a word event as received.
    pub fn record_word(&self, event: WordEvent) {
        tracing::debug!(word = %event.word, "Word event");
        self.words.record(event);
        self.stats.record_word_event();
    }

    /// Cloneable read handle for display, export and highlighting.
    pub fn view(&self) -> PipelineView {
        PipelineView {
            instance_id: self.instance_id,
            parameters: ExportParameters {
                window_size: self.settings.window_size,
                stride: self.settings.stride,
                history_capacity: self.settings.history_capacity,
            },
            highlight_threshold: self.settings.highlight_threshold,
            history: self.history.clone(),
            predictions: self.predictions.clone(),
            words: self.words.clone(),
            stats: self.stats.clone(),
        }
    }

    /// Dispatches still waiting on the inference service.
    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }

    /// Samples still needed before the next window.
    pub fn samples_until_window(&self) -> usize {
        self.extractor.samples_until_ready()
    }

    pub fn settings(&self) -> PipelineSettings {
        self.settings
    }

    /// Drain in-flight predictions for up to `grace`, cancel the rest, and
    /// wait for the reconciler to record everything that completed.
    pub async fn shutdown(self, grace: Duration) -> DrainReport {
        let Pipeline {
            mut dispatcher,
            reconciler,
            predictions,
            ..
        } = self;

        let report = dispatcher.shutdown(grace).await;
        drop(dispatcher);

        if let Err(e) = reconciler.await {
            tracing::error!("Prediction reconciler failed: {}", e);
        }

        tracing::info!(
            completed = report.completed,
            cancelled = report.cancelled,
            recorded = predictions.len(),
            "Pipeline stopped"
        );
        report
    }
}

/// Single writer of the prediction log; records in completion order.
async fn reconcile(
    mut completions: mpsc::UnboundedReceiver<Prediction>,
    log: SharedPredictionLog,
    stats: SharedStats,
) {
    while let Some(mut prediction) = completions.recv().await {
        // Tasks finish on any worker; arrival here is the completion order.
        prediction.timestamp = Utc::now();
        stats.record_prediction(prediction.is_success());
        if let Some(score) = prediction.prediction {
            tracing::info!(
                window_id = prediction.window_id,
                first_seq = prediction.first_seq,
                last_seq = prediction.last_seq,
                latency_ms = prediction.latency_ms(),
                "Prediction {}",
                score
            );
        }
        log.record(prediction);
    }
}

/// Read-only view over a running pipeline.
#[derive(Clone)]
pub struct PipelineView {
    instance_id: Uuid,
    parameters: ExportParameters,
    highlight_threshold: f64,
    history: SharedSampleBuffer,
    predictions: SharedPredictionLog,
    words: SharedWordLog,
    stats: SharedStats,
}

impl PipelineView {
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Display history in arrival order.
    pub fn samples(&self) -> Vec<Sample> {
        self.history.snapshot()
    }

    pub fn max_value(&self) -> f64 {
        self.history.max_value()
    }

    /// Predictions in completion order.
    pub fn predictions(&self) -> Vec<Prediction> {
        self.predictions.all()
    }

    /// Most recent successful prediction by completion order.
    pub fn latest_prediction(&self) -> Option<Prediction> {
        self.predictions.latest()
    }

    pub fn word_events(&self) -> Vec<WordEvent> {
        self.words.all()
    }

    /// The word to highlight, if the latest prediction is positive.
    pub fn current_highlight(&self) -> Option<String> {
        let latest = self.predictions.latest();
        current_highlight(latest.as_ref(), &self.words.all(), self.highlight_threshold)
    }

    pub fn stats(&self) -> SharedStats {
        self.stats.clone()
    }

    /// Snapshot everything into an export document.
    pub fn export(&self) -> ExportDocument {
        let predictions = self.predictions.all();
        let word_events = self.words.all();
        let latest = predictions.iter().rev().find(|p| p.is_success());
        let current_highlight =
            current_highlight(latest, &word_events, self.highlight_threshold);

        ExportDocument {
            export_version: EXPORT_VERSION.to_string(),
            producer: ExportProducer {
                name: PRODUCER_NAME.to_string(),
                version: crate::VERSION.to_string(),
                instance_id: self.instance_id,
            },
            exported_at: Utc::now(),
            parameters: self.parameters,
            sample_history: self.history.snapshot(),
            word_events,
            predictions,
            current_highlight,
            max_value: self.history.max_value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::InferenceError;
    use crate::stats::create_shared_stats;
    use async_trait::async_trait;

    /// Returns 1.0 when the window's first value is odd.
    struct Parity;

    #[async_trait]
    impl Predictor for Parity {
        async fn predict(&self, values: Vec<f64>) -> Result<f64, InferenceError> {
            Ok((values[0] as u64 % 2) as f64)
        }
    }

    fn settings(window_size: usize, stride: usize) -> PipelineSettings {
        PipelineSettings {
            window_size,
            stride,
            history_capacity: Some(10),
            ..PipelineSettings::default()
        }
    }

    #[tokio::test]
    async fn test_rejects_bad_window() {
        let result = Pipeline::new(
            settings(4, 5),
            Arc::new(Parity),
            create_shared_stats(),
            Handle::current(),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_dispatch_per_ready_window() {
        let stats = create_shared_stats();
        let mut pipeline =
            Pipeline::new(settings(4, 2), Arc::new(Parity), stats.clone(), Handle::current())
                .unwrap();

        let mut handles = Vec::new();
        for v in 1..=8 {
            if let Some(h) = pipeline.ingest_value(v as f64) {
                handles.push(h);
            }
        }
        // 1 + (8 - 4) / 2
        assert_eq!(handles.len(), 3);
        assert_eq!(
            handles.iter().map(|h| h.window_id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let view = pipeline.view();
        pipeline.shutdown(Duration::from_secs(1)).await;

        let predictions = view.predictions();
        assert_eq!(predictions.len(), 3);
        let mut ranges: Vec<(u64, u64)> =
            predictions.iter().map(|p| (p.first_seq, p.last_seq)).collect();
        ranges.sort();
        assert_eq!(ranges, vec![(1, 4), (3, 6), (5, 8)]);
        assert_eq!(stats.snapshot().windows_dispatched, 3);
        assert_eq!(stats.snapshot().predictions_succeeded, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_log_timestamps_follow_completion_order() {
        let mut pipeline = Pipeline::new(
            settings(1, 1),
            Arc::new(Parity),
            create_shared_stats(),
            Handle::current(),
        )
        .unwrap();
        let view = pipeline.view();

        for v in 1..=200 {
            pipeline.ingest_value(v as f64);
        }
        pipeline.shutdown(Duration::from_secs(5)).await;

        let predictions = view.predictions();
        assert_eq!(predictions.len(), 200);
        assert!(predictions
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp));
    }

    #[tokio::test]
    async fn test_malformed_input_dropped() {
        let stats = create_shared_stats();
        let mut pipeline =
            Pipeline::new(settings(2, 1), Arc::new(Parity), stats.clone(), Handle::current())
                .unwrap();

        assert!(pipeline.ingest_raw("abc").is_none());
        assert!(pipeline.ingest_line("").is_none());
        assert!(pipeline.ingest_value(f64::NAN).is_none());
        assert!(pipeline.ingest_raw("1").is_none());
        assert!(pipeline.ingest_line("{\"value\": \"2\"}").is_some());
        assert!(pipeline.ingest_line("{\"word\": \"oi\"}").is_none());

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.malformed_dropped, 3);
        assert_eq!(snapshot.samples_ingested, 2);
        assert_eq!(snapshot.word_events, 1);

        let view = pipeline.view();
        let seqs: Vec<u64> = view.samples().iter().map(|s| s.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
        pipeline.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_highlight_and_export() {
        let mut pipeline = Pipeline::new(
            settings(2, 2),
            Arc::new(Parity),
            create_shared_stats(),
            Handle::current(),
        )
        .unwrap();
        let view = pipeline.view();

        pipeline.record_word(WordEvent::new("água"));
        pipeline.ingest_value(3.0);
        pipeline.ingest_value(4.0);
        pipeline.shutdown(Duration::from_secs(1)).await;

        assert_eq!(view.latest_prediction().and_then(|p| p.prediction), Some(1.0));
        assert_eq!(view.current_highlight(), Some("água".to_string()));

        let doc = view.export();
        assert_eq!(doc.sample_history.len(), 2);
        assert_eq!(doc.word_events.len(), 1);
        assert_eq!(doc.predictions.len(), 1);
        assert_eq!(doc.current_highlight, Some("água".to_string()));
        assert_eq!(doc.max_value, 4.0);
        assert_eq!(doc.producer.instance_id, view.instance_id());
    }
}
