//! Export document for a pipeline session.
//!
//! An export is a read-only dump of the sample history, word events,
//! predictions and current highlight, written as JSON for an external
//! file writer or served over HTTP.

use crate::core::predictions::Prediction;
use crate::feed::{Sample, WordEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// The current export format version.
pub const EXPORT_VERSION: &str = "1.0";

/// The name of this producer.
pub const PRODUCER_NAME: &str = "emg-predict-agent";

/// Producer metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportProducer {
    pub name: String,
    pub version: String,
    /// Pipeline instance that produced the export
    pub instance_id: Uuid,
}

/// Window parameters in effect for the session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportParameters {
    pub window_size: usize,
    pub stride: usize,
    pub history_capacity: Option<usize>,
}

/// Full session export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub export_version: String,
    pub producer: ExportProducer,
    pub exported_at: DateTime<Utc>,
    pub parameters: ExportParameters,
    /// Retained display history, arrival order
    pub sample_history: Vec<Sample>,
    /// Word events, arrival order
    pub word_events: Vec<WordEvent>,
    /// Predictions, completion order
    pub predictions: Vec<Prediction>,
    pub current_highlight: Option<String>,
    pub max_value: f64,
}

/// Errors writing or reading an export.
#[derive(Debug)]
pub enum ExportError {
    Io(String),
    Serialize(String),
    Parse(String),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Io(e) => write!(f, "Export IO error: {e}"),
            ExportError::Serialize(e) => write!(f, "Export serialize error: {e}"),
            ExportError::Parse(e) => write!(f, "Export parse error: {e}"),
        }
    }
}

impl std::error::Error for ExportError {}

impl ExportDocument {
    pub fn to_json_pretty(&self) -> Result<String, ExportError> {
        serde_json::to_string_pretty(self).map_err(|e| ExportError::Serialize(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, ExportError> {
        serde_json::from_str(json).map_err(|e| ExportError::Parse(e.to_string()))
    }

    /// Write the document, creating parent directories as needed.
    pub fn write_to(&self, path: &Path) -> Result<(), ExportError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ExportError::Io(e.to_string()))?;
        }
        std::fs::write(path, self.to_json_pretty()?).map_err(|e| ExportError::Io(e.to_string()))
    }

    pub fn read_from(path: &Path) -> Result<Self, ExportError> {
        let content = std::fs::read_to_string(path).map_err(|e| ExportError::Io(e.to_string()))?;
        Self::from_json(&content)
    }

    /// Successful predictions only.
    pub fn successful_predictions(&self) -> impl Iterator<Item = &Prediction> {
        self.predictions.iter().filter(|p| p.is_success())
    }
}

/// File name for a session export written at `at`.
pub fn session_file_name(at: DateTime<Utc>) -> String {
    format!("session_{}.json", at.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::predictions::{DispatchFailure, FailureKind};
    use crate::core::windowing::Window;

    fn document() -> ExportDocument {
        let samples: Vec<Sample> = (1..=4)
            .map(|seq| Sample::new(seq, seq as f64 * 1.5, Utc::now()))
            .collect();
        let window = Window {
            id: 1,
            samples: samples[..3].to_vec(),
        };

        ExportDocument {
            export_version: EXPORT_VERSION.to_string(),
            producer: ExportProducer {
                name: PRODUCER_NAME.to_string(),
                version: crate::VERSION.to_string(),
                instance_id: Uuid::new_v4(),
            },
            exported_at: Utc::now(),
            parameters: ExportParameters {
                window_size: 3,
                stride: 1,
                history_capacity: Some(100),
            },
            sample_history: samples,
            word_events: vec![WordEvent::new("olá"), WordEvent::new("tchau")],
            predictions: vec![
                Prediction::success(&window, Utc::now(), 1.0),
                Prediction::failure(
                    &window,
                    Utc::now(),
                    DispatchFailure {
                        kind: FailureKind::Server,
                        message: "500".to_string(),
                        attempts: 1,
                    },
                ),
            ],
            current_highlight: Some("tchau".to_string()),
            max_value: 6.0,
        }
    }

    #[test]
    fn test_round_trip_preserves_sequences() {
        let doc = document();
        let json = doc.to_json_pretty().unwrap();
        let back = ExportDocument::from_json(&json).unwrap();

        assert_eq!(back.sample_history, doc.sample_history);
        assert_eq!(back.word_events, doc.word_events);
        assert_eq!(back.predictions, doc.predictions);
        assert_eq!(back, doc);
    }

    #[test]
    fn test_write_and_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exports").join(session_file_name(Utc::now()));

        let doc = document();
        doc.write_to(&path).unwrap();
        let back = ExportDocument::read_from(&path).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.successful_predictions().count(), 1);
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(document()).unwrap();
        assert!(json["sample_history"].is_array());
        assert!(json["word_events"].is_array());
        assert!(json["predictions"].is_array());
        assert_eq!(json["current_highlight"], "tchau");
        assert_eq!(json["producer"]["name"], PRODUCER_NAME);
    }

    #[test]
    fn test_malformed_export_rejected() {
        assert!(matches!(
            ExportDocument::from_json("{\"sample_history\": 3}"),
            Err(ExportError::Parse(_))
        ));
    }
}
