//! Client for the external inference service.
//!
//! The pipeline only sees the [`Predictor`] trait: an ordered sequence of
//! sample values in, one numeric prediction out. [`HttpPredictor`] is the
//! adapter for the Flask-style `POST /predict` service used by the speller.

use crate::core::FailureKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Inference service configuration.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Full URL of the predict endpoint
    pub url: String,
}

impl InferenceConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self::new("http://localhost:5000/predict")
    }
}

/// Inference error types.
#[derive(Debug)]
pub enum InferenceError {
    /// Client could not be built
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Service returned an error response
    Server { status: u16, message: String },
    /// Response did not contain a numeric prediction
    Malformed(String),
}

impl InferenceError {
    /// Failure tag recorded in the prediction log.
    pub fn kind(&self) -> FailureKind {
        match self {
            InferenceError::Config(_) | InferenceError::Network(_) => FailureKind::Transport,
            InferenceError::Server { .. } => FailureKind::Server,
            InferenceError::Malformed(_) => FailureKind::MalformedResponse,
        }
    }
}

impl std::fmt::Display for InferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InferenceError::Config(msg) => write!(f, "Inference config error: {msg}"),
            InferenceError::Network(msg) => write!(f, "Inference network error: {msg}"),
            InferenceError::Server { status, message } => {
                write!(f, "Inference server error ({status}): {message}")
            }
            InferenceError::Malformed(msg) => write!(f, "Malformed inference response: {msg}"),
        }
    }
}

impl std::error::Error for InferenceError {}

/// A black-box asynchronous prediction function.
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Predict over one window of sample values, in arrival order.
    async fn predict(&self, values: Vec<f64>) -> Result<f64, InferenceError>;
}

/// Request body for the predict endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PredictRequest {
    pub data: Vec<f64>,
}

/// Response body from the predict endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictResponse {
    #[serde(default)]
    pub prediction: Option<serde_json::Value>,
}

impl PredictResponse {
    /// Extract the prediction, accepting numbers and numeric strings.
    pub fn into_score(self) -> Result<f64, InferenceError> {
        match self.prediction {
            Some(serde_json::Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| InferenceError::Malformed(format!("unrepresentable number {n}"))),
            Some(serde_json::Value::Bool(b)) => Ok(if b { 1.0 } else { 0.0 }),
            Some(serde_json::Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| InferenceError::Malformed(format!("non-numeric prediction {s:?}"))),
            Some(other) => Err(InferenceError::Malformed(format!(
                "unexpected prediction value {other}"
            ))),
            None => Err(InferenceError::Malformed(
                "response has no prediction field".to_string(),
            )),
        }
    }
}

/// HTTP predictor posting `{"data": [...]}` and reading `{"prediction": n}`.
pub struct HttpPredictor {
    config: InferenceConfig,
    client: reqwest::Client,
}

impl HttpPredictor {
    /// Create a new HTTP predictor.
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| InferenceError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }
}

#[async_trait]
impl Predictor for HttpPredictor {
    async fn predict(&self, values: Vec<f64>) -> Result<f64, InferenceError> {
        let response = self
            .client
            .post(&self.config.url)
            .json(&PredictRequest { data: values })
            .send()
            .await
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(InferenceError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let body: PredictResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Malformed(e.to_string()))?;

        body.into_score()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<f64, InferenceError> {
        serde_json::from_str::<PredictResponse>(json)
            .unwrap()
            .into_score()
    }

    #[test]
    fn test_response_parsing() {
        assert_eq!(parse(r#"{"prediction": 1}"#).unwrap(), 1.0);
        assert_eq!(parse(r#"{"prediction": 0.25}"#).unwrap(), 0.25);
        assert_eq!(parse(r#"{"prediction": "1"}"#).unwrap(), 1.0);
        assert_eq!(parse(r#"{"prediction": true}"#).unwrap(), 1.0);
    }

    #[test]
    fn test_malformed_responses() {
        let err = parse(r#"{"label": 1}"#).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedResponse);

        let err = parse(r#"{"prediction": [1, 0]}"#).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedResponse);

        let err = parse(r#"{"prediction": "yes"}"#).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedResponse);
    }

    #[test]
    fn test_request_shape() {
        let body = serde_json::to_value(PredictRequest {
            data: vec![1.0, 2.5],
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"data": [1.0, 2.5]}));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            InferenceError::Network("refused".into()).kind(),
            FailureKind::Transport
        );
        let server = InferenceError::Server {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(server.kind(), FailureKind::Server);
        assert!(server.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let predictor =
            HttpPredictor::new(InferenceConfig::new(format!("http://127.0.0.1:{port}/predict")))
                .unwrap();
        let err = predictor.predict(vec![1.0]).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transport);
    }
}
