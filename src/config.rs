//! Configuration for the EMG Predict Agent.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Number of samples in each prediction window
    pub window_size: usize,

    /// Samples dropped from the front of the working buffer after each dispatch
    pub stride: usize,

    /// Display history capacity; `None` keeps every sample
    pub history_capacity: Option<usize>,

    /// Inference endpoint
    pub inference_url: String,

    /// Timeout for a single inference attempt
    #[serde(with = "duration_serde")]
    pub inference_timeout: Duration,

    /// Extra attempts after a failed inference call
    pub max_retries: u32,

    /// How long shutdown waits for in-flight predictions
    #[serde(with = "duration_serde")]
    pub shutdown_grace: Duration,

    /// Score at or above which a prediction highlights the current word
    pub highlight_threshold: f64,

    /// Where samples come from
    pub feed: FeedSource,

    /// Path for session exports
    pub export_path: PathBuf,

    /// Path for stats and other state
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("emg-predict-agent");

        Self {
            window_size: 25,
            stride: 12,
            history_capacity: Some(100),
            inference_url: "http://localhost:5000/predict".to_string(),
            inference_timeout: Duration::from_secs(5),
            max_retries: 0,
            shutdown_grace: Duration::from_secs(2),
            highlight_threshold: 0.5,
            feed: FeedSource::default(),
            export_path: data_dir.join("exports"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("emg-predict-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    ///
    /// These are programmer errors and are fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_window(self.window_size, self.stride)?;

        if self.history_capacity == Some(0) {
            return Err(ConfigError::Invalid(
                "history capacity must be positive (omit it for unbounded history)".to_string(),
            ));
        }
        if self.inference_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "inference timeout must be positive".to_string(),
            ));
        }
        if !self.highlight_threshold.is_finite() {
            return Err(ConfigError::Invalid(
                "highlight threshold must be a finite number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Check window parameters: both positive and `stride <= window_size`.
pub fn validate_window(window_size: usize, stride: usize) -> Result<(), ConfigError> {
    if window_size == 0 {
        return Err(ConfigError::Invalid(
            "window size must be positive".to_string(),
        ));
    }
    if stride == 0 {
        return Err(ConfigError::Invalid("stride must be positive".to_string()));
    }
    if stride > window_size {
        return Err(ConfigError::Invalid(format!(
            "stride ({stride}) must not exceed window size ({window_size}); samples would never be windowed"
        )));
    }
    Ok(())
}

/// Where the agent reads its sample feed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedSource {
    /// Newline-delimited messages from a TCP bridge
    Tcp { addr: String },
    /// Newline-delimited messages on standard input
    Stdin,
}

impl Default for FeedSource {
    fn default() -> Self {
        FeedSource::Tcp {
            addr: "127.0.0.1:3001".to_string(),
        }
    }
}

impl std::fmt::Display for FeedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedSource::Tcp { addr } => write!(f, "tcp://{addr}"),
            FeedSource::Stdin => write!(f, "stdin"),
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration, stored as whole seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
