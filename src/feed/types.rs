//! Event types delivered by the inbound feed.
//!
//! A feed line is either a sample reading or a word event. Samples carry only
//! the raw value until the pipeline stamps them with an arrival index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single EMG reading with its arrival index and arrival time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// 1-based arrival index assigned by the pipeline
    pub seq: u64,
    /// Sensor value
    pub value: f64,
    /// Time the sample arrived
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn new(seq: u64, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            seq,
            value,
            timestamp,
        }
    }

    /// Wall-clock time of day with millisecond precision, for chart axes.
    pub fn formatted_time(&self) -> String {
        self.timestamp.format("%H:%M:%S%.3f").to_string()
    }
}

/// A word shown to the user, used to correlate predictions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordEvent {
    pub word: String,
    pub timestamp: DateTime<Utc>,
}

impl WordEvent {
    /// Create a word event stamped with the current time.
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn at(word: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            word: word.into(),
            timestamp,
        }
    }
}

/// A parsed feed message.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A raw sensor value, not yet stamped
    Sample(f64),
    /// A word event
    Word(WordEvent),
}

/// Reasons a feed line is rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Line was empty or whitespace
    Empty,
    /// Value did not parse as a finite number
    NotNumeric(String),
    /// JSON object without a recognised field
    UnknownMessage(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Empty => write!(f, "empty feed line"),
            ParseError::NotNumeric(v) => write!(f, "not a numeric sample: {v:?}"),
            ParseError::UnknownMessage(m) => write!(f, "unrecognised feed message: {m}"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Wire shape of a JSON feed message.
#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    word: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// Parse a numeric string the way the sensor bridge emits it.
pub fn parse_value(raw: &str) -> Result<f64, ParseError> {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ParseError::NotNumeric(trimmed.to_string())),
    }
}

/// Parse one feed line.
///
/// Accepted forms:
/// - a bare number: `512.0`
/// - `{"value": 512.0}` or `{"value": "512.0"}`
/// - `{"word": "hello"}`, optionally with an RFC 3339 `"timestamp"`
pub fn parse_line(line: &str) -> Result<FeedEvent, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    if !line.starts_with('{') {
        return parse_value(line).map(FeedEvent::Sample);
    }

    let msg: RawMessage =
        serde_json::from_str(line).map_err(|_| ParseError::UnknownMessage(line.to_string()))?;

    if let Some(word) = msg.word {
        let timestamp = msg.timestamp.unwrap_or_else(Utc::now);
        return Ok(FeedEvent::Word(WordEvent::at(word, timestamp)));
    }

    match msg.value {
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .map(FeedEvent::Sample)
            .ok_or_else(|| ParseError::NotNumeric(n.to_string())),
        Some(serde_json::Value::String(s)) => parse_value(&s).map(FeedEvent::Sample),
        Some(other) => Err(ParseError::NotNumeric(other.to_string())),
        None => Err(ParseError::UnknownMessage(line.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_number() {
        assert_eq!(parse_line("512.5"), Ok(FeedEvent::Sample(512.5)));
        assert_eq!(parse_line("  -3 \r"), Ok(FeedEvent::Sample(-3.0)));
    }

    #[test]
    fn test_parse_json_value_string_and_number() {
        assert_eq!(
            parse_line(r#"{"value": "101.25"}"#),
            Ok(FeedEvent::Sample(101.25))
        );
        assert_eq!(parse_line(r#"{"value": 7}"#), Ok(FeedEvent::Sample(7.0)));
    }

    #[test]
    fn test_parse_word_event() {
        match parse_line(r#"{"word": "casa", "timestamp": "2024-01-22T10:00:01Z"}"#) {
            Ok(FeedEvent::Word(event)) => {
                assert_eq!(event.word, "casa");
                assert_eq!(event.timestamp.to_rfc3339(), "2024-01-22T10:00:01+00:00");
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_lines_rejected() {
        assert_eq!(parse_line(""), Err(ParseError::Empty));
        assert!(matches!(parse_line("abc"), Err(ParseError::NotNumeric(_))));
        assert!(matches!(parse_line("NaN"), Err(ParseError::NotNumeric(_))));
        assert!(matches!(
            parse_line(r#"{"value": "x1"}"#),
            Err(ParseError::NotNumeric(_))
        ));
        assert!(matches!(
            parse_line(r#"{"other": 1}"#),
            Err(ParseError::UnknownMessage(_))
        ));
        assert!(matches!(
            parse_line("{not json"),
            Err(ParseError::UnknownMessage(_))
        ));
    }

    #[test]
    fn test_formatted_time() {
        let ts = DateTime::parse_from_rfc3339("2024-01-22T10:00:01.250Z")
            .unwrap()
            .with_timezone(&Utc);
        let sample = Sample::new(1, 1.0, ts);
        assert_eq!(sample.formatted_time(), "10:00:01.250");
    }
}
