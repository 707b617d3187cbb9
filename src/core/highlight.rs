//! Word events and the highlighting decision.
//!
//! A word is highlighted while the most recent successful prediction is
//! positive. The highlighted word is the last one shown at or before that
//! prediction completed.

use crate::core::predictions::Prediction;
use crate::feed::WordEvent;
use std::sync::{Arc, PoisonError, RwLock};

/// Arrival-ordered record of word events, stored as received.
#[derive(Debug, Default)]
pub struct WordLog {
    events: RwLock<Vec<WordEvent>>,
}

impl WordLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: WordEvent) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn all(&self) -> Vec<WordEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn latest(&self) -> Option<WordEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Thread-safe shared word log.
pub type SharedWordLog = Arc<WordLog>;

/// Decide which word, if any, to highlight.
///
/// `latest` must be the most recent successful prediction in completion
/// order. A score at or above `threshold` counts as positive.
pub fn current_highlight(
    latest: Option<&Prediction>,
    words: &[WordEvent],
    threshold: f64,
) -> Option<String> {
    let prediction = latest?;
    let score = prediction.prediction?;
    if score < threshold {
        return None;
    }

    words
        .iter()
        .rev()
        .find(|w| w.timestamp <= prediction.timestamp)
        .or_else(|| words.last())
        .map(|w| w.word.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::windowing::Window;
    use crate::feed::Sample;
    use chrono::{Duration, Utc};

    fn prediction(score: f64) -> Prediction {
        let window = Window {
            id: 1,
            samples: vec![Sample::new(1, 1.0, Utc::now())],
        };
        Prediction::success(&window, Utc::now(), score)
    }

    #[test]
    fn test_no_prediction_no_highlight() {
        let words = vec![WordEvent::new("sim")];
        assert_eq!(current_highlight(None, &words, 0.5), None);
    }

    #[test]
    fn test_negative_prediction_no_highlight() {
        let words = vec![WordEvent::new("sim")];
        let p = prediction(0.0);
        assert_eq!(current_highlight(Some(&p), &words, 0.5), None);
    }

    #[test]
    fn test_positive_prediction_highlights_word_shown_before_completion() {
        let p = prediction(1.0);
        let words = vec![
            WordEvent::at("agua", p.timestamp - Duration::seconds(4)),
            WordEvent::at("comida", p.timestamp - Duration::seconds(1)),
            WordEvent::at("dormir", p.timestamp + Duration::seconds(2)),
        ];
        assert_eq!(
            current_highlight(Some(&p), &words, 0.5),
            Some("comida".to_string())
        );
    }

    #[test]
    fn test_falls_back_to_latest_word() {
        let p = prediction(1.0);
        let words = vec![WordEvent::at("dormir", p.timestamp + Duration::seconds(2))];
        assert_eq!(
            current_highlight(Some(&p), &words, 0.5),
            Some("dormir".to_string())
        );
        assert_eq!(current_highlight(Some(&p), &[], 0.5), None);
    }

    #[test]
    fn test_word_log_order() {
        let log = WordLog::new();
        log.record(WordEvent::new("um"));
        log.record(WordEvent::new("dois"));
        let words: Vec<String> = log.all().into_iter().map(|w| w.word).collect();
        assert_eq!(words, vec!["um", "dois"]);
        assert_eq!(log.latest().map(|w| w.word), Some("dois".to_string()));
    }
}
