//! Sliding-window extraction over the working sample buffer.
//!
//! Samples accumulate until `window_size` are available. The most recent
//! `window_size` samples form a window; after the window is dispatched the
//! oldest `stride` samples are dropped, so consecutive windows overlap by
//! `window_size - stride` samples.

use crate::config::{validate_window, ConfigError};
use crate::feed::Sample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// An ordered, fixed-length snapshot of consecutive samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    /// Sequential window identifier, starting at 1
    pub id: u64,
    /// Samples in arrival order
    pub samples: Vec<Sample>,
}

impl Window {
    /// Sample values in arrival order, as sent to the inference service.
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first_seq(&self) -> u64 {
        self.samples.first().map(|s| s.seq).unwrap_or_default()
    }

    pub fn last_seq(&self) -> u64 {
        self.samples.last().map(|s| s.seq).unwrap_or_default()
    }

    /// Arrival time of the oldest sample.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.samples.first().map(|s| s.timestamp)
    }

    /// Arrival time of the newest sample.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.samples.last().map(|s| s.timestamp)
    }
}

/// Maintains the working buffer used for prediction.
#[derive(Debug)]
pub struct WindowExtractor {
    window_size: usize,
    stride: usize,
    buffer: VecDeque<Sample>,
    /// Id of the next window handed out
    next_id: u64,
    /// Windows extracted and slid past so far
    extracted: u64,
}

impl WindowExtractor {
    /// Create an extractor, rejecting zero sizes and `stride > window_size`.
    pub fn new(window_size: usize, stride: usize) -> Result<Self, ConfigError> {
        validate_window(window_size, stride)?;
        Ok(Self {
            window_size,
            stride,
            buffer: VecDeque::with_capacity(window_size),
            next_id: 1,
            extracted: 0,
        })
    }

    /// Append a sample to the working buffer.
    pub fn push(&mut self, sample: Sample) {
        self.buffer.push_back(sample);
    }

    /// The most recent `window_size` samples, if that many are buffered.
    ///
    /// Does not mutate the buffer; calling it twice without `slide` returns
    /// the same window.
    pub fn try_extract(&self) -> Option<Window> {
        if self.buffer.len() < self.window_size {
            return None;
        }

        let skip = self.buffer.len() - self.window_size;
        Some(Window {
            id: self.next_id,
            samples: self.buffer.iter().skip(skip).copied().collect(),
        })
    }

    /// Drop the oldest `stride` samples after a window has been dispatched.
    pub fn slide(&mut self) {
        let n = self.stride.min(self.buffer.len());
        self.buffer.drain(..n);
        self.next_id += 1;
        self.extracted += 1;
    }

    /// Samples still needed before the next window is ready.
    pub fn samples_until_ready(&self) -> usize {
        self.window_size.saturating_sub(self.buffer.len())
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of windows consumed so far.
    pub fn windows_extracted(&self) -> u64 {
        self.extracted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(seq: u64) -> Sample {
        Sample::new(seq, seq as f64, Utc::now())
    }

    /// Feed `n` samples, extracting and sliding at most once per arrival.
    fn run(extractor: &mut WindowExtractor, seqs: std::ops::RangeInclusive<u64>) -> Vec<Window> {
        let mut windows = Vec::new();
        for seq in seqs {
            extractor.push(sample(seq));
            if let Some(window) = extractor.try_extract() {
                windows.push(window);
                extractor.slide();
            }
        }
        windows
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(WindowExtractor::new(0, 0).is_err());
        assert!(WindowExtractor::new(10, 0).is_err());
        assert!(WindowExtractor::new(10, 11).is_err());
        assert!(WindowExtractor::new(10, 10).is_ok());
    }

    #[test]
    fn test_extract_does_not_mutate() {
        let mut extractor = WindowExtractor::new(3, 1).unwrap();
        for seq in 1..=3 {
            extractor.push(sample(seq));
        }
        let a = extractor.try_extract().unwrap();
        let b = extractor.try_extract().unwrap();
        assert_eq!(a, b);
        assert_eq!(extractor.buffered(), 3);
    }

    #[test]
    fn test_not_ready_before_window_size() {
        let mut extractor = WindowExtractor::new(5, 2).unwrap();
        for seq in 1..=4 {
            extractor.push(sample(seq));
            assert!(extractor.try_extract().is_none());
        }
        assert_eq!(extractor.samples_until_ready(), 1);
    }

    #[test]
    fn test_scenario_25_12() {
        let mut extractor = WindowExtractor::new(25, 12).unwrap();

        let first = run(&mut extractor, 1..=25);
        assert_eq!(first.len(), 1);
        assert_eq!((first[0].first_seq(), first[0].last_seq()), (1, 25));
        assert_eq!(extractor.buffered(), 13);

        // Arrival 26 alone does not trigger another window.
        assert!(run(&mut extractor, 26..=26).is_empty());
        assert!(run(&mut extractor, 27..=36).is_empty());

        let second = run(&mut extractor, 37..=37);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, 2);
        assert_eq!((second[0].first_seq(), second[0].last_seq()), (13, 37));

        let third = run(&mut extractor, 38..=49);
        assert_eq!(third.len(), 1);
        assert_eq!((third[0].first_seq(), third[0].last_seq()), (25, 49));
    }

    #[test]
    fn test_window_count_formula() {
        for window_size in 1..=9usize {
            for stride in 1..=window_size {
                for n in window_size as u64..=40 {
                    let mut extractor = WindowExtractor::new(window_size, stride).unwrap();
                    let windows = run(&mut extractor, 1..=n);
                    let expected = 1 + (n as usize - window_size) / stride;
                    assert_eq!(
                        windows.len(),
                        expected,
                        "window_size={window_size} stride={stride} n={n}"
                    );
                    assert_eq!(extractor.windows_extracted(), expected as u64);
                }
            }
        }
    }

    #[test]
    fn test_windows_contiguous_with_bounded_overlap() {
        let window_size = 8;
        let stride = 3;
        let mut extractor = WindowExtractor::new(window_size, stride).unwrap();
        let windows = run(&mut extractor, 1..=60);

        for window in &windows {
            assert_eq!(window.len(), window_size);
            let seqs: Vec<u64> = window.samples.iter().map(|s| s.seq).collect();
            let expected: Vec<u64> = (window.first_seq()..=window.last_seq()).collect();
            assert_eq!(seqs, expected);
        }

        for pair in windows.windows(2) {
            assert_eq!(pair[1].first_seq(), pair[0].first_seq() + stride as u64);
            let overlap = pair[0].last_seq().saturating_sub(pair[1].first_seq()) + 1;
            assert_eq!(overlap as usize, window_size - stride);
        }
    }

    #[test]
    fn test_stride_equal_window_has_no_overlap() {
        let mut extractor = WindowExtractor::new(4, 4).unwrap();
        let windows = run(&mut extractor, 1..=12);
        let ranges: Vec<(u64, u64)> = windows
            .iter()
            .map(|w| (w.first_seq(), w.last_seq()))
            .collect();
        assert_eq!(ranges, vec![(1, 4), (5, 8), (9, 12)]);
    }

    #[test]
    fn test_values_in_order() {
        let mut extractor = WindowExtractor::new(3, 3).unwrap();
        let windows = run(&mut extractor, 1..=3);
        assert_eq!(windows[0].values(), vec![1.0, 2.0, 3.0]);
    }
}
