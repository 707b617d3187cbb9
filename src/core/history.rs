//! Display history of recent samples.
//!
//! Independent of windowing: the history may be capped or unbounded, while
//! the prediction working buffer always bounds itself by sliding.

use crate::feed::Sample;
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

/// Bounded (or unbounded) arrival-ordered history with a running maximum.
///
/// One writer pushes; any number of readers take copies.
#[derive(Debug)]
pub struct SampleBuffer {
    capacity: Option<usize>,
    inner: RwLock<HistoryInner>,
}

#[derive(Debug)]
struct HistoryInner {
    samples: VecDeque<Sample>,
    max_value: f64,
    evicted: u64,
}

impl SampleBuffer {
    /// Create a history keeping at most `capacity` samples; `None` is unbounded.
    pub fn new(capacity: Option<usize>) -> Self {
        let samples = match capacity {
            Some(cap) => VecDeque::with_capacity(cap),
            None => VecDeque::new(),
        };
        Self {
            capacity,
            inner: RwLock::new(HistoryInner {
                samples,
                max_value: 0.0,
                evicted: 0,
            }),
        }
    }

    /// Append a sample, evicting the oldest on overflow.
    pub fn push(&self, sample: Sample) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if sample.value > inner.max_value {
            inner.max_value = sample.value;
        }

        inner.samples.push_back(sample);
        if let Some(cap) = self.capacity {
            while inner.samples.len() > cap {
                inner.samples.pop_front();
                inner.evicted += 1;
            }
        }
    }

    /// Copy of the retained samples in arrival order.
    pub fn snapshot(&self) -> Vec<Sample> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.samples.iter().copied().collect()
    }

    /// Largest value seen since startup, never lower than 0.
    pub fn max_value(&self) -> f64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .max_value
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .samples
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Samples dropped by FIFO eviction.
    pub fn evicted(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .evicted
    }
}

/// Thread-safe shared sample history.
pub type SharedSampleBuffer = Arc<SampleBuffer>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(seq: u64, value: f64) -> Sample {
        Sample::new(seq, value, Utc::now())
    }

    #[test]
    fn test_bounded_keeps_most_recent() {
        let buffer = SampleBuffer::new(Some(100));
        for seq in 1..=250 {
            buffer.push(sample(seq, seq as f64));
        }

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), 100);
        let seqs: Vec<u64> = snapshot.iter().map(|s| s.seq).collect();
        assert_eq!(seqs, (151..=250).collect::<Vec<_>>());
        assert_eq!(buffer.evicted(), 150);
    }

    #[test]
    fn test_unbounded_keeps_everything() {
        let buffer = SampleBuffer::new(None);
        for seq in 1..=1_000 {
            buffer.push(sample(seq, 1.0));
        }
        assert_eq!(buffer.len(), 1_000);
        assert_eq!(buffer.evicted(), 0);
    }

    #[test]
    fn test_running_max_never_decreases() {
        let buffer = SampleBuffer::new(Some(2));
        assert_eq!(buffer.max_value(), 0.0);

        buffer.push(sample(1, 40.0));
        buffer.push(sample(2, 90.0));
        buffer.push(sample(3, 10.0));
        buffer.push(sample(4, 5.0));

        // 90 has been evicted but the maximum is kept.
        assert_eq!(buffer.max_value(), 90.0);
    }

    #[test]
    fn test_negative_values_do_not_lower_max() {
        let buffer = SampleBuffer::new(None);
        buffer.push(sample(1, -5.0));
        assert_eq!(buffer.max_value(), 0.0);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let buffer = Arc::new(SampleBuffer::new(Some(10)));
        buffer.push(sample(1, 1.0));
        let snapshot = buffer.snapshot();
        buffer.push(sample(2, 2.0));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(buffer.len(), 2);
    }
}
