//! Fixed-capacity FIFO of latency samples.

use std::collections::VecDeque;

use crate::errors::CheckError;

/// The most recent successful latency samples, in milliseconds.
///
/// Samples are kept in insertion order. Once the buffer is full, every push
/// evicts exactly one sample from the front.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryBuffer {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Create an empty buffer holding at most `capacity` samples.
    ///
    /// # Errors
    /// Returns a configuration error when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, CheckError> {
        if capacity == 0 {
            return Err(CheckError::config(
                "sample size must be at least 1",
            ));
        }

        Ok(Self { samples: VecDeque::with_capacity(capacity), capacity })
    }

    pub fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Copy of the retained samples, oldest first.
    pub fn snapshot_sequence(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> + '_ {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
