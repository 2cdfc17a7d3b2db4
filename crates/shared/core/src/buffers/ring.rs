//! Ring Buffer
//!
//! Fixed-capacity FIFO used for alert logs and drift history.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Fixed-capacity FIFO of owned entries
///
/// Iteration order is oldest first; use [`RingBuffer::iter_recent`] for
/// newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, returning the evicted oldest entry if the buffer was full
    pub fn push(&mut self, entry: T) -> Option<T> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change capacity, dropping the oldest entries that no longer fit
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    /// Newest first
    pub fn iter_recent(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().rev()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
