//! Rolling numeric window

use super::RingBuffer;

/// The most recent `capacity` values of a stream
#[derive(Debug, Clone, PartialEq)]
pub struct RollingBuffer {
    inner: RingBuffer<f64>,
}

impl RollingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RingBuffer::new(capacity),
        }
    }

    /// Append a value, returning the evicted value if the window was full
    pub fn push(&mut self, value: f64) -> Option<f64> {
        self.inner.push(value)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Resize the window keeping the newest values
    pub fn resize(&mut self, capacity: usize) {
        self.inner.set_capacity(capacity);
    }

    /// Snapshot of the window, oldest first
    pub fn values(&self) -> Vec<f64> {
        self.inner.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}
