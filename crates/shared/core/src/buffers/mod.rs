//! Capacity-bounded FIFO storage
//!
//! Both buffers evict the oldest entry when a push would exceed capacity.

mod ring;
mod rolling;

pub use ring::RingBuffer;
pub use rolling::RollingBuffer;
