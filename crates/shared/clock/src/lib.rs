//! Vigil Clock Infrastructure
//!
//! Time sources for the drift monitor and alert log:
//!
//! - [`SystemClock`]: wall-clock time
//! - [`ManualClock`]: frozen time that only moves when told to, for
//!   deterministic tests and replay
//!
//! ## Usage
//!
//! ```ignore
//! use vigil_clock::{ManualClock, SystemClock};
//! use chrono::Duration;
//!
//! let clock = ManualClock::new(start);
//! clock.advance(Duration::minutes(5)); // Jump forward
//! ```

mod manual;
mod system;

pub use manual::ManualClock;
pub use system::SystemClock;

// Re-export the Clock trait for convenience
pub use vigil_ports::Clock;
