use chrono::Duration;
use std::sync::RwLock;
use vigil_core::Timestamp;
use vigil_ports::Clock;

/// Clock that stays fixed until explicitly moved
///
/// Reads are shared, writes go through an `RwLock`, so the clock can sit
/// behind an `Arc` shared between the drift monitor, the alert log and the
/// test driving them.
pub struct ManualClock {
    current_time: RwLock<Timestamp>,
}

impl ManualClock {
    pub fn new(initial_time: Timestamp) -> Self {
        Self {
            current_time: RwLock::new(initial_time),
        }
    }

    /// Advance the time by a specified duration
    pub fn advance(&self, duration: Duration) {
        match self.current_time.write() {
            Ok(mut current) => *current += duration,
            Err(poisoned) => *poisoned.into_inner() += duration,
        }
    }

    /// Explicitly set the time
    ///
    /// Warning: moving backwards produces out-of-order records.
    pub fn set_time(&self, time: Timestamp) {
        match self.current_time.write() {
            Ok(mut current) => *current = time,
            Err(poisoned) => *poisoned.into_inner() = time,
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        match self.current_time.read() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn name(&self) -> &str {
        "ManualClock"
    }
}
