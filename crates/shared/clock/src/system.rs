use chrono::Utc;
use vigil_core::Timestamp;
use vigil_ports::Clock;

/// Wall-clock time source
///
/// Drift records and alerts stamped with this clock carry the time they
/// were produced, not the time of the observations they describe.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    fn name(&self) -> &str {
        "SystemClock"
    }
}
