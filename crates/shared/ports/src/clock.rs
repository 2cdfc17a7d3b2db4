use vigil_core::Timestamp;

/// Source of "now" for records the monitors produce
///
/// Drift records and alerts are stamped through this port so tests can pin
/// or step time instead of reading the wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;

    /// Identifier used in logs
    fn name(&self) -> &str {
        "Clock"
    }
}
