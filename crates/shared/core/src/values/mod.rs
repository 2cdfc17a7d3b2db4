use chrono::{DateTime, Utc};

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Small floor added to denominators so zero spread never divides by zero
pub const EPSILON: f64 = 1e-8;
