use std::time::Duration;

use chrono::{DateTime, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Absolute expiration of an `exp` claim (seconds since epoch, possibly
/// fractional). `None` when the instant is out of range.
pub fn expires_at_from_exp_claim(exp_seconds: f64) -> Option<DateTime<Utc>> {
    if !exp_seconds.is_finite() {
        return None;
    }
    let millis = (exp_seconds * 1000.0).trunc();
    if millis < i64::MIN as f64 || millis > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_millis(millis as i64)
}

/// Time left until `at`, zero when it already passed.
pub fn duration_until(at: DateTime<Utc>) -> Duration {
    (at - now()).to_std().unwrap_or(Duration::ZERO)
}
