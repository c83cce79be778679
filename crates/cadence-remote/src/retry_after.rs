//! `Retry-After` header parsing
//!
//! The header is either a number of seconds or an HTTP date. Dates more
//! than an hour away are ignored.

use std::time::Duration;

use tracing::warn;

/// Upper bound accepted for an HTTP-date `Retry-After`
const MAX_DATE_DELAY_SECS: u64 = 3600;

/// Parses a `Retry-After` header value, falling back to `default`
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            let secs = (target - now).num_seconds();
            if let Some(secs) = u64::try_from(secs)
                .ok()
                .filter(|&s| s <= MAX_DATE_DELAY_SECS)
            {
                return Duration::from_secs(secs);
            }
        } else {
            // Already passed: retry right away.
            return Duration::ZERO;
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}
