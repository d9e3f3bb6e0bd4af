//! Clock helpers for lessord
//!
//! All lease arithmetic is done on UTC wall-clock instants. Leases are
//! measured in whole hours and span process restarts, so monotonic time is
//! of no use here.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `LESSOR_MOCK_TIME` environment variable can be set
//! to shift the clock for every time-sensitive operation. This is handy for
//! exercising expiry warnings without waiting an hour.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` in UTC (e.g., `2025-12-25 14:30:00`)

use chrono::{DateTime, NaiveDateTime, Utc};
use std::sync::OnceLock;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "LESSOR_MOCK_TIME";

/// Offset between mock time and real time, fixed at first use so the mock
/// clock keeps advancing.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S") {
                    Ok(naive_dt) => {
                        let offset = naive_dt.and_utc().signed_duration_since(Utc::now());
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    }
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = "%Y-%m-%d %H:%M:%S",
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Current UTC time, respecting mock time in debug builds.
pub fn now() -> DateTime<Utc> {
    let real_now = Utc::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Whole hours as a chrono duration
pub fn hours(n: u32) -> chrono::Duration {
    chrono::Duration::hours(i64::from(n))
}

/// Expiry instant of a lease, saturating at the latest representable instant
pub fn lease_expiry(started_at: DateTime<Utc>, duration_hours: u32) -> DateTime<Utc> {
    started_at
        .checked_add_signed(hours(duration_hours))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Format an instant for messages sent to renters and the administrator
pub fn format_datetime_full(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Format a remaining duration as whole minutes, clamped at zero
pub fn format_minutes(remaining: chrono::Duration) -> String {
    format!("{} min", remaining.num_minutes().max(0))
}
