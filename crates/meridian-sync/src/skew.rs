//! # Clock Skew Guard
//!
//! Detects client/server wall-clock divergence that could corrupt
//! last-write-wins resolution.
//!
//! Skew is a detectability measure, not a correctness guarantee: a skewed
//! request is still accepted, but the response is annotated and the event
//! logged so operators can fix the device clock before its timestamps start
//! winning (or losing) conflicts they shouldn't. Every response carries the
//! authoritative server time so callers can self-correct.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

/// Skew beyond this threshold triggers a warning.
pub const CLOCK_SKEW_THRESHOLD_SECS: i64 = 5 * 60;

/// A detected clock divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkewWarning {
    /// Signed skew in seconds: positive means the client clock runs ahead.
    pub skew_secs: i64,
    /// The client timestamp that tripped the threshold.
    pub client_time: DateTime<Utc>,
    /// Server time at measurement.
    pub server_time: DateTime<Utc>,
}

/// Measures client-reported time against the server clock.
#[derive(Debug, Clone, Copy)]
pub struct ClockSkewGuard {
    threshold: Duration,
}

impl Default for ClockSkewGuard {
    fn default() -> Self {
        ClockSkewGuard {
            threshold: Duration::seconds(CLOCK_SKEW_THRESHOLD_SECS),
        }
    }
}

impl ClockSkewGuard {
    /// Creates a guard with a custom threshold (tests).
    pub fn with_threshold(threshold: Duration) -> Self {
        ClockSkewGuard { threshold }
    }

    /// Compares the caller-supplied timestamp to the server clock.
    ///
    /// Returns a warning when |client - server| exceeds the threshold.
    /// Never an error: skewed requests proceed normally.
    pub fn measure(
        &self,
        client_time: DateTime<Utc>,
        server_time: DateTime<Utc>,
    ) -> Option<SkewWarning> {
        let skew = client_time.signed_duration_since(server_time);
        if skew.abs() <= self.threshold {
            return None;
        }

        let warning = SkewWarning {
            skew_secs: skew.num_seconds(),
            client_time,
            server_time,
        };
        warn!(
            skew_secs = warning.skew_secs,
            client_time = %client_time.to_rfc3339(),
            server_time = %server_time.to_rfc3339(),
            "Client clock skew exceeds threshold; last-write-wins ordering is at risk"
        );
        Some(warning)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn t(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_small_skew_passes_silently() {
        let guard = ClockSkewGuard::default();
        let server = t("2026-03-01T12:00:00Z");
        let client = t("2026-03-01T12:04:00Z");
        assert!(guard.measure(client, server).is_none());
    }

    #[test]
    fn test_exact_threshold_passes() {
        let guard = ClockSkewGuard::default();
        let server = t("2026-03-01T12:00:00Z");
        let client = t("2026-03-01T12:05:00Z");
        assert!(guard.measure(client, server).is_none());
    }

    /// A client running 10 minutes ahead trips the warning.
    #[test]
    fn test_ten_minutes_ahead_warns() {
        let guard = ClockSkewGuard::default();
        let server = t("2026-03-01T12:00:00Z");
        let client = t("2026-03-01T12:10:00Z");

        let warning = guard.measure(client, server).unwrap();
        assert_eq!(warning.skew_secs, 600);
    }

    #[test]
    fn test_skew_is_symmetric() {
        let guard = ClockSkewGuard::default();
        let server = t("2026-03-01T12:00:00Z");
        let client = t("2026-03-01T11:50:00Z");

        let warning = guard.measure(client, server).unwrap();
        assert_eq!(warning.skew_secs, -600);
    }
}
