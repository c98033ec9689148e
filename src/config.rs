//! Session configuration.
//!
//! [`SessionConfig`] is a plain value built with `const fn` setters, so it can live in a
//! `const` or be loaded from an application's own config file through `serde`. Durations
//! are serialized as whole milliseconds.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

/// Baud rate the MegaLeaf controller's CDC port is configured for.
pub const DEFAULT_BAUD_RATE: u32 = 1_152_000;

/// Default bound on one request/response round trip.
pub const DEFAULT_ROUND_TRIP_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default interval at which a blocked serial read wakes to check its deadline.
pub const DEFAULT_READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Tunables for one session.
///
/// ```rust
/// use embassy_time::Duration;
/// use megaleaf_envoy::config::SessionConfig;
///
/// const CONFIG: SessionConfig = SessionConfig::new()
///     .with_round_trip_timeout(Duration::from_millis(250))
///     .with_baud_rate(115_200);
///
/// assert_eq!(CONFIG.round_trip_timeout.as_millis(), 250);
/// ```
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Bound on one request/response round trip. Expiry yields
    /// [`Error::Timeout`](crate::Error::Timeout).
    #[serde(rename = "round_trip_timeout_ms", with = "millis")]
    pub round_trip_timeout: Duration,
    /// Serial baud rate (host serial link only).
    pub baud_rate: u32,
    /// How long one blocking serial read may wait before yielding (host serial link only).
    ///
    /// Rounded to tenths of a second, between 0.1 s and 25.5 s.
    #[serde(rename = "read_poll_interval_ms", with = "millis")]
    pub read_poll_interval: Duration,
}

impl SessionConfig {
    /// The default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            round_trip_timeout: DEFAULT_ROUND_TRIP_TIMEOUT,
            baud_rate: DEFAULT_BAUD_RATE,
            read_poll_interval: DEFAULT_READ_POLL_INTERVAL,
        }
    }

    /// Replace the round-trip timeout.
    #[must_use]
    pub const fn with_round_trip_timeout(self, round_trip_timeout: Duration) -> Self {
        Self {
            round_trip_timeout,
            ..self
        }
    }

    /// Replace the baud rate.
    #[must_use]
    pub const fn with_baud_rate(self, baud_rate: u32) -> Self {
        Self { baud_rate, ..self }
    }

    /// Replace the serial read poll interval.
    #[must_use]
    pub const fn with_read_poll_interval(self, read_poll_interval: Duration) -> Self {
        Self {
            read_poll_interval,
            ..self
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// `serde` adapter storing an [`embassy_time::Duration`] as milliseconds.
mod millis {
    use embassy_time::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(super) fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_millis().serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
