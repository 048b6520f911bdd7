//! Configuration for the booking core.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Unparseable values fall back to the default rather than failing startup.

use crate::cancellation::DEFAULT_REFUND_NOTICE_HOURS;
use crate::commission::CommissionScheme;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Booking and waitlist rules
    pub booking: BookingConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Platform-wide booking rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Hard cap on tickets in one booking, applied on top of the event's own
    /// limit (default: 4)
    pub max_tickets_per_booking: u32,
    /// How long a notified waitlist guest has to book, in hours (default: 12)
    pub waitlist_window_hours: i64,
    /// Notice a guest must give for a full refund, in hours (default: 48)
    pub refund_notice_hours: i64,
    /// Seconds between waitlist expiry sweeps (default: 300)
    pub sweep_interval_secs: u64,
    /// Commission percentage for events created without one (default: 15)
    pub default_commission_percent: u32,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `seated=debug` (default: info)
    pub level: String,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            max_tickets_per_booking: 4,
            waitlist_window_hours: 12,
            refund_notice_hours: DEFAULT_REFUND_NOTICE_HOURS,
            sweep_interval_secs: 300,
            default_commission_percent: 15,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl BookingConfig {
    /// Conversion window for notified waitlist entries.
    #[must_use]
    pub fn waitlist_window(&self) -> Duration {
        Duration::try_hours(self.waitlist_window_hours).unwrap_or_else(|| Duration::hours(12))
    }

    /// Notice period of the refund policy.
    #[must_use]
    pub fn refund_notice(&self) -> Duration {
        Duration::try_hours(self.refund_notice_hours)
            .unwrap_or_else(|| Duration::hours(DEFAULT_REFUND_NOTICE_HOURS))
    }

    /// Period of the expiry sweeper.
    #[must_use]
    pub const fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }

    /// Commission for events that do not name one. Out-of-range values fall
    /// back to 15%.
    #[must_use]
    pub fn default_commission(&self) -> CommissionScheme {
        CommissionScheme::percentage(self.default_commission_percent)
            .unwrap_or(CommissionScheme::Percentage(15))
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SEATED_MAX_TICKETS_PER_BOOKING`: per-booking ticket cap (default: 4)
    /// - `SEATED_WAITLIST_WINDOW_HOURS`: waitlist conversion window (default: 12)
    /// - `SEATED_REFUND_NOTICE_HOURS`: full-refund notice period (default: 48)
    /// - `SEATED_SWEEP_INTERVAL_SECS`: expiry sweep period (default: 300)
    /// - `SEATED_DEFAULT_COMMISSION_PERCENT`: fallback commission (default: 15)
    /// - `SEATED_LOG_LEVEL`: log filter (default: info)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = BookingConfig::default();
        Self {
            booking: BookingConfig {
                max_tickets_per_booking: lookup("SEATED_MAX_TICKETS_PER_BOOKING")
                    .and_then(|s| s.parse().ok())
                    .filter(|max| *max > 0)
                    .unwrap_or(defaults.max_tickets_per_booking),
                waitlist_window_hours: lookup("SEATED_WAITLIST_WINDOW_HOURS")
                    .and_then(|s| s.parse().ok())
                    .filter(|hours| *hours > 0)
                    .unwrap_or(defaults.waitlist_window_hours),
                refund_notice_hours: lookup("SEATED_REFUND_NOTICE_HOURS")
                    .and_then(|s| s.parse().ok())
                    .filter(|hours| *hours >= 0)
                    .unwrap_or(defaults.refund_notice_hours),
                sweep_interval_secs: lookup("SEATED_SWEEP_INTERVAL_SECS")
                    .and_then(|s| s.parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(defaults.sweep_interval_secs),
                default_commission_percent: lookup("SEATED_DEFAULT_COMMISSION_PERCENT")
                    .and_then(|s| s.parse().ok())
                    .filter(|percent| *percent <= 100)
                    .unwrap_or(defaults.default_commission_percent),
            },
            logging: LoggingConfig {
                level: lookup("SEATED_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            },
        }
    }
}
