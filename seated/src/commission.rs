//! Platform commission.
//!
//! The fee is taken from the amount the guest pays; the host receives the
//! rest. Fees are whole minor units, rounded half up, and never exceed the
//! gross, so `fee + payout == gross` for every input.

use crate::types::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the platform fee is derived from a booking's gross amount.
///
/// Serialized as `{"type": "percentage", "value": 15}` or
/// `{"type": "flat", "value": 500}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CommissionScheme {
    /// Whole-number percentage of gross
    Percentage(u32),
    /// Fixed fee per booking, capped at gross
    Flat(Money),
}

/// Rejected commission configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommissionError {
    /// Percentages above 100 would pay the host a negative amount.
    #[error("commission percentage must be within 0..=100 (got {0})")]
    PercentOutOfRange(u32),
}

impl CommissionScheme {
    /// Percentage scheme, validated.
    ///
    /// # Errors
    ///
    /// Returns [`CommissionError::PercentOutOfRange`] when `percent > 100`.
    pub const fn percentage(percent: u32) -> Result<Self, CommissionError> {
        if percent > 100 {
            return Err(CommissionError::PercentOutOfRange(percent));
        }
        Ok(Self::Percentage(percent))
    }

    /// Flat fee scheme.
    #[must_use]
    pub const fn flat(fee: Money) -> Self {
        Self::Flat(fee)
    }
}

/// Split of a gross amount between platform and host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commission {
    /// Amount the split was computed from
    pub gross: Money,
    /// Platform fee
    pub fee: Money,
    /// Host payout
    pub payout: Money,
}

/// Splits `gross` into platform fee and host payout.
///
/// Out-of-range percentages that slipped past [`CommissionScheme::percentage`]
/// (for example via deserialization) are clamped so the fee never exceeds
/// `gross`.
#[must_use]
pub fn calculate_commission(gross: Money, scheme: &CommissionScheme) -> Commission {
    let gross_minor = gross.minor();
    let fee_minor = match *scheme {
        CommissionScheme::Percentage(percent) => {
            let scaled = u128::from(gross_minor) * u128::from(percent);
            // round half up in minor units
            let rounded = (scaled + 50) / 100;
            u64::try_from(rounded.min(u128::from(gross_minor))).unwrap_or(gross_minor)
        }
        CommissionScheme::Flat(fee) => fee.minor().min(gross_minor),
    };

    let fee = Money::from_minor(fee_minor);
    Commission {
        gross,
        fee,
        payout: gross.saturating_sub(fee),
    }
}
