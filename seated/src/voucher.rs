//! Discount vouchers.
//!
//! A voucher problem never blocks a booking: the ledger reports the
//! [`VoucherError`] as a warning and charges the full price.

use crate::types::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a voucher takes off the gross price.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum VoucherDiscount {
    /// Whole-number percentage of gross, rounded down
    Percentage(u32),
    /// Fixed amount
    Fixed(Money),
}

/// A discount code with validity constraints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    /// Code the guest types in
    pub code: String,
    /// Discount granted
    pub discount: VoucherDiscount,
    /// Smallest gross amount the voucher applies to
    pub min_spend: Money,
    /// Last moment the voucher is valid
    pub expires_at: Option<DateTime<Utc>>,
    /// Maximum number of redemptions
    pub usage_cap: Option<u32>,
    /// Redemptions so far
    pub times_used: u32,
}

/// Why a voucher could not be applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VoucherError {
    /// No voucher with that code.
    #[error("voucher {code} does not exist")]
    Unknown {
        /// Code entered
        code: String,
    },

    /// Past its expiry.
    #[error("voucher {code} expired at {expired_at}")]
    Expired {
        /// Code entered
        code: String,
        /// When it expired
        expired_at: DateTime<Utc>,
    },

    /// All redemptions used up.
    #[error("voucher {code} has reached its usage cap of {cap}")]
    UsageCapReached {
        /// Code entered
        code: String,
        /// Redemption limit
        cap: u32,
    },

    /// Booking too small for the voucher.
    #[error("voucher {code} requires a minimum spend of {min_spend} (booking is {gross})")]
    BelowMinimumSpend {
        /// Code entered
        code: String,
        /// Required gross
        min_spend: Money,
        /// Booking gross
        gross: Money,
    },
}

impl Voucher {
    /// Creates an unrestricted voucher.
    #[must_use]
    pub fn new(code: impl Into<String>, discount: VoucherDiscount) -> Self {
        Self {
            code: code.into(),
            discount,
            min_spend: Money::ZERO,
            expires_at: None,
            usage_cap: None,
            times_used: 0,
        }
    }

    /// Requires a minimum gross amount.
    #[must_use]
    pub const fn with_min_spend(mut self, min_spend: Money) -> Self {
        self.min_spend = min_spend;
        self
    }

    /// Sets the expiry.
    #[must_use]
    pub const fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Limits the number of redemptions.
    #[must_use]
    pub const fn with_usage_cap(mut self, cap: u32) -> Self {
        self.usage_cap = Some(cap);
        self
    }

    /// Discount this voucher grants on `gross` at `now`, never more than `gross`.
    ///
    /// # Errors
    ///
    /// Returns a [`VoucherError`] if the voucher is expired, used up, or the
    /// booking is below the minimum spend.
    pub fn discount_for(&self, gross: Money, now: DateTime<Utc>) -> Result<Money, VoucherError> {
        if let Some(expired_at) = self.expires_at.filter(|expiry| now > *expiry) {
            return Err(VoucherError::Expired {
                code: self.code.clone(),
                expired_at,
            });
        }

        if let Some(cap) = self.usage_cap.filter(|cap| self.times_used >= *cap) {
            return Err(VoucherError::UsageCapReached {
                code: self.code.clone(),
                cap,
            });
        }

        if gross < self.min_spend {
            return Err(VoucherError::BelowMinimumSpend {
                code: self.code.clone(),
                min_spend: self.min_spend,
                gross,
            });
        }

        let discount = match self.discount {
            VoucherDiscount::Percentage(percent) => {
                let scaled = u128::from(gross.minor()) * u128::from(percent) / 100;
                u64::try_from(scaled).map_or(gross, Money::from_minor)
            }
            VoucherDiscount::Fixed(amount) => amount,
        };

        Ok(discount.min(gross))
    }

    /// Counts one redemption.
    pub const fn record_use(&mut self) {
        self.times_used = self.times_used.saturating_add(1);
    }
}

/// Checks `voucher` against a booking of `gross` at `now` and returns the
/// discount it grants.
///
/// # Errors
///
/// See [`Voucher::discount_for`].
pub fn validate_voucher(voucher: &Voucher, gross: Money, now: DateTime<Utc>) -> Result<Money, VoucherError> {
    voucher.discount_for(gross, now)
}
