//! Cancellation policy.
//!
//! Refunds are looked up in a fixed table keyed by who initiated the
//! cancellation and whether enough notice was given. There is no sliding
//! scale: a guest either gets everything they paid back or nothing.

use crate::aggregates::{Booking, Event};
use crate::types::Money;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default notice a guest must give for a full refund.
pub const DEFAULT_REFUND_NOTICE_HOURS: i64 = 48;

/// Who (or what) ended the booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initiator {
    /// The guest cancelled their own booking
    Guest,
    /// The host cancelled this one booking
    Host,
    /// The host cancelled the whole event
    EventCancellation,
    /// The host recorded that the guest did not attend
    NoShow,
}

/// Whether the cancellation came before the notice deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeBand {
    /// At or before `starts_at - notice`
    InTime,
    /// After the deadline
    Late,
}

/// Portion of the paid amount returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundShare {
    /// Everything paid
    Full,
    /// Nothing
    Nothing,
}

/// Why a refund was (or was not) granted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    /// Guest cancelled with enough notice
    GuestCancelledInTime,
    /// Guest cancelled too close to the event
    GuestCancelledLate,
    /// Host cancelled the booking
    HostCancelled,
    /// Host cancelled the event
    EventCancelled,
    /// Guest did not attend
    NoShow,
}

/// Outcome of the policy for one booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundDecision {
    /// Amount to return to the guest
    pub amount: Money,
    /// Policy row that applied
    pub reason: RefundReason,
}

/// The refund table.
///
/// Every `(initiator, band)` pair has exactly one row; host-driven rows ignore
/// the band.
#[must_use]
pub const fn policy_row(initiator: Initiator, band: NoticeBand) -> (RefundShare, RefundReason) {
    match (initiator, band) {
        (Initiator::Guest, NoticeBand::InTime) => (RefundShare::Full, RefundReason::GuestCancelledInTime),
        (Initiator::Guest, NoticeBand::Late) => (RefundShare::Nothing, RefundReason::GuestCancelledLate),
        (Initiator::Host, _) => (RefundShare::Full, RefundReason::HostCancelled),
        (Initiator::EventCancellation, _) => (RefundShare::Full, RefundReason::EventCancelled),
        (Initiator::NoShow, _) => (RefundShare::Nothing, RefundReason::NoShow),
    }
}

/// Cancellation policy with a configurable notice period.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefundPolicy {
    notice: Duration,
}

impl RefundPolicy {
    /// Policy requiring `notice` before the event for a full guest refund.
    #[must_use]
    pub const fn new(notice: Duration) -> Self {
        Self { notice }
    }

    /// The configured notice period.
    #[must_use]
    pub const fn notice(&self) -> Duration {
        self.notice
    }

    /// Classifies `now` against the event start. The deadline itself counts
    /// as in time.
    #[must_use]
    pub fn notice_band(&self, starts_at: DateTime<Utc>, now: DateTime<Utc>) -> NoticeBand {
        match starts_at.checked_sub_signed(self.notice) {
            Some(deadline) if now <= deadline => NoticeBand::InTime,
            _ => NoticeBand::Late,
        }
    }

    /// Refund owed when `initiator` ends `booking` at `now`.
    ///
    /// "Everything paid" is what the guest was charged once the booking is
    /// marked paid, and zero before that.
    #[must_use]
    pub fn compute_refund(
        &self,
        booking: &Booking,
        event: &Event,
        initiator: Initiator,
        now: DateTime<Utc>,
    ) -> RefundDecision {
        let band = self.notice_band(event.starts_at, now);
        let (share, reason) = policy_row(initiator, band);
        let amount = match share {
            RefundShare::Full => booking.amount_paid(),
            RefundShare::Nothing => Money::ZERO,
        };

        tracing::debug!(
            booking_id = %booking.id,
            ?initiator,
            ?band,
            ?reason,
            amount = amount.minor(),
            "Refund computed"
        );

        RefundDecision { amount, reason }
    }
}

impl Default for RefundPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_REFUND_NOTICE_HOURS))
    }
}
