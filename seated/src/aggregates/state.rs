//! Per-event state and the environment shared by the reducers.
//!
//! The ledger loads one [`LedgerState`] per event while holding that event's
//! lock: the event, every booking on it and its whole waitlist. The event,
//! booking and waitlist reducers mutate it in place, and the ledger writes
//! back whatever changed.

use super::booking::{Booking, BookingStatus, BookingWarning};
use super::event::Event;
use super::waitlist::{WaitlistEntry, held_seats};
use crate::cancellation::RefundPolicy;
use crate::config::BookingConfig;
use crate::effects::EffectRunner;
use crate::error::{Entity, LedgerError, Result};
use crate::types::{BookingId, WaitlistEntryId};
use crate::voucher::Voucher;
use chrono::{DateTime, Utc};
use seated_core::environment::Clock;
use std::sync::Arc;

// ============================================================================
// Environment
// ============================================================================

/// What the reducers may consult: time, platform rules and the effect
/// builders. No storage.
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Source of "now"
    pub clock: Arc<dyn Clock>,
    /// Platform rules
    pub config: BookingConfig,
    /// Refund table with the configured notice period
    pub refund_policy: RefundPolicy,
    /// Builds notification and payment effects
    pub effects: EffectRunner,
}

impl BookingEnvironment {
    /// Environment whose refund policy is derived from `config`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, config: BookingConfig, effects: EffectRunner) -> Self {
        Self {
            clock,
            refund_policy: RefundPolicy::new(config.refund_notice()),
            config,
            effects,
        }
    }
}

// ============================================================================
// State
// ============================================================================

/// One event and everything attached to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerState {
    /// The event
    pub event: Event,
    /// Every booking on the event
    pub bookings: Vec<Booking>,
    /// Every waitlist entry, in position order
    pub entries: Vec<WaitlistEntry>,
    /// Voucher named by the booking request being reduced, if it exists
    pub voucher: Option<Voucher>,
    /// Non-fatal problems found by the last booking request
    pub warnings: Vec<BookingWarning>,
    /// Error from the last action; nothing should be persisted when set
    pub last_error: Option<LedgerError>,
}

impl LedgerState {
    /// State over loaded records.
    #[must_use]
    pub fn new(event: Event, bookings: Vec<Booking>, entries: Vec<WaitlistEntry>) -> Self {
        Self {
            event,
            bookings,
            entries,
            voucher: None,
            warnings: Vec::new(),
            last_error: None,
        }
    }

    /// Attaches the voucher a request names.
    #[must_use]
    pub fn with_voucher(mut self, voucher: Option<Voucher>) -> Self {
        self.voucher = voucher;
        self
    }

    /// A booking by id.
    #[must_use]
    pub fn booking(&self, id: BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|booking| booking.id == id)
    }

    /// A waitlist entry by id.
    #[must_use]
    pub fn entry(&self, id: WaitlistEntryId) -> Option<&WaitlistEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub(crate) fn booking_mut(&mut self, id: BookingId) -> Result<&mut Booking> {
        self.bookings
            .iter_mut()
            .find(|booking| booking.id == id)
            .ok_or_else(|| LedgerError::not_found(Entity::Booking, id))
    }

    pub(crate) fn entry_mut(&mut self, id: WaitlistEntryId) -> Result<&mut WaitlistEntry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| LedgerError::not_found(Entity::WaitlistEntry, id))
    }

    /// Tickets held by live waitlist offers, ignoring `except`.
    #[must_use]
    pub fn held_seats(&self, now: DateTime<Utc>, except: Option<WaitlistEntryId>) -> u32 {
        held_seats(&self.entries, now, except)
    }

    /// Seats anyone can take: spots left less held offers, ignoring `except`.
    #[must_use]
    pub fn open_seats(&self, now: DateTime<Utc>, except: Option<WaitlistEntryId>) -> u32 {
        self.event
            .spots_left()
            .saturating_sub(self.held_seats(now, except))
    }

    /// The PENDING booking an offer was used on. Such an offer keeps holding
    /// its seats for that booking and cannot be used again.
    #[must_use]
    pub fn pending_claimant(&self, entry_id: WaitlistEntryId) -> Option<&Booking> {
        self.bookings.iter().find(|booking| {
            booking.status == BookingStatus::Pending && booking.waitlist_entry == Some(entry_id)
        })
    }
}
