//! Booking ledger.
//!
//! The store around the event and booking reducers. Each mutation follows
//! the same shape:
//!
//! 1. lock the event (and the voucher code, when a request names one)
//! 2. load the event with its bookings and waitlist
//! 3. reduce the action over that state
//! 4. persist what changed, undoing the booking write if the event write fails
//! 5. release the locks and run the effects the reducer returned

use super::environment::LedgerEnvironment;
use super::waitlist::WaitlistEngine;
use crate::aggregates::{
    Booking, BookingAction, BookingReducer, BookingStatus, BookingWarning, Event, EventAction,
    EventDraft, EventReducer, LedgerState, WaitlistEntry, WaitlistStatus,
};
use crate::effects::run_effects;
use crate::error::{Entity, LedgerError, Result};
use crate::types::{Actor, BookingId, EventId, GuestInfo, HostId, Money, WaitlistEntryId};

// ============================================================================
// Requests and outcomes
// ============================================================================

/// A guest's booking request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingRequest {
    /// Event to book
    pub event_id: EventId,
    /// Who is booking
    pub guest: GuestInfo,
    /// Seats wanted
    pub ticket_count: u32,
    /// Discount code, if any
    pub voucher_code: Option<String>,
    /// Waitlist offer being taken up, if any
    pub waitlist_entry: Option<WaitlistEntryId>,
}

impl BookingRequest {
    /// Plain request without voucher or waitlist offer.
    #[must_use]
    pub const fn new(event_id: EventId, guest: GuestInfo, ticket_count: u32) -> Self {
        Self {
            event_id,
            guest,
            ticket_count,
            voucher_code: None,
            waitlist_entry: None,
        }
    }

    /// Applies a voucher code.
    #[must_use]
    pub fn with_voucher(mut self, code: impl Into<String>) -> Self {
        self.voucher_code = Some(code.into());
        self
    }

    /// Takes up a waitlist offer.
    #[must_use]
    pub const fn from_waitlist(mut self, entry_id: WaitlistEntryId) -> Self {
        self.waitlist_entry = Some(entry_id);
        self
    }
}

/// Result of [`BookingLedger::create_booking`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingOutcome {
    /// The new booking
    pub booking: Booking,
    /// Anything the guest should be told
    pub warnings: Vec<BookingWarning>,
    /// The waitlist offer this booking used up. A PENDING booking keeps its
    /// offer until the host decides, so this is only set once approved.
    pub converted_entry: Option<WaitlistEntryId>,
}

/// Seat counts for one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Availability {
    /// The event
    pub event_id: EventId,
    /// Total seats
    pub capacity: u32,
    /// Capacity minus confirmed tickets
    pub spots_left: u32,
    /// Seats held for notified waitlist guests
    pub held_for_waitlist: u32,
    /// Seats anyone can book right now
    pub open: u32,
}

/// Result of [`BookingLedger::cancel_event`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventCancellation {
    /// The event, now cancelled
    pub event: Event,
    /// Bookings cancelled by the cascade
    pub bookings_cancelled: usize,
    /// Total refunded
    pub refunded: Money,
    /// Waitlist entries withdrawn
    pub waitlist_closed: usize,
}

impl EventCancellation {
    fn from_states(loaded: &LedgerState, after: LedgerState) -> Result<Self> {
        let cancelled: Vec<&Booking> = after
            .bookings
            .iter()
            .filter(|booking| {
                booking.status == BookingStatus::Cancelled
                    && loaded
                        .booking(booking.id)
                        .is_some_and(|previous| previous.status != BookingStatus::Cancelled)
            })
            .collect();
        let refunded = cancelled
            .iter()
            .filter_map(|booking| booking.refund)
            .try_fold(Money::ZERO, |total, refund| total.checked_add(refund.amount))
            .ok_or(LedgerError::AmountOverflow)?;
        let waitlist_closed = after
            .entries
            .iter()
            .filter(|entry| {
                !entry.is_active() && loaded.entry(entry.id).is_some_and(WaitlistEntry::is_active)
            })
            .count();
        let bookings_cancelled = cancelled.len();

        Ok(Self {
            bookings_cancelled,
            refunded,
            waitlist_closed,
            event: after.event,
        })
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// The booking ledger.
#[derive(Clone)]
pub struct BookingLedger {
    env: LedgerEnvironment,
    waitlist: WaitlistEngine,
}

impl BookingLedger {
    /// Ledger over `env`, with a waitlist engine sharing the same stores and
    /// locks.
    #[must_use]
    pub fn new(env: LedgerEnvironment) -> Self {
        Self {
            waitlist: WaitlistEngine::new(env.clone()),
            env,
        }
    }

    /// The waitlist engine wired to this ledger.
    #[must_use]
    pub const fn waitlist(&self) -> &WaitlistEngine {
        &self.waitlist
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    /// Creates a DRAFT event owned by `host_id`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidEvent`] if the draft fails validation.
    pub async fn create_event(&self, host_id: HostId, draft: EventDraft) -> Result<Event> {
        let event = Event::from_draft(
            EventId::new(),
            host_id,
            draft,
            self.env.rules.config.default_commission(),
            self.env.now(),
        )?;
        self.env.repos.events.save(event.clone()).await?;

        tracing::info!(event_id = %event.id, %host_id, capacity = event.capacity, "Event created");
        Ok(event)
    }

    /// DRAFT → PUBLISHED.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnauthorizedActor`] unless `actor` is the host, and
    /// [`LedgerError::InvalidStateTransition`] unless the event is a draft.
    pub async fn publish_event(&self, event_id: EventId, actor: Actor) -> Result<Event> {
        let (_, state) = self
            .env
            .dispatch(&EventReducer::new(), event_id, EventAction::Publish { actor })
            .await?;
        Ok(state.event)
    }

    /// Host cancels the whole event.
    ///
    /// Every PENDING or APPROVED booking is cancelled with a full refund of
    /// what was paid, and every active waitlist entry is withdrawn. Calling it
    /// again on a cancelled event finishes a cascade that was interrupted.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnauthorizedActor`] unless `actor` is the host
    /// - [`LedgerError::EventStarted`] once a published event has begun
    /// - [`LedgerError::InvalidStateTransition`] for a completed event
    pub async fn cancel_event(
        &self,
        event_id: EventId,
        actor: Actor,
        reason: Option<String>,
    ) -> Result<EventCancellation> {
        let (loaded, after) = self
            .env
            .dispatch(&EventReducer::new(), event_id, EventAction::Cancel { actor, reason })
            .await?;
        EventCancellation::from_states(&loaded, after)
    }

    /// PUBLISHED → COMPLETED once the event has started. Withdraws whatever
    /// is still on the waitlist. Bookings are settled one by one with
    /// [`Self::mark_completed`] and [`Self::mark_no_show`].
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnauthorizedActor`] unless `actor` is the host
    /// - [`LedgerError::EventNotStarted`] before the start time
    /// - [`LedgerError::InvalidStateTransition`] unless PUBLISHED
    pub async fn complete_event(&self, event_id: EventId, actor: Actor) -> Result<Event> {
        let (_, state) = self
            .env
            .dispatch(&EventReducer::new(), event_id, EventAction::Complete { actor })
            .await?;
        Ok(state.event)
    }

    // ------------------------------------------------------------------------
    // Bookings
    // ------------------------------------------------------------------------

    /// Books seats on a published event that has not started yet.
    ///
    /// Instant-booking events confirm immediately and take the seats; manual
    /// events create a PENDING request that holds nothing until approved. A
    /// guest's own live waitlist offer is not counted against them. Instant
    /// bookings convert it; a PENDING request keeps it NOTIFIED and holding
    /// its seats until the host decides.
    ///
    /// A lapsed offer does not block the request: it is reported as
    /// [`BookingWarning::WaitlistWindowExpired`] and the booking is taken
    /// from open seats.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::EventNotBookable`] unless the event is published
    /// - [`LedgerError::EventStarted`] from the start time on
    /// - [`LedgerError::InvalidTicketCount`] outside `1..=limit`
    /// - [`LedgerError::CapacityExceeded`] if too few spots are open
    pub async fn create_booking(&self, request: BookingRequest) -> Result<BookingOutcome> {
        let BookingRequest {
            event_id,
            guest,
            ticket_count,
            voucher_code,
            waitlist_entry,
        } = request;

        let guard = self.env.locks.lock(&event_id).await;
        // redemptions of one code are serialized across events
        let voucher_guard = match &voucher_code {
            Some(code) => Some(self.env.voucher_locks.lock(code).await),
            None => None,
        };
        let voucher = match &voucher_code {
            Some(code) => self.env.repos.vouchers.find(code).await?,
            None => None,
        };

        let mut state = self.env.load(event_id).await?.with_voucher(voucher);
        let booking_id = BookingId::new();
        let action = BookingAction::Request {
            booking_id,
            guest,
            ticket_count,
            voucher_code,
            waitlist_entry,
        };
        let effects = self.env.reduce(&BookingReducer::new(), &mut state, action).await?;
        drop(voucher_guard);
        drop(guard);

        run_effects(effects).await;

        let booking = state
            .booking(booking_id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found(Entity::Booking, booking_id))?;
        let converted_entry = booking.waitlist_entry.filter(|entry_id| {
            state
                .entry(*entry_id)
                .is_some_and(|entry| matches!(entry.status, WaitlistStatus::Converted { .. }))
        });
        Ok(BookingOutcome {
            booking,
            warnings: state.warnings,
            converted_entry,
        })
    }

    /// PENDING → APPROVED, taking the seats and converting the waitlist offer
    /// the request was made with.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnauthorizedActor`] unless `actor` is the host
    /// - [`LedgerError::InvalidStateTransition`] unless PENDING
    /// - [`LedgerError::EventStarted`] once the event has begun
    /// - [`LedgerError::CapacityExceeded`] if the seats are gone; the booking
    ///   stays PENDING
    pub async fn approve_booking(&self, booking_id: BookingId, actor: Actor) -> Result<Booking> {
        self.dispatch(booking_id, BookingAction::Approve { booking_id, actor })
            .await
    }

    /// PENDING → DECLINED. A waitlist offer the request was holding is
    /// withdrawn and its seats offered to the next guests.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnauthorizedActor`] unless `actor` is the host, and
    /// [`LedgerError::InvalidStateTransition`] unless PENDING.
    pub async fn decline_booking(&self, booking_id: BookingId, actor: Actor) -> Result<Booking> {
        self.dispatch(booking_id, BookingAction::Decline { booking_id, actor })
            .await
    }

    /// Guest or host cancels a PENDING or APPROVED booking before the event.
    ///
    /// The refund follows the cancellation policy. Seats freed by an APPROVED
    /// booking, or held for a PENDING one, are offered to the waitlist before
    /// the lock is released.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnauthorizedActor`] unless `actor` is the booking's
    ///   guest or the event's host
    /// - [`LedgerError::InvalidStateTransition`] from a terminal state
    /// - [`LedgerError::EventStarted`] once the event has begun
    pub async fn cancel_booking(
        &self,
        booking_id: BookingId,
        actor: Actor,
        reason: Option<String>,
    ) -> Result<Booking> {
        self.dispatch(
            booking_id,
            BookingAction::Cancel {
                booking_id,
                actor,
                reason,
            },
        )
        .await
    }

    /// Records the processor's payment confirmation.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidStateTransition`] unless the booking is APPROVED
    /// and unpaid.
    pub async fn mark_paid(&self, booking_id: BookingId) -> Result<Booking> {
        self.dispatch(booking_id, BookingAction::MarkPaid { booking_id })
            .await
    }

    /// APPROVED → COMPLETED, after the event started.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnauthorizedActor`], [`LedgerError::EventNotStarted`] or
    /// [`LedgerError::InvalidStateTransition`].
    pub async fn mark_completed(&self, booking_id: BookingId, actor: Actor) -> Result<Booking> {
        self.dispatch(booking_id, BookingAction::Complete { booking_id, actor })
            .await
    }

    /// APPROVED → NO_SHOW, after the event started. Records a zero refund.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnauthorizedActor`], [`LedgerError::EventNotStarted`] or
    /// [`LedgerError::InvalidStateTransition`].
    pub async fn mark_no_show(&self, booking_id: BookingId, actor: Actor) -> Result<Booking> {
        self.dispatch(booking_id, BookingAction::MarkNoShow { booking_id, actor })
            .await
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// One event.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for an unknown id.
    pub async fn event(&self, event_id: EventId) -> Result<Event> {
        self.env.event(event_id).await
    }

    /// One booking.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for an unknown id.
    pub async fn booking(&self, booking_id: BookingId) -> Result<Booking> {
        self.env.booking(booking_id).await
    }

    /// All bookings for an event, oldest first.
    ///
    /// # Errors
    ///
    /// Repository failures only.
    pub async fn bookings_for_event(&self, event_id: EventId) -> Result<Vec<Booking>> {
        Ok(self.env.repos.bookings.list_for_event(event_id).await?)
    }

    /// Seat counts as a guest would see them right now.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for an unknown event.
    pub async fn availability(&self, event_id: EventId) -> Result<Availability> {
        let state = self.env.load(event_id).await?;
        let now = self.env.now();

        Ok(Availability {
            event_id,
            capacity: state.event.capacity,
            spots_left: state.event.spots_left(),
            held_for_waitlist: state.held_seats(now, None),
            open: state.open_seats(now, None),
        })
    }

    async fn dispatch(&self, booking_id: BookingId, action: BookingAction) -> Result<Booking> {
        let event_id = self.env.booking(booking_id).await?.event_id;
        let (_, state) = self
            .env
            .dispatch(&BookingReducer::new(), event_id, action)
            .await?;
        state
            .booking(booking_id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found(Entity::Booking, booking_id))
    }
}
