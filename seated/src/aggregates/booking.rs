//! Booking aggregate: the reservation state machine.
//!
//! ```text
//! PENDING ──approve──▶ APPROVED ──complete──▶ COMPLETED
//!    │                    │  └────no-show───▶ NO_SHOW
//!    ├──decline──▶ DECLINED
//!    └──cancel───▶ CANCELLED ◀──cancel──┘
//! ```
//!
//! Manual-approval events start bookings at PENDING; instant-booking events
//! start them at APPROVED. Only APPROVED, COMPLETED and NO_SHOW occupy seats.

use super::event::{BookingMode, Event};
use super::state::{BookingEnvironment, LedgerState};
use super::waitlist::{WaitlistEntry, WaitlistStatus, forfeit, promote};
use crate::cancellation::{Initiator, RefundDecision};
use crate::commission::{Commission, calculate_commission};
use crate::effects::Effects;
use crate::error::{Entity, LedgerError, Result};
use crate::notifications::Notification;
use crate::types::{Actor, BookingId, EventId, GuestInfo, Money, WaitlistEntryId};
use crate::voucher::{VoucherError, validate_voucher};
use chrono::{DateTime, Utc};
use seated_core::SmallVec;
use seated_core::effect::Effect;
use seated_core::reducer::Reducer;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Status and transitions
// ============================================================================

/// Booking status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Waiting for the host
    Pending,
    /// Confirmed; seats are taken
    Approved,
    /// Guest attended
    Completed,
    /// Host turned the request down
    Declined,
    /// Cancelled by guest or host
    Cancelled,
    /// Guest did not attend
    NoShow,
}

impl BookingStatus {
    /// No further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Declined | Self::Cancelled | Self::NoShow
        )
    }

    /// The booking's tickets count against event capacity.
    #[must_use]
    pub const fn consumes_seats(self) -> bool {
        matches!(self, Self::Approved | Self::Completed | Self::NoShow)
    }

    /// Status after `transition`, or `None` if the move is not allowed.
    #[must_use]
    pub const fn next(self, transition: BookingTransition) -> Option<Self> {
        use BookingTransition as T;
        match (self, transition) {
            (Self::Pending, T::Approve) => Some(Self::Approved),
            (Self::Pending, T::Decline) => Some(Self::Declined),
            (Self::Pending | Self::Approved, T::Cancel) => Some(Self::Cancelled),
            (Self::Approved, T::Complete) => Some(Self::Completed),
            (Self::Approved, T::MarkNoShow) => Some(Self::NoShow),
            (Self::Pending, T::Complete | T::MarkNoShow)
            | (Self::Approved, T::Approve | T::Decline)
            | (Self::Completed | Self::Declined | Self::Cancelled | Self::NoShow, _) => None,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Completed => "COMPLETED",
            Self::Declined => "DECLINED",
            Self::Cancelled => "CANCELLED",
            Self::NoShow => "NO_SHOW",
        })
    }
}

/// A requested status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BookingTransition {
    /// Host accepts
    Approve,
    /// Host refuses
    Decline,
    /// Guest or host cancels
    Cancel,
    /// Host confirms attendance
    Complete,
    /// Host records absence
    MarkNoShow,
}

impl BookingTransition {
    const fn operation(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Decline => "decline",
            Self::Cancel => "cancel",
            Self::Complete => "complete",
            Self::MarkNoShow => "mark as no-show",
        }
    }
}

// ============================================================================
// Pricing
// ============================================================================

/// Price breakdown fixed at booking time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    /// `ticket_count × price`
    pub total_price: Money,
    /// Voucher discount, if one was applied
    pub voucher_discount: Option<Money>,
    /// Split of the amount charged
    pub commission: Commission,
}

impl Pricing {
    /// Prices `ticket_count` seats on `event`, less `discount`.
    ///
    /// Commission is taken from the amount the guest actually pays.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AmountOverflow`] if the gross does not fit.
    pub fn quote(event: &Event, ticket_count: u32, discount: Option<Money>) -> Result<Self> {
        let total_price = event
            .price
            .checked_mul(ticket_count)
            .ok_or(LedgerError::AmountOverflow)?;
        let voucher_discount = discount.map(|amount| amount.min(total_price));
        let charged = total_price.saturating_sub(voucher_discount.unwrap_or(Money::ZERO));

        Ok(Self {
            total_price,
            voucher_discount,
            commission: calculate_commission(charged, &event.commission),
        })
    }

    /// What the guest is asked to pay.
    #[must_use]
    pub const fn amount_due(&self) -> Money {
        self.commission.gross
    }
}

// ============================================================================
// Booking entity
// ============================================================================

/// A reservation of `ticket_count` seats on one event by one guest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Unique identifier
    pub id: BookingId,
    /// Event booked
    pub event_id: EventId,
    /// Who booked
    pub guest: GuestInfo,
    /// Seats requested
    pub ticket_count: u32,
    /// Current status
    pub status: BookingStatus,
    /// Gross, `ticket_count × price`
    pub total_price: Money,
    /// Voucher code that was applied
    pub voucher_code: Option<String>,
    /// Discount from that voucher
    pub voucher_discount: Option<Money>,
    /// Platform commission on the amount charged
    pub platform_fee: Money,
    /// Host share of the amount charged
    pub host_payout: Money,
    /// Request time
    pub created_at: DateTime<Utc>,
    /// Approval time (creation time for instant bookings)
    pub approved_at: Option<DateTime<Utc>>,
    /// When the payment processor confirmed payment
    pub paid_at: Option<DateTime<Utc>>,
    /// Cancellation time
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Free-text reason supplied on cancellation
    pub cancel_reason: Option<String>,
    /// Refund decided on cancellation or no-show
    pub refund: Option<RefundDecision>,
    /// Waitlist entry this booking was made from (advisory)
    pub waitlist_entry: Option<WaitlistEntryId>,
}

impl Booking {
    /// Opens a booking in the event's initial status.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        id: BookingId,
        event: &Event,
        guest: GuestInfo,
        ticket_count: u32,
        pricing: Pricing,
        voucher_code: Option<String>,
        waitlist_entry: Option<WaitlistEntryId>,
        now: DateTime<Utc>,
    ) -> Self {
        let (status, approved_at) = match event.booking_mode {
            BookingMode::Instant => (BookingStatus::Approved, Some(now)),
            BookingMode::Manual => (BookingStatus::Pending, None),
        };

        Self {
            id,
            event_id: event.id,
            guest,
            ticket_count,
            status,
            total_price: pricing.total_price,
            voucher_code,
            voucher_discount: pricing.voucher_discount,
            platform_fee: pricing.commission.fee,
            host_payout: pricing.commission.payout,
            created_at: now,
            approved_at,
            paid_at: None,
            cancelled_at: None,
            cancel_reason: None,
            refund: None,
            waitlist_entry,
        }
    }

    /// What the guest is charged: gross less discount.
    #[must_use]
    pub fn amount_due(&self) -> Money {
        self.total_price
            .saturating_sub(self.voucher_discount.unwrap_or(Money::ZERO))
    }

    /// What the guest has paid so far.
    #[must_use]
    pub fn amount_paid(&self) -> Money {
        if self.paid_at.is_some() {
            self.amount_due()
        } else {
            Money::ZERO
        }
    }

    /// Checks that `transition` is allowed without applying it.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidStateTransition`] if it is not.
    pub fn ensure_can(&self, transition: BookingTransition) -> Result<BookingStatus> {
        self.status
            .next(transition)
            .ok_or_else(|| LedgerError::transition(Entity::Booking, self.status, transition.operation()))
    }

    fn apply(&mut self, transition: BookingTransition) -> Result<BookingStatus> {
        let next = self.ensure_can(transition)?;
        let previous = self.status;
        self.status = next;
        Ok(previous)
    }

    /// PENDING → APPROVED.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidStateTransition`] unless PENDING.
    pub fn approve(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.apply(BookingTransition::Approve)?;
        self.approved_at = Some(now);
        Ok(())
    }

    /// PENDING → DECLINED.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidStateTransition`] unless PENDING.
    pub fn decline(&mut self) -> Result<()> {
        self.apply(BookingTransition::Decline).map(|_| ())
    }

    /// PENDING or APPROVED → CANCELLED. Returns the status it was cancelled from.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidStateTransition`] from a terminal state.
    pub fn cancel(
        &mut self,
        now: DateTime<Utc>,
        reason: Option<String>,
        refund: RefundDecision,
    ) -> Result<BookingStatus> {
        let previous = self.apply(BookingTransition::Cancel)?;
        self.cancelled_at = Some(now);
        self.cancel_reason = reason;
        self.refund = Some(refund);
        Ok(previous)
    }

    /// APPROVED → COMPLETED.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidStateTransition`] unless APPROVED.
    pub fn complete(&mut self) -> Result<()> {
        self.apply(BookingTransition::Complete).map(|_| ())
    }

    /// APPROVED → NO_SHOW, recording the (zero) refund.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidStateTransition`] unless APPROVED.
    pub fn mark_no_show(&mut self, refund: RefundDecision) -> Result<()> {
        self.apply(BookingTransition::MarkNoShow)?;
        self.refund = Some(refund);
        Ok(())
    }

    /// Records the processor's payment confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidStateTransition`] unless the booking is
    /// APPROVED and not yet paid.
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<()> {
        match (self.status, self.paid_at) {
            (BookingStatus::Approved, None) => {
                self.paid_at = Some(now);
                Ok(())
            }
            (BookingStatus::Approved, Some(_)) => {
                Err(LedgerError::transition(Entity::Booking, "APPROVED (paid)", "mark as paid"))
            }
            (status, _) => Err(LedgerError::transition(Entity::Booking, status, "mark as paid")),
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Non-fatal problems with a booking request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingWarning {
    /// The voucher was not applied; the full price is charged.
    InvalidVoucher(VoucherError),
    /// The named waitlist offer had lapsed. The booking was taken from open
    /// seats and the entry was left as it was.
    WaitlistWindowExpired {
        /// The lapsed entry
        entry_id: WaitlistEntryId,
        /// When its window closed
        expired_at: DateTime<Utc>,
    },
}

/// Commands against the bookings of one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingAction {
    /// A guest asks for seats.
    Request {
        /// Id for the new booking
        booking_id: BookingId,
        /// Who is booking
        guest: GuestInfo,
        /// Seats wanted
        ticket_count: u32,
        /// Discount code, if any
        voucher_code: Option<String>,
        /// Waitlist offer being taken up, if any
        waitlist_entry: Option<WaitlistEntryId>,
    },
    /// Host accepts a PENDING booking.
    Approve {
        /// The booking
        booking_id: BookingId,
        /// Who asks
        actor: Actor,
    },
    /// Host turns a PENDING booking down.
    Decline {
        /// The booking
        booking_id: BookingId,
        /// Who asks
        actor: Actor,
    },
    /// Guest or host cancels.
    Cancel {
        /// The booking
        booking_id: BookingId,
        /// Who asks
        actor: Actor,
        /// Free-text reason
        reason: Option<String>,
    },
    /// The processor confirmed payment.
    MarkPaid {
        /// The booking
        booking_id: BookingId,
    },
    /// Host confirms the guest attended.
    Complete {
        /// The booking
        booking_id: BookingId,
        /// Who asks
        actor: Actor,
    },
    /// Host records the guest did not attend.
    MarkNoShow {
        /// The booking
        booking_id: BookingId,
        /// Who asks
        actor: Actor,
    },
}

/// Reducer for [`BookingAction`].
///
/// Capacity is only ever checked against the [`LedgerState`] it is handed, so
/// the caller must hold the event's lock from load to persist.
#[derive(Clone, Copy, Debug, Default)]
pub struct BookingReducer;

impl BookingReducer {
    /// Creates the reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn apply(
        state: &mut LedgerState,
        action: BookingAction,
        env: &BookingEnvironment,
    ) -> Result<Effects<BookingAction>> {
        let now = env.clock.now();
        match action {
            BookingAction::Request {
                booking_id,
                guest,
                ticket_count,
                voucher_code,
                waitlist_entry,
            } => request(
                state,
                Request {
                    booking_id,
                    guest,
                    ticket_count,
                    voucher_code,
                    waitlist_entry,
                },
                now,
                env,
            ),
            BookingAction::Approve { booking_id, actor } => approve(state, booking_id, actor, now, env),
            BookingAction::Decline { booking_id, actor } => {
                state.event.ensure_host(actor, "decline bookings")?;
                let booking = state.booking_mut(booking_id)?;
                booking.decline()?;
                let email = booking.guest.email.clone();
                let entry = booking.waitlist_entry;
                tracing::info!(%booking_id, event_id = %state.event.id, "Booking declined");

                let mut effects: Effects<BookingAction> = Effects::new();
                effects.push(env.effects.notify(Notification::BookingDeclined { email, booking_id }));
                effects.extend(forfeit(state, entry, env));
                Ok(effects)
            }
            BookingAction::Cancel {
                booking_id,
                actor,
                reason,
            } => cancel(state, booking_id, actor, reason, now, env),
            BookingAction::MarkPaid { booking_id } => {
                let booking = state.booking_mut(booking_id)?;
                booking.mark_paid(now)?;
                tracing::info!(%booking_id, amount = booking.amount_paid().minor(), "Booking paid");
                Ok(Effects::new())
            }
            BookingAction::Complete { booking_id, actor } => {
                state.event.ensure_host(actor, "mark bookings completed")?;
                state.event.ensure_started(now, "mark bookings completed")?;
                state.booking_mut(booking_id)?.complete()?;
                tracing::info!(%booking_id, event_id = %state.event.id, "Booking completed");
                Ok(Effects::new())
            }
            BookingAction::MarkNoShow { booking_id, actor } => {
                state.event.ensure_host(actor, "mark bookings as no-show")?;
                state.event.ensure_started(now, "mark bookings as no-show")?;
                let booking = state
                    .booking(booking_id)
                    .ok_or_else(|| LedgerError::not_found(Entity::Booking, booking_id))?;
                let refund = env
                    .refund_policy
                    .compute_refund(booking, &state.event, Initiator::NoShow, now);
                state.booking_mut(booking_id)?.mark_no_show(refund)?;
                tracing::info!(%booking_id, event_id = %state.event.id, "Booking marked no-show");
                Ok(Effects::new())
            }
        }
    }
}

impl Reducer for BookingReducer {
    type State = LedgerState;
    type Action = BookingAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut LedgerState,
        action: BookingAction,
        env: &BookingEnvironment,
    ) -> SmallVec<[Effect<BookingAction>; 4]> {
        state.last_error = None;
        state.warnings.clear();
        match Self::apply(state, action, env) {
            Ok(effects) => effects,
            Err(error) => {
                state.last_error = Some(error);
                SmallVec::new()
            }
        }
    }
}

struct Request {
    booking_id: BookingId,
    guest: GuestInfo,
    ticket_count: u32,
    voucher_code: Option<String>,
    waitlist_entry: Option<WaitlistEntryId>,
}

/// The waitlist offer a request is taken against.
enum Claim {
    None,
    Offer(WaitlistEntryId),
    Lapsed {
        entry_id: WaitlistEntryId,
        expired_at: DateTime<Utc>,
    },
}

impl Claim {
    const fn offer(&self) -> Option<WaitlistEntryId> {
        match self {
            Self::Offer(entry_id) => Some(*entry_id),
            Self::None | Self::Lapsed { .. } => None,
        }
    }
}

/// A live offer not yet used by a PENDING booking.
fn usable(state: &LedgerState, entry: &WaitlistEntry, now: DateTime<Utc>) -> bool {
    entry.holds_seats(now) && state.pending_claimant(entry.id).is_none()
}

fn claim_for(
    state: &LedgerState,
    guest: &GuestInfo,
    named: Option<WaitlistEntryId>,
    now: DateTime<Utc>,
) -> Result<Claim> {
    let Some(entry_id) = named else {
        // an unnamed request still uses the guest's own live offer
        return Ok(state
            .entries
            .iter()
            .find(|entry| entry.guest.id == guest.id && usable(state, entry, now))
            .map_or(Claim::None, |entry| Claim::Offer(entry.id)));
    };

    let entry = state
        .entry(entry_id)
        .ok_or_else(|| LedgerError::not_found(Entity::WaitlistEntry, entry_id))?;
    if entry.guest.id != guest.id {
        return Err(LedgerError::UnauthorizedActor {
            operation: "book with another guest's waitlist offer",
        });
    }
    match entry.status {
        WaitlistStatus::Notified { expires_at, .. } if now > expires_at => Ok(Claim::Lapsed {
            entry_id,
            expired_at: expires_at,
        }),
        WaitlistStatus::Expired { expired_at, .. } => Ok(Claim::Lapsed { entry_id, expired_at }),
        WaitlistStatus::Notified { .. } if usable(state, entry, now) => Ok(Claim::Offer(entry_id)),
        WaitlistStatus::Notified { .. } => Err(LedgerError::transition(
            Entity::WaitlistEntry,
            "NOTIFIED (claimed by a pending booking)",
            "convert",
        )),
        status => Err(LedgerError::transition(Entity::WaitlistEntry, status, "convert")),
    }
}

#[allow(clippy::too_many_lines)]
fn request(
    state: &mut LedgerState,
    request: Request,
    now: DateTime<Utc>,
    env: &BookingEnvironment,
) -> Result<Effects<BookingAction>> {
    let Request {
        booking_id,
        guest,
        ticket_count,
        voucher_code,
        waitlist_entry,
    } = request;
    let event_id = state.event.id;

    state.event.ensure_bookable(now, "book")?;
    let max = state.event.ticket_limit(env.config.max_tickets_per_booking);
    if ticket_count == 0 || ticket_count > max {
        return Err(LedgerError::InvalidTicketCount {
            requested: ticket_count,
            max,
        });
    }

    let mut warnings = Vec::new();
    let claim = claim_for(state, &guest, waitlist_entry, now)?;
    if let Claim::Lapsed { entry_id, expired_at } = claim {
        tracing::info!(%event_id, %entry_id, %expired_at, "Waitlist offer lapsed; booking from open seats");
        warnings.push(BookingWarning::WaitlistWindowExpired { entry_id, expired_at });
    }

    let open = state.open_seats(now, claim.offer());
    if ticket_count > open {
        return Err(LedgerError::CapacityExceeded {
            requested: ticket_count,
            available: open,
        });
    }

    let gross = state
        .event
        .price
        .checked_mul(ticket_count)
        .ok_or(LedgerError::AmountOverflow)?;
    let discount = match voucher_code {
        None => None,
        Some(code) => {
            let checked = match state.voucher.as_ref().filter(|voucher| voucher.code == code) {
                Some(voucher) => validate_voucher(voucher, gross, now),
                None => Err(VoucherError::Unknown { code: code.clone() }),
            };
            match checked {
                Ok(discount) => Some((code, discount)),
                Err(error) => {
                    tracing::info!(%event_id, %error, "Voucher not applied");
                    warnings.push(BookingWarning::InvalidVoucher(error));
                    None
                }
            }
        }
    };

    let pricing = Pricing::quote(&state.event, ticket_count, discount.as_ref().map(|(_, amount)| *amount))?;
    let booking = Booking::open(
        booking_id,
        &state.event,
        guest,
        ticket_count,
        pricing,
        discount.map(|(code, _)| code),
        claim.offer(),
        now,
    );

    let approved = booking.status == BookingStatus::Approved;
    if approved {
        state.event.reserve_seats(ticket_count)?;
        if let Some(entry_id) = claim.offer() {
            state.entry_mut(entry_id)?.convert(booking_id, now)?;
            tracing::info!(%entry_id, %booking_id, %event_id, "Waitlist entry converted");
        }
    }
    if booking.voucher_discount.is_some() {
        if let Some(voucher) = state.voucher.as_mut() {
            voucher.record_use();
        }
    }

    tracing::info!(
        %booking_id,
        %event_id,
        ticket_count,
        status = %booking.status,
        amount_due = booking.amount_due().minor(),
        spots_left = state.event.spots_left(),
        "Booking created"
    );

    let mut effects = if approved {
        confirmation(&booking, env)
    } else {
        let mut effects = Effects::new();
        effects.push(env.effects.notify(Notification::BookingAwaitingApproval {
            email: booking.guest.email.clone(),
            booking_id,
        }));
        effects
    };
    effects.push(env.effects.notify(Notification::BookingRequested {
        host_id: state.event.host_id,
        booking_id,
        event_id,
        ticket_count,
        needs_approval: !approved,
    }));

    state.bookings.push(booking);
    state.warnings = warnings;
    Ok(effects)
}

fn approve(
    state: &mut LedgerState,
    booking_id: BookingId,
    actor: Actor,
    now: DateTime<Utc>,
    env: &BookingEnvironment,
) -> Result<Effects<BookingAction>> {
    state.event.ensure_host(actor, "approve bookings")?;
    let booking = state
        .booking(booking_id)
        .ok_or_else(|| LedgerError::not_found(Entity::Booking, booking_id))?;
    booking.ensure_can(BookingTransition::Approve)?;
    state.event.ensure_bookable(now, "approve a booking")?;

    // the offer this request was made with still holds its seats for it
    let claim = booking
        .waitlist_entry
        .filter(|entry_id| state.entry(*entry_id).is_some_and(|entry| entry.holds_seats(now)));
    let ticket_count = booking.ticket_count;
    let open = state.open_seats(now, claim);
    if ticket_count > open {
        return Err(LedgerError::CapacityExceeded {
            requested: ticket_count,
            available: open,
        });
    }

    state.event.reserve_seats(ticket_count)?;
    let booking = state.booking_mut(booking_id)?;
    booking.approve(now)?;
    let booking = booking.clone();
    if let Some(entry_id) = claim {
        state.entry_mut(entry_id)?.convert(booking_id, now)?;
    }

    tracing::info!(
        %booking_id,
        event_id = %state.event.id,
        ticket_count,
        converted_entry = ?claim,
        spots_left = state.event.spots_left(),
        "Booking approved"
    );
    Ok(confirmation(&booking, env))
}

fn cancel(
    state: &mut LedgerState,
    booking_id: BookingId,
    actor: Actor,
    reason: Option<String>,
    now: DateTime<Utc>,
    env: &BookingEnvironment,
) -> Result<Effects<BookingAction>> {
    let booking = state
        .booking(booking_id)
        .ok_or_else(|| LedgerError::not_found(Entity::Booking, booking_id))?;
    let initiator = match actor {
        Actor::Guest(guest_id) if guest_id == booking.guest.id => Initiator::Guest,
        Actor::Host(host_id) if host_id == state.event.host_id => Initiator::Host,
        Actor::Guest(_) | Actor::Host(_) | Actor::System => {
            return Err(LedgerError::UnauthorizedActor {
                operation: "cancel this booking",
            });
        }
    };
    booking.ensure_can(BookingTransition::Cancel)?;
    state.event.ensure_not_started(now, "cancel a booking")?;

    let refund = env
        .refund_policy
        .compute_refund(booking, &state.event, initiator, now);
    let booking = state.booking_mut(booking_id)?;
    let previous = booking.cancel(now, reason, refund)?;
    let email = booking.guest.email.clone();
    let entry = booking.waitlist_entry;
    let freed = if previous.consumes_seats() {
        booking.ticket_count
    } else {
        0
    };
    if freed > 0 {
        state.event.release_seats(freed);
    }

    tracing::info!(
        %booking_id,
        event_id = %state.event.id,
        ?initiator,
        from = %previous,
        refund = refund.amount.minor(),
        reason = ?refund.reason,
        freed,
        "Booking cancelled"
    );

    let mut effects: Effects<BookingAction> = Effects::new();
    effects.push(env.effects.refund(booking_id, refund.amount));
    effects.push(env.effects.notify(Notification::BookingCancelled {
        email,
        booking_id,
        refund,
    }));
    if freed > 0 {
        effects.extend(promote(state, env));
    } else if previous == BookingStatus::Pending {
        effects.extend(forfeit(state, entry, env));
    }
    Ok(effects)
}

fn confirmation(booking: &Booking, env: &BookingEnvironment) -> Effects<BookingAction> {
    let mut effects = Effects::new();
    effects.push(env.effects.payment_link(
        booking.id,
        booking.guest.email.clone(),
        booking.amount_due(),
    ));
    effects.push(env.effects.notify(Notification::BookingConfirmed {
        email: booking.guest.email.clone(),
        booking_id: booking.id,
        event_id: booking.event_id,
        amount_due: booking.amount_due(),
    }));
    effects
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::aggregates::test_support::{approved_paid_booking, guest, published_event};
    use crate::cancellation::RefundReason;
    use crate::commission::CommissionScheme;

    const ALL_STATUSES: [BookingStatus; 6] = [
        BookingStatus::Pending,
        BookingStatus::Approved,
        BookingStatus::Completed,
        BookingStatus::Declined,
        BookingStatus::Cancelled,
        BookingStatus::NoShow,
    ];

    const ALL_TRANSITIONS: [BookingTransition; 5] = [
        BookingTransition::Approve,
        BookingTransition::Decline,
        BookingTransition::Cancel,
        BookingTransition::Complete,
        BookingTransition::MarkNoShow,
    ];

    fn manual_booking() -> Booking {
        let mut event = published_event(8, 20_000);
        event.booking_mode = BookingMode::Manual;
        let pricing = Pricing::quote(&event, 2, None).unwrap();
        Booking::open(BookingId::new(), &event, guest("Ola"), 2, pricing, None, None, Utc::now())
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for status in ALL_STATUSES.into_iter().filter(|s| s.is_terminal()) {
            for transition in ALL_TRANSITIONS {
                assert_eq!(status.next(transition), None, "{status} --{transition:?}");
            }
        }
    }

    #[test]
    fn only_documented_edges_exist() {
        let allowed: Vec<_> = ALL_STATUSES
            .into_iter()
            .flat_map(|s| ALL_TRANSITIONS.into_iter().filter_map(move |t| s.next(t).map(|n| (s, n))))
            .collect();

        assert_eq!(
            allowed,
            vec![
                (BookingStatus::Pending, BookingStatus::Approved),
                (BookingStatus::Pending, BookingStatus::Declined),
                (BookingStatus::Pending, BookingStatus::Cancelled),
                (BookingStatus::Approved, BookingStatus::Cancelled),
                (BookingStatus::Approved, BookingStatus::Completed),
                (BookingStatus::Approved, BookingStatus::NoShow),
            ]
        );
    }

    #[test]
    fn instant_events_open_approved() {
        let event = published_event(8, 20_000);
        let pricing = Pricing::quote(&event, 1, None).unwrap();
        let now = Utc::now();
        let booking = Booking::open(BookingId::new(), &event, guest("Jan"), 1, pricing, None, None, now);

        assert_eq!(booking.status, BookingStatus::Approved);
        assert_eq!(booking.approved_at, Some(now));
    }

    #[test]
    fn failed_approval_leaves_booking_untouched() {
        let mut booking = manual_booking();
        booking.approve(Utc::now()).unwrap();
        let snapshot = booking.clone();

        let again = booking.approve(Utc::now());

        assert!(matches!(again, Err(LedgerError::InvalidStateTransition { .. })));
        assert_eq!(booking, snapshot);
    }

    #[test]
    fn pricing_applies_discount_before_commission() {
        let mut event = published_event(8, 10_000);
        event.commission = CommissionScheme::Percentage(10);

        let pricing = Pricing::quote(&event, 2, Some(Money::from_minor(5_000))).unwrap();

        assert_eq!(pricing.total_price, Money::from_minor(20_000));
        assert_eq!(pricing.amount_due(), Money::from_minor(15_000));
        assert_eq!(pricing.commission.fee, Money::from_minor(1_500));
        assert_eq!(pricing.commission.payout, Money::from_minor(13_500));
    }

    #[test]
    fn refund_basis_is_zero_until_paid() {
        let mut booking = manual_booking();
        booking.approve(Utc::now()).unwrap();
        assert_eq!(booking.amount_paid(), Money::ZERO);

        booking.mark_paid(Utc::now()).unwrap();
        assert_eq!(booking.amount_paid(), Money::from_minor(40_000));
        assert!(booking.mark_paid(Utc::now()).is_err());
    }

    #[test]
    fn cancel_reports_previous_status() {
        let mut booking = manual_booking();
        let refund = RefundDecision { amount: Money::ZERO, reason: RefundReason::GuestCancelledInTime };

        let previous = booking.cancel(Utc::now(), Some("plans changed".into()), refund).unwrap();

        assert_eq!(previous, BookingStatus::Pending);
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert_eq!(booking.cancel_reason.as_deref(), Some("plans changed"));
    }

    // ------------------------------------------------------------------------
    // Reducer
    // ------------------------------------------------------------------------

    mod reducer {
        use super::*;
        use crate::aggregates::test_support::{environment_at, waiting_entry};
        use chrono::Duration;
        use seated_testing::{ReducerTest, assertions};

        /// Capacity-1 event whose only seat is held by a notified entry.
        fn offered_seat(mode: BookingMode, notified_at: DateTime<Utc>) -> (LedgerState, WaitlistEntry) {
            let mut event = published_event(1, 20_000);
            event.booking_mode = mode;
            let mut entry = waiting_entry(&event, "Zofia", 1);
            entry.notify(notified_at, Duration::hours(12)).unwrap();
            (LedgerState::new(event, Vec::new(), vec![entry.clone()]), entry)
        }

        fn request_with(entry: &WaitlistEntry, booking_id: BookingId) -> BookingAction {
            BookingAction::Request {
                booking_id,
                guest: entry.guest.clone(),
                ticket_count: 1,
                voucher_code: None,
                waitlist_entry: Some(entry.id),
            }
        }

        #[test]
        fn lapsed_offer_books_open_seats_with_a_warning() {
            let now = Utc::now();
            let (state, entry) = offered_seat(BookingMode::Instant, now - Duration::hours(13));
            let expired_at = entry.expires_at().unwrap();
            let booking_id = BookingId::new();

            ReducerTest::new(BookingReducer::new())
                .with_env(environment_at(now))
                .given_state(state)
                .when_action(request_with(&entry, booking_id))
                .then_state(move |state| {
                    assert_eq!(state.last_error, None);
                    assert_eq!(
                        state.warnings,
                        vec![BookingWarning::WaitlistWindowExpired { entry_id: entry.id, expired_at }]
                    );
                    let booking = state.booking(booking_id).unwrap();
                    assert_eq!(booking.status, BookingStatus::Approved);
                    assert_eq!(booking.waitlist_entry, None);
                    assert_eq!(state.entry(entry.id).unwrap().status, entry.status);
                    assert_eq!(state.event.spots_left(), 0);
                })
                .then_effects(|effects| assertions::assert_effects_count(effects, 3))
                .run();
        }

        #[test]
        fn pending_request_keeps_the_offer_until_approval() {
            let now = Utc::now();
            let env = environment_at(now);
            let (mut state, entry) = offered_seat(BookingMode::Manual, now - Duration::hours(1));
            let booking_id = BookingId::new();
            let reducer = BookingReducer::new();

            let _ = reducer.reduce(&mut state, request_with(&entry, booking_id), &env);

            assert_eq!(state.last_error, None);
            assert_eq!(state.booking(booking_id).unwrap().status, BookingStatus::Pending);
            assert!(matches!(state.entry(entry.id).unwrap().status, WaitlistStatus::Notified { .. }));
            assert_eq!(state.held_seats(now, None), 1);
            assert_eq!(state.pending_claimant(entry.id).map(|booking| booking.id), Some(booking_id));

            let host = Actor::Host(state.event.host_id);
            ReducerTest::new(reducer)
                .with_env(env)
                .given_state(state)
                .when_action(BookingAction::Approve { booking_id, actor: host })
                .then_state(move |state| {
                    assert_eq!(state.last_error, None);
                    assert_eq!(state.booking(booking_id).unwrap().status, BookingStatus::Approved);
                    assert!(matches!(
                        state.entry(entry.id).unwrap().status,
                        WaitlistStatus::Converted { booking_id: converted, .. } if converted == booking_id
                    ));
                    assert_eq!(state.held_seats(now, None), 0);
                    assert_eq!(state.event.spots_left(), 0);
                })
                .then_effects(assertions::assert_has_future_effect)
                .run();
        }

        #[test]
        fn decline_forfeits_the_offer_and_promotes_the_next_guest() {
            let now = Utc::now();
            let env = environment_at(now);
            let (mut state, entry) = offered_seat(BookingMode::Manual, now - Duration::hours(1));
            let next = waiting_entry(&state.event, "Piotr", 2);
            state.entries.push(next.clone());
            let booking_id = BookingId::new();
            let _ = BookingReducer::new().reduce(&mut state, request_with(&entry, booking_id), &env);
            let host = Actor::Host(state.event.host_id);

            ReducerTest::new(BookingReducer::new())
                .with_env(env)
                .given_state(state)
                .when_action(BookingAction::Decline { booking_id, actor: host })
                .then_state(move |state| {
                    assert_eq!(state.last_error, None);
                    assert_eq!(state.booking(booking_id).unwrap().status, BookingStatus::Declined);
                    assert!(matches!(state.entry(entry.id).unwrap().status, WaitlistStatus::Withdrawn { .. }));
                    assert_eq!(state.entry(next.id).unwrap().expires_at(), Some(now + Duration::hours(12)));
                    assert_eq!(state.open_seats(now, None), 0);
                })
                // declined notice and the new offer
                .then_effects(|effects| assertions::assert_effects_count(effects, 2))
                .run();
        }

        #[test]
        fn cancellation_after_start_is_rejected() {
            let mut event = published_event(8, 20_000);
            let booking = approved_paid_booking(&event, 2);
            event.reserve_seats(2).unwrap();
            let starts_at = event.starts_at;
            let actor = Actor::Guest(booking.guest.id);
            let booking_id = booking.id;

            ReducerTest::new(BookingReducer::new())
                .with_env(environment_at(starts_at + Duration::minutes(5)))
                .given_state(LedgerState::new(event, vec![booking], Vec::new()))
                .when_action(BookingAction::Cancel { booking_id, actor, reason: None })
                .then_state(move |state| {
                    assert_eq!(
                        state.last_error,
                        Some(LedgerError::EventStarted { operation: "cancel a booking", starts_at })
                    );
                    assert_eq!(state.booking(booking_id).unwrap().status, BookingStatus::Approved);
                    assert_eq!(state.event.spots_left(), 6);
                })
                .then_effects(assertions::assert_no_effects)
                .run();
        }

        #[test]
        fn booking_after_start_is_rejected() {
            let event = published_event(8, 20_000);
            let starts_at = event.starts_at;

            ReducerTest::new(BookingReducer::new())
                .with_env(environment_at(starts_at + Duration::days(1)))
                .given_state(LedgerState::new(event, Vec::new(), Vec::new()))
                .when_action(BookingAction::Request {
                    booking_id: BookingId::new(),
                    guest: guest("Ola"),
                    ticket_count: 1,
                    voucher_code: None,
                    waitlist_entry: None,
                })
                .then_state(move |state| {
                    assert_eq!(
                        state.last_error,
                        Some(LedgerError::EventStarted { operation: "book", starts_at })
                    );
                    assert!(state.bookings.is_empty());
                })
                .then_effects(assertions::assert_no_effects)
                .run();
        }
    }
}
