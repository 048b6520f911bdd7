//! Event aggregate: lifecycle and seat accounting.
//!
//! Seats are counted, not assigned. `spots_left` is always derived from
//! `capacity - confirmed_tickets`, and confirmed tickets only move through
//! [`Event::reserve_seats`] and [`Event::release_seats`].

use super::booking::BookingTransition;
use super::state::{BookingEnvironment, LedgerState};
use super::waitlist::close;
use crate::cancellation::Initiator;
use crate::commission::CommissionScheme;
use crate::effects::Effects;
use crate::error::{Entity, LedgerError, Result};
use crate::notifications::Notification;
use crate::types::{Actor, EventId, HostId, Money};
use chrono::{DateTime, Utc};
use seated_core::SmallVec;
use seated_core::effect::Effect;
use seated_core::reducer::Reducer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Being configured, not visible to guests
    Draft,
    /// Listed and open for bookings
    Published,
    /// Called off by the host
    Cancelled,
    /// Took place
    Completed,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Draft => "DRAFT",
            Self::Published => "PUBLISHED",
            Self::Cancelled => "CANCELLED",
            Self::Completed => "COMPLETED",
        })
    }
}

/// Whether bookings need a host decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingMode {
    /// Bookings are approved on creation
    Instant,
    /// Bookings wait for the host to approve or decline
    Manual,
}

/// What a host submits when creating an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    /// Listing title
    pub title: String,
    /// When the event begins
    pub starts_at: DateTime<Utc>,
    /// Total seats
    pub capacity: u32,
    /// Price per ticket
    pub price: Money,
    /// Largest single booking the host accepts
    pub max_tickets_per_booking: u32,
    /// Instant or manual approval
    pub booking_mode: BookingMode,
    /// Platform commission; the platform default applies when absent
    pub commission: Option<CommissionScheme>,
}

/// A hosted event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier
    pub id: EventId,
    /// Owner
    pub host_id: HostId,
    /// Listing title
    pub title: String,
    /// When the event begins
    pub starts_at: DateTime<Utc>,
    /// Total seats
    pub capacity: u32,
    /// Price per ticket
    pub price: Money,
    /// Largest single booking the host accepts
    pub max_tickets_per_booking: u32,
    /// Instant or manual approval
    pub booking_mode: BookingMode,
    /// Platform commission for this event
    pub commission: CommissionScheme,
    /// Lifecycle status
    pub status: EventStatus,
    /// When the host created the listing
    pub created_at: DateTime<Utc>,
    confirmed_tickets: u32,
}

impl Event {
    /// Creates a draft event from a host submission, filling in
    /// `default_commission` when the draft names none.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidEvent`] for a zero capacity, a zero
    /// per-booking limit, or an empty title.
    pub fn from_draft(
        id: EventId,
        host_id: HostId,
        draft: EventDraft,
        default_commission: CommissionScheme,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        if draft.title.trim().is_empty() {
            return Err(LedgerError::InvalidEvent {
                reason: "title must not be empty".to_string(),
            });
        }
        if draft.capacity == 0 {
            return Err(LedgerError::InvalidEvent {
                reason: "capacity must be greater than zero".to_string(),
            });
        }
        if draft.max_tickets_per_booking == 0 {
            return Err(LedgerError::InvalidEvent {
                reason: "max tickets per booking must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            id,
            host_id,
            title: draft.title,
            starts_at: draft.starts_at,
            capacity: draft.capacity,
            price: draft.price,
            max_tickets_per_booking: draft.max_tickets_per_booking,
            booking_mode: draft.booking_mode,
            commission: draft.commission.unwrap_or(default_commission),
            status: EventStatus::Draft,
            created_at,
            confirmed_tickets: 0,
        })
    }

    /// Seats held by approved, completed and no-show bookings.
    #[must_use]
    pub const fn confirmed_tickets(&self) -> u32 {
        self.confirmed_tickets
    }

    /// Capacity minus confirmed tickets.
    #[must_use]
    pub const fn spots_left(&self) -> u32 {
        self.capacity.saturating_sub(self.confirmed_tickets)
    }

    /// Listed and not yet begun: bookings and waitlist offers are open.
    #[must_use]
    pub fn is_bookable(&self, now: DateTime<Utc>) -> bool {
        self.status == EventStatus::Published && now < self.starts_at
    }

    /// Checks the event takes bookings at `now`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::EventNotBookable`] unless published, and
    /// [`LedgerError::EventStarted`] from the start time on.
    pub fn ensure_bookable(&self, now: DateTime<Utc>, operation: &'static str) -> Result<()> {
        if self.status != EventStatus::Published {
            return Err(LedgerError::EventNotBookable {
                event_id: self.id,
                status: self.status,
            });
        }
        self.ensure_not_started(now, operation)
    }

    /// `now` is past the start time.
    #[must_use]
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now > self.starts_at
    }

    /// # Errors
    ///
    /// [`LedgerError::EventStarted`] from the start time on.
    pub fn ensure_not_started(&self, now: DateTime<Utc>, operation: &'static str) -> Result<()> {
        if now >= self.starts_at {
            return Err(LedgerError::EventStarted {
                operation,
                starts_at: self.starts_at,
            });
        }
        Ok(())
    }

    /// Post-event bookkeeping is only possible once the event is under way.
    ///
    /// # Errors
    ///
    /// [`LedgerError::EventNotStarted`] until the start time has passed.
    pub fn ensure_started(&self, now: DateTime<Utc>, operation: &'static str) -> Result<()> {
        if !self.has_started(now) {
            return Err(LedgerError::EventNotStarted {
                operation,
                starts_at: self.starts_at,
            });
        }
        Ok(())
    }

    /// # Errors
    ///
    /// [`LedgerError::UnauthorizedActor`] unless `actor` is this event's host.
    pub fn ensure_host(&self, actor: Actor, operation: &'static str) -> Result<()> {
        match actor {
            Actor::Host(host_id) if host_id == self.host_id => Ok(()),
            Actor::Host(_) | Actor::Guest(_) | Actor::System => {
                Err(LedgerError::UnauthorizedActor { operation })
            }
        }
    }

    /// Per-booking ticket limit: the stricter of the event's and the platform's.
    #[must_use]
    pub fn ticket_limit(&self, platform_max: u32) -> u32 {
        self.max_tickets_per_booking.min(platform_max)
    }

    /// Takes `count` seats.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::CapacityExceeded`] if fewer than `count` spots
    /// are left; the event is unchanged.
    pub fn reserve_seats(&mut self, count: u32) -> Result<()> {
        let available = self.spots_left();
        if count > available {
            return Err(LedgerError::CapacityExceeded {
                requested: count,
                available,
            });
        }
        self.confirmed_tickets += count;
        Ok(())
    }

    /// Gives back `count` seats.
    pub fn release_seats(&mut self, count: u32) {
        if count > self.confirmed_tickets {
            tracing::warn!(
                event_id = %self.id,
                count,
                confirmed = self.confirmed_tickets,
                "Releasing more seats than were confirmed"
            );
        }
        self.confirmed_tickets = self.confirmed_tickets.saturating_sub(count);
    }

    /// Draft → Published.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidStateTransition`] from any other status.
    pub fn publish(&mut self) -> Result<()> {
        match self.status {
            EventStatus::Draft => {
                self.status = EventStatus::Published;
                Ok(())
            }
            EventStatus::Published | EventStatus::Cancelled | EventStatus::Completed => {
                Err(LedgerError::transition(Entity::Event, self.status, "publish"))
            }
        }
    }

    /// Draft or Published → Cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidStateTransition`] if the event is already
    /// cancelled or completed.
    pub fn cancel(&mut self) -> Result<()> {
        match self.status {
            EventStatus::Draft | EventStatus::Published => {
                self.status = EventStatus::Cancelled;
                Ok(())
            }
            EventStatus::Cancelled | EventStatus::Completed => {
                Err(LedgerError::transition(Entity::Event, self.status, "cancel"))
            }
        }
    }

    /// Published → Completed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidStateTransition`] from any other status.
    pub fn complete(&mut self) -> Result<()> {
        match self.status {
            EventStatus::Published => {
                self.status = EventStatus::Completed;
                Ok(())
            }
            EventStatus::Draft | EventStatus::Cancelled | EventStatus::Completed => {
                Err(LedgerError::transition(Entity::Event, self.status, "complete"))
            }
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Host commands against an event as a whole.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventAction {
    /// Draft → Published
    Publish {
        /// Who asks
        actor: Actor,
    },
    /// Call the event off, cancelling every live booking and closing the
    /// waitlist. Repeating it on a cancelled event finishes the cascade.
    Cancel {
        /// Who asks
        actor: Actor,
        /// Recorded on every cancelled booking
        reason: Option<String>,
    },
    /// Published → Completed once the event took place. Closes the waitlist.
    Complete {
        /// Who asks
        actor: Actor,
    },
}

/// Reducer for [`EventAction`].
#[derive(Clone, Copy, Debug, Default)]
pub struct EventReducer;

impl EventReducer {
    /// Creates the reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn apply(state: &mut LedgerState, action: EventAction, env: &BookingEnvironment) -> Result<Effects<EventAction>> {
        let now = env.clock.now();
        match action {
            EventAction::Publish { actor } => {
                state.event.ensure_host(actor, "publish this event")?;
                state.event.publish()?;
                tracing::info!(event_id = %state.event.id, "Event published");
                Ok(Effects::new())
            }
            EventAction::Cancel { actor, reason } => {
                state.event.ensure_host(actor, "cancel this event")?;
                if state.event.status == EventStatus::Published {
                    state.event.ensure_not_started(now, "cancel an event")?;
                }
                if state.event.status != EventStatus::Cancelled {
                    state.event.cancel()?;
                }
                Ok(cancel_cascade(state, reason, now, env))
            }
            EventAction::Complete { actor } => {
                state.event.ensure_host(actor, "complete this event")?;
                state.event.ensure_started(now, "complete an event")?;
                state.event.complete()?;

                let effects = close(state, env);
                tracing::info!(
                    event_id = %state.event.id,
                    waitlist_closed = effects.len(),
                    "Event completed"
                );
                Ok(effects)
            }
        }
    }
}

impl Reducer for EventReducer {
    type State = LedgerState;
    type Action = EventAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut LedgerState,
        action: EventAction,
        env: &BookingEnvironment,
    ) -> SmallVec<[Effect<EventAction>; 4]> {
        state.last_error = None;
        match Self::apply(state, action, env) {
            Ok(effects) => effects,
            Err(error) => {
                state.last_error = Some(error);
                SmallVec::new()
            }
        }
    }
}

/// Cancels every PENDING or APPROVED booking with a full refund of what was
/// paid, then withdraws the waitlist.
fn cancel_cascade(
    state: &mut LedgerState,
    reason: Option<String>,
    now: DateTime<Utc>,
    env: &BookingEnvironment,
) -> Effects<EventAction> {
    let mut effects = Effects::new();
    let mut freed = 0u32;
    let mut cancelled = 0usize;
    let mut refunded = Money::ZERO;

    let live = state
        .bookings
        .iter_mut()
        .filter(|booking| booking.ensure_can(BookingTransition::Cancel).is_ok());
    for booking in live {
        let refund = env.refund_policy.compute_refund(
            booking,
            &state.event,
            Initiator::EventCancellation,
            now,
        );
        let Ok(previous) = booking.cancel(now, reason.clone(), refund) else {
            continue;
        };
        if previous.consumes_seats() {
            freed = freed.saturating_add(booking.ticket_count);
        }
        cancelled += 1;
        refunded = refunded.saturating_add(refund.amount);
        effects.push(env.effects.refund(booking.id, refund.amount));
        effects.push(env.effects.notify(Notification::BookingCancelled {
            email: booking.guest.email.clone(),
            booking_id: booking.id,
            refund,
        }));
    }
    state.event.release_seats(freed);

    let closed = close(state, env);
    tracing::info!(
        event_id = %state.event.id,
        bookings_cancelled = cancelled,
        refunded = refunded.minor(),
        waitlist_closed = closed.len(),
        "Event cancelled"
    );
    effects.extend(closed);
    effects
}
