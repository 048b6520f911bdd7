//! Waitlist entries and the pure parts of promotion.
//!
//! An entry is WAITING until capacity frees up, then NOTIFIED with a
//! conversion window. Inside the window its tickets are held for it; after
//! the window it can only expire. Positions are FIFO and never reused.

use super::booking::BookingStatus;
use super::state::{BookingEnvironment, LedgerState};
use crate::effects::Effects;
use crate::error::{Entity, LedgerError, Result};
use crate::notifications::Notification;
use crate::types::{Actor, BookingId, EventId, GuestInfo, WaitlistEntryId};
use chrono::{DateTime, Duration, Utc};
use seated_core::SmallVec;
use seated_core::effect::Effect;
use seated_core::reducer::Reducer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an entry is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WaitlistStatus {
    /// In the queue
    Waiting,
    /// Offered a spot; may convert until `expires_at`
    Notified {
        /// When the offer went out
        notified_at: DateTime<Utc>,
        /// End of the conversion window
        expires_at: DateTime<Utc>,
    },
    /// The window closed without a booking
    Expired {
        /// When the offer went out
        notified_at: DateTime<Utc>,
        /// When the entry was swept
        expired_at: DateTime<Utc>,
    },
    /// Turned into a booking
    Converted {
        /// The booking made from this entry
        booking_id: BookingId,
        /// When the booking was made
        converted_at: DateTime<Utc>,
    },
    /// Left the queue, or the event was cancelled
    Withdrawn {
        /// When it was withdrawn
        withdrawn_at: DateTime<Utc>,
    },
}

impl fmt::Display for WaitlistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Waiting => "WAITING",
            Self::Notified { .. } => "NOTIFIED",
            Self::Expired { .. } => "EXPIRED",
            Self::Converted { .. } => "CONVERTED",
            Self::Withdrawn { .. } => "WITHDRAWN",
        })
    }
}

/// One guest's place in an event's queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    /// Unique identifier
    pub id: WaitlistEntryId,
    /// Event queued for
    pub event_id: EventId,
    /// Who is waiting
    pub guest: GuestInfo,
    /// 1-based FIFO position, unique per event
    pub position: u32,
    /// Seats wanted
    pub tickets_wanted: u32,
    /// When the guest joined
    pub joined_at: DateTime<Utc>,
    /// Lifecycle state
    pub status: WaitlistStatus,
}

impl WaitlistEntry {
    /// Creates a WAITING entry.
    #[must_use]
    pub const fn new(
        id: WaitlistEntryId,
        event_id: EventId,
        guest: GuestInfo,
        position: u32,
        tickets_wanted: u32,
        joined_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            event_id,
            guest,
            position,
            tickets_wanted,
            joined_at,
            status: WaitlistStatus::Waiting,
        }
    }

    /// When the entry was notified, if it ever was.
    #[must_use]
    pub const fn notified_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            WaitlistStatus::Notified { notified_at, .. }
            | WaitlistStatus::Expired { notified_at, .. } => Some(notified_at),
            WaitlistStatus::Waiting
            | WaitlistStatus::Converted { .. }
            | WaitlistStatus::Withdrawn { .. } => None,
        }
    }

    /// End of the conversion window while NOTIFIED.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            WaitlistStatus::Notified { expires_at, .. } => Some(expires_at),
            _ => None,
        }
    }

    /// WAITING or NOTIFIED.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(
            self.status,
            WaitlistStatus::Waiting | WaitlistStatus::Notified { .. }
        )
    }

    /// NOTIFIED and still inside the window: its tickets are reserved for it.
    #[must_use]
    pub fn holds_seats(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expires_at| now <= expires_at)
    }

    /// NOTIFIED and past the window: due for the sweeper.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expires_at| now > expires_at)
    }

    /// WAITING → NOTIFIED with a window of `window` from `now`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidStateTransition`] unless WAITING.
    pub fn notify(&mut self, now: DateTime<Utc>, window: Duration) -> Result<DateTime<Utc>> {
        if self.status != WaitlistStatus::Waiting {
            return Err(LedgerError::transition(Entity::WaitlistEntry, self.status, "notify"));
        }
        let expires_at = now.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.status = WaitlistStatus::Notified {
            notified_at: now,
            expires_at,
        };
        Ok(expires_at)
    }

    /// Checks the entry may convert at `now` without changing it.
    ///
    /// # Errors
    ///
    /// [`LedgerError::WaitlistWindowExpired`] past the window, and
    /// [`LedgerError::InvalidStateTransition`] unless NOTIFIED.
    pub fn ensure_convertible(&self, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            WaitlistStatus::Notified { expires_at, .. } if now > expires_at => {
                Err(LedgerError::WaitlistWindowExpired {
                    entry_id: self.id,
                    expired_at: expires_at,
                })
            }
            WaitlistStatus::Notified { .. } => Ok(()),
            status => Err(LedgerError::transition(Entity::WaitlistEntry, status, "convert")),
        }
    }

    /// NOTIFIED → CONVERTED, inside the window only.
    ///
    /// # Errors
    ///
    /// See [`Self::ensure_convertible`]. The entry is unchanged on error.
    pub fn convert(&mut self, booking_id: BookingId, now: DateTime<Utc>) -> Result<()> {
        self.ensure_convertible(now)?;
        self.status = WaitlistStatus::Converted {
            booking_id,
            converted_at: now,
        };
        Ok(())
    }

    /// NOTIFIED → EXPIRED, only once the window has passed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidStateTransition`] unless the entry is
    /// stale.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            WaitlistStatus::Notified {
                notified_at,
                expires_at,
            } if now > expires_at => {
                self.status = WaitlistStatus::Expired {
                    notified_at,
                    expired_at: now,
                };
                Ok(())
            }
            status => Err(LedgerError::transition(Entity::WaitlistEntry, status, "expire")),
        }
    }

    /// WAITING or NOTIFIED → WITHDRAWN.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidStateTransition`] from a final state.
    pub fn withdraw(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.is_active() {
            return Err(LedgerError::transition(Entity::WaitlistEntry, self.status, "withdraw"));
        }
        self.status = WaitlistStatus::Withdrawn { withdrawn_at: now };
        Ok(())
    }
}

/// Position for the next joiner given the current maximum.
#[must_use]
pub fn next_position(current_max: Option<u32>) -> u32 {
    current_max.map_or(1, |max| max.saturating_add(1))
}

/// Tickets held by unexpired NOTIFIED entries, ignoring `except`.
#[must_use]
pub fn held_seats(
    entries: &[WaitlistEntry],
    now: DateTime<Utc>,
    except: Option<WaitlistEntryId>,
) -> u32 {
    entries
        .iter()
        .filter(|entry| Some(entry.id) != except && entry.holds_seats(now))
        .fold(0u32, |held, entry| held.saturating_add(entry.tickets_wanted))
}

/// Picks WAITING entries to notify for `free` seats.
///
/// Walks in position order and takes every entry that still fits, so a large
/// party at the head does not block smaller parties behind it.
#[must_use]
pub fn select_for_promotion(entries: &[WaitlistEntry], free: u32) -> Vec<WaitlistEntryId> {
    let mut waiting: Vec<&WaitlistEntry> = entries
        .iter()
        .filter(|entry| entry.status == WaitlistStatus::Waiting)
        .collect();
    waiting.sort_by_key(|entry| entry.position);

    let mut remaining = free;
    let mut selected = Vec::new();
    for entry in waiting {
        if remaining == 0 {
            break;
        }
        if entry.tickets_wanted <= remaining {
            remaining -= entry.tickets_wanted;
            selected.push(entry.id);
        }
    }
    selected
}

// ============================================================================
// Reducer
// ============================================================================

/// Commands against one event's waitlist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitlistAction {
    /// Queue a guest for seats that cannot be booked right now.
    Join {
        /// Id for the new entry
        entry_id: WaitlistEntryId,
        /// Who is waiting
        guest: GuestInfo,
        /// Seats wanted
        tickets_wanted: u32,
    },
    /// The entry's guest leaves the queue.
    Leave {
        /// The entry
        entry_id: WaitlistEntryId,
        /// Who asks
        actor: Actor,
    },
    /// Offer whatever is open to waiting guests.
    Promote,
    /// Record that a notified entry was used for `booking_id`.
    Convert {
        /// The entry
        entry_id: WaitlistEntryId,
        /// The booking made from it
        booking_id: BookingId,
    },
    /// Expire lapsed offers and promote into the seats they held.
    ExpireStale,
    /// Withdraw every active entry.
    Close,
}

/// Reducer for [`WaitlistAction`].
#[derive(Clone, Copy, Debug, Default)]
pub struct WaitlistReducer;

impl WaitlistReducer {
    /// Creates the reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn apply(
        state: &mut LedgerState,
        action: WaitlistAction,
        env: &BookingEnvironment,
    ) -> Result<Effects<WaitlistAction>> {
        let now = env.clock.now();
        match action {
            WaitlistAction::Join {
                entry_id,
                guest,
                tickets_wanted,
            } => {
                join(state, entry_id, guest, tickets_wanted, now, env)?;
                Ok(Effects::new())
            }
            WaitlistAction::Leave { entry_id, actor } => {
                let entry = state.entry_mut(entry_id)?;
                if actor != Actor::Guest(entry.guest.id) {
                    return Err(LedgerError::UnauthorizedActor {
                        operation: "leave another guest's waitlist entry",
                    });
                }
                let was_holding = entry.holds_seats(now);
                entry.withdraw(now)?;
                tracing::info!(%entry_id, event_id = %entry.event_id, was_holding, "Guest left waitlist");

                Ok(if was_holding { promote(state, env) } else { Effects::new() })
            }
            WaitlistAction::Promote => Ok(promote(state, env)),
            WaitlistAction::Convert { entry_id, booking_id } => {
                convert(state, entry_id, booking_id, now)?;
                Ok(Effects::new())
            }
            WaitlistAction::ExpireStale => Ok(expire_stale(state, now, env)),
            WaitlistAction::Close => Ok(close(state, env)),
        }
    }
}

impl Reducer for WaitlistReducer {
    type State = LedgerState;
    type Action = WaitlistAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut LedgerState,
        action: WaitlistAction,
        env: &BookingEnvironment,
    ) -> SmallVec<[Effect<WaitlistAction>; 4]> {
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

fn join(
    state: &mut LedgerState,
    entry_id: WaitlistEntryId,
    guest: GuestInfo,
    tickets_wanted: u32,
    now: DateTime<Utc>,
    env: &BookingEnvironment,
) -> Result<()> {
    let event = &state.event;
    event.ensure_bookable(now, "join the waitlist")?;
    let max = event.ticket_limit(env.config.max_tickets_per_booking);
    if tickets_wanted == 0 || tickets_wanted > max {
        return Err(LedgerError::InvalidTicketCount {
            requested: tickets_wanted,
            max,
        });
    }

    if let Some(existing) = state
        .entries
        .iter()
        .find(|entry| entry.guest.id == guest.id && entry.is_active())
    {
        return Err(LedgerError::DuplicateWaitlistEntry {
            entry_id: existing.id,
        });
    }

    let open = state.open_seats(now, None);
    if tickets_wanted <= open {
        return Err(LedgerError::SpotsAvailable {
            requested: tickets_wanted,
            available: open,
        });
    }

    let position = next_position(state.entries.iter().map(|entry| entry.position).max());
    let event_id = state.event.id;
    state.entries.push(WaitlistEntry::new(
        entry_id,
        event_id,
        guest,
        position,
        tickets_wanted,
        now,
    ));

    tracing::info!(%entry_id, %event_id, position, tickets_wanted, "Guest joined waitlist");
    Ok(())
}

fn convert(
    state: &mut LedgerState,
    entry_id: WaitlistEntryId,
    booking_id: BookingId,
    now: DateTime<Utc>,
) -> Result<()> {
    let entry = state
        .entry(entry_id)
        .ok_or_else(|| LedgerError::not_found(Entity::WaitlistEntry, entry_id))?;
    entry.ensure_convertible(now)?;

    let booking = state.booking(booking_id).ok_or_else(|| LedgerError::NotFound {
        entity: Entity::Booking,
        id: format!("{booking_id} for event {}", state.event.id),
    })?;
    if matches!(booking.status, BookingStatus::Cancelled | BookingStatus::Declined) {
        return Err(LedgerError::transition(
            Entity::Booking,
            booking.status,
            "convert a waitlist entry into",
        ));
    }
    if entry.guest.id != booking.guest.id {
        return Err(LedgerError::UnauthorizedActor {
            operation: "convert another guest's waitlist entry",
        });
    }

    state.entry_mut(entry_id)?.convert(booking_id, now)?;
    let booking = state.booking_mut(booking_id)?;
    if booking.waitlist_entry.is_none() {
        booking.waitlist_entry = Some(entry_id);
    }

    tracing::info!(%entry_id, %booking_id, event_id = %state.event.id, "Waitlist entry converted");
    Ok(())
}

fn expire_stale<A: Send + 'static>(
    state: &mut LedgerState,
    now: DateTime<Utc>,
    env: &BookingEnvironment,
) -> Effects<A> {
    let mut effects = Effects::new();
    let event_id = state.event.id;
    for entry in state.entries.iter_mut().filter(|entry| entry.is_stale(now)) {
        if entry.expire(now).is_err() {
            continue;
        }
        tracing::info!(entry_id = %entry.id, %event_id, "Waitlist entry expired");
        effects.push(env.effects.notify(Notification::WaitlistEntryExpired {
            email: entry.guest.email.clone(),
            entry_id: entry.id,
        }));
    }
    if !effects.is_empty() {
        effects.extend(promote(state, env));
    }
    effects
}

/// Notifies waiting entries that fit into the open seats.
///
/// Free capacity is recomputed from the event and the live offers every time,
/// so promoting twice never notifies anyone twice. Nothing is offered once
/// the event stops taking bookings.
pub(crate) fn promote<A: Send + 'static>(state: &mut LedgerState, env: &BookingEnvironment) -> Effects<A> {
    let now = env.clock.now();
    if !state.event.is_bookable(now) {
        return Effects::new();
    }

    let selected = select_for_promotion(&state.entries, state.open_seats(now, None));
    let window = env.config.waitlist_window();
    let event_id = state.event.id;
    let mut effects = Effects::new();
    for entry in state.entries.iter_mut().filter(|entry| selected.contains(&entry.id)) {
        let Ok(expires_at) = entry.notify(now, window) else {
            continue;
        };
        tracing::info!(
            entry_id = %entry.id,
            %event_id,
            position = entry.position,
            tickets = entry.tickets_wanted,
            %expires_at,
            "Waitlist entry notified"
        );
        effects.push(env.effects.notify(Notification::WaitlistSpotAvailable {
            email: entry.guest.email.clone(),
            entry_id: entry.id,
            event_id,
            tickets: entry.tickets_wanted,
            expires_at,
        }));
    }
    effects
}

/// Withdraws every active entry. One notification per entry withdrawn.
pub(crate) fn close<A: Send + 'static>(state: &mut LedgerState, env: &BookingEnvironment) -> Effects<A> {
    let now = env.clock.now();
    let event_id = state.event.id;
    let mut effects = Effects::new();
    for entry in state.entries.iter_mut().filter(|entry| entry.is_active()) {
        if entry.withdraw(now).is_err() {
            continue;
        }
        effects.push(env.effects.notify(Notification::WaitlistClosed {
            email: entry.guest.email.clone(),
            entry_id: entry.id,
            event_id,
        }));
    }
    effects
}

/// Gives up the offer a PENDING booking was holding when that booking ends
/// without being approved, and offers the seats to the next guests.
pub(crate) fn forfeit<A: Send + 'static>(
    state: &mut LedgerState,
    entry_id: Option<WaitlistEntryId>,
    env: &BookingEnvironment,
) -> Effects<A> {
    let now = env.clock.now();
    let Some(entry) = entry_id.and_then(|id| state.entries.iter_mut().find(|entry| entry.id == id)) else {
        return Effects::new();
    };
    if entry.expires_at().is_none() || entry.withdraw(now).is_err() {
        return Effects::new();
    }
    tracing::info!(entry_id = %entry.id, event_id = %entry.event_id, "Waitlist offer forfeited");
    promote(state, env)
}
