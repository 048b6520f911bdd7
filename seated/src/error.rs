//! Error types for the booking core.

use crate::aggregates::EventStatus;
use crate::types::{EventId, WaitlistEntryId};
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// Result type alias for ledger and waitlist operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// The kind of record an error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entity {
    /// A hosted event
    Event,
    /// A booking
    Booking,
    /// A waitlist entry
    WaitlistEntry,
    /// A voucher
    Voucher,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Event => "event",
            Self::Booking => "booking",
            Self::WaitlistEntry => "waitlist entry",
            Self::Voucher => "voucher",
        })
    }
}

/// Failures surfaced to the presentation layer.
///
/// Capacity and transition errors are typed so callers can tell "sold out"
/// apart from "already handled". The core never turns one into a different
/// status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Requested tickets exceed the spots open right now.
    #[error("requested {requested} tickets but only {available} spots are open")]
    CapacityExceeded {
        /// Tickets asked for
        requested: u32,
        /// Spots that could be taken
        available: u32,
    },

    /// Operation is not allowed from the record's current state.
    #[error("cannot {operation} {entity} in state {from}")]
    InvalidStateTransition {
        /// Which record
        entity: Entity,
        /// Its current state
        from: String,
        /// What was attempted
        operation: &'static str,
    },

    /// A notified waitlist entry tried to convert after its window closed.
    #[error("waitlist entry {entry_id} conversion window closed at {expired_at}")]
    WaitlistWindowExpired {
        /// The entry
        entry_id: WaitlistEntryId,
        /// End of its conversion window
        expired_at: DateTime<Utc>,
    },

    /// No record with that id.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Which kind of record
        entity: Entity,
        /// The id that was looked up
        id: String,
    },

    /// The actor may not perform this operation on this record.
    #[error("actor is not allowed to {operation}")]
    UnauthorizedActor {
        /// What was attempted
        operation: &'static str,
    },

    /// Ticket count outside `1..=max`.
    #[error("ticket count {requested} is outside 1..={max}")]
    InvalidTicketCount {
        /// Tickets asked for
        requested: u32,
        /// Per-booking maximum for this event
        max: u32,
    },

    /// The event is not published (draft, cancelled or completed).
    #[error("event {event_id} is {status} and not open for bookings")]
    EventNotBookable {
        /// The event
        event_id: EventId,
        /// Its status
        status: EventStatus,
    },

    /// Post-event bookkeeping attempted before the event took place.
    #[error("cannot {operation} before the event starts at {starts_at}")]
    EventNotStarted {
        /// What was attempted
        operation: &'static str,
        /// Event start
        starts_at: DateTime<Utc>,
    },

    /// Booking, waitlist or cancellation attempted once the event began.
    #[error("cannot {operation} after the event started at {starts_at}")]
    EventStarted {
        /// What was attempted
        operation: &'static str,
        /// Event start
        starts_at: DateTime<Utc>,
    },

    /// Joining the waitlist while the requested seats can be booked directly.
    #[error("{available} spots are open for {requested} tickets; book instead of joining the waitlist")]
    SpotsAvailable {
        /// Tickets wanted
        requested: u32,
        /// Spots open
        available: u32,
    },

    /// The guest already has a waiting or notified entry for this event.
    #[error("guest already holds active waitlist entry {entry_id}")]
    DuplicateWaitlistEntry {
        /// The existing entry
        entry_id: WaitlistEntryId,
    },

    /// Event draft failed validation.
    #[error("invalid event: {reason}")]
    InvalidEvent {
        /// What is wrong
        reason: String,
    },

    /// Price arithmetic overflowed.
    #[error("amount overflow while pricing booking")]
    AmountOverflow,

    /// Persistence failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl LedgerError {
    pub(crate) fn not_found(entity: Entity, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn transition(
        entity: Entity,
        from: impl fmt::Display,
        operation: &'static str,
    ) -> Self {
        Self::InvalidStateTransition {
            entity,
            from: from.to_string(),
            operation,
        }
    }
}

/// Persistence failures reported by repository implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// An in-process store lock was poisoned by a panicking writer.
    #[error("storage lock poisoned")]
    Poisoned,

    /// The backing store rejected or failed the operation.
    #[error("storage backend error: {0}")]
    Backend(String),
}
