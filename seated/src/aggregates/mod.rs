//! Aggregates for the booking core.
//!
//! - Event: listing lifecycle and seat accounting
//! - Booking: reservation state machine and price breakdown
//! - Waitlist: queue entries and promotion selection
//!
//! Each aggregate also carries a reducer over the per-event [`LedgerState`].
//! The reducers decide and mutate; the ledger loads, locks and persists.

pub mod booking;
pub mod event;
pub mod state;
pub mod waitlist;

pub use booking::{
    Booking, BookingAction, BookingReducer, BookingStatus, BookingTransition, BookingWarning,
    Pricing,
};
pub use event::{BookingMode, Event, EventAction, EventDraft, EventReducer, EventStatus};
pub use state::{BookingEnvironment, LedgerState};
pub use waitlist::{WaitlistAction, WaitlistEntry, WaitlistReducer, WaitlistStatus};
