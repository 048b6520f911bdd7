//! Application services.
//!
//! - [`BookingLedger`]: events, bookings and their state transitions
//! - [`WaitlistEngine`]: queue, promotion and conversion
//! - [`ExpirySweeper`]: background task that expires lapsed waitlist offers
//!
//! Both are stores around the aggregate reducers: they take the event's
//! `KeyedMutex`, load a `LedgerState`, reduce, persist the difference and
//! run the returned effects once the lock is released.

mod environment;
mod ledger;
mod sweeper;
mod waitlist;

pub use environment::LedgerEnvironment;
pub use ledger::{Availability, BookingLedger, BookingOutcome, BookingRequest, EventCancellation};
pub use sweeper::ExpirySweeper;
pub use waitlist::{SweepReport, WaitlistEngine};
