//! Persistence seams.
//!
//! The ledger and the waitlist engine only talk to storage through these
//! traits. Futures are boxed so the traits stay object-safe and can be held
//! as `Arc<dyn ...>` in the environment.

use crate::aggregates::{Booking, Event, WaitlistEntry};
use crate::error::RepositoryError;
use crate::types::{BookingId, EventId, WaitlistEntryId};
use crate::voucher::Voucher;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::sync::Arc;

/// Result of a repository call.
pub type RepoResult<T> = Result<T, RepositoryError>;

/// Event storage.
pub trait EventRepository: Send + Sync {
    /// Loads an event.
    fn find(&self, id: EventId) -> BoxFuture<'_, RepoResult<Option<Event>>>;

    /// Inserts or replaces an event.
    fn save(&self, event: Event) -> BoxFuture<'_, RepoResult<()>>;
}

/// Booking storage.
pub trait BookingRepository: Send + Sync {
    /// Loads a booking.
    fn find(&self, id: BookingId) -> BoxFuture<'_, RepoResult<Option<Booking>>>;

    /// Inserts or replaces a booking.
    fn save(&self, booking: Booking) -> BoxFuture<'_, RepoResult<()>>;

    /// Removes a booking. Used to undo a write whose event update failed.
    fn delete(&self, id: BookingId) -> BoxFuture<'_, RepoResult<()>>;

    /// All bookings for an event, oldest first.
    fn list_for_event(&self, event_id: EventId) -> BoxFuture<'_, RepoResult<Vec<Booking>>>;
}

/// Waitlist storage.
pub trait WaitlistRepository: Send + Sync {
    /// Loads an entry.
    fn find(&self, id: WaitlistEntryId) -> BoxFuture<'_, RepoResult<Option<WaitlistEntry>>>;

    /// Inserts or replaces an entry.
    fn save(&self, entry: WaitlistEntry) -> BoxFuture<'_, RepoResult<()>>;

    /// Every entry for an event in position order.
    fn list_for_event(&self, event_id: EventId) -> BoxFuture<'_, RepoResult<Vec<WaitlistEntry>>>;

    /// NOTIFIED entries whose window closed before `now`, across all events.
    fn list_stale(&self, now: DateTime<Utc>) -> BoxFuture<'_, RepoResult<Vec<WaitlistEntry>>>;
}

/// Voucher storage.
pub trait VoucherRepository: Send + Sync {
    /// Looks a voucher up by code.
    fn find<'a>(&'a self, code: &'a str) -> BoxFuture<'a, RepoResult<Option<Voucher>>>;

    /// Inserts or replaces a voucher.
    fn save(&self, voucher: Voucher) -> BoxFuture<'_, RepoResult<()>>;
}

/// The full set of stores the core needs.
#[derive(Clone)]
pub struct Repositories {
    /// Events
    pub events: Arc<dyn EventRepository>,
    /// Bookings
    pub bookings: Arc<dyn BookingRepository>,
    /// Waitlist entries
    pub waitlist: Arc<dyn WaitlistRepository>,
    /// Vouchers
    pub vouchers: Arc<dyn VoucherRepository>,
}

impl Repositories {
    /// Fresh in-memory stores.
    #[must_use]
    pub fn in_memory() -> Self {
        use crate::stores::memory::{
            InMemoryBookingRepository, InMemoryEventRepository, InMemoryVoucherRepository,
            InMemoryWaitlistRepository,
        };

        Self {
            events: Arc::new(InMemoryEventRepository::new()),
            bookings: Arc::new(InMemoryBookingRepository::new()),
            waitlist: Arc::new(InMemoryWaitlistRepository::new()),
            vouchers: Arc::new(InMemoryVoucherRepository::new()),
        }
    }
}
