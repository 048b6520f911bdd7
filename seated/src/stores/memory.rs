//! In-memory repositories.
//!
//! Used by tests and the demo binary. Each store is a `HashMap` behind a
//! `std::sync::Mutex`; a poisoned lock surfaces as
//! [`RepositoryError::Poisoned`].

use crate::aggregates::{Booking, Event, WaitlistEntry};
use crate::error::RepositoryError;
use crate::repository::{
    BookingRepository, EventRepository, RepoResult, VoucherRepository, WaitlistRepository,
};
use crate::types::{BookingId, EventId, WaitlistEntryId};
use crate::voucher::Voucher;
use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture, FutureExt};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct Table<K, V> {
    rows: Arc<Mutex<HashMap<K, V>>>,
}

impl<K, V> Clone for Table<K, V> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
        }
    }
}

impl<K: Eq + Hash, V: Clone> Table<K, V> {
    fn new() -> Self {
        Self {
            rows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn rows(&self) -> RepoResult<MutexGuard<'_, HashMap<K, V>>> {
        self.rows.lock().map_err(|_| RepositoryError::Poisoned)
    }

    fn get(&self, key: &K) -> RepoResult<Option<V>> {
        Ok(self.rows()?.get(key).cloned())
    }

    fn put(&self, key: K, value: V) -> RepoResult<()> {
        self.rows()?.insert(key, value);
        Ok(())
    }

    fn remove(&self, key: &K) -> RepoResult<()> {
        self.rows()?.remove(key);
        Ok(())
    }

    fn select(&self, predicate: impl Fn(&V) -> bool) -> RepoResult<Vec<V>> {
        Ok(self
            .rows()?
            .values()
            .filter(|&value| predicate(value))
            .cloned()
            .collect())
    }
}

fn ready<'a, T: Send + 'a>(result: RepoResult<T>) -> BoxFuture<'a, RepoResult<T>> {
    future::ready(result).boxed()
}

// ============================================================================
// Events
// ============================================================================

/// In-memory event store.
#[derive(Debug, Clone)]
pub struct InMemoryEventRepository {
    events: Table<EventId, Event>,
}

impl InMemoryEventRepository {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Table::new(),
        }
    }
}

impl Default for InMemoryEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRepository for InMemoryEventRepository {
    fn find(&self, id: EventId) -> BoxFuture<'_, RepoResult<Option<Event>>> {
        ready(self.events.get(&id))
    }

    fn save(&self, event: Event) -> BoxFuture<'_, RepoResult<()>> {
        ready(self.events.put(event.id, event))
    }
}

// ============================================================================
// Bookings
// ============================================================================

/// In-memory booking store.
#[derive(Debug, Clone)]
pub struct InMemoryBookingRepository {
    bookings: Table<BookingId, Booking>,
}

impl InMemoryBookingRepository {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bookings: Table::new(),
        }
    }
}

impl Default for InMemoryBookingRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingRepository for InMemoryBookingRepository {
    fn find(&self, id: BookingId) -> BoxFuture<'_, RepoResult<Option<Booking>>> {
        ready(self.bookings.get(&id))
    }

    fn save(&self, booking: Booking) -> BoxFuture<'_, RepoResult<()>> {
        ready(self.bookings.put(booking.id, booking))
    }

    fn delete(&self, id: BookingId) -> BoxFuture<'_, RepoResult<()>> {
        ready(self.bookings.remove(&id))
    }

    fn list_for_event(&self, event_id: EventId) -> BoxFuture<'_, RepoResult<Vec<Booking>>> {
        let result = self
            .bookings
            .select(|booking| booking.event_id == event_id)
            .map(|mut bookings| {
                bookings.sort_by_key(|booking| booking.created_at);
                bookings
            });
        ready(result)
    }
}

// ============================================================================
// Waitlist
// ============================================================================

/// In-memory waitlist store.
#[derive(Debug, Clone)]
pub struct InMemoryWaitlistRepository {
    entries: Table<WaitlistEntryId, WaitlistEntry>,
}

impl InMemoryWaitlistRepository {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Table::new(),
        }
    }
}

impl Default for InMemoryWaitlistRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitlistRepository for InMemoryWaitlistRepository {
    fn find(&self, id: WaitlistEntryId) -> BoxFuture<'_, RepoResult<Option<WaitlistEntry>>> {
        ready(self.entries.get(&id))
    }

    fn save(&self, entry: WaitlistEntry) -> BoxFuture<'_, RepoResult<()>> {
        ready(self.entries.put(entry.id, entry))
    }

    fn list_for_event(&self, event_id: EventId) -> BoxFuture<'_, RepoResult<Vec<WaitlistEntry>>> {
        let result = self
            .entries
            .select(|entry| entry.event_id == event_id)
            .map(|mut entries| {
                entries.sort_by_key(|entry| entry.position);
                entries
            });
        ready(result)
    }

    fn list_stale(&self, now: DateTime<Utc>) -> BoxFuture<'_, RepoResult<Vec<WaitlistEntry>>> {
        let result = self
            .entries
            .select(|entry| entry.is_stale(now))
            .map(|mut entries| {
                entries.sort_by_key(|entry| (entry.event_id, entry.position));
                entries
            });
        ready(result)
    }
}

// ============================================================================
// Vouchers
// ============================================================================

/// In-memory voucher store keyed by code.
#[derive(Debug, Clone)]
pub struct InMemoryVoucherRepository {
    vouchers: Table<String, Voucher>,
}

impl InMemoryVoucherRepository {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            vouchers: Table::new(),
        }
    }
}

impl Default for InMemoryVoucherRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl VoucherRepository for InMemoryVoucherRepository {
    fn find<'a>(&'a self, code: &'a str) -> BoxFuture<'a, RepoResult<Option<Voucher>>> {
        ready(self.vouchers.get(&code.to_string()))
    }

    fn save(&self, voucher: Voucher) -> BoxFuture<'_, RepoResult<()>> {
        ready(self.vouchers.put(voucher.code.clone(), voucher))
    }
}
