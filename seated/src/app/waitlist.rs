//! Waitlist promotion engine.
//!
//! The store around [`WaitlistReducer`]: it keeps the FIFO queue per event,
//! offers freed seats to waiting guests and expires offers that were not
//! taken up. Every reduction runs under the event's lock, so promotion never
//! races a booking for the same seats.

use super::environment::LedgerEnvironment;
use crate::aggregates::{LedgerState, WaitlistAction, WaitlistEntry, WaitlistReducer, WaitlistStatus};
use crate::error::{Entity, LedgerError, Result};
use crate::types::{Actor, BookingId, EventId, GuestInfo, WaitlistEntryId};
use std::collections::BTreeSet;

/// Outcome of one expiry sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Offers moved to EXPIRED
    pub expired: usize,
    /// Waiting entries notified as a result
    pub promoted: usize,
    /// Events whose sweep failed; retried on the next run
    pub failed_events: Vec<EventId>,
}

/// The waitlist promotion engine.
#[derive(Clone)]
pub struct WaitlistEngine {
    env: LedgerEnvironment,
}

impl WaitlistEngine {
    /// Engine over `env`.
    #[must_use]
    pub const fn new(env: LedgerEnvironment) -> Self {
        Self { env }
    }

    /// Queues `guest` for `tickets_wanted` seats.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::EventNotBookable`] unless the event is published
    /// - [`LedgerError::EventStarted`] from the start time on
    /// - [`LedgerError::InvalidTicketCount`] outside `1..=limit`
    /// - [`LedgerError::SpotsAvailable`] if the seats can be booked directly
    /// - [`LedgerError::DuplicateWaitlistEntry`] if the guest is already queued
    pub async fn join_waitlist(
        &self,
        event_id: EventId,
        guest: GuestInfo,
        tickets_wanted: u32,
    ) -> Result<WaitlistEntry> {
        let entry_id = WaitlistEntryId::new();
        let action = WaitlistAction::Join {
            entry_id,
            guest,
            tickets_wanted,
        };
        let (_, state) = self.dispatch(event_id, action).await?;
        entry_in(&state, entry_id)
    }

    /// The entry's guest leaves the queue. A NOTIFIED entry's held seats are
    /// offered to the next guests.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnauthorizedActor`] for anyone but the entry's guest, and
    /// [`LedgerError::InvalidStateTransition`] if the entry is already final.
    pub async fn leave_waitlist(&self, entry_id: WaitlistEntryId, actor: Actor) -> Result<WaitlistEntry> {
        let event_id = self.env.entry(entry_id).await?.event_id;
        let (_, state) = self
            .dispatch(event_id, WaitlistAction::Leave { entry_id, actor })
            .await?;
        entry_in(&state, entry_id)
    }

    /// Offers free seats on `event_id` to waiting guests. Returns the entries
    /// that were notified.
    ///
    /// `freed_count` is informational; free capacity is always recomputed
    /// from the event and the live offers, so calling this twice never
    /// promotes anyone twice.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for an unknown event, or a repository error.
    pub async fn on_capacity_freed(&self, event_id: EventId, freed_count: u32) -> Result<Vec<WaitlistEntry>> {
        tracing::debug!(%event_id, freed_count, "Capacity freed");

        let (loaded, state) = self.dispatch(event_id, WaitlistAction::Promote).await?;
        Ok(newly_notified(&loaded, &state).cloned().collect())
    }

    /// Marks a NOTIFIED entry as converted into `booking_id`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::WaitlistWindowExpired`] past the window (entry unchanged)
    /// - [`LedgerError::NotFound`] if the booking is not on the entry's event
    /// - [`LedgerError::InvalidStateTransition`] unless the entry is NOTIFIED
    ///   and the booking is still live
    /// - [`LedgerError::UnauthorizedActor`] if the booking is another guest's
    pub async fn convert_to_booking(&self, entry_id: WaitlistEntryId, booking_id: BookingId) -> Result<WaitlistEntry> {
        let event_id = self.env.entry(entry_id).await?.event_id;
        let (_, state) = self
            .dispatch(event_id, WaitlistAction::Convert { entry_id, booking_id })
            .await?;
        entry_in(&state, entry_id)
    }

    /// Expires every lapsed offer and re-runs promotion for the affected
    /// events.
    ///
    /// Safe to run concurrently with itself and with ledger operations: each
    /// event's entries are re-read under its lock before anything is expired.
    ///
    /// # Errors
    ///
    /// Only if the stale entries cannot be listed. Failures for a single event
    /// are logged and reported in [`SweepReport::failed_events`].
    pub async fn expire_stale_entries(&self) -> Result<SweepReport> {
        let stale = self.env.repos.waitlist.list_stale(self.env.now()).await?;
        let events: BTreeSet<EventId> = stale.iter().map(|entry| entry.event_id).collect();

        let mut report = SweepReport::default();
        for event_id in events {
            match self.expire_for_event(event_id).await {
                Ok((expired, promoted)) => {
                    report.expired += expired;
                    report.promoted += promoted;
                }
                Err(error) => {
                    tracing::warn!(%event_id, %error, "Waitlist expiry failed for event");
                    report.failed_events.push(event_id);
                }
            }
        }

        if report.expired > 0 || !report.failed_events.is_empty() {
            tracing::info!(
                expired = report.expired,
                promoted = report.promoted,
                failed = report.failed_events.len(),
                "Waitlist sweep finished"
            );
        }
        Ok(report)
    }

    async fn expire_for_event(&self, event_id: EventId) -> Result<(usize, usize)> {
        let (loaded, state) = self.dispatch(event_id, WaitlistAction::ExpireStale).await?;
        let expired = state
            .entries
            .iter()
            .filter(|entry| {
                matches!(entry.status, WaitlistStatus::Expired { .. })
                    && loaded
                        .entry(entry.id)
                        .is_some_and(|previous| previous.expires_at().is_some())
            })
            .count();
        Ok((expired, newly_notified(&loaded, &state).count()))
    }

    /// Every entry for an event in position order.
    ///
    /// # Errors
    ///
    /// Repository failures only.
    pub async fn waitlist_for_event(&self, event_id: EventId) -> Result<Vec<WaitlistEntry>> {
        Ok(self.env.repos.waitlist.list_for_event(event_id).await?)
    }

    /// One entry.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for an unknown id.
    pub async fn entry(&self, entry_id: WaitlistEntryId) -> Result<WaitlistEntry> {
        self.env.entry(entry_id).await
    }

    /// Seats currently held by live offers on an event.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for an unknown event.
    pub async fn held_seats(&self, event_id: EventId) -> Result<u32> {
        let state = self.env.load(event_id).await?;
        Ok(state.held_seats(self.env.now(), None))
    }

    /// Drops idle event and voucher locks. Returns how many were removed.
    pub fn prune_locks(&self) -> usize {
        self.env.locks.prune() + self.env.voucher_locks.prune()
    }

    async fn dispatch(&self, event_id: EventId, action: WaitlistAction) -> Result<(LedgerState, LedgerState)> {
        self.env
            .dispatch(&WaitlistReducer::new(), event_id, action)
            .await
    }
}

fn entry_in(state: &LedgerState, entry_id: WaitlistEntryId) -> Result<WaitlistEntry> {
    state
        .entry(entry_id)
        .cloned()
        .ok_or_else(|| LedgerError::not_found(Entity::WaitlistEntry, entry_id))
}

/// Entries that went from WAITING to NOTIFIED between `loaded` and `after`.
fn newly_notified<'a>(loaded: &'a LedgerState, after: &'a LedgerState) -> impl Iterator<Item = &'a WaitlistEntry> {
    after.entries.iter().filter(|entry| {
        entry.expires_at().is_some()
            && loaded
                .entry(entry.id)
                .is_some_and(|previous| previous.status == WaitlistStatus::Waiting)
    })
}
