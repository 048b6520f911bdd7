//! Injected dependencies for the ledger and the waitlist engine, and the
//! load / reduce / persist cycle they share.

use crate::aggregates::{Booking, BookingEnvironment, Event, LedgerState, WaitlistEntry};
use crate::config::BookingConfig;
use crate::effects::{EffectRunner, Effects, run_effects};
use crate::error::{Entity, LedgerError, Result};
use crate::repository::Repositories;
use crate::types::{BookingId, EventId, WaitlistEntryId};
use seated_core::KeyedMutex;
use seated_core::environment::Clock;
use seated_core::reducer::Reducer;
use std::fmt::Debug;
use std::sync::Arc;

/// Everything the booking core needs from the outside world.
///
/// Cloning is cheap; clones share stores, collaborators and locks.
#[derive(Clone)]
pub struct LedgerEnvironment {
    /// Persistence
    pub repos: Repositories,
    /// What the reducers see: clock, rules and effect builders
    pub rules: BookingEnvironment,
    /// One writer per event at a time
    pub locks: Arc<KeyedMutex<EventId>>,
    /// One redemption per voucher code at a time, across events
    pub voucher_locks: Arc<KeyedMutex<String>>,
}

impl LedgerEnvironment {
    /// Creates an environment; the refund policy is derived from `config`.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        repos: Repositories,
        effects: EffectRunner,
        config: BookingConfig,
    ) -> Self {
        Self {
            repos,
            rules: BookingEnvironment::new(clock, config, effects),
            locks: Arc::new(KeyedMutex::new()),
            voucher_locks: Arc::new(KeyedMutex::new()),
        }
    }

    /// Current time from the configured clock.
    pub(crate) fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.rules.clock.now()
    }

    /// Loads the event with all of its bookings and waitlist entries. The
    /// caller must hold the event's lock.
    pub(crate) async fn load(&self, event_id: EventId) -> Result<LedgerState> {
        let event = self.event(event_id).await?;
        let bookings = self.repos.bookings.list_for_event(event_id).await?;
        let entries = self.repos.waitlist.list_for_event(event_id).await?;
        Ok(LedgerState::new(event, bookings, entries))
    }

    /// Locks the event, loads it, reduces `action` and persists the result,
    /// then releases the lock and runs the effects. Returns the state as
    /// loaded and as the reducer left it.
    pub(crate) async fn dispatch<R>(
        &self,
        reducer: &R,
        event_id: EventId,
        action: R::Action,
    ) -> Result<(LedgerState, LedgerState)>
    where
        R: Reducer<State = LedgerState, Environment = BookingEnvironment> + Sync,
        R::Action: Send + Debug + 'static,
    {
        let guard = self.locks.lock(&event_id).await;
        let mut state = self.load(event_id).await?;
        let loaded = state.clone();
        let effects = self.reduce(reducer, &mut state, action).await?;
        drop(guard);

        run_effects(effects).await;
        Ok((loaded, state))
    }

    /// Runs `action` through `reducer` and writes back what changed.
    ///
    /// On a rejected action `state` is left exactly as loaded and nothing is
    /// written.
    pub(crate) async fn reduce<R>(
        &self,
        reducer: &R,
        state: &mut LedgerState,
        action: R::Action,
    ) -> Result<Effects<R::Action>>
    where
        R: Reducer<State = LedgerState, Environment = BookingEnvironment> + Sync,
    {
        let before = state.clone();
        let effects = reducer.reduce(state, action, &self.rules);
        if let Some(error) = state.last_error.take() {
            *state = before;
            return Err(error);
        }
        self.persist(&before, state).await?;
        Ok(effects)
    }

    /// Bookings first, then waitlist entries, then the event. If the event
    /// write fails the booking and entry writes are undone, so seat counts
    /// never disagree with the bookings that hold them.
    async fn persist(&self, before: &LedgerState, after: &LedgerState) -> Result<()> {
        let bookings: Vec<(&Booking, Option<&Booking>)> = after
            .bookings
            .iter()
            .map(|booking| (booking, before.booking(booking.id)))
            .filter(|(booking, previous)| previous.is_none_or(|previous| previous != *booking))
            .collect();
        let entries: Vec<(&WaitlistEntry, Option<&WaitlistEntry>)> = after
            .entries
            .iter()
            .map(|entry| (entry, before.entry(entry.id)))
            .filter(|(entry, previous)| previous.is_none_or(|previous| previous != *entry))
            .collect();

        for (booking, _) in &bookings {
            self.repos.bookings.save((*booking).clone()).await?;
        }
        for (entry, _) in &entries {
            self.repos.waitlist.save((*entry).clone()).await?;
        }

        if after.event != before.event {
            if let Err(error) = self.repos.events.save(after.event.clone()).await {
                self.undo(&bookings, &entries).await;
                return Err(error.into());
            }
        }

        if let Some(voucher) = after.voucher.as_ref().filter(|voucher| Some(*voucher) != before.voucher.as_ref()) {
            let code = voucher.code.clone();
            if let Err(error) = self.repos.vouchers.save(voucher.clone()).await {
                tracing::warn!(event_id = %after.event.id, %code, %error, "Voucher usage not recorded");
            }
        }
        Ok(())
    }

    async fn undo(
        &self,
        bookings: &[(&Booking, Option<&Booking>)],
        entries: &[(&WaitlistEntry, Option<&WaitlistEntry>)],
    ) {
        for (booking, previous) in bookings {
            let undo = match previous {
                Some(previous) => self.repos.bookings.save((*previous).clone()).await,
                None => self.repos.bookings.delete(booking.id).await,
            };
            if let Err(undo_error) = undo {
                tracing::error!(
                    booking_id = %booking.id,
                    event_id = %booking.event_id,
                    %undo_error,
                    "Booking write could not be undone after event write failed"
                );
            }
        }
        for (entry, previous) in entries {
            // new entries only come from joins, which never write the event
            let Some(previous) = previous else {
                continue;
            };
            if let Err(undo_error) = self.repos.waitlist.save((*previous).clone()).await {
                tracing::error!(
                    entry_id = %entry.id,
                    event_id = %entry.event_id,
                    %undo_error,
                    "Waitlist write could not be undone after event write failed"
                );
            }
        }
    }

    pub(crate) async fn event(&self, id: EventId) -> Result<Event> {
        self.repos
            .events
            .find(id)
            .await?
            .ok_or_else(|| LedgerError::not_found(Entity::Event, id))
    }

    pub(crate) async fn booking(&self, id: BookingId) -> Result<Booking> {
        self.repos
            .bookings
            .find(id)
            .await?
            .ok_or_else(|| LedgerError::not_found(Entity::Booking, id))
    }

    pub(crate) async fn entry(&self, id: WaitlistEntryId) -> Result<WaitlistEntry> {
        self.repos
            .waitlist
            .find(id)
            .await?
            .ok_or_else(|| LedgerError::not_found(Entity::WaitlistEntry, id))
    }
}
