//! Shared setup for the ledger integration tests.
//!
//! Every harness runs against in-memory stores, a manual clock starting at
//! 2025-01-01 00:00 UTC, a recording notifier and a mock payment gateway.

#![allow(dead_code)]
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use chrono::Duration;
use seated::{
    Actor, BookingConfig, BookingLedger, BookingMode, BookingRequest, CommissionScheme,
    EffectRunner, Event, EventDraft, GuestInfo, HostId, LedgerEnvironment, MockPaymentGateway,
    Money, RecordingNotifier, Repositories, WaitlistEngine,
};
use seated_core::environment::Clock;
use seated_testing::{ManualClock, init_test_tracing, test_clock};
use std::sync::Arc;

/// Ledger plus handles on everything it talks to.
pub struct Harness {
    pub ledger: BookingLedger,
    pub clock: ManualClock,
    pub notifier: RecordingNotifier,
    pub gateway: MockPaymentGateway,
    pub repos: Repositories,
    pub host_id: HostId,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(BookingConfig::default())
    }

    pub fn with_config(config: BookingConfig) -> Self {
        init_test_tracing();

        let clock = ManualClock::new(test_clock().now());
        let notifier = RecordingNotifier::new();
        let gateway = MockPaymentGateway::new();
        let repos = Repositories::in_memory();
        let env = LedgerEnvironment::new(
            Arc::new(clock.clone()),
            repos.clone(),
            EffectRunner::new(Arc::new(notifier.clone()), Arc::new(gateway.clone())),
            config,
        );

        Self {
            ledger: BookingLedger::new(env),
            clock,
            notifier,
            gateway,
            repos,
            host_id: HostId::new(),
        }
    }

    pub fn waitlist(&self) -> &WaitlistEngine {
        self.ledger.waitlist()
    }

    pub const fn host(&self) -> Actor {
        Actor::Host(self.host_id)
    }

    /// Published event starting seven days from the harness start time,
    /// 4 tickets per booking, 15% commission.
    pub async fn published_event(&self, capacity: u32, price: u64, mode: BookingMode) -> Event {
        let draft = EventDraft {
            title: "Pierogi supper club".to_string(),
            starts_at: self.clock.now() + Duration::days(7),
            capacity,
            price: Money::from_minor(price),
            max_tickets_per_booking: 4,
            booking_mode: mode,
            commission: Some(CommissionScheme::Percentage(15)),
        };
        let event = self.ledger.create_event(self.host_id, draft).await.unwrap();
        self.ledger.publish_event(event.id, self.host()).await.unwrap()
    }

    /// Books `tickets` seats for a fresh guest and marks the booking paid.
    pub async fn paid_booking(&self, event: &Event, name: &str, tickets: u32) -> seated::Booking {
        let outcome = self
            .ledger
            .create_booking(BookingRequest::new(event.id, guest(name), tickets))
            .await
            .expect("booking should succeed");
        self.ledger.mark_paid(outcome.booking.id).await.unwrap()
    }

    /// Fills every seat with one-ticket paid bookings.
    pub async fn sell_out(&self, event: &Event) -> Vec<seated::Booking> {
        let mut bookings = Vec::new();
        for n in 1..=event.capacity {
            bookings.push(self.paid_booking(event, &format!("Guest {n}"), 1).await);
        }
        bookings
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.notifier.kinds().iter().filter(|k| **k == kind).count()
    }
}

pub fn guest(name: &str) -> GuestInfo {
    let email = format!("{}@example.com", name.to_lowercase().replace(' ', "."));
    GuestInfo::new(name, email)
}
