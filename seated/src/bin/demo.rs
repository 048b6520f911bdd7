//! Seated booking core demo
//!
//! Runs the capacity-8 waitlist scenario against in-memory stores:
//! - a sold-out supper club with two guests on the waitlist
//! - a cancellation with enough notice (full refund) promotes the first
//! - the first lets the 12h offer lapse, so the sweep promotes the second
//! - the second books in time and the event is full again
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=info,seated=debug cargo run --bin seated-demo
//! ```

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use seated::{
    Actor, BookingLedger, BookingMode, BookingRequest, CommissionScheme, Config, EffectRunner,
    EventDraft, ExpirySweeper, GuestInfo, HostId, LedgerEnvironment, MockPaymentGateway, Money,
    Repositories, TracingNotifier,
};
use seated_core::environment::Clock;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Wall clock that the demo can fast-forward.
#[derive(Clone, Default)]
struct DemoClock {
    offset: Arc<Mutex<Duration>>,
}

impl DemoClock {
    fn fast_forward(&self, by: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }
}

impl Clock for DemoClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now() + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🍽️  Starting Seated demo...");

    let clock = DemoClock::default();
    let env = LedgerEnvironment::new(
        Arc::new(clock.clone()),
        Repositories::in_memory(),
        EffectRunner::new(Arc::new(TracingNotifier), Arc::new(MockPaymentGateway::new())),
        config.booking.clone(),
    );
    let ledger = BookingLedger::new(env);

    // Step 1: a sold-out supper club
    let host_id = HostId::new();
    let event = ledger
        .create_event(
            host_id,
            EventDraft {
                title: "Pierogi supper club".to_string(),
                starts_at: clock.now() + Duration::days(7),
                capacity: 8,
                price: Money::from_minor(20_000),
                max_tickets_per_booking: 4,
                booking_mode: BookingMode::Instant,
                commission: Some(CommissionScheme::Percentage(15)),
            },
        )
        .await?;
    ledger.publish_event(event.id, Actor::Host(host_id)).await?;

    let mut bookings = Vec::new();
    for n in 1..=8 {
        let guest = GuestInfo::new(format!("Guest {n}"), format!("guest{n}@example.com"));
        let outcome = ledger
            .create_booking(BookingRequest::new(event.id, guest, 1))
            .await?;
        ledger.mark_paid(outcome.booking.id).await?;
        bookings.push(outcome.booking);
    }
    let first = bookings.first().context("no bookings were made")?;
    tracing::info!(
        fee = %first.platform_fee,
        payout = %first.host_payout,
        "✓ Event sold out"
    );

    // Step 2: two guests queue up
    let zofia = GuestInfo::new("Zofia", "zofia@example.com");
    let piotr = GuestInfo::new("Piotr", "piotr@example.com");
    ledger.waitlist().join_waitlist(event.id, zofia, 1).await?;
    let piotr_entry = ledger.waitlist().join_waitlist(event.id, piotr.clone(), 1).await?;

    // Step 3: a guest cancels a week ahead
    let cancelled = ledger
        .cancel_booking(first.id, Actor::Guest(first.guest.id), Some("Change of plans".to_string()))
        .await?;
    tracing::info!(refund = ?cancelled.refund, "✓ Cancellation refunded");
    let availability = ledger.availability(event.id).await?;
    tracing::info!(?availability, "Seat held for first waitlist guest");

    // Step 4: the offer lapses
    clock.fast_forward(Duration::hours(13));
    let report = ledger.waitlist().expire_stale_entries().await?;
    tracing::info!(?report, "✓ Stale offer expired, next guest notified");

    // Step 5: the second guest books in time
    let outcome = ledger
        .create_booking(BookingRequest::new(event.id, piotr, 1).from_waitlist(piotr_entry.id))
        .await?;
    let availability = ledger.availability(event.id).await?;
    tracing::info!(
        booking_id = %outcome.booking.id,
        converted = ?outcome.converted_entry,
        open = availability.open,
        "✓ Waitlist guest booked"
    );

    // Step 6: background sweeper start/stop
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let sweeper = ExpirySweeper::spawn(ledger.waitlist().clone(), config.booking.sweep_interval(), shutdown_rx);
    shutdown_tx.send(()).context("sweeper stopped before shutdown")?;
    sweeper.await.context("sweeper task panicked")?;

    tracing::info!("🍽️  Demo finished");
    Ok(())
}
