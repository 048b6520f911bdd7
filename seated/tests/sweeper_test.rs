//! Background expiry sweeper tests.
//!
//! Run with: `cargo test --test sweeper_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

mod common;

use chrono::Duration;
use common::{Harness, guest};
use seated::{Actor, BookingMode, ExpirySweeper, WaitlistStatus};
use std::time::Duration as StdDuration;
use tokio::sync::broadcast;

/// Test 1: The sweeper expires a lapsed offer and promotes the next guest
#[tokio::test]
async fn test_sweeper_promotes_in_background() {
    let h = Harness::new();
    let event = h.published_event(1, 20_000, BookingMode::Instant).await;
    let bookings = h.sell_out(&event).await;
    let zofia = h.waitlist().join_waitlist(event.id, guest("Zofia"), 1).await.unwrap();
    let piotr = h.waitlist().join_waitlist(event.id, guest("Piotr"), 1).await.unwrap();
    h.ledger
        .cancel_booking(bookings[0].id, Actor::Guest(bookings[0].guest.id), None)
        .await
        .unwrap();
    h.clock.advance(Duration::hours(13));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let sweeper = ExpirySweeper::spawn(h.waitlist().clone(), StdDuration::from_millis(10), shutdown_rx);

    let promoted = tokio::time::timeout(StdDuration::from_secs(5), async {
        loop {
            let entry = h.waitlist().entry(piotr.id).await.unwrap();
            if matches!(entry.status, WaitlistStatus::Notified { .. }) {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
    })
    .await;

    shutdown_tx.send(()).unwrap();
    sweeper.await.unwrap();

    assert!(promoted.is_ok(), "sweeper never promoted the next guest");
    assert!(matches!(
        h.waitlist().entry(zofia.id).await.unwrap().status,
        WaitlistStatus::Expired { .. }
    ));

    println!("✓ Background sweep promoted Piotr");
}

/// Test 2: Dropping the shutdown sender stops the loop
#[tokio::test]
async fn test_sweeper_stops_when_sender_dropped() {
    let h = Harness::new();
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let sweeper = ExpirySweeper::spawn(h.waitlist().clone(), StdDuration::from_secs(3600), shutdown_rx);

    drop(shutdown_tx);
    let stopped = tokio::time::timeout(StdDuration::from_secs(5), sweeper).await;

    assert!(matches!(stopped, Ok(Ok(()))));

    println!("✓ Sweeper stopped");
}
