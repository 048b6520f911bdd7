//! Booking lifecycle integration tests.
//!
//! Drives the ledger through instant and manual bookings, approval,
//! payment, cancellation and post-event bookkeeping against in-memory stores.
//!
//! Run with: `cargo test --test booking_lifecycle_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

mod common;

use chrono::Duration;
use common::{Harness, guest};
use seated::payment_gateway::GatewayCall;
use seated::{
    Actor, BookingMode, BookingRequest, BookingStatus, BookingWarning, EventDraft, HostId,
    LedgerError, Money, RefundReason, Voucher, VoucherDiscount, VoucherError,
};
use seated_core::environment::Clock;

/// Test 1: Instant booking confirms, takes seats and asks for payment
#[tokio::test]
async fn test_instant_booking_confirms_immediately() {
    let h = Harness::new();
    let event = h.published_event(8, 20_000, BookingMode::Instant).await;

    let outcome = h
        .ledger
        .create_booking(BookingRequest::new(event.id, guest("Ola"), 2))
        .await
        .unwrap();

    assert_eq!(outcome.booking.status, BookingStatus::Approved);
    assert_eq!(outcome.booking.total_price, Money::from_minor(40_000));
    assert!(outcome.warnings.is_empty());
    assert!(outcome.booking.approved_at.is_some());

    let availability = h.ledger.availability(event.id).await.unwrap();
    assert_eq!(availability.spots_left, 6);
    assert_eq!(availability.open, 6);

    assert_eq!(
        h.gateway.calls(),
        vec![GatewayCall::PaymentLink {
            booking_id: outcome.booking.id,
            amount: Money::from_minor(40_000),
        }]
    );
    assert_eq!(h.count_kind("booking_confirmed"), 1);
    assert_eq!(h.count_kind("booking_requested"), 1);

    println!("✓ Instant booking approved with 6 spots left");
}

/// Test 2: Commission on a single 200.00 ticket at 15%
#[tokio::test]
async fn test_commission_split_on_booking() {
    let h = Harness::new();
    let event = h.published_event(8, 20_000, BookingMode::Instant).await;

    let booking = h.paid_booking(&event, "Ola", 1).await;

    assert_eq!(booking.platform_fee, Money::from_minor(3_000));
    assert_eq!(booking.host_payout, Money::from_minor(17_000));
    assert_eq!(booking.amount_paid(), Money::from_minor(20_000));

    println!("✓ Platform fee 30.00, host payout 170.00");
}

/// Test 3: Manual events hold nothing until the host approves
#[tokio::test]
async fn test_manual_booking_waits_for_host() {
    let h = Harness::new();
    let event = h.published_event(8, 20_000, BookingMode::Manual).await;

    let outcome = h
        .ledger
        .create_booking(BookingRequest::new(event.id, guest("Ola"), 3))
        .await
        .unwrap();

    assert_eq!(outcome.booking.status, BookingStatus::Pending);
    assert_eq!(h.ledger.availability(event.id).await.unwrap().spots_left, 8);
    assert!(h.gateway.calls().is_empty());
    assert_eq!(h.count_kind("booking_awaiting_approval"), 1);

    let approved = h
        .ledger
        .approve_booking(outcome.booking.id, h.host())
        .await
        .unwrap();

    assert_eq!(approved.status, BookingStatus::Approved);
    assert_eq!(h.ledger.availability(event.id).await.unwrap().spots_left, 5);
    assert_eq!(h.gateway.calls().len(), 1);
    assert_eq!(h.count_kind("booking_confirmed"), 1);

    println!("✓ Manual booking approved, seats taken on approval");
}

/// Test 4: Approval re-checks capacity and leaves the loser PENDING
#[tokio::test]
async fn test_approval_rechecks_capacity() {
    let h = Harness::new();
    let event = h.published_event(2, 20_000, BookingMode::Manual).await;

    let first = h
        .ledger
        .create_booking(BookingRequest::new(event.id, guest("Ola"), 2))
        .await
        .unwrap()
        .booking;
    let second = h
        .ledger
        .create_booking(BookingRequest::new(event.id, guest("Jan"), 2))
        .await
        .unwrap()
        .booking;

    h.ledger.approve_booking(first.id, h.host()).await.unwrap();
    let result = h.ledger.approve_booking(second.id, h.host()).await;

    assert_eq!(
        result,
        Err(LedgerError::CapacityExceeded {
            requested: 2,
            available: 0,
        })
    );
    let second = h.ledger.booking(second.id).await.unwrap();
    assert_eq!(second.status, BookingStatus::Pending);

    println!("✓ Second approval rejected, booking still pending");
}

/// Test 5: Declining a request frees nothing and notifies the guest
#[tokio::test]
async fn test_decline_booking() {
    let h = Harness::new();
    let event = h.published_event(8, 20_000, BookingMode::Manual).await;
    let booking = h
        .ledger
        .create_booking(BookingRequest::new(event.id, guest("Ola"), 2))
        .await
        .unwrap()
        .booking;

    let declined = h.ledger.decline_booking(booking.id, h.host()).await.unwrap();

    assert_eq!(declined.status, BookingStatus::Declined);
    assert_eq!(h.ledger.availability(event.id).await.unwrap().spots_left, 8);
    assert_eq!(h.count_kind("booking_declined"), 1);

    let again = h.ledger.approve_booking(booking.id, h.host()).await;
    assert!(matches!(again, Err(LedgerError::InvalidStateTransition { .. })));

    println!("✓ Declined booking is terminal");
}

/// Test 6: Only the event's host decides on requests
#[tokio::test]
async fn test_only_host_can_approve() {
    let h = Harness::new();
    let event = h.published_event(8, 20_000, BookingMode::Manual).await;
    let booking = h
        .ledger
        .create_booking(BookingRequest::new(event.id, guest("Ola"), 1))
        .await
        .unwrap()
        .booking;

    let stranger = h.ledger.approve_booking(booking.id, Actor::Host(HostId::new())).await;
    let guest_itself = h
        .ledger
        .approve_booking(booking.id, Actor::Guest(booking.guest.id))
        .await;
    let system = h.ledger.decline_booking(booking.id, Actor::System).await;

    assert!(matches!(stranger, Err(LedgerError::UnauthorizedActor { .. })));
    assert!(matches!(guest_itself, Err(LedgerError::UnauthorizedActor { .. })));
    assert!(matches!(system, Err(LedgerError::UnauthorizedActor { .. })));
    assert_eq!(
        h.ledger.booking(booking.id).await.unwrap().status,
        BookingStatus::Pending
    );

    println!("✓ Non-hosts rejected");
}

/// Test 7: Ticket counts outside 1..=max are rejected
#[tokio::test]
async fn test_invalid_ticket_count() {
    let h = Harness::new();
    let event = h.published_event(20, 20_000, BookingMode::Instant).await;

    let zero = h
        .ledger
        .create_booking(BookingRequest::new(event.id, guest("Ola"), 0))
        .await;
    let five = h
        .ledger
        .create_booking(BookingRequest::new(event.id, guest("Jan"), 5))
        .await;

    assert_eq!(zero, Err(LedgerError::InvalidTicketCount { requested: 0, max: 4 }));
    assert_eq!(five, Err(LedgerError::InvalidTicketCount { requested: 5, max: 4 }));
    assert!(h.ledger.bookings_for_event(event.id).await.unwrap().is_empty());

    println!("✓ Ticket count bounds enforced");
}

/// Test 8: Booking more than is open fails with typed capacity error
#[tokio::test]
async fn test_capacity_exceeded() {
    let h = Harness::new();
    let event = h.published_event(3, 20_000, BookingMode::Instant).await;
    h.paid_booking(&event, "Ola", 2).await;

    let result = h
        .ledger
        .create_booking(BookingRequest::new(event.id, guest("Jan"), 2))
        .await;

    assert_eq!(
        result,
        Err(LedgerError::CapacityExceeded {
            requested: 2,
            available: 1,
        })
    );

    println!("✓ Capacity enforced");
}

/// Test 9: Draft events cannot be booked
#[tokio::test]
async fn test_draft_event_not_bookable() {
    let h = Harness::new();
    let draft = EventDraft {
        title: "Ramen workshop".to_string(),
        starts_at: h.clock.now() + Duration::days(3),
        capacity: 10,
        price: Money::from_minor(9_000),
        max_tickets_per_booking: 2,
        booking_mode: BookingMode::Instant,
        commission: None,
    };
    let event = h.ledger.create_event(h.host_id, draft).await.unwrap();

    let result = h
        .ledger
        .create_booking(BookingRequest::new(event.id, guest("Ola"), 1))
        .await;

    assert!(matches!(result, Err(LedgerError::EventNotBookable { .. })));

    println!("✓ Draft event rejected bookings");
}

/// Test 10: A valid voucher reduces the charge and commission follows it
#[tokio::test]
async fn test_voucher_discount_applies_before_commission() {
    let h = Harness::new();
    let event = h.published_event(8, 20_000, BookingMode::Instant).await;
    h.repos
        .vouchers
        .save(Voucher::new("WELCOME10", VoucherDiscount::Percentage(10)).with_usage_cap(1))
        .await
        .unwrap();

    let outcome = h
        .ledger
        .create_booking(BookingRequest::new(event.id, guest("Ola"), 2).with_voucher("WELCOME10"))
        .await
        .unwrap();

    assert!(outcome.warnings.is_empty());
    assert_eq!(outcome.booking.voucher_discount, Some(Money::from_minor(4_000)));
    assert_eq!(outcome.booking.amount_due(), Money::from_minor(36_000));
    assert_eq!(outcome.booking.platform_fee, Money::from_minor(5_400));
    assert_eq!(outcome.booking.host_payout, Money::from_minor(30_600));

    let voucher = h.repos.vouchers.find("WELCOME10").await.unwrap().unwrap();
    assert_eq!(voucher.times_used, 1);

    // cap reached: the next booking pays full price with a warning
    let second = h
        .ledger
        .create_booking(BookingRequest::new(event.id, guest("Jan"), 1).with_voucher("WELCOME10"))
        .await
        .unwrap();
    assert_eq!(second.booking.amount_due(), Money::from_minor(20_000));
    assert_eq!(
        second.warnings,
        vec![BookingWarning::InvalidVoucher(VoucherError::UsageCapReached {
            code: "WELCOME10".to_string(),
            cap: 1,
        })]
    );

    println!("✓ Voucher applied once, then rejected with a warning");
}

/// Test 11: An unknown voucher code never blocks the booking
#[tokio::test]
async fn test_unknown_voucher_is_a_warning() {
    let h = Harness::new();
    let event = h.published_event(8, 20_000, BookingMode::Instant).await;

    let outcome = h
        .ledger
        .create_booking(BookingRequest::new(event.id, guest("Ola"), 1).with_voucher("NOPE"))
        .await
        .unwrap();

    assert_eq!(outcome.booking.status, BookingStatus::Approved);
    assert_eq!(outcome.booking.voucher_code, None);
    assert_eq!(
        outcome.warnings,
        vec![BookingWarning::InvalidVoucher(VoucherError::Unknown {
            code: "NOPE".to_string(),
        })]
    );

    println!("✓ Unknown voucher ignored");
}

/// Test 12: Guest cancelling with enough notice gets everything back
#[tokio::test]
async fn test_guest_cancel_in_time_full_refund() {
    let h = Harness::new();
    let event = h.published_event(8, 20_000, BookingMode::Instant).await;
    let booking = h.paid_booking(&event, "Ola", 2).await;

    let cancelled = h
        .ledger
        .cancel_booking(booking.id, Actor::Guest(booking.guest.id), Some("Flu".to_string()))
        .await
        .unwrap();

    let refund = cancelled.refund.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("Flu"));
    assert_eq!(refund.reason, RefundReason::GuestCancelledInTime);
    assert_eq!(refund.amount, Money::from_minor(40_000));
    assert_eq!(h.gateway.refunds(), vec![(booking.id, Money::from_minor(40_000))]);
    assert_eq!(h.ledger.availability(event.id).await.unwrap().spots_left, 8);
    assert_eq!(h.count_kind("booking_cancelled"), 1);

    println!("✓ Full refund with a week's notice");
}

/// Test 13: Guest cancelling inside the notice period gets nothing
#[tokio::test]
async fn test_guest_cancel_late_no_refund() {
    let h = Harness::new();
    let event = h.published_event(8, 20_000, BookingMode::Instant).await;
    let booking = h.paid_booking(&event, "Ola", 1).await;
    h.clock.advance(Duration::days(6) + Duration::hours(1));

    let cancelled = h
        .ledger
        .cancel_booking(booking.id, Actor::Guest(booking.guest.id), None)
        .await
        .unwrap();

    let refund = cancelled.refund.unwrap();
    assert_eq!(refund.reason, RefundReason::GuestCancelledLate);
    assert_eq!(refund.amount, Money::ZERO);
    assert!(h.gateway.refunds().is_empty());
    assert_eq!(h.ledger.availability(event.id).await.unwrap().spots_left, 8);

    println!("✓ No refund 23h before the event");
}

/// Test 14: Host cancelling a booking always refunds in full
#[tokio::test]
async fn test_host_cancel_full_refund() {
    let h = Harness::new();
    let event = h.published_event(8, 20_000, BookingMode::Instant).await;
    let booking = h.paid_booking(&event, "Ola", 1).await;
    h.clock.advance(Duration::days(6) + Duration::hours(20));

    let cancelled = h
        .ledger
        .cancel_booking(booking.id, h.host(), None)
        .await
        .unwrap();

    let refund = cancelled.refund.unwrap();
    assert_eq!(refund.reason, RefundReason::HostCancelled);
    assert_eq!(refund.amount, Money::from_minor(20_000));

    println!("✓ Host cancellation refunded late");
}

/// Test 15: Cancelling before payment refunds nothing
#[tokio::test]
async fn test_unpaid_cancel_refunds_nothing() {
    let h = Harness::new();
    let event = h.published_event(8, 20_000, BookingMode::Instant).await;
    let booking = h
        .ledger
        .create_booking(BookingRequest::new(event.id, guest("Ola"), 1))
        .await
        .unwrap()
        .booking;

    let cancelled = h
        .ledger
        .cancel_booking(booking.id, Actor::Guest(booking.guest.id), None)
        .await
        .unwrap();

    assert_eq!(cancelled.refund.unwrap().amount, Money::ZERO);
    assert!(h.gateway.refunds().is_empty());

    println!("✓ Nothing paid, nothing refunded");
}

/// Test 16: Strangers cannot cancel and terminal bookings stay terminal
#[tokio::test]
async fn test_cancel_rejections() {
    let h = Harness::new();
    let event = h.published_event(8, 20_000, BookingMode::Instant).await;
    let booking = h.paid_booking(&event, "Ola", 1).await;

    let stranger = h
        .ledger
        .cancel_booking(booking.id, Actor::Guest(guest("Jan").id), None)
        .await;
    assert!(matches!(stranger, Err(LedgerError::UnauthorizedActor { .. })));

    h.ledger.cancel_booking(booking.id, h.host(), None).await.unwrap();
    let twice = h.ledger.cancel_booking(booking.id, h.host(), None).await;
    assert!(matches!(twice, Err(LedgerError::InvalidStateTransition { .. })));
    assert_eq!(h.ledger.availability(event.id).await.unwrap().spots_left, 8);

    println!("✓ Cancel rejections");
}

/// Test 17: Payment is recorded once, and only for approved bookings
#[tokio::test]
async fn test_mark_paid_rules() {
    let h = Harness::new();
    let event = h.published_event(8, 20_000, BookingMode::Manual).await;
    let booking = h
        .ledger
        .create_booking(BookingRequest::new(event.id, guest("Ola"), 1))
        .await
        .unwrap()
        .booking;

    let pending = h.ledger.mark_paid(booking.id).await;
    assert!(matches!(pending, Err(LedgerError::InvalidStateTransition { .. })));

    h.ledger.approve_booking(booking.id, h.host()).await.unwrap();
    let paid = h.ledger.mark_paid(booking.id).await.unwrap();
    assert_eq!(paid.paid_at, Some(h.clock.now()));

    let twice = h.ledger.mark_paid(booking.id).await;
    assert!(matches!(twice, Err(LedgerError::InvalidStateTransition { .. })));

    println!("✓ Payment recorded exactly once");
}

/// Test 18: Completion only after the event started
#[tokio::test]
async fn test_completion_after_start() {
    let h = Harness::new();
    let event = h.published_event(8, 20_000, BookingMode::Instant).await;
    let booking = h.paid_booking(&event, "Ola", 1).await;

    let early = h.ledger.mark_completed(booking.id, h.host()).await;
    assert_eq!(
        early,
        Err(LedgerError::EventNotStarted {
            operation: "mark bookings completed",
            starts_at: event.starts_at,
        })
    );

    h.clock.set(event.starts_at + Duration::hours(3));
    let completed = h.ledger.mark_completed(booking.id, h.host()).await.unwrap();

    assert_eq!(completed.status, BookingStatus::Completed);
    // completed bookings keep their seats
    assert_eq!(h.ledger.availability(event.id).await.unwrap().spots_left, 7);

    println!("✓ Completed after the event");
}

/// Test 19: No-shows keep their seats and get a zero refund
#[tokio::test]
async fn test_no_show_zero_refund() {
    let h = Harness::new();
    let event = h.published_event(8, 20_000, BookingMode::Instant).await;
    let booking = h.paid_booking(&event, "Ola", 2).await;
    h.clock.set(event.starts_at + Duration::hours(1));

    let guest_marking = h
        .ledger
        .mark_no_show(booking.id, Actor::Guest(booking.guest.id))
        .await;
    assert!(matches!(guest_marking, Err(LedgerError::UnauthorizedActor { .. })));

    let no_show = h.ledger.mark_no_show(booking.id, h.host()).await.unwrap();

    let refund = no_show.refund.unwrap();
    assert_eq!(no_show.status, BookingStatus::NoShow);
    assert_eq!(refund.reason, RefundReason::NoShow);
    assert_eq!(refund.amount, Money::ZERO);
    assert_eq!(h.ledger.availability(event.id).await.unwrap().spots_left, 6);

    let cancel = h.ledger.cancel_booking(booking.id, h.host(), None).await;
    assert!(matches!(cancel, Err(LedgerError::InvalidStateTransition { .. })));

    println!("✓ No-show recorded");
}

/// Test 20: Unknown ids are typed not-found errors
#[tokio::test]
async fn test_unknown_booking() {
    let h = Harness::new();

    let result = h.ledger.mark_paid(seated::BookingId::new()).await;

    assert!(matches!(result, Err(LedgerError::NotFound { .. })));

    println!("✓ Unknown booking reported");
}

/// Test 21: Nothing can be booked, queued or cancelled once the event started
#[tokio::test]
async fn test_event_closes_at_start() {
    let h = Harness::new();
    let event = h.published_event(1, 20_000, BookingMode::Instant).await;
    let booking = h.paid_booking(&event, "Ola", 1).await;
    h.clock.set(event.starts_at);

    let late_booking = h
        .ledger
        .create_booking(BookingRequest::new(event.id, guest("Jan"), 1))
        .await;
    let late_join = h.waitlist().join_waitlist(event.id, guest("Zofia"), 1).await;
    let late_cancel = h
        .ledger
        .cancel_booking(booking.id, Actor::Guest(booking.guest.id), None)
        .await;

    let started = |operation: &'static str| LedgerError::EventStarted {
        operation,
        starts_at: event.starts_at,
    };
    assert_eq!(late_booking.map(|outcome| outcome.booking.id), Err(started("book")));
    assert_eq!(late_join.map(|entry| entry.id), Err(started("join the waitlist")));
    assert_eq!(late_cancel.map(|booking| booking.id), Err(started("cancel a booking")));
    assert_eq!(
        h.ledger.booking(booking.id).await.unwrap().status,
        BookingStatus::Approved
    );
    assert!(h.gateway.refunds().is_empty());

    println!("✓ Booking, joining and cancelling refused at the start time");
}

/// Test 22: Completing the event closes the waitlist and ends booking
#[tokio::test]
async fn test_complete_event() {
    let h = Harness::new();
    let event = h.published_event(1, 20_000, BookingMode::Instant).await;
    let booking = h.paid_booking(&event, "Ola", 1).await;
    let zofia = h.waitlist().join_waitlist(event.id, guest("Zofia"), 1).await.unwrap();

    let early = h.ledger.complete_event(event.id, h.host()).await;
    assert_eq!(
        early.map(|event| event.status),
        Err(LedgerError::EventNotStarted {
            operation: "complete an event",
            starts_at: event.starts_at,
        })
    );

    h.clock.set(event.starts_at + Duration::hours(4));
    let stranger = h.ledger.complete_event(event.id, Actor::Host(HostId::new())).await;
    assert!(matches!(stranger, Err(LedgerError::UnauthorizedActor { .. })));

    let completed = h.ledger.complete_event(event.id, h.host()).await.unwrap();
    assert_eq!(completed.status, seated::EventStatus::Completed);
    assert!(matches!(
        h.waitlist().entry(zofia.id).await.unwrap().status,
        seated::WaitlistStatus::Withdrawn { .. }
    ));
    assert_eq!(h.count_kind("waitlist_closed"), 1);

    let attended = h.ledger.mark_completed(booking.id, h.host()).await.unwrap();
    assert_eq!(attended.status, BookingStatus::Completed);

    let after = h
        .ledger
        .create_booking(BookingRequest::new(event.id, guest("Jan"), 1))
        .await;
    assert!(matches!(after, Err(LedgerError::EventNotBookable { .. })));

    let again = h.ledger.complete_event(event.id, h.host()).await;
    assert!(matches!(again, Err(LedgerError::InvalidStateTransition { .. })));

    println!("✓ Event completed, queue closed, booking recorded as attended");
}

