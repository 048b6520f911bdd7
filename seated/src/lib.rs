//! Seated booking core
//!
//! The engineering core of a marketplace for culinary events: hosts list
//! supper clubs, tastings and workshops; guests book seats. This crate covers:
//!
//! - **Booking lifecycle**: request, host approval or decline, payment,
//!   completion or no-show, cancellation
//! - **Commission**: platform fee and host payout from the amount charged
//! - **Cancellation policy**: refund table keyed by who cancelled and how much
//!   notice they gave
//! - **Waitlist promotion**: FIFO queue per event, time-boxed offers, periodic
//!   expiry sweep
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐     ┌────────────────────┐
//! │ BookingLedger │────▶│   WaitlistEngine   │◀──── ExpirySweeper
//! └───────────────┘     └────────────────────┘
//!         │                       │
//!         ├── Commission          │
//!         ├── RefundPolicy        │
//!         ▼                       ▼
//! ┌──────────────────────────────────────────┐
//! │ LedgerEnvironment                        │
//! │  clock · repositories · per-event locks  │
//! │  EffectRunner (notifier, payment gateway)│
//! └──────────────────────────────────────────┘
//! ```
//!
//! The ledger and the engine are stores. The decisions live in three
//! reducers over one event's [`LedgerState`]: [`BookingReducer`],
//! [`WaitlistReducer`] and [`EventReducer`]. They mutate the state and return
//! notifications, payment links and refunds as effects, which run only after
//! the state is persisted and the lock is released.
//!
//! # Capacity
//!
//! ```text
//! spots_left = capacity - tickets of APPROVED, COMPLETED and NO_SHOW bookings
//! open       = spots_left - tickets held by unexpired waitlist offers
//! ```
//!
//! Every capacity check and seat change for an event runs while holding that
//! event's lock, so two guests can never both take the last seat. PENDING
//! bookings hold nothing of their own; approval re-checks capacity. A PENDING
//! booking made from a waitlist offer keeps that offer's seats held until the
//! host decides.
//!
//! # Usage
//!
//! ```ignore
//! let ledger = BookingLedger::new(env);
//! let event = ledger.create_event(host_id, draft).await?;
//! ledger.publish_event(event.id, Actor::Host(host_id)).await?;
//! let outcome = ledger
//!     .create_booking(BookingRequest::new(event.id, guest, 2))
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregates;
pub mod app;
pub mod cancellation;
pub mod commission;
pub mod config;
pub mod effects;
pub mod error;
pub mod notifications;
pub mod payment_gateway;
pub mod repository;
pub mod stores;
pub mod types;
pub mod voucher;

pub use aggregates::{
    Booking, BookingAction, BookingEnvironment, BookingMode, BookingReducer, BookingStatus,
    BookingWarning, Event, EventAction, EventDraft, EventReducer, EventStatus, LedgerState,
    WaitlistAction, WaitlistEntry, WaitlistReducer, WaitlistStatus,
};
pub use app::{
    Availability, BookingLedger, BookingOutcome, BookingRequest, EventCancellation,
    ExpirySweeper, LedgerEnvironment, SweepReport, WaitlistEngine,
};
pub use cancellation::{Initiator, RefundDecision, RefundPolicy, RefundReason};
pub use commission::{Commission, CommissionScheme, calculate_commission};
pub use config::{BookingConfig, Config};
pub use effects::{EffectRunner, Effects, run_effects};
pub use error::{LedgerError, RepositoryError, Result};
pub use notifications::{Notification, Notifier, TracingNotifier};
pub use payment_gateway::PaymentGateway;
pub use repository::Repositories;
pub use types::{Actor, BookingId, EventId, GuestId, GuestInfo, HostId, Money, WaitlistEntryId};
pub use voucher::{Voucher, VoucherDiscount, VoucherError};

#[cfg(any(test, feature = "test-utils"))]
pub use notifications::RecordingNotifier;
#[cfg(any(test, feature = "test-utils"))]
pub use payment_gateway::MockPaymentGateway;
