//! Guest and host notifications.
//!
//! The core decides *what* to tell people; a [`Notifier`] decides how (email,
//! push, SMS). Delivery happens after state is committed and never rolls it
//! back.

use crate::cancellation::RefundDecision;
use crate::types::{BookingId, EventId, HostId, Money, WaitlistEntryId};
use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Something a guest or host should hear about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// The host has a new booking, or a request to decide on.
    BookingRequested {
        /// Event owner
        host_id: HostId,
        /// The booking
        booking_id: BookingId,
        /// Event booked
        event_id: EventId,
        /// Seats booked
        ticket_count: u32,
        /// Manual-approval event; the host has to approve or decline
        needs_approval: bool,
    },
    /// The guest's request went to the host.
    BookingAwaitingApproval {
        /// Guest address
        email: String,
        /// The booking
        booking_id: BookingId,
    },
    /// A booking was approved.
    BookingConfirmed {
        /// Guest address
        email: String,
        /// The booking
        booking_id: BookingId,
        /// Event booked
        event_id: EventId,
        /// Amount to pay
        amount_due: Money,
    },
    /// The host declined a booking request.
    BookingDeclined {
        /// Guest address
        email: String,
        /// The booking
        booking_id: BookingId,
    },
    /// A booking was cancelled.
    BookingCancelled {
        /// Guest address
        email: String,
        /// The booking
        booking_id: BookingId,
        /// Refund granted
        refund: RefundDecision,
    },
    /// A waitlisted guest may now book.
    WaitlistSpotAvailable {
        /// Guest address
        email: String,
        /// The entry
        entry_id: WaitlistEntryId,
        /// Event with free seats
        event_id: EventId,
        /// Seats held for the guest
        tickets: u32,
        /// Last moment to book
        expires_at: DateTime<Utc>,
    },
    /// A waitlist offer lapsed.
    WaitlistEntryExpired {
        /// Guest address
        email: String,
        /// The entry
        entry_id: WaitlistEntryId,
    },
    /// The event was cancelled or took place while the guest was on its
    /// waitlist.
    WaitlistClosed {
        /// Guest address
        email: String,
        /// The entry
        entry_id: WaitlistEntryId,
        /// Event that closed
        event_id: EventId,
    },
}

impl Notification {
    /// Short label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BookingRequested { .. } => "booking_requested",
            Self::BookingAwaitingApproval { .. } => "booking_awaiting_approval",
            Self::BookingConfirmed { .. } => "booking_confirmed",
            Self::BookingDeclined { .. } => "booking_declined",
            Self::BookingCancelled { .. } => "booking_cancelled",
            Self::WaitlistSpotAvailable { .. } => "waitlist_spot_available",
            Self::WaitlistEntryExpired { .. } => "waitlist_entry_expired",
            Self::WaitlistClosed { .. } => "waitlist_closed",
        }
    }
}

/// Delivery failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The channel rejected or dropped the message.
    #[error("notification delivery failed: {0}")]
    Delivery(String),

    /// The payload could not be rendered.
    #[error("notification could not be encoded: {0}")]
    Encoding(String),
}

/// Delivers notifications.
pub trait Notifier: Send + Sync {
    /// Sends one notification.
    fn send(&self, notification: Notification) -> BoxFuture<'_, Result<(), NotifyError>>;
}

/// Writes notifications to the log as JSON instead of delivering them.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn send(&self, notification: Notification) -> BoxFuture<'_, Result<(), NotifyError>> {
        let result = serde_json::to_string(&notification)
            .map(|payload| {
                tracing::info!(kind = notification.kind(), %payload, "Notification sent");
            })
            .map_err(|e| NotifyError::Encoding(e.to_string()));
        future::ready(result).boxed()
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use recording::RecordingNotifier;

#[cfg(any(test, feature = "test-utils"))]
mod recording {
    use super::{Notification, Notifier, NotifyError};
    use futures::future::{self, BoxFuture, FutureExt};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// Keeps every notification in memory for assertions.
    #[derive(Clone, Debug, Default)]
    pub struct RecordingNotifier {
        sent: Arc<Mutex<Vec<Notification>>>,
        failing: Arc<AtomicBool>,
    }

    impl RecordingNotifier {
        /// A notifier that accepts everything.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// A notifier that records and then reports a delivery failure.
        #[must_use]
        pub fn failing() -> Self {
            let notifier = Self::new();
            notifier.failing.store(true, Ordering::SeqCst);
            notifier
        }

        /// Everything sent so far, in order.
        #[must_use]
        pub fn sent(&self) -> Vec<Notification> {
            self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
        }

        /// Labels of everything sent so far.
        #[must_use]
        pub fn kinds(&self) -> Vec<&'static str> {
            self.sent().iter().map(Notification::kind).collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn send(&self, notification: Notification) -> BoxFuture<'_, Result<(), NotifyError>> {
            let result = self
                .sent
                .lock()
                .map_err(|_| NotifyError::Delivery("recorder poisoned".to_string()))
                .and_then(|mut sent| {
                    sent.push(notification);
                    if self.failing.load(Ordering::SeqCst) {
                        Err(NotifyError::Delivery("recorder configured to fail".to_string()))
                    } else {
                        Ok(())
                    }
                });
            future::ready(result).boxed()
        }
    }
}
