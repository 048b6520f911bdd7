//! Payment processor integration.
//!
//! The core never charges cards itself. On approval it asks the processor for
//! a payment link; the processor later confirms payment through
//! [`crate::app::BookingLedger::mark_paid`]. Refunds are issued after a
//! cancellation is committed.

use crate::types::{BookingId, Money};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use thiserror::Error;

/// Payment gateway result
pub type GatewayResult<T> = Result<T, PaymentGatewayError>;

/// Payment gateway error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaymentGatewayError {
    /// The processor refused the request.
    #[error("payment processor rejected request: {reason}")]
    Rejected {
        /// Processor's reason
        reason: String,
    },

    /// No answer in time.
    #[error("payment processor timed out")]
    Timeout,

    /// Anything else.
    #[error("payment error: {message}")]
    Other {
        /// Error message
        message: String,
    },
}

/// Where the guest completes payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLink {
    /// Booking being paid for
    pub booking_id: BookingId,
    /// Checkout URL
    pub url: String,
    /// Amount requested
    pub amount: Money,
    /// When the link stops working, if the processor says
    pub expires_at: Option<DateTime<Utc>>,
}

/// Processor acknowledgement of a refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundReceipt {
    /// Booking refunded
    pub booking_id: BookingId,
    /// Processor refund reference
    pub refund_id: String,
    /// Amount returned
    pub amount: Money,
}

/// Payment gateway trait
///
/// Abstraction over processors such as Stripe or Przelewy24.
pub trait PaymentGateway: Send + Sync {
    /// Creates a checkout link for an approved booking.
    fn issue_payment_link<'a>(
        &'a self,
        booking_id: BookingId,
        email: &'a str,
        amount: Money,
    ) -> BoxFuture<'a, GatewayResult<PaymentLink>>;

    /// Returns `amount` to the guest who paid for `booking_id`.
    fn refund(&self, booking_id: BookingId, amount: Money) -> BoxFuture<'_, GatewayResult<RefundReceipt>>;
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{GatewayCall, MockPaymentGateway};

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use super::{GatewayResult, PaymentGateway, PaymentGatewayError, PaymentLink, RefundReceipt};
    use crate::types::{BookingId, Money};
    use futures::future::{BoxFuture, FutureExt};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// A call the mock received.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum GatewayCall {
        /// `issue_payment_link`
        PaymentLink {
            /// Booking
            booking_id: BookingId,
            /// Amount
            amount: Money,
        },
        /// `refund`
        Refund {
            /// Booking
            booking_id: BookingId,
            /// Amount
            amount: Money,
        },
    }

    /// Records every call and succeeds unless told to fail.
    #[derive(Clone, Debug, Default)]
    pub struct MockPaymentGateway {
        calls: Arc<Mutex<Vec<GatewayCall>>>,
        failing: Arc<AtomicBool>,
    }

    impl MockPaymentGateway {
        /// A gateway that accepts everything.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// A gateway that rejects everything (calls are still recorded).
        #[must_use]
        pub fn failing() -> Self {
            let gateway = Self::new();
            gateway.failing.store(true, Ordering::SeqCst);
            gateway
        }

        /// Calls received so far.
        #[must_use]
        pub fn calls(&self) -> Vec<GatewayCall> {
            self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
        }

        /// Refunds requested so far.
        #[must_use]
        pub fn refunds(&self) -> Vec<(BookingId, Money)> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    GatewayCall::Refund { booking_id, amount } => Some((booking_id, amount)),
                    GatewayCall::PaymentLink { .. } => None,
                })
                .collect()
        }

        fn record(&self, call: GatewayCall) -> GatewayResult<()> {
            self.calls
                .lock()
                .map_err(|_| PaymentGatewayError::Other {
                    message: "mock call log poisoned".to_string(),
                })?
                .push(call);
            if self.failing.load(Ordering::SeqCst) {
                return Err(PaymentGatewayError::Rejected {
                    reason: "mock gateway configured to fail".to_string(),
                });
            }
            Ok(())
        }
    }

    impl PaymentGateway for MockPaymentGateway {
        fn issue_payment_link<'a>(
            &'a self,
            booking_id: BookingId,
            _email: &'a str,
            amount: Money,
        ) -> BoxFuture<'a, GatewayResult<PaymentLink>> {
            async move {
                self.record(GatewayCall::PaymentLink { booking_id, amount })?;
                let link = PaymentLink {
                    booking_id,
                    url: format!("https://pay.example.test/checkout/{booking_id}"),
                    amount,
                    expires_at: None,
                };
                tracing::info!(%booking_id, amount = amount.minor(), url = %link.url, "Mock payment link issued");
                Ok(link)
            }
            .boxed()
        }

        fn refund(&self, booking_id: BookingId, amount: Money) -> BoxFuture<'_, GatewayResult<RefundReceipt>> {
            async move {
                self.record(GatewayCall::Refund { booking_id, amount })?;
                let refund_id = format!("mock_refund_{}", uuid::Uuid::new_v4());
                tracing::info!(%booking_id, amount = amount.minor(), %refund_id, "Mock refund processed");
                Ok(RefundReceipt {
                    booking_id,
                    refund_id,
                    amount,
                })
            }
            .boxed()
        }
    }
}
