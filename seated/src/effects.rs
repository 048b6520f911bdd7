//! Side effects as values.
//!
//! Reducers build [`Effect::Future`]s through the [`EffectRunner`] held in
//! their environment. Nothing runs until the ledger has committed the state
//! change, released the event lock and called [`run_effects`]. A failing
//! effect is logged and never undoes the transition that produced it.

use crate::notifications::{Notification, Notifier};
use crate::payment_gateway::PaymentGateway;
use crate::types::{BookingId, Money};
use seated_core::SmallVec;
use seated_core::effect::Effect;
use std::fmt::Debug;
use std::sync::Arc;

/// Effects produced by one reduction. Most produce at most a few.
pub type Effects<A> = SmallVec<[Effect<A>; 4]>;

/// Builds and executes effects against the configured collaborators.
#[derive(Clone)]
pub struct EffectRunner {
    notifier: Arc<dyn Notifier>,
    payments: Arc<dyn PaymentGateway>,
}

impl EffectRunner {
    /// Runner over the given notifier and payment gateway.
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>, payments: Arc<dyn PaymentGateway>) -> Self {
        Self { notifier, payments }
    }

    /// Sends `notification`.
    #[must_use]
    pub fn notify<A: Send + 'static>(&self, notification: Notification) -> Effect<A> {
        let notifier = Arc::clone(&self.notifier);
        Effect::Future(Box::pin(async move {
            let kind = notification.kind();
            if let Err(error) = notifier.send(notification).await {
                tracing::warn!(kind, %error, "Notification failed");
            }
            None
        }))
    }

    /// Asks the processor for a checkout link.
    #[must_use]
    pub fn payment_link<A: Send + 'static>(&self, booking_id: BookingId, email: String, amount: Money) -> Effect<A> {
        let payments = Arc::clone(&self.payments);
        Effect::Future(Box::pin(async move {
            match payments.issue_payment_link(booking_id, &email, amount).await {
                Ok(link) => tracing::debug!(%booking_id, url = %link.url, "Payment link ready"),
                Err(error) => tracing::warn!(%booking_id, %error, "Payment link failed"),
            }
            None
        }))
    }

    /// Returns `amount` to the guest. A zero refund is [`Effect::None`].
    #[must_use]
    pub fn refund<A: Send + 'static>(&self, booking_id: BookingId, amount: Money) -> Effect<A> {
        if amount.is_zero() {
            return Effect::None;
        }
        let payments = Arc::clone(&self.payments);
        Effect::Future(Box::pin(async move {
            match payments.refund(booking_id, amount).await {
                Ok(receipt) => {
                    tracing::info!(%booking_id, refund_id = %receipt.refund_id, amount = amount.minor(), "Refund issued");
                }
                Err(error) => tracing::warn!(%booking_id, amount = amount.minor(), %error, "Refund failed"),
            }
            None
        }))
    }
}

/// Runs `effects` one after another, in the order the reducer emitted them.
pub async fn run_effects<A: Send + Debug + 'static>(effects: Effects<A>) {
    for action in Effect::chain(effects.into_vec()).execute().await {
        tracing::debug!(?action, "Effect produced an action; nothing dispatches it");
    }
}
