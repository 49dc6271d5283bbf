//! Redirect e-wallet checkout with continuation-token resumption.
//!
//! 1. Create the order in `pending`.
//! 2. Create a payment intent whose return URLs carry a [`ContinuationToken`].
//! 3. Attach the chosen e-wallet: either redirect the customer or, when the
//!    provider confirms synchronously, verify right away.
//! 4. When the customer comes back, [`RedirectEwallet::resume`] confirms the
//!    intent with the gateway before verifying, and consumes the token once
//!    it reaches a final outcome.
//!
//! A gateway failure after step 1 leaves the order `pending`; it is resolved by
//! an operator.

use std::sync::Arc;

use url::Url;

use bytestall_core::{CartLine, EwalletProvider, Identity, Order, OrderId, OrderStatus, PaymentMethod};

use super::continuation::{ContinuationOutcome, ContinuationToken, ReplayGuard};
use super::paymongo::{AttachOutcome, IntentRequest, IntentStatus, PaymentGateway};
use super::{CheckoutError, CheckoutOutcome};
use crate::orders::{Actor, OrderError, OrderLifecycle};
use crate::services::NotificationDispatcher;

/// What happened when a customer returned from the provider's page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// This call confirmed the payment and verified the order; the cart can be
    /// cleared.
    Completed(Order),
    /// The gateway has not settled the payment yet; the order stays pending.
    Processing(Order),
    /// Cancelled or failed on the provider's side; the order is untouched.
    Cancelled { order_id: Option<OrderId> },
    /// The token was already handled, or the order was confirmed earlier;
    /// nothing happened.
    Replayed,
}

#[derive(Clone)]
pub struct RedirectEwallet {
    lifecycle: OrderLifecycle,
    gateway: Arc<dyn PaymentGateway>,
    notifications: NotificationDispatcher,
    return_url: Url,
    replay: ReplayGuard,
}

impl RedirectEwallet {
    /// `return_url` is the checkout page the gateway sends customers back to.
    #[must_use]
    pub fn new(
        lifecycle: OrderLifecycle,
        gateway: Arc<dyn PaymentGateway>,
        notifications: NotificationDispatcher,
        return_url: Url,
        replay: ReplayGuard,
    ) -> Self {
        Self {
            lifecycle,
            gateway,
            notifications,
            return_url,
            replay,
        }
    }

    /// Create the order and start the gateway payment.
    ///
    /// # Errors
    ///
    /// `Validation` before the order exists; `Gateway` after it exists, in
    /// which case the order remains `pending`.
    #[tracing::instrument(skip_all, fields(provider = provider.as_str()))]
    pub async fn reconcile(
        &self,
        customer: Option<&Identity>,
        lines: &[CartLine],
        method: &PaymentMethod,
        provider: EwalletProvider,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let customer = customer
            .ok_or_else(|| OrderError::Validation("sign in to check out".to_owned()))?;
        let order = self
            .lifecycle
            .create(Some(customer), lines, method, None, None)
            .await?;

        let request = IntentRequest {
            order_id: order.id.clone(),
            amount: order.total_price(),
            description: format!("Bytestall order {}", order.id),
            success_url: ContinuationToken::success(order.id.clone()).embed(&self.return_url),
            cancel_url: ContinuationToken::cancel(order.id.clone()).embed(&self.return_url),
            customer_email: customer.email.clone(),
            customer_name: customer.name.clone(),
        };

        let intent = self.gateway.create_intent(&request).await.inspect_err(|e| {
            tracing::warn!(order_id = %order.id, error = %e, "Payment intent failed; order left pending");
        })?;
        let order = self
            .lifecycle
            .attach_payment_intent(&order, &intent.id)
            .await?;

        let attached = self
            .gateway
            .attach_method(
                &intent,
                provider,
                &request.success_url,
                &customer.name,
                &customer.email,
            )
            .await
            .inspect_err(|e| {
                tracing::warn!(order_id = %order.id, error = %e, "Payment attach failed; order left pending");
            })?;

        match attached {
            AttachOutcome::Redirect(url) => Ok(CheckoutOutcome::Redirect { order, url }),
            AttachOutcome::Succeeded => {
                let order = self.confirm(&order.id, customer).await?;
                Ok(CheckoutOutcome::Verified(order))
            }
        }
    }

    /// Handle a continuation token from the checkout page's query.
    ///
    /// The token is marked consumed only once it reaches a final outcome, so a
    /// failed attempt leaves it usable by the order's owner. Only the call that
    /// verifies the order reports `Completed`; an order that was already
    /// confirmed yields `Replayed` even when the replay guard has forgotten the
    /// token.
    ///
    /// # Errors
    ///
    /// Ownership and lookup errors for the token's order, or `Gateway` if the
    /// intent status cannot be fetched.
    #[tracing::instrument(skip(self, customer), fields(token = %token))]
    pub async fn resume(
        &self,
        token: &ContinuationToken,
        customer: &Identity,
    ) -> Result<ResumeOutcome, CheckoutError> {
        if self.replay.is_consumed(token) {
            tracing::info!("Ignoring replayed continuation token");
            return Ok(ResumeOutcome::Replayed);
        }

        let outcome = self.settle(token, customer).await?;
        match &outcome {
            ResumeOutcome::Completed(_) | ResumeOutcome::Cancelled { .. } => {
                if !self.replay.consume(token).await {
                    tracing::debug!("Continuation token consumed concurrently");
                }
            }
            ResumeOutcome::Processing(_) | ResumeOutcome::Replayed => {}
        }
        Ok(outcome)
    }

    async fn settle(
        &self,
        token: &ContinuationToken,
        customer: &Identity,
    ) -> Result<ResumeOutcome, CheckoutError> {
        let order_id = match (token.outcome, &token.order_id) {
            (ContinuationOutcome::Success, Some(id)) => id.clone(),
            (_, order_id) => {
                tracing::info!("Customer cancelled redirect payment");
                return Ok(ResumeOutcome::Cancelled {
                    order_id: order_id.clone(),
                });
            }
        };

        let order = self.lifecycle.get_for_customer(&order_id, customer).await?;
        if order.status.grants_access() {
            tracing::info!(order_id = %order_id, "Order already confirmed; token ignored");
            return Ok(ResumeOutcome::Replayed);
        }
        if order.status.is_terminal() {
            return Ok(ResumeOutcome::Cancelled {
                order_id: Some(order_id),
            });
        }
        let Some(intent_id) = order.payment_intent_id.clone() else {
            return Ok(ResumeOutcome::Processing(order));
        };

        match self.gateway.intent_status(&intent_id).await? {
            IntentStatus::Succeeded => match self.verify(&order_id, customer).await? {
                Some(order) => {
                    self.notifications.order_placed(&order);
                    Ok(ResumeOutcome::Completed(order))
                }
                None => Ok(ResumeOutcome::Replayed),
            },
            IntentStatus::InProgress => Ok(ResumeOutcome::Processing(order)),
            IntentStatus::Failed => {
                tracing::info!(order_id = %order_id, "Redirect payment failed at the gateway");
                Ok(ResumeOutcome::Cancelled {
                    order_id: Some(order_id),
                })
            }
        }
    }

    /// Verify on behalf of the gateway. `None` when another request got there
    /// first.
    async fn verify(
        &self,
        id: &OrderId,
        customer: &Identity,
    ) -> Result<Option<Order>, CheckoutError> {
        let actor = Actor::Gateway {
            customer: customer.clone(),
        };
        match self.lifecycle.verify(id, &actor).await {
            Ok(order) => Ok(Some(order)),
            Err(e) if e.is_already(OrderStatus::Verified) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn confirm(&self, id: &OrderId, customer: &Identity) -> Result<Order, CheckoutError> {
        let order = match self.verify(id, customer).await? {
            Some(order) => order,
            None => self.lifecycle.get(id).await?,
        };
        self.notifications.order_placed(&order);
        Ok(order)
    }
}
