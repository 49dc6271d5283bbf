//! Orders: an immutable snapshot of a cart plus mutable payment status.
//!
//! Line prices and the total are fixed when the order is built from the cart and
//! are never recomputed from catalog prices afterwards. Status changes go through
//! the methods on [`Order`], which enforce the transition table from
//! [`OrderStatus::can_transition_to`] and keep the access flags consistent:
//! `access_granted` is never set without `payment_verified`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    CartLine, CurrencyCode, Email, Identity, OrderId, OrderStatus, PaymentMethod, Price, ProductId,
};

/// Errors from applying a status transition to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The transition is not allowed from the current status.
    #[error("cannot move order from {from} to {to}")]
    Illegal {
        /// Current status.
        from: OrderStatus,
        /// Requested status.
        to: OrderStatus,
    },
    /// The order is already in the requested status.
    #[error("order is already {0}")]
    AlreadyInState(OrderStatus),
}

/// A purchased line, snapshotted from the cart at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: ProductId,
    pub title: String,
    pub quantity: u32,
    pub unit_price_at_purchase: Decimal,
}

impl OrderLine {
    /// `unit_price_at_purchase * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price_at_purchase * Decimal::from(self.quantity)
    }
}

impl From<&CartLine> for OrderLine {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id.clone(),
            title: line.title.clone(),
            quantity: line.quantity,
            unit_price_at_purchase: line.unit_price,
        }
    }
}

/// A customer order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub created_at: DateTime<Utc>,
    pub user_email: Email,
    pub user_name: String,
    pub items: Vec<OrderLine>,
    pub total: Decimal,
    pub currency: CurrencyCode,
    /// Slug of the payment method chosen at checkout.
    pub payment_method: String,
    pub payment_reference: Option<String>,
    pub payment_proof_ref: Option<String>,
    pub payment_intent_id: Option<String>,
    pub status: OrderStatus,
    pub payment_verified: bool,
    pub payment_verified_at: Option<DateTime<Utc>>,
    pub payment_verified_by: Option<String>,
    pub access_granted: bool,
    pub access_granted_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// Incremented on every persisted write; used for compare-and-swap.
    pub revision: i64,
}

impl Order {
    /// Snapshot `lines` into a new order owned by `owner`.
    ///
    /// Manual methods start in `payment_submitted` (the proof is attached now);
    /// the redirect method starts in `pending`. Callers are responsible for
    /// rejecting empty carts and missing proofs before building the order.
    #[must_use]
    pub fn snapshot(
        owner: &Identity,
        lines: &[CartLine],
        method: &PaymentMethod,
        payment_proof_ref: Option<String>,
        currency: CurrencyCode,
        now: DateTime<Utc>,
    ) -> Self {
        let items: Vec<OrderLine> = lines.iter().map(OrderLine::from).collect();
        let total = items.iter().map(OrderLine::line_total).sum();
        let status = if method.is_manual() {
            OrderStatus::PaymentSubmitted
        } else {
            OrderStatus::Pending
        };

        Self {
            id: OrderId::generate(),
            created_at: now,
            user_email: owner.email.clone(),
            user_name: owner.name.clone(),
            items,
            total,
            currency,
            payment_method: method.slug.clone(),
            payment_reference: None,
            payment_proof_ref,
            payment_intent_id: None,
            status,
            payment_verified: false,
            payment_verified_at: None,
            payment_verified_by: None,
            access_granted: false,
            access_granted_at: None,
            notes: None,
            revision: 0,
        }
    }

    /// Total as a displayable price.
    #[must_use]
    pub const fn total_price(&self) -> Price {
        Price::new(self.total, self.currency)
    }

    /// Whether any line references `product_id`.
    #[must_use]
    pub fn references_product(&self, product_id: &ProductId) -> bool {
        self.items.iter().any(|line| &line.product_id == product_id)
    }

    /// Mark payment verified and grant access.
    ///
    /// Timestamps are stamped exactly once; verifying an already verified order
    /// fails with [`TransitionError::AlreadyInState`] and leaves it untouched.
    ///
    /// # Errors
    ///
    /// Returns an error unless the order is awaiting verification.
    pub fn verify(&mut self, verified_by: &str, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.check(OrderStatus::Verified)?;
        self.status = OrderStatus::Verified;
        self.payment_verified = true;
        self.payment_verified_at = Some(now);
        self.payment_verified_by = Some(verified_by.to_owned());
        self.access_granted = true;
        self.access_granted_at = Some(now);
        Ok(())
    }

    /// Cancel the order, recording the reason in `notes`.
    ///
    /// # Errors
    ///
    /// Returns an error unless the order is awaiting verification.
    pub fn reject(&mut self, reason: &str) -> Result<(), TransitionError> {
        self.check(OrderStatus::Cancelled)?;
        self.status = OrderStatus::Cancelled;
        self.notes = Some(reason.to_owned());
        Ok(())
    }

    /// Mark the order completed after the customer fetched the asset.
    ///
    /// # Errors
    ///
    /// Returns an error unless the order is verified.
    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.check(OrderStatus::Completed)?;
        self.status = OrderStatus::Completed;
        Ok(())
    }

    /// Set the status without consulting the transition table.
    ///
    /// Returns the previous status. Access flags are left as they are, so the
    /// `access_granted => payment_verified` invariant still holds.
    pub fn override_status(&mut self, status: OrderStatus) -> OrderStatus {
        std::mem::replace(&mut self.status, status)
    }

    fn check(&self, to: OrderStatus) -> Result<(), TransitionError> {
        if self.status == to {
            return Err(TransitionError::AlreadyInState(to));
        }
        if !self.status.can_transition_to(to) {
            return Err(TransitionError::Illegal {
                from: self.status,
                to,
            });
        }
        Ok(())
    }
}
