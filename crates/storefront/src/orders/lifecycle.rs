//! The order state machine.
//!
//! Every transition reads the order, checks who is asking, applies the pure
//! transition from [`Order`], and writes it back with a compare-and-swap on
//! `revision` together with an audit row. Two operators racing on the same
//! order cannot both win: the second write fails with
//! [`OrderError::ConcurrentModification`].

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use bytestall_core::{
    CartLine, CurrencyCode, Email, Identity, Order, OrderId, OrderStatus, PAYMONGO_SLUG,
    PaymentMethod, TransitionError,
};

use crate::db::{AuditEntry, OrderRepository, RepositoryError};

/// Maximum orders returned by admin listings.
pub const ADMIN_LIST_LIMIT: i64 = 200;

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The request is incomplete or malformed.
    #[error("{0}")]
    Validation(String),

    /// The order does not exist.
    #[error("order not found")]
    NotFound,

    /// The order belongs to someone else. Displays exactly like `NotFound`.
    #[error("order not found")]
    Unauthorized,

    /// The transition is not allowed from the order's current status.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// The order's status does not unlock the digital asset.
    #[error("order is {} and cannot be accessed yet", .0.label())]
    AccessDenied(OrderStatus),

    /// Someone else changed the order between read and write.
    #[error("order was modified by someone else; reload and try again")]
    ConcurrentModification,

    /// The operation would break referential consistency.
    #[error("{0}")]
    Consistency(String),

    /// Storage failure.
    #[error("repository error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for OrderError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::Stale { .. } => Self::ConcurrentModification,
            other => Self::Repository(other),
        }
    }
}

impl OrderError {
    /// Whether this error only says the order is already in `status`.
    #[must_use]
    pub fn is_already(&self, status: OrderStatus) -> bool {
        matches!(self, Self::InvalidTransition(TransitionError::AlreadyInState(s)) if *s == status)
    }
}

/// Who is acting on an order.
#[derive(Debug, Clone)]
pub enum Actor {
    /// The customer who placed the order.
    Customer(Identity),
    /// A store operator (allow-listed at the HTTP boundary).
    Operator(Email),
    /// The payment gateway confirming a redirect payment for `customer`.
    Gateway { customer: Identity },
}

impl Actor {
    /// Label recorded in the audit trail and `payment_verified_by`.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Customer(identity) => format!("customer:{}", identity.email),
            Self::Operator(email) => format!("operator:{email}"),
            Self::Gateway { .. } => format!("gateway:{PAYMONGO_SLUG}"),
        }
    }

    fn authorize(&self, order: &Order) -> Result<(), OrderError> {
        match self {
            Self::Operator(_) => Ok(()),
            Self::Customer(identity) | Self::Gateway { customer: identity } => {
                if identity.owns(&order.user_email) {
                    Ok(())
                } else {
                    Err(OrderError::Unauthorized)
                }
            }
        }
    }
}

/// Owns order creation and every status change.
#[derive(Clone)]
pub struct OrderLifecycle {
    orders: Arc<dyn OrderRepository>,
    currency: CurrencyCode,
}

impl OrderLifecycle {
    #[must_use]
    pub fn new(orders: Arc<dyn OrderRepository>, currency: CurrencyCode) -> Self {
        Self { orders, currency }
    }

    /// Snapshot the cart into a new order and persist it.
    ///
    /// `payment_reference` is the customer's transaction number for a manual
    /// transfer, if they gave one.
    ///
    /// # Errors
    ///
    /// `Validation` when no one is signed in, the cart is empty, the method is
    /// inactive, or a manual method has no proof.
    #[tracing::instrument(skip(self, owner, lines, method, proof_ref, payment_reference), fields(method = %method.slug, lines = lines.len()))]
    pub async fn create(
        &self,
        owner: Option<&Identity>,
        lines: &[CartLine],
        method: &PaymentMethod,
        proof_ref: Option<String>,
        payment_reference: Option<String>,
    ) -> Result<Order, OrderError> {
        let owner = owner.ok_or_else(|| OrderError::Validation("sign in to check out".to_owned()))?;
        if lines.is_empty() {
            return Err(OrderError::Validation("your cart is empty".to_owned()));
        }
        if !method.is_active {
            return Err(OrderError::Validation(format!(
                "payment method {} is not available",
                method.name
            )));
        }
        if method.is_manual() && proof_ref.is_none() {
            return Err(OrderError::Validation(
                "upload a screenshot of your payment".to_owned(),
            ));
        }

        let order = Order {
            payment_reference,
            ..Order::snapshot(owner, lines, method, proof_ref, self.currency, Utc::now())
        };
        self.orders.insert(&order).await?;

        tracing::info!(
            order_id = %order.id,
            status = %order.status,
            total = %order.total,
            "Order created"
        );
        Ok(order)
    }

    /// Fetch an order without an ownership check (operators, internal use).
    ///
    /// # Errors
    ///
    /// `NotFound` when the order does not exist.
    pub async fn get(&self, id: &OrderId) -> Result<Order, OrderError> {
        self.orders.get(id).await?.ok_or(OrderError::NotFound)
    }

    /// Fetch an order owned by `customer`.
    ///
    /// # Errors
    ///
    /// `NotFound` when the order does not exist, `Unauthorized` when it belongs
    /// to a different email.
    pub async fn get_for_customer(
        &self,
        id: &OrderId,
        customer: &Identity,
    ) -> Result<Order, OrderError> {
        let order = self.get(id).await?;
        Actor::Customer(customer.clone()).authorize(&order)?;
        Ok(order)
    }

    /// Orders placed by `customer`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn list_for_customer(&self, customer: &Identity) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.list_for_email(&customer.email).await?)
    }

    /// Most recent orders for the admin view.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn list_recent(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.list_recent(status, ADMIN_LIST_LIMIT).await?)
    }

    /// Record the gateway's payment intent on a pending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the order changed since `order` was read.
    pub async fn attach_payment_intent(
        &self,
        order: &Order,
        intent_id: &str,
    ) -> Result<Order, OrderError> {
        let updated = Order {
            payment_intent_id: Some(intent_id.to_owned()),
            ..order.clone()
        };
        Ok(self.orders.save(&updated, None).await?)
    }

    /// Confirm payment and grant access.
    ///
    /// Only operators and the gateway may verify. Verifying an already
    /// verified order fails with `AlreadyInState` and stamps nothing.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Unauthorized`, `InvalidTransition` or
    /// `ConcurrentModification`.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.label()))]
    pub async fn verify(&self, id: &OrderId, actor: &Actor) -> Result<Order, OrderError> {
        if matches!(actor, Actor::Customer(_)) {
            return Err(OrderError::Unauthorized);
        }
        let label = actor.label();
        let by = match actor {
            Actor::Operator(email) => email.to_string(),
            _ => label.clone(),
        };
        self.transition(id, actor, None, |order| order.verify(&by, Utc::now()))
            .await
    }

    /// Cancel an order awaiting verification.
    ///
    /// # Errors
    ///
    /// `NotFound`, `InvalidTransition` or `ConcurrentModification`.
    #[tracing::instrument(skip(self))]
    pub async fn reject(
        &self,
        id: &OrderId,
        operator: &Email,
        reason: &str,
    ) -> Result<Order, OrderError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(OrderError::Validation("a rejection reason is required".to_owned()));
        }
        self.transition(
            id,
            &Actor::Operator(operator.clone()),
            Some(reason),
            |order| order.reject(reason),
        )
        .await
    }

    /// Mark a verified order completed. Only the owning customer can do this,
    /// by exercising access.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Unauthorized`, `InvalidTransition` or
    /// `ConcurrentModification`.
    pub async fn mark_completed(
        &self,
        id: &OrderId,
        customer: &Identity,
    ) -> Result<Order, OrderError> {
        self.transition(id, &Actor::Customer(customer.clone()), None, Order::complete)
            .await
    }

    /// Administrative override: set any status without consulting the
    /// transition table. Always logged at warn level and audited.
    ///
    /// # Errors
    ///
    /// `NotFound` or `ConcurrentModification`.
    #[tracing::instrument(skip(self))]
    pub async fn set_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
        operator: &Email,
        reason: Option<&str>,
    ) -> Result<Order, OrderError> {
        let actor = Actor::Operator(operator.clone());
        let order = self
            .transition(id, &actor, reason, |order| {
                order.override_status(status);
                Ok(())
            })
            .await?;

        tracing::warn!(
            order_id = %id,
            to = %status,
            operator = %operator,
            reason = reason.unwrap_or(""),
            "Order status overridden"
        );
        Ok(order)
    }

    /// Hard-delete a cancelled order.
    ///
    /// # Errors
    ///
    /// `Consistency` unless the order is cancelled; `NotFound` if absent.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: &OrderId, operator: &Email) -> Result<(), OrderError> {
        let order = self.get(id).await?;
        if order.status != OrderStatus::Cancelled {
            return Err(OrderError::Consistency(format!(
                "only cancelled orders can be deleted; this order is {}",
                order.status.label()
            )));
        }
        self.orders.delete(id).await?;
        tracing::warn!(order_id = %id, operator = %operator, "Order hard-deleted");
        Ok(())
    }

    /// Audit trail for an order, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn audit_trail(&self, id: &OrderId) -> Result<Vec<AuditEntry>, OrderError> {
        Ok(self.orders.audit_trail(id).await?)
    }

    async fn transition<F>(
        &self,
        id: &OrderId,
        actor: &Actor,
        reason: Option<&str>,
        apply: F,
    ) -> Result<Order, OrderError>
    where
        F: FnOnce(&mut Order) -> Result<(), TransitionError> + Send,
    {
        let mut order = self.get(id).await?;
        actor.authorize(&order)?;

        let from = order.status;
        apply(&mut order)?;

        let audit = AuditEntry {
            order_id: order.id.clone(),
            actor: actor.label(),
            from_status: from,
            to_status: order.status,
            reason: reason.map(str::to_owned),
            created_at: Utc::now(),
        };
        let saved = self.orders.save(&order, Some(&audit)).await?;

        tracing::info!(
            order_id = %saved.id,
            from = %from,
            to = %saved.status,
            actor = %audit.actor,
            "Order transitioned"
        );
        Ok(saved)
    }
}
