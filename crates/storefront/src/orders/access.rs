//! Delivery gating for purchased digital assets.

use std::sync::Arc;

use serde::Serialize;

use bytestall_core::{Identity, Order, OrderId, OrderStatus, ProductId};

use super::lifecycle::{OrderError, OrderLifecycle};
use crate::db::CatalogRepository;

/// Whether the customer may fetch the assets of `order`.
#[must_use]
pub const fn can_access(order: &Order) -> bool {
    order.status.grants_access()
}

/// One downloadable product of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Download {
    pub product_id: ProductId,
    pub title: String,
    /// `None` when the product no longer has a delivery link.
    pub drive_link: Option<String>,
}

/// The result of exercising access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessGrant {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub downloads: Vec<Download>,
}

/// Hands out delivery links for verified orders.
#[derive(Clone)]
pub struct AccessGate {
    lifecycle: OrderLifecycle,
    catalog: Arc<dyn CatalogRepository>,
}

impl AccessGate {
    #[must_use]
    pub fn new(lifecycle: OrderLifecycle, catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { lifecycle, catalog }
    }

    /// Return the download links for an order and mark it completed.
    ///
    /// The first call on a verified order moves it to `completed`; later calls
    /// return the same links without touching the order.
    ///
    /// # Errors
    ///
    /// `AccessDenied` for orders that are not verified or completed, plus the
    /// lookup errors of [`OrderLifecycle::get_for_customer`].
    #[tracing::instrument(skip(self, customer), fields(customer = %customer.email))]
    pub async fn exercise_access(
        &self,
        id: &OrderId,
        customer: &Identity,
    ) -> Result<AccessGrant, OrderError> {
        let mut order = self.lifecycle.get_for_customer(id, customer).await?;
        if !can_access(&order) {
            return Err(OrderError::AccessDenied(order.status));
        }

        if order.status == OrderStatus::Verified {
            order = match self.lifecycle.mark_completed(id, customer).await {
                Ok(completed) => completed,
                // A concurrent request completed it first.
                Err(OrderError::ConcurrentModification) => {
                    let current = self.lifecycle.get_for_customer(id, customer).await?;
                    if !can_access(&current) {
                        return Err(OrderError::AccessDenied(current.status));
                    }
                    current
                }
                Err(e) => return Err(e),
            };
        }

        let mut downloads = Vec::with_capacity(order.items.len());
        for line in &order.items {
            let drive_link = self
                .catalog
                .get_product(&line.product_id)
                .await
                .map_err(OrderError::from)?
                .and_then(|product| product.drive_link);
            downloads.push(Download {
                product_id: line.product_id.clone(),
                title: line.title.clone(),
                drive_link,
            });
        }

        Ok(AccessGrant {
            order_id: order.id,
            status: order.status,
            downloads,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use bytestall_core::{
        AuthType, CartLine, CurrencyCode, Email, PaymentMethod, ProductRef, UserId,
    };
    use rust_decimal::Decimal;

    use super::*;
    use crate::db::{InMemoryCatalog, InMemoryOrders};
    use crate::models::Product;
    use crate::orders::Actor;

    fn buyer() -> Identity {
        Identity {
            id: UserId::new("u1"),
            email: Email::parse("buyer@example.com").unwrap(),
            name: "Buyer".to_owned(),
            picture: None,
            auth_type: AuthType::Google,
        }
    }

    fn product() -> Product {
        Product {
            id: ProductId::new("p1"),
            title: "Icon set".to_owned(),
            slug: "icon-set".to_owned(),
            price: Decimal::new(2500, 0),
            category: None,
            image_url: None,
            drive_link: Some("https://drive.example/icon-set".to_owned()),
            archived: false,
        }
    }

    async fn setup() -> (OrderLifecycle, AccessGate, Order) {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.put_product(product()).await;
        let lifecycle = OrderLifecycle::new(Arc::new(InMemoryOrders::new()), CurrencyCode::PHP);
        let gate = AccessGate::new(lifecycle.clone(), catalog);

        let method = PaymentMethod {
            slug: "gcash-qr".to_owned(),
            ..PaymentMethod::paymongo()
        };
        let line: ProductRef = product().to_ref();
        let order = lifecycle
            .create(
                Some(&buyer()),
                &[CartLine::from_product(&line, 1)],
                &method,
                Some("image-1".to_owned()),
                None,
            )
            .await
            .unwrap();
        (lifecycle, gate, order)
    }

    #[tokio::test]
    async fn test_unverified_orders_are_refused() {
        let (lifecycle, gate, order) = setup().await;
        assert!(matches!(
            gate.exercise_access(&order.id, &buyer()).await,
            Err(OrderError::AccessDenied(OrderStatus::PaymentSubmitted))
        ));

        lifecycle
            .reject(&order.id, &Email::parse("ops@example.com").unwrap(), "blurry")
            .await
            .unwrap();
        assert!(matches!(
            gate.exercise_access(&order.id, &buyer()).await,
            Err(OrderError::AccessDenied(OrderStatus::Cancelled))
        ));
    }

    #[tokio::test]
    async fn test_first_access_completes_then_is_idempotent() {
        let (lifecycle, gate, order) = setup().await;
        lifecycle
            .verify(&order.id, &Actor::Operator(Email::parse("ops@example.com").unwrap()))
            .await
            .unwrap();

        let first = gate.exercise_access(&order.id, &buyer()).await.unwrap();
        assert_eq!(first.status, OrderStatus::Completed);
        assert_eq!(
            first.downloads[0].drive_link.as_deref(),
            Some("https://drive.example/icon-set")
        );

        let second = gate.exercise_access(&order.id, &buyer()).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(lifecycle.audit_trail(&order.id).await.unwrap().len(), 2);
    }
}
