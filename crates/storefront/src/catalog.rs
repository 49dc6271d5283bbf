//! Catalog access for the commerce flows, plus the guarded admin operations.
//!
//! Products referenced by historical orders are never hard-deleted: they can
//! only be archived, which hides them from new carts while keeping order
//! history and delivery links intact.

use std::sync::Arc;

use bytestall_core::{PaymentMethod, ProductId};

use crate::db::{CatalogRepository, OrderRepository};
use crate::models::Product;
use crate::orders::OrderError;

#[derive(Clone)]
pub struct CatalogService {
    catalog: Arc<dyn CatalogRepository>,
    orders: Arc<dyn OrderRepository>,
    redirect_payments: bool,
}

impl CatalogService {
    /// `redirect_payments` adds the synthetic PayMongo entry to method listings.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        orders: Arc<dyn OrderRepository>,
        redirect_payments: bool,
    ) -> Self {
        Self {
            catalog,
            orders,
            redirect_payments,
        }
    }

    /// A product that can be browsed and added to a cart.
    ///
    /// # Errors
    ///
    /// `NotFound` for missing or archived products.
    pub async fn product(&self, id: &ProductId) -> Result<Product, OrderError> {
        match self.catalog.get_product(id).await? {
            Some(product) if !product.archived => Ok(product),
            _ => Err(OrderError::NotFound),
        }
    }

    /// Payment methods offered at checkout: active manual methods, then the
    /// redirect e-wallet entry when the gateway is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn payment_methods(&self) -> Result<Vec<PaymentMethod>, OrderError> {
        let mut methods = self.catalog.list_payment_methods().await?;
        if self.redirect_payments {
            methods.push(PaymentMethod::paymongo());
        }
        Ok(methods)
    }

    /// Resolve an active payment method by slug.
    ///
    /// # Errors
    ///
    /// `Validation` for unknown, inactive, or unconfigured methods.
    pub async fn payment_method(&self, slug: &str) -> Result<PaymentMethod, OrderError> {
        self.payment_methods()
            .await?
            .into_iter()
            .find(|m| m.slug == slug)
            .ok_or_else(|| OrderError::Validation(format!("unknown payment method: {slug}")))
    }

    /// Hide a product from the storefront.
    ///
    /// # Errors
    ///
    /// `NotFound` if the product does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn archive(&self, id: &ProductId) -> Result<(), OrderError> {
        self.catalog.set_archived(id, true).await?;
        tracing::info!(product_id = %id, "Product archived");
        Ok(())
    }

    /// Permanently delete a product that no order references.
    ///
    /// # Errors
    ///
    /// `Consistency` while any order line references the product; the product
    /// is left as it was.
    #[tracing::instrument(skip(self))]
    pub async fn hard_delete(&self, id: &ProductId) -> Result<(), OrderError> {
        if self.orders.references_product(id).await? {
            tracing::warn!(product_id = %id, "Refused to delete product referenced by orders");
            return Err(OrderError::Consistency(
                "product is referenced by existing orders; archive it instead".to_owned(),
            ));
        }
        self.catalog.delete_product(id).await?;
        tracing::warn!(product_id = %id, "Product hard-deleted");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytestall_core::{
        AuthType, CartLine, CurrencyCode, Email, Identity, Order, PAYMONGO_SLUG, PaymentMethodId,
        UserId,
    };
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::db::{InMemoryCatalog, InMemoryOrders};

    fn product(id: &str) -> Product {
        Product {
            id: ProductId::new(id),
            title: "Font bundle".to_owned(),
            slug: id.to_owned(),
            price: Decimal::new(900, 0),
            category: None,
            image_url: None,
            drive_link: None,
            archived: false,
        }
    }

    async fn setup(redirect: bool) -> (Arc<InMemoryCatalog>, Arc<InMemoryOrders>, CatalogService) {
        let catalog = Arc::new(InMemoryCatalog::new());
        let orders = Arc::new(InMemoryOrders::new());
        catalog.put_product(product("sold")).await;
        catalog.put_product(product("unsold")).await;
        catalog
            .put_payment_method(PaymentMethod {
                id: PaymentMethodId::new("pm1"),
                name: "BPI transfer".to_owned(),
                slug: "bpi".to_owned(),
                account_name: Some("Bytestall".to_owned()),
                account_number: Some("1234".to_owned()),
                qr_code_ref: None,
                instructions: None,
                is_active: true,
            })
            .await;
        let service = CatalogService::new(catalog.clone(), orders.clone(), redirect);
        (catalog, orders, service)
    }

    #[tokio::test]
    async fn test_hard_delete_refused_while_referenced() {
        let (_, orders, service) = setup(false).await;
        let buyer = Identity {
            id: UserId::new("u1"),
            email: Email::parse("buyer@example.com").unwrap(),
            name: "Buyer".to_owned(),
            picture: None,
            auth_type: AuthType::Email,
        };
        let order = Order::snapshot(
            &buyer,
            &[CartLine::from_product(&product("sold").to_ref(), 1)],
            &PaymentMethod::paymongo(),
            None,
            CurrencyCode::PHP,
            Utc::now(),
        );
        orders.insert(&order).await.unwrap();

        assert!(matches!(
            service.hard_delete(&ProductId::new("sold")).await,
            Err(OrderError::Consistency(_))
        ));
        assert!(service.product(&ProductId::new("sold")).await.is_ok());

        service.hard_delete(&ProductId::new("unsold")).await.unwrap();
        assert!(matches!(
            service.product(&ProductId::new("unsold")).await,
            Err(OrderError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_archived_products_are_hidden() {
        let (_, _, service) = setup(false).await;
        service.archive(&ProductId::new("sold")).await.unwrap();
        assert!(matches!(
            service.product(&ProductId::new("sold")).await,
            Err(OrderError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_paymongo_listed_only_when_configured() {
        let (_, _, without) = setup(false).await;
        assert!(without.payment_method(PAYMONGO_SLUG).await.is_err());

        let (_, _, with) = setup(true).await;
        let slugs: Vec<String> = with
            .payment_methods()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.slug)
            .collect();
        assert_eq!(slugs, vec!["bpi".to_owned(), PAYMONGO_SLUG.to_owned()]);
    }
}
