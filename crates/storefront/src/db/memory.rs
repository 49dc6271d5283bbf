//! In-memory repository implementations.
//!
//! Used by tests and by local runs without a database. Semantics match the
//! `PostgreSQL` repositories, including compare-and-swap on order revisions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use bytestall_core::{Email, Order, OrderId, OrderStatus, PaymentMethod, ProductId, UserId};

use super::{AuditEntry, CatalogRepository, OrderRepository, RemoteWishlist, RepositoryError};
use crate::models::product::Product;

/// In-memory order store.
#[derive(Default)]
pub struct InMemoryOrders {
    // Insertion order doubles as a tie-breaker for equal timestamps.
    orders: RwLock<Vec<Order>>,
    audit: RwLock<Vec<AuditEntry>>,
}

impl InMemoryOrders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn newest_first(orders: impl Iterator<Item = (usize, Order)>) -> Vec<Order> {
        let mut sorted: Vec<(usize, Order)> = orders.collect();
        sorted.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));
        sorted.into_iter().map(|(_, order)| order).collect()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrders {
    async fn get(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.read().await.iter().find(|o| &o.id == id).cloned())
    }

    async fn list_for_email(&self, email: &Email) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(Self::newest_first(
            orders
                .iter()
                .cloned()
                .enumerate()
                .filter(|(_, o)| &o.user_email == email),
        ))
    }

    async fn list_recent(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        let mut recent = Self::newest_first(
            orders
                .iter()
                .cloned()
                .enumerate()
                .filter(|(_, o)| status.is_none_or(|s| o.status == s)),
        );
        recent.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(recent)
    }

    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        if orders.iter().any(|o| o.id == order.id) {
            return Err(RepositoryError::Conflict("order already exists".to_owned()));
        }
        orders.push(order.clone());
        Ok(())
    }

    async fn save(
        &self,
        order: &Order,
        audit: Option<&AuditEntry>,
    ) -> Result<Order, RepositoryError> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .iter_mut()
            .find(|o| o.id == order.id)
            .ok_or(RepositoryError::NotFound)?;

        if stored.revision != order.revision {
            return Err(RepositoryError::Stale {
                expected: order.revision,
            });
        }

        // Lines and totals are immutable; only the header is written.
        let items = std::mem::take(&mut stored.items);
        *stored = Order {
            items,
            total: stored.total,
            revision: order.revision + 1,
            ..order.clone()
        };
        let saved = stored.clone();
        drop(orders);

        if let Some(entry) = audit {
            self.audit.write().await.push(entry.clone());
        }
        Ok(saved)
    }

    async fn delete(&self, id: &OrderId) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        let before = orders.len();
        orders.retain(|o| &o.id != id);
        if orders.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn references_product(&self, product_id: &ProductId) -> Result<bool, RepositoryError> {
        Ok(self
            .orders
            .read()
            .await
            .iter()
            .any(|o| o.references_product(product_id)))
    }

    async fn audit_trail(&self, id: &OrderId) -> Result<Vec<AuditEntry>, RepositoryError> {
        Ok(self
            .audit
            .read()
            .await
            .iter()
            .filter(|e| &e.order_id == id)
            .cloned()
            .collect())
    }
}

/// In-memory catalog.
#[derive(Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<ProductId, Product>>,
    payment_methods: RwLock<Vec<PaymentMethod>>,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a product.
    pub async fn put_product(&self, product: Product) {
        self.products
            .write()
            .await
            .insert(product.id.clone(), product);
    }

    /// Append a manual payment method; methods list in insertion order.
    pub async fn put_payment_method(&self, method: PaymentMethod) {
        let mut methods = self.payment_methods.write().await;
        methods.retain(|m| m.slug != method.slug);
        methods.push(method);
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.products.read().await.get(id).cloned())
    }

    async fn list_payment_methods(&self) -> Result<Vec<PaymentMethod>, RepositoryError> {
        Ok(self
            .payment_methods
            .read()
            .await
            .iter()
            .filter(|m| m.is_active)
            .cloned()
            .collect())
    }

    async fn get_payment_method(
        &self,
        slug: &str,
    ) -> Result<Option<PaymentMethod>, RepositoryError> {
        Ok(self
            .payment_methods
            .read()
            .await
            .iter()
            .find(|m| m.slug == slug)
            .cloned())
    }

    async fn set_archived(&self, id: &ProductId, archived: bool) -> Result<(), RepositoryError> {
        let mut products = self.products.write().await;
        let product = products.get_mut(id).ok_or(RepositoryError::NotFound)?;
        product.archived = archived;
        Ok(())
    }

    async fn delete_product(&self, id: &ProductId) -> Result<(), RepositoryError> {
        self.products
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}

/// A call received by [`InMemoryWishlist`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WishlistCall {
    Add(UserId, ProductId),
    Remove(UserId, ProductId),
    Replace(UserId, Vec<ProductId>),
}

/// In-memory remote wishlist that records every mutating call.
///
/// [`InMemoryWishlist::set_unavailable`] makes every call fail, which is how
/// tests exercise the best-effort sync path.
#[derive(Default)]
pub struct InMemoryWishlist {
    items: RwLock<HashMap<UserId, Vec<ProductId>>>,
    calls: RwLock<Vec<WishlistCall>>,
    unavailable: AtomicBool,
}

impl InMemoryWishlist {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail with [`RepositoryError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Mutating calls received so far, including failed ones.
    pub async fn calls(&self) -> Vec<WishlistCall> {
        self.calls.read().await.clone()
    }

    async fn record(&self, call: WishlistCall) -> Result<(), RepositoryError> {
        self.calls.write().await.push(call);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "wishlist store offline".to_owned(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteWishlist for InMemoryWishlist {
    async fn add(&self, user: &UserId, product: &ProductId) -> Result<(), RepositoryError> {
        self.record(WishlistCall::Add(user.clone(), product.clone()))
            .await?;
        let mut items = self.items.write().await;
        let list = items.entry(user.clone()).or_default();
        if !list.contains(product) {
            list.push(product.clone());
        }
        Ok(())
    }

    async fn remove(&self, user: &UserId, product: &ProductId) -> Result<(), RepositoryError> {
        self.record(WishlistCall::Remove(user.clone(), product.clone()))
            .await?;
        if let Some(list) = self.items.write().await.get_mut(user) {
            list.retain(|p| p != product);
        }
        Ok(())
    }

    async fn list(&self, user: &UserId) -> Result<Vec<ProductId>, RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "wishlist store offline".to_owned(),
            ));
        }
        Ok(self
            .items
            .read()
            .await
            .get(user)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace(&self, user: &UserId, products: &[ProductId]) -> Result<(), RepositoryError> {
        self.record(WishlistCall::Replace(user.clone(), products.to_vec()))
            .await?;
        let mut deduped: Vec<ProductId> = Vec::with_capacity(products.len());
        for product in products {
            if !deduped.contains(product) {
                deduped.push(product.clone());
            }
        }
        self.items.write().await.insert(user.clone(), deduped);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytestall_core::{AuthType, CartLine, CurrencyCode, Identity, ProductRef};
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;

    fn order() -> Order {
        let identity = Identity {
            id: UserId::new("u1"),
            email: Email::parse("buyer@example.com").unwrap(),
            name: "Buyer".to_owned(),
            picture: None,
            auth_type: AuthType::Email,
        };
        let product = ProductRef {
            id: ProductId::new("p1"),
            title: "Preset pack".to_owned(),
            slug: "preset-pack".to_owned(),
            price: Decimal::new(2500, 0),
            category: None,
            image_url: None,
        };
        Order::snapshot(
            &identity,
            &[CartLine::from_product(&product, 1)],
            &PaymentMethod::paymongo(),
            None,
            CurrencyCode::PHP,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_save_is_compare_and_swap() {
        let repo = InMemoryOrders::new();
        let order = order();
        repo.insert(&order).await.unwrap();

        let mut first = order.clone();
        first.notes = Some("first".to_owned());
        let saved = repo.save(&first, None).await.unwrap();
        assert_eq!(saved.revision, 1);

        let mut stale = order.clone();
        stale.notes = Some("second".to_owned());
        let err = repo.save(&stale, None).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Stale { expected: 0 }));

        let stored = repo.get(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.notes.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_save_never_rewrites_lines() {
        let repo = InMemoryOrders::new();
        let order = order();
        repo.insert(&order).await.unwrap();

        let mut tampered = order.clone();
        tampered.items.clear();
        tampered.total = Decimal::ZERO;
        repo.save(&tampered, None).await.unwrap();

        let stored = repo.get(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.items.len(), 1);
        assert_eq!(stored.total, Decimal::new(2500, 0));
    }

    #[tokio::test]
    async fn test_wishlist_records_failed_calls() {
        let wishlist = InMemoryWishlist::new();
        let user = UserId::new("u1");
        wishlist.set_unavailable(true);
        assert!(wishlist.add(&user, &ProductId::new("p1")).await.is_err());
        wishlist.set_unavailable(false);
        wishlist.add(&user, &ProductId::new("p2")).await.unwrap();

        assert_eq!(wishlist.calls().await.len(), 2);
        assert_eq!(
            wishlist.list(&user).await.unwrap(),
            vec![ProductId::new("p2")]
        );
    }
}
