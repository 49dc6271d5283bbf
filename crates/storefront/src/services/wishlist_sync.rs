//! Mirrors local wishlist changes to the remote per-user record.
//!
//! Remote calls are best-effort and at-most-once: they are queued on the
//! [`TaskQueue`] and a failure is logged and counted, never rolled back into the
//! local cache. Because the queue has a single consumer, calls reach the remote
//! store in the order the toggles happened, so an older call cannot overwrite
//! a newer one for the same product. Drift left by a failed call is repaired by
//! the next toggle of that product or by [`WishlistSync::resync`].

use std::sync::Arc;

use bytestall_core::{ProductId, ProductRef, UserId};

use super::tasks::TaskQueue;
use crate::cache::CommerceCache;
use crate::db::{CatalogRepository, RemoteWishlist};

#[derive(Clone)]
pub struct WishlistSync {
    remote: Arc<dyn RemoteWishlist>,
    catalog: Arc<dyn CatalogRepository>,
    queue: TaskQueue,
}

impl WishlistSync {
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteWishlist>,
        catalog: Arc<dyn CatalogRepository>,
        queue: TaskQueue,
    ) -> Self {
        Self {
            remote,
            catalog,
            queue,
        }
    }

    /// Toggle `product` in the local wishlist and mirror the change.
    ///
    /// Returns whether the product is wishlisted afterwards. Nothing is sent
    /// when no one is signed in.
    pub fn toggle(&self, cache: &mut CommerceCache, product: &ProductRef) -> bool {
        let wishlisted = cache.toggle_wishlist(product);
        if let Some(user) = cache.user() {
            self.mirror(user.id.clone(), product.id.clone(), wishlisted);
        }
        wishlisted
    }

    fn mirror(&self, user: UserId, product: ProductId, wishlisted: bool) {
        let remote = Arc::clone(&self.remote);
        if wishlisted {
            self.queue.dispatch("wishlist.add", async move {
                remote.add(&user, &product).await?;
                Ok(())
            });
        } else {
            self.queue.dispatch("wishlist.remove", async move {
                remote.remove(&user, &product).await?;
                Ok(())
            });
        }
    }

    /// Merge the remote wishlist into the local one after sign-in.
    ///
    /// Products missing from the catalog or archived are skipped. A remote
    /// failure leaves the local wishlist as it was. Returns how many products
    /// were added.
    #[tracing::instrument(skip(self, cache))]
    pub async fn hydrate(&self, cache: &mut CommerceCache) -> usize {
        let Some(user) = cache.user().map(|u| u.id.clone()) else {
            return 0;
        };

        let ids = match self.remote.list(&user).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user, "Failed to fetch remote wishlist");
                return 0;
            }
        };

        let mut remote = Vec::with_capacity(ids.len());
        for id in ids.iter().filter(|id| !cache.is_wishlisted(id)) {
            match self.catalog.get_product(id).await {
                Ok(Some(product)) if !product.archived => remote.push(product.to_ref()),
                Ok(_) => tracing::debug!(product_id = %id, "Skipping unavailable wishlist product"),
                Err(e) => tracing::warn!(error = %e, product_id = %id, "Failed to load wishlist product"),
            }
        }

        cache.merge_wishlist(remote)
    }

    /// Replace the remote wishlist with the local one.
    ///
    /// Returns `false` when no one is signed in.
    pub fn resync(&self, cache: &CommerceCache) -> bool {
        let Some(user) = cache.user().map(|u| u.id.clone()) else {
            return false;
        };
        let remote = Arc::clone(&self.remote);
        let products = cache.wishlist_ids();
        self.queue.dispatch("wishlist.replace", async move {
            remote.replace(&user, &products).await?;
            Ok(())
        });
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytestall_core::{AuthType, Email, Identity};
    use rust_decimal::Decimal;

    use super::*;
    use crate::db::memory::WishlistCall;
    use crate::db::{InMemoryCatalog, InMemoryWishlist};
    use crate::models::Product;

    fn product(id: &str) -> Product {
        Product {
            id: ProductId::new(id),
            title: format!("Template {id}"),
            slug: id.to_owned(),
            price: Decimal::new(300, 0),
            category: None,
            image_url: None,
            drive_link: Some(format!("https://drive.example/{id}")),
            archived: false,
        }
    }

    fn signed_in() -> CommerceCache {
        let mut cache = CommerceCache::new();
        cache.set_user(Some(Identity {
            id: UserId::new("u1"),
            email: Email::parse("fan@example.com").unwrap(),
            name: "Fan".to_owned(),
            picture: None,
            auth_type: AuthType::Google,
        }));
        cache
    }

    fn setup() -> (Arc<InMemoryWishlist>, Arc<InMemoryCatalog>, TaskQueue, WishlistSync) {
        let remote = Arc::new(InMemoryWishlist::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let queue = TaskQueue::spawn(64);
        let sync = WishlistSync::new(remote.clone(), catalog.clone(), queue.clone());
        (remote, catalog, queue, sync)
    }

    #[tokio::test]
    async fn test_toggle_twice_issues_add_then_remove() {
        let (remote, _catalog, queue, sync) = setup();
        let mut cache = signed_in();
        let p = product("p1").to_ref();

        assert!(sync.toggle(&mut cache, &p));
        assert!(!sync.toggle(&mut cache, &p));
        queue.flush().await;

        let user = UserId::new("u1");
        assert_eq!(
            remote.calls().await,
            vec![
                WishlistCall::Add(user.clone(), p.id.clone()),
                WishlistCall::Remove(user, p.id.clone()),
            ]
        );
        assert!(cache.wishlist().is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_toggle_stays_local() {
        let (remote, _catalog, queue, sync) = setup();
        let mut cache = CommerceCache::new();

        assert!(sync.toggle(&mut cache, &product("p1").to_ref()));
        queue.flush().await;
        assert!(remote.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_remote_failure_keeps_local_toggle() {
        let (remote, _catalog, queue, sync) = setup();
        remote.set_unavailable(true);
        let mut cache = signed_in();

        assert!(sync.toggle(&mut cache, &product("p1").to_ref()));
        queue.flush().await;

        assert!(cache.is_wishlisted(&ProductId::new("p1")));
        assert_eq!(queue.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_hydrate_unions_and_skips_archived() {
        let (remote, catalog, _queue, sync) = setup();
        catalog.put_product(product("remote")).await;
        catalog
            .put_product(Product {
                archived: true,
                ..product("gone")
            })
            .await;
        remote
            .replace(
                &UserId::new("u1"),
                &[
                    ProductId::new("remote"),
                    ProductId::new("gone"),
                    ProductId::new("local"),
                ],
            )
            .await
            .unwrap();

        let mut cache = signed_in();
        cache.toggle_wishlist(&product("local").to_ref());

        assert_eq!(sync.hydrate(&mut cache).await, 1);
        assert_eq!(
            cache.wishlist_ids(),
            vec![ProductId::new("local"), ProductId::new("remote")]
        );
    }

    #[tokio::test]
    async fn test_resync_replaces_remote() {
        let (remote, _catalog, queue, sync) = setup();
        let mut cache = signed_in();
        cache.toggle_wishlist(&product("a").to_ref());
        cache.toggle_wishlist(&product("b").to_ref());

        assert!(sync.resync(&cache));
        queue.flush().await;

        assert_eq!(
            remote.list(&UserId::new("u1")).await.unwrap(),
            vec![ProductId::new("a"), ProductId::new("b")]
        );
    }
}
