//! The customer's commerce cache: cart, wishlist, saved-for-later and
//! recently-viewed products.
//!
//! Every mutation is synchronous and infallible. Persistence is a separate
//! step through a [`CacheStore`]; see [`persist`]. The signed-in identity is
//! held alongside the lists but is never persisted with them.
//!
//! # Invariants
//!
//! - Cart lines are unique by product id; adding an existing product sums quantities.
//! - `wishlist` and `saved_for_later` hold each product id at most once.
//! - `recently_viewed` is most-recent-first, unique, and at most
//!   [`RECENTLY_VIEWED_LIMIT`] long.

pub mod persist;

use rust_decimal::Decimal;

use bytestall_core::{CartLine, Identity, ProductId, ProductRef};

pub use persist::{
    CACHE_SCHEMA_VERSION, CacheStore, CacheStoreError, MemoryCacheStore, PersistedCache,
    SessionCacheStore,
};

/// Maximum number of recently viewed products kept.
pub const RECENTLY_VIEWED_LIMIT: usize = 10;

/// Cart, wishlist and browsing history for one customer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommerceCache {
    cart: Vec<CartLine>,
    wishlist: Vec<ProductRef>,
    saved_for_later: Vec<ProductRef>,
    recently_viewed: Vec<ProductRef>,
    user: Option<Identity>,
}

impl CommerceCache {
    /// An empty cache with no signed-in user.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// Add `quantity` of `product`, merging into an existing line.
    pub fn add_to_cart(&mut self, product: &ProductRef, quantity: u32) {
        if quantity == 0 {
            return;
        }
        match self.cart.iter_mut().find(|l| l.product_id == product.id) {
            Some(line) => line.quantity = line.quantity.saturating_add(quantity),
            None => self.cart.push(CartLine::from_product(product, quantity)),
        }
    }

    /// Remove the line for `product_id`, if any.
    pub fn remove_from_cart(&mut self, product_id: &ProductId) {
        self.cart.retain(|l| &l.product_id != product_id);
    }

    /// Replace the quantity of an existing line. A quantity of zero removes it.
    pub fn update_quantity(&mut self, product_id: &ProductId, quantity: u32) {
        if quantity == 0 {
            self.remove_from_cart(product_id);
            return;
        }
        if let Some(line) = self.cart.iter_mut().find(|l| &l.product_id == product_id) {
            line.quantity = quantity;
        }
    }

    pub fn clear_cart(&mut self) {
        self.cart.clear();
    }

    /// Sum of `unit_price * quantity` over the cart, unrounded.
    #[must_use]
    pub fn cart_total(&self) -> Decimal {
        self.cart.iter().map(CartLine::line_total).sum()
    }

    /// Sum of quantities over the cart.
    #[must_use]
    pub fn cart_count(&self) -> u32 {
        self.cart
            .iter()
            .fold(0_u32, |acc, l| acc.saturating_add(l.quantity))
    }

    #[must_use]
    pub fn cart(&self) -> &[CartLine] {
        &self.cart
    }

    // =========================================================================
    // Wishlist
    // =========================================================================

    /// Add `product` if absent, remove it if present.
    ///
    /// Returns whether the product is in the wishlist afterwards.
    pub fn toggle_wishlist(&mut self, product: &ProductRef) -> bool {
        if self.is_wishlisted(&product.id) {
            self.wishlist.retain(|p| p.id != product.id);
            false
        } else {
            self.wishlist.push(product.clone());
            true
        }
    }

    #[must_use]
    pub fn is_wishlisted(&self, product_id: &ProductId) -> bool {
        self.wishlist.iter().any(|p| &p.id == product_id)
    }

    #[must_use]
    pub fn wishlist(&self) -> &[ProductRef] {
        &self.wishlist
    }

    /// Product ids in the wishlist, in display order.
    #[must_use]
    pub fn wishlist_ids(&self) -> Vec<ProductId> {
        self.wishlist.iter().map(|p| p.id.clone()).collect()
    }

    /// Union `remote` into the wishlist, keeping local entries first.
    ///
    /// Returns how many products were added.
    pub fn merge_wishlist(&mut self, remote: Vec<ProductRef>) -> usize {
        let before = self.wishlist.len();
        for product in remote {
            if !self.is_wishlisted(&product.id) {
                self.wishlist.push(product);
            }
        }
        self.wishlist.len() - before
    }

    // =========================================================================
    // Saved for later
    // =========================================================================

    /// Move a cart line to the saved-for-later list.
    ///
    /// Returns `false` if the product is not in the cart.
    pub fn save_for_later(&mut self, product_id: &ProductId) -> bool {
        let Some(index) = self.cart.iter().position(|l| &l.product_id == product_id) else {
            return false;
        };
        let line = self.cart.remove(index);
        if !self.saved_for_later.iter().any(|p| &p.id == product_id) {
            self.saved_for_later.push(line.to_product_ref());
        }
        true
    }

    /// Move a saved product back into the cart with quantity 1.
    ///
    /// Returns `false` if the product is not saved.
    pub fn move_to_cart(&mut self, product_id: &ProductId) -> bool {
        let Some(index) = self
            .saved_for_later
            .iter()
            .position(|p| &p.id == product_id)
        else {
            return false;
        };
        let product = self.saved_for_later.remove(index);
        self.add_to_cart(&product, 1);
        true
    }

    pub fn remove_saved(&mut self, product_id: &ProductId) {
        self.saved_for_later.retain(|p| &p.id != product_id);
    }

    #[must_use]
    pub fn saved_for_later(&self) -> &[ProductRef] {
        &self.saved_for_later
    }

    // =========================================================================
    // Recently viewed
    // =========================================================================

    /// Record a product view: most recent first, no duplicates, capped.
    pub fn add_to_recently_viewed(&mut self, product: &ProductRef) {
        self.recently_viewed.retain(|p| p.id != product.id);
        self.recently_viewed.insert(0, product.clone());
        self.recently_viewed.truncate(RECENTLY_VIEWED_LIMIT);
    }

    #[must_use]
    pub fn recently_viewed(&self) -> &[ProductRef] {
        &self.recently_viewed
    }

    // =========================================================================
    // User
    // =========================================================================

    #[must_use]
    pub const fn user(&self) -> Option<&Identity> {
        self.user.as_ref()
    }

    pub fn set_user(&mut self, user: Option<Identity>) {
        self.user = user;
    }

    // =========================================================================
    // Persistence boundary
    // =========================================================================

    /// The persisted form of this cache. The user is not included.
    #[must_use]
    pub fn snapshot(&self) -> PersistedCache {
        PersistedCache {
            version: CACHE_SCHEMA_VERSION,
            cart: self.cart.clone(),
            wishlist: self.wishlist.clone(),
            saved_for_later: self.saved_for_later.clone(),
            recently_viewed: self.recently_viewed.clone(),
        }
    }

    /// Rebuild a cache from its persisted form, re-applying every invariant.
    #[must_use]
    pub fn restore(blob: PersistedCache, user: Option<Identity>) -> Self {
        let mut cache = Self {
            user,
            ..Self::default()
        };
        for line in blob.cart {
            cache.add_to_cart(&line.to_product_ref(), line.quantity);
        }
        for product in blob.wishlist {
            if !cache.is_wishlisted(&product.id) {
                cache.wishlist.push(product);
            }
        }
        for product in blob.saved_for_later {
            if !cache.saved_for_later.iter().any(|p| p.id == product.id) {
                cache.saved_for_later.push(product);
            }
        }
        for product in blob.recently_viewed {
            if cache.recently_viewed.len() < RECENTLY_VIEWED_LIMIT
                && !cache.recently_viewed.iter().any(|p| p.id == product.id)
            {
                cache.recently_viewed.push(product);
            }
        }
        cache
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn product(id: &str, price: i64) -> ProductRef {
        ProductRef {
            id: ProductId::new(id),
            title: format!("Product {id}"),
            slug: id.to_owned(),
            price: Decimal::new(price, 0),
            category: Some("presets".to_owned()),
            image_url: None,
        }
    }

    #[test]
    fn test_add_to_cart_merges_by_id() {
        let mut cache = CommerceCache::new();
        let p = product("p1", 100);
        cache.add_to_cart(&p, 1);
        cache.add_to_cart(&p, 2);

        assert_eq!(cache.cart().len(), 1);
        assert_eq!(cache.cart()[0].quantity, 3);
        assert_eq!(cache.cart_total(), Decimal::new(300, 0));
        assert_eq!(cache.cart_count(), 3);
    }

    #[test]
    fn test_update_quantity_zero_removes() {
        let mut cache = CommerceCache::new();
        cache.add_to_cart(&product("p1", 100), 1);
        cache.add_to_cart(&product("p2", 50), 1);

        cache.update_quantity(&ProductId::new("p1"), 4);
        assert_eq!(cache.cart_total(), Decimal::new(450, 0));

        cache.update_quantity(&ProductId::new("p1"), 0);
        assert_eq!(cache.cart().len(), 1);
        assert_eq!(cache.cart()[0].product_id.as_str(), "p2");
    }

    #[test]
    fn test_toggle_wishlist_is_idempotent_pairwise() {
        let mut cache = CommerceCache::new();
        let p = product("p1", 100);

        assert!(cache.toggle_wishlist(&p));
        assert!(cache.is_wishlisted(&p.id));
        assert!(!cache.toggle_wishlist(&p));
        assert!(cache.wishlist().is_empty());
    }

    #[test]
    fn test_recently_viewed_dedups_and_caps() {
        let mut cache = CommerceCache::new();
        for i in 0..12 {
            cache.add_to_recently_viewed(&product(&format!("p{i}"), 10));
        }
        cache.add_to_recently_viewed(&product("p5", 10));

        let ids: Vec<&str> = cache
            .recently_viewed()
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids.len(), RECENTLY_VIEWED_LIMIT);
        assert_eq!(ids[0], "p5");
        assert_eq!(ids.iter().filter(|id| **id == "p5").count(), 1);
        assert!(!ids.contains(&"p0"));
    }

    #[test]
    fn test_save_for_later_round_trip_resets_quantity() {
        let mut cache = CommerceCache::new();
        cache.add_to_cart(&product("p1", 100), 3);

        assert!(cache.save_for_later(&ProductId::new("p1")));
        assert!(cache.cart().is_empty());
        assert_eq!(cache.saved_for_later().len(), 1);

        assert!(cache.move_to_cart(&ProductId::new("p1")));
        assert!(cache.saved_for_later().is_empty());
        assert_eq!(cache.cart()[0].quantity, 1);

        assert!(!cache.move_to_cart(&ProductId::new("p1")));
    }

    #[test]
    fn test_merge_wishlist_keeps_local_first() {
        let mut cache = CommerceCache::new();
        cache.toggle_wishlist(&product("local", 1));
        let added = cache.merge_wishlist(vec![product("remote", 1), product("local", 1)]);

        assert_eq!(added, 1);
        assert_eq!(
            cache.wishlist_ids(),
            vec![ProductId::new("local"), ProductId::new("remote")]
        );
    }

    #[test]
    fn test_restore_reapplies_invariants() {
        let blob = PersistedCache {
            version: CACHE_SCHEMA_VERSION,
            cart: vec![
                CartLine::from_product(&product("p1", 100), 1),
                CartLine::from_product(&product("p1", 100), 2),
            ],
            wishlist: vec![product("w", 1), product("w", 1)],
            saved_for_later: vec![product("s", 1), product("s", 1)],
            recently_viewed: (0..15).map(|i| product(&format!("r{i}"), 1)).collect(),
        };

        let cache = CommerceCache::restore(blob, None);
        assert_eq!(cache.cart().len(), 1);
        assert_eq!(cache.cart_count(), 3);
        assert_eq!(cache.wishlist().len(), 1);
        assert_eq!(cache.saved_for_later().len(), 1);
        assert_eq!(cache.recently_viewed().len(), RECENTLY_VIEWED_LIMIT);
    }
}
