//! Remote per-user wishlist record.

use async_trait::async_trait;
use sqlx::PgPool;

use bytestall_core::{ProductId, UserId};

use super::RepositoryError;

/// The server-side copy of a customer's wishlist, keyed by (user, product).
#[async_trait]
pub trait RemoteWishlist: Send + Sync {
    /// Add a product. Adding an existing product is not an error.
    async fn add(&self, user: &UserId, product: &ProductId) -> Result<(), RepositoryError>;

    /// Remove a product. Removing an absent product is not an error.
    async fn remove(&self, user: &UserId, product: &ProductId) -> Result<(), RepositoryError>;

    /// Product ids on the remote record, in stored order.
    async fn list(&self, user: &UserId) -> Result<Vec<ProductId>, RepositoryError>;

    /// Replace the remote record with `products`.
    async fn replace(&self, user: &UserId, products: &[ProductId]) -> Result<(), RepositoryError>;
}

/// `PostgreSQL` wishlist repository.
#[derive(Clone)]
pub struct PgRemoteWishlist {
    pool: PgPool,
}

impl PgRemoteWishlist {
    /// Create a new wishlist repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RemoteWishlist for PgRemoteWishlist {
    async fn add(&self, user: &UserId, product: &ProductId) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO storefront.wishlist_item (user_id, product_id, position)
            SELECT $1, $2, COALESCE(MAX(position) + 1, 0)
            FROM storefront.wishlist_item WHERE user_id = $1
            ON CONFLICT (user_id, product_id) DO NOTHING
            ",
        )
        .bind(user)
        .bind(product)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, user: &UserId, product: &ProductId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM storefront.wishlist_item WHERE user_id = $1 AND product_id = $2")
            .bind(user)
            .bind(product)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list(&self, user: &UserId) -> Result<Vec<ProductId>, RepositoryError> {
        let ids = sqlx::query_scalar::<_, ProductId>(
            r"
            SELECT product_id FROM storefront.wishlist_item
            WHERE user_id = $1
            ORDER BY position, created_at
            ",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn replace(&self, user: &UserId, products: &[ProductId]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM storefront.wishlist_item WHERE user_id = $1")
            .bind(user)
            .execute(&mut *tx)
            .await?;

        for (position, product) in products.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| RepositoryError::Conflict("wishlist too long".to_owned()))?;
            sqlx::query(
                r"
                INSERT INTO storefront.wishlist_item (user_id, product_id, position)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, product_id) DO NOTHING
                ",
            )
            .bind(user)
            .bind(product)
            .bind(position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
