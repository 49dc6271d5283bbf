//! Catalog persistence: products and manual payment methods.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;

use bytestall_core::{PaymentMethod, PaymentMethodId, ProductId};

use super::RepositoryError;
use crate::models::product::Product;

/// Read and patch access to catalog documents.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Fetch a product, archived or not.
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Active manual payment methods in display order.
    async fn list_payment_methods(&self) -> Result<Vec<PaymentMethod>, RepositoryError>;

    /// Fetch a manual payment method by slug.
    async fn get_payment_method(&self, slug: &str)
    -> Result<Option<PaymentMethod>, RepositoryError>;

    /// Set the archived flag on a product.
    async fn set_archived(&self, id: &ProductId, archived: bool) -> Result<(), RepositoryError>;

    /// Remove a product document.
    async fn delete_product(&self, id: &ProductId) -> Result<(), RepositoryError>;
}

/// `PostgreSQL` catalog repository.
#[derive(Clone)]
pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    /// Create a new catalog repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    title: String,
    slug: String,
    price: Decimal,
    category: Option<String>,
    image_url: Option<String>,
    drive_link: Option<String>,
    archived: bool,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            slug: row.slug,
            price: row.price,
            category: row.category,
            image_url: row.image_url,
            drive_link: row.drive_link,
            archived: row.archived,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentMethodRow {
    id: PaymentMethodId,
    name: String,
    slug: String,
    account_name: Option<String>,
    account_number: Option<String>,
    qr_code_ref: Option<String>,
    instructions: Option<String>,
    is_active: bool,
}

impl From<PaymentMethodRow> for PaymentMethod {
    fn from(row: PaymentMethodRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            account_name: row.account_name,
            account_number: row.account_number,
            qr_code_ref: row.qr_code_ref,
            instructions: row.instructions,
            is_active: row.is_active,
        }
    }
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, title, slug, price, category, image_url, drive_link, archived
            FROM storefront.product
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Product::from))
    }

    async fn list_payment_methods(&self) -> Result<Vec<PaymentMethod>, RepositoryError> {
        let rows = sqlx::query_as::<_, PaymentMethodRow>(
            r"
            SELECT id, name, slug, account_name, account_number, qr_code_ref,
                   instructions, is_active
            FROM storefront.payment_method
            WHERE is_active
            ORDER BY sort_order, name
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PaymentMethod::from).collect())
    }

    async fn get_payment_method(
        &self,
        slug: &str,
    ) -> Result<Option<PaymentMethod>, RepositoryError> {
        let row = sqlx::query_as::<_, PaymentMethodRow>(
            r"
            SELECT id, name, slug, account_name, account_number, qr_code_ref,
                   instructions, is_active
            FROM storefront.payment_method
            WHERE slug = $1
            ",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PaymentMethod::from))
    }

    async fn set_archived(&self, id: &ProductId, archived: bool) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE storefront.product SET archived = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(archived)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete_product(&self, id: &ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.product WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
