//! Order persistence.
//!
//! Line items are written once on insert and never updated. Header writes are
//! compare-and-swap on `revision`: a save succeeds only if the stored revision
//! still matches the one the caller read.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use bytestall_core::{CurrencyCode, Email, Order, OrderId, OrderLine, OrderStatus, ProductId};

use super::{RepositoryError, map_unique_violation};

/// One status change recorded in the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AuditEntry {
    pub order_id: OrderId,
    /// Who made the change (`customer:<email>`, `operator:<email>`, `gateway:<provider>`).
    pub actor: String,
    pub from_status: OrderStatus,
    pub to_status: OrderStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Storage for orders and their audit trail.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Fetch one order with its lines.
    async fn get(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Orders placed by `email`, newest first.
    async fn list_for_email(&self, email: &Email) -> Result<Vec<Order>, RepositoryError>;

    /// Most recent orders, optionally filtered by status.
    async fn list_recent(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> Result<Vec<Order>, RepositoryError>;

    /// Insert a new order and its lines.
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError>;

    /// Write the order header if the stored revision equals `order.revision`.
    ///
    /// Returns the order with its revision incremented. `audit`, when given, is
    /// written in the same transaction.
    async fn save(
        &self,
        order: &Order,
        audit: Option<&AuditEntry>,
    ) -> Result<Order, RepositoryError>;

    /// Hard-delete an order and its lines.
    async fn delete(&self, id: &OrderId) -> Result<(), RepositoryError>;

    /// Whether any order line references `product_id`.
    async fn references_product(&self, product_id: &ProductId) -> Result<bool, RepositoryError>;

    /// Audit trail for one order, oldest first.
    async fn audit_trail(&self, id: &OrderId) -> Result<Vec<AuditEntry>, RepositoryError>;
}

/// `PostgreSQL` order repository.
#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_lines(
        &self,
        ids: &[String],
    ) -> Result<Vec<(String, OrderLine)>, RepositoryError> {
        let rows = sqlx::query_as::<_, LineRow>(
            r"
            SELECT order_id, product_id, title, quantity, unit_price_at_purchase
            FROM storefront.order_line
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            ",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let quantity = u32::try_from(row.quantity).map_err(|_| {
                    RepositoryError::DataCorruption(format!(
                        "negative quantity on order {}",
                        row.order_id
                    ))
                })?;
                Ok((
                    row.order_id,
                    OrderLine {
                        product_id: row.product_id,
                        title: row.title,
                        quantity,
                        unit_price_at_purchase: row.unit_price_at_purchase,
                    },
                ))
            })
            .collect()
    }

    async fn assemble(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        let ids: Vec<String> = rows.iter().map(|r| r.id.as_str().to_owned()).collect();
        let mut by_order: HashMap<String, Vec<OrderLine>> = HashMap::new();
        for (order_id, line) in self.load_lines(&ids).await? {
            by_order.entry(order_id).or_default().push(line);
        }

        rows.into_iter()
            .map(|row| {
                let items = by_order.remove(row.id.as_str()).unwrap_or_default();
                row.into_order(items)
            })
            .collect()
    }
}

const ORDER_COLUMNS: &str = r"
    id, created_at, user_email, user_name, total, currency, payment_method,
    payment_reference, payment_proof_ref, payment_intent_id, status,
    payment_verified, payment_verified_at, payment_verified_by,
    access_granted, access_granted_at, notes, revision
";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    created_at: DateTime<Utc>,
    user_email: Email,
    user_name: String,
    total: Decimal,
    currency: String,
    payment_method: String,
    payment_reference: Option<String>,
    payment_proof_ref: Option<String>,
    payment_intent_id: Option<String>,
    status: OrderStatus,
    payment_verified: bool,
    payment_verified_at: Option<DateTime<Utc>>,
    payment_verified_by: Option<String>,
    access_granted: bool,
    access_granted_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    revision: i64,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderLine>) -> Result<Order, RepositoryError> {
        let currency = self.currency.parse::<CurrencyCode>().map_err(|e| {
            RepositoryError::DataCorruption(format!("order {}: {e}", self.id))
        })?;

        Ok(Order {
            id: self.id,
            created_at: self.created_at,
            user_email: self.user_email,
            user_name: self.user_name,
            items,
            total: self.total,
            currency,
            payment_method: self.payment_method,
            payment_reference: self.payment_reference,
            payment_proof_ref: self.payment_proof_ref,
            payment_intent_id: self.payment_intent_id,
            status: self.status,
            payment_verified: self.payment_verified,
            payment_verified_at: self.payment_verified_at,
            payment_verified_by: self.payment_verified_by,
            access_granted: self.access_granted,
            access_granted_at: self.access_granted_at,
            notes: self.notes,
            revision: self.revision,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LineRow {
    order_id: String,
    product_id: ProductId,
    title: String,
    quantity: i32,
    unit_price_at_purchase: Decimal,
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    order_id: OrderId,
    actor: String,
    from_status: OrderStatus,
    to_status: OrderStatus,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditEntry {
    fn from(row: AuditRow) -> Self {
        Self {
            order_id: row.order_id,
            actor: row.actor,
            from_status: row.from_status,
            to_status: row.to_status,
            reason: row.reason,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn get(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.\"order\" WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.assemble(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_for_email(&self, email: &Email) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.\"order\"
             WHERE user_email = $1
             ORDER BY created_at DESC"
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        self.assemble(rows).await
    }

    async fn list_recent(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.\"order\"
             WHERE ($1::storefront.order_status IS NULL OR status = $1)
             ORDER BY created_at DESC
             LIMIT $2"
        ))
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        self.assemble(rows).await
    }

    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO storefront."order" (
                id, created_at, user_email, user_name, total, currency, payment_method,
                payment_reference, payment_proof_ref, payment_intent_id, status,
                payment_verified, payment_verified_at, payment_verified_by,
                access_granted, access_granted_at, notes, revision
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(&order.id)
        .bind(order.created_at)
        .bind(&order.user_email)
        .bind(&order.user_name)
        .bind(order.total)
        .bind(order.currency.code())
        .bind(&order.payment_method)
        .bind(&order.payment_reference)
        .bind(&order.payment_proof_ref)
        .bind(&order.payment_intent_id)
        .bind(order.status)
        .bind(order.payment_verified)
        .bind(order.payment_verified_at)
        .bind(&order.payment_verified_by)
        .bind(order.access_granted)
        .bind(order.access_granted_at)
        .bind(&order.notes)
        .bind(order.revision)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, "order"))?;

        for (position, line) in order.items.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| RepositoryError::Conflict("too many order lines".to_owned()))?;
            let quantity = i32::try_from(line.quantity)
                .map_err(|_| RepositoryError::Conflict("quantity out of range".to_owned()))?;

            sqlx::query(
                r"
                INSERT INTO storefront.order_line
                    (order_id, position, product_id, title, quantity, unit_price_at_purchase)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(&order.id)
            .bind(position)
            .bind(&line.product_id)
            .bind(&line.title)
            .bind(quantity)
            .bind(line.unit_price_at_purchase)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn save(
        &self,
        order: &Order,
        audit: Option<&AuditEntry>,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE storefront."order"
            SET payment_reference = $3,
                payment_proof_ref = $4,
                payment_intent_id = $5,
                status = $6,
                payment_verified = $7,
                payment_verified_at = $8,
                payment_verified_by = $9,
                access_granted = $10,
                access_granted_at = $11,
                notes = $12,
                revision = revision + 1
            WHERE id = $1 AND revision = $2
            "#,
        )
        .bind(&order.id)
        .bind(order.revision)
        .bind(&order.payment_reference)
        .bind(&order.payment_proof_ref)
        .bind(&order.payment_intent_id)
        .bind(order.status)
        .bind(order.payment_verified)
        .bind(order.payment_verified_at)
        .bind(&order.payment_verified_by)
        .bind(order.access_granted)
        .bind(order.access_granted_at)
        .bind(&order.notes)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists: bool = sqlx::query_scalar(
                r#"SELECT EXISTS (SELECT 1 FROM storefront."order" WHERE id = $1)"#,
            )
            .bind(&order.id)
            .fetch_one(&mut *tx)
            .await?;

            return Err(if exists {
                RepositoryError::Stale {
                    expected: order.revision,
                }
            } else {
                RepositoryError::NotFound
            });
        }

        if let Some(entry) = audit {
            sqlx::query(
                r"
                INSERT INTO storefront.order_audit
                    (order_id, actor, from_status, to_status, reason, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(&entry.order_id)
            .bind(&entry.actor)
            .bind(entry.from_status)
            .bind(entry.to_status)
            .bind(&entry.reason)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Order {
            revision: order.revision + 1,
            ..order.clone()
        })
    }

    async fn delete(&self, id: &OrderId) -> Result<(), RepositoryError> {
        let result = sqlx::query(r#"DELETE FROM storefront."order" WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn references_product(&self, product_id: &ProductId) -> Result<bool, RepositoryError> {
        let referenced: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM storefront.order_line WHERE product_id = $1)",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(referenced)
    }

    async fn audit_trail(&self, id: &OrderId) -> Result<Vec<AuditEntry>, RepositoryError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r"
            SELECT order_id, actor, from_status, to_status, reason, created_at
            FROM storefront.order_audit
            WHERE order_id = $1
            ORDER BY created_at, id
            ",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AuditEntry::from).collect())
    }
}
