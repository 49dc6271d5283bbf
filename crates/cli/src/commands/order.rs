//! Order administration commands.
//!
//! # Usage
//!
//! ```bash
//! bs-cli order set-status <ORDER_ID> cancelled -o ops@bytestall.shop -r "duplicate order"
//! bs-cli order audit <ORDER_ID>
//! ```
//!
//! The override goes through the same lifecycle code as the admin routes, so
//! it is written with a revision check and an audit row.

use std::sync::Arc;

use bytestall_core::{CurrencyCode, Email, OrderId, OrderStatus};
use bytestall_storefront::db::{self, PgOrderRepository};
use bytestall_storefront::orders::{OrderError, OrderLifecycle};
use thiserror::Error;

use super::database_url;

#[derive(Debug, Error)]
pub enum OrderCommandError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid STOREFRONT_CURRENCY: {0}")]
    InvalidCurrency(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Order(#[from] OrderError),
}

async fn lifecycle() -> Result<OrderLifecycle, OrderCommandError> {
    let url = database_url().ok_or(OrderCommandError::MissingEnvVar("STOREFRONT_DATABASE_URL"))?;
    let currency = match std::env::var("STOREFRONT_CURRENCY") {
        Ok(code) => code
            .parse::<CurrencyCode>()
            .map_err(|_| OrderCommandError::InvalidCurrency(code))?,
        Err(_) => CurrencyCode::default(),
    };

    tracing::info!("Connecting to storefront database...");
    let pool = db::create_pool(&url).await?;
    Ok(OrderLifecycle::new(
        Arc::new(PgOrderRepository::new(pool)),
        currency,
    ))
}

/// Override an order's status.
///
/// # Errors
///
/// Returns an error if the order does not exist or changed concurrently.
pub async fn set_status(
    id: &OrderId,
    status: OrderStatus,
    operator: &Email,
    reason: Option<&str>,
) -> Result<(), OrderCommandError> {
    let order = lifecycle()
        .await?
        .set_status(id, status, operator, reason)
        .await?;

    tracing::info!(
        order_id = %order.id,
        status = %order.status,
        revision = order.revision,
        "Order status set"
    );
    Ok(())
}

/// Log an order's audit trail, oldest first.
///
/// # Errors
///
/// Returns an error if the database cannot be read.
pub async fn audit(id: &OrderId) -> Result<(), OrderCommandError> {
    let entries = lifecycle().await?.audit_trail(id).await?;
    if entries.is_empty() {
        tracing::info!(order_id = %id, "No audit entries");
    }
    for entry in entries {
        tracing::info!(
            at = %entry.created_at,
            actor = %entry.actor,
            from = %entry.from_status,
            to = %entry.to_status,
            reason = entry.reason.as_deref().unwrap_or(""),
            "Audit"
        );
    }
    Ok(())
}
