//! Database operations for storefront `PostgreSQL`.
//!
//! # Schema: `storefront`
//!
//! ## Tables
//!
//! - `product` - Catalog fields the order engine reads (price, title, drive link)
//! - `payment_method` - Manual payment methods shown at checkout
//! - `order` / `order_line` - Orders and their immutable line snapshots
//! - `order_audit` - One row per status change, including overrides
//! - `wishlist_item` - Remote per-user wishlist record
//! - `tower_sessions.session` - Session storage (created by the session store)
//!
//! Every repository is a trait so services can run against the in-memory
//! implementations in [`memory`] during tests and local runs.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p bytestall-cli -- migrate storefront
//! ```

pub mod catalog;
pub mod memory;
pub mod orders;
pub mod wishlist;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use catalog::{CatalogRepository, PgCatalogRepository};
pub use memory::{InMemoryCatalog, InMemoryOrders, InMemoryWishlist};
pub use orders::{AuditEntry, OrderRepository, PgOrderRepository};
pub use wishlist::{PgRemoteWishlist, RemoteWishlist};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate id).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The row changed since it was read.
    #[error("stale write: expected revision {expected}")]
    Stale {
        /// Revision the caller read before writing.
        expected: i64,
    },

    /// The backing store is unreachable (remote collaborators).
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map a unique-violation into [`RepositoryError::Conflict`].
fn map_unique_violation(err: sqlx::Error, what: &str) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(format!("{what} already exists"))
        }
        _ => RepositoryError::Database(err),
    }
}
