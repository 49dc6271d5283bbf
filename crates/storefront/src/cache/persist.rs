//! Persistence boundary for the commerce cache.
//!
//! The cache is stored as one versioned blob. A blob with an unknown version is
//! discarded and the customer starts with an empty cache; restoring re-applies
//! the cache invariants, so a hand-edited or stale blob cannot break them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_sessions::Session;

use bytestall_core::{CartLine, Identity, ProductRef};

use super::CommerceCache;
use crate::models::session::keys;

/// Current persisted-cache schema version.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// The persisted form of a [`CommerceCache`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCache {
    pub version: u32,
    #[serde(default)]
    pub cart: Vec<CartLine>,
    #[serde(default)]
    pub wishlist: Vec<ProductRef>,
    #[serde(default)]
    pub saved_for_later: Vec<ProductRef>,
    #[serde(default)]
    pub recently_viewed: Vec<ProductRef>,
}

/// Errors from reading or writing the persisted cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheStoreError {
    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable storage for one customer's cache blob.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// The stored blob as raw JSON, if any.
    async fn load_raw(&self) -> Result<Option<serde_json::Value>, CacheStoreError>;

    /// Overwrite the stored blob.
    async fn store_raw(&self, blob: serde_json::Value) -> Result<(), CacheStoreError>;
}

/// Cache store backed by the customer's session.
#[derive(Clone)]
pub struct SessionCacheStore {
    session: Session,
}

impl SessionCacheStore {
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl CacheStore for SessionCacheStore {
    async fn load_raw(&self) -> Result<Option<serde_json::Value>, CacheStoreError> {
        Ok(self.session.get(keys::COMMERCE_CACHE).await?)
    }

    async fn store_raw(&self, blob: serde_json::Value) -> Result<(), CacheStoreError> {
        self.session.insert(keys::COMMERCE_CACHE, blob).await?;
        Ok(())
    }
}

/// Process-local cache store.
#[derive(Default)]
pub struct MemoryCacheStore {
    blob: RwLock<Option<serde_json::Value>>,
}

impl MemoryCacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn load_raw(&self) -> Result<Option<serde_json::Value>, CacheStoreError> {
        Ok(self.blob.read().await.clone())
    }

    async fn store_raw(&self, blob: serde_json::Value) -> Result<(), CacheStoreError> {
        *self.blob.write().await = Some(blob);
        Ok(())
    }
}

impl PersistedCache {
    /// Decode a raw blob, returning `None` for unknown schema versions.
    ///
    /// # Errors
    ///
    /// Returns an error if a blob with the current version does not deserialize.
    pub fn decode(raw: serde_json::Value) -> Result<Option<Self>, serde_json::Error> {
        let version = raw.get("version").and_then(serde_json::Value::as_u64);
        if version != Some(u64::from(CACHE_SCHEMA_VERSION)) {
            tracing::warn!(
                ?version,
                expected = CACHE_SCHEMA_VERSION,
                "Discarding persisted cache with unknown schema version"
            );
            return Ok(None);
        }
        serde_json::from_value(raw).map(Some)
    }
}

impl CommerceCache {
    /// Load the cache from `store`, attaching `user`.
    ///
    /// Never fails: a missing, unreadable or outdated blob yields an empty cache.
    pub async fn load(store: &dyn CacheStore, user: Option<Identity>) -> Self {
        let raw = match store.load_raw().await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Self::restore_empty(user),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read persisted cache");
                return Self::restore_empty(user);
            }
        };

        match PersistedCache::decode(raw) {
            Ok(Some(blob)) => Self::restore(blob, user),
            Ok(None) => Self::restore_empty(user),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable persisted cache");
                Self::restore_empty(user)
            }
        }
    }

    /// Write the cache to `store`.
    ///
    /// Failures are logged and otherwise ignored; the in-memory cache stays
    /// authoritative for the current request.
    pub async fn persist(&self, store: &dyn CacheStore) {
        let result = match serde_json::to_value(self.snapshot()) {
            Ok(blob) => store.store_raw(blob).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to persist commerce cache");
        }
    }

    fn restore_empty(user: Option<Identity>) -> Self {
        let mut cache = Self::new();
        cache.set_user(user);
        cache
    }
}
