//! Per-request access to the session-persisted [`CommerceCache`].

use std::ops::{Deref, DerefMut};

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::cache::{CommerceCache, SessionCacheStore};
use crate::error::AppError;

use super::auth::current_identity;

/// The caller's commerce cache, loaded from their session.
///
/// Mutations stay in memory until [`SessionCache::save`] is called.
pub struct SessionCache {
    cache: CommerceCache,
    store: SessionCacheStore,
}

impl SessionCache {
    /// Persist the cache back into the session. Failures are only logged.
    pub async fn save(&self) {
        self.cache.persist(&self.store).await;
    }
}

impl Deref for SessionCache {
    type Target = CommerceCache;

    fn deref(&self) -> &Self::Target {
        &self.cache
    }
}

impl DerefMut for SessionCache {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.cache
    }
}

impl<S> FromRequestParts<S> for SessionCache
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal("session layer missing".to_owned()))?;
        let user = current_identity(parts).await;
        let store = SessionCacheStore::new(session);
        let cache = CommerceCache::load(&store, user).await;
        Ok(Self { cache, store })
    }
}
