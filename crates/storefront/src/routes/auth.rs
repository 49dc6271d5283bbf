//! Authentication route handlers.
//!
//! Sign-in itself is delegated to the external identity provider; whatever
//! integration receives its callback calls [`sign_in`]. The storefront only
//! owns the session side: storing the identity, hydrating the wishlist, and
//! logging out.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tower_sessions::Session;

use bytestall_core::Identity;

use crate::cache::{CommerceCache, SessionCacheStore};
use crate::error::{clear_sentry_user, set_sentry_user};
use crate::middleware::{clear_current_identity, set_current_identity};
use crate::state::AppState;

/// Store `identity` in the session and merge the remote wishlist into the
/// session's cache.
///
/// Returns how many wishlist entries came from the remote record.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn sign_in(
    state: &AppState,
    session: &Session,
    identity: Identity,
) -> Result<usize, tower_sessions::session::Error> {
    // New identity, new session id.
    session.cycle_id().await?;
    set_current_identity(session, &identity).await?;
    set_sentry_user(&identity.id, Some(identity.email.as_str()));

    let store = SessionCacheStore::new(session.clone());
    let mut cache = CommerceCache::load(&store, Some(identity)).await;
    let merged = state.wishlist().hydrate(&mut cache).await;
    cache.persist(&store).await;

    tracing::info!(merged, "Customer signed in");
    Ok(merged)
}

/// Where unauthenticated customers are sent.
///
/// The identity provider's hosted page is configured outside the storefront,
/// so this only tells the client that a sign-in is needed.
pub async fn login() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "sign in to continue" })),
    )
        .into_response()
}

/// Log out: drop the identity but keep the cart and wishlist.
pub async fn logout(session: Session) -> StatusCode {
    if let Err(e) = clear_current_identity(&session).await {
        tracing::error!("Failed to clear session: {}", e);
    }
    if let Err(e) = session.cycle_id().await {
        tracing::error!("Failed to cycle session id: {}", e);
    }
    clear_sentry_user();

    StatusCode::NO_CONTENT
}
