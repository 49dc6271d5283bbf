//! Wishlist route handlers.

use axum::{Json, extract::State};
use serde::Serialize;
use tracing::instrument;

use bytestall_core::ProductRef;

use crate::error::Result;
use crate::middleware::{RequireIdentity, SessionCache};
use crate::state::AppState;

use super::cart::ProductForm;

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub wishlisted: bool,
}

#[derive(Debug, Serialize)]
pub struct ResyncResponse {
    pub queued: bool,
}

/// The local wishlist.
#[instrument(skip(cache))]
pub async fn show(cache: SessionCache) -> Json<Vec<ProductRef>> {
    Json(cache.wishlist().to_vec())
}

/// Toggle a product; mirrored to the remote record when signed in.
#[instrument(skip(state, cache))]
pub async fn toggle(
    State(state): State<AppState>,
    mut cache: SessionCache,
    Json(form): Json<ProductForm>,
) -> Result<Json<ToggleResponse>> {
    let product = state.catalog().product(&form.product_id).await?;
    let wishlisted = state.wishlist().toggle(&mut cache, &product.to_ref());
    cache.save().await;
    Ok(Json(ToggleResponse { wishlisted }))
}

/// Push the whole local wishlist to the remote record.
#[instrument(skip_all, fields(user = %identity.email))]
pub async fn resync(
    State(state): State<AppState>,
    RequireIdentity(identity): RequireIdentity,
    cache: SessionCache,
) -> Json<ResyncResponse> {
    Json(ResyncResponse {
        queued: state.wishlist().resync(&cache),
    })
}
