//! Cart route handlers.
//!
//! The cart lives in the session-persisted commerce cache. Every mutation
//! returns the updated cart so the client can re-render in one round trip.

use axum::{Json, extract::State};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use bytestall_core::{CartLine, Price, ProductId, ProductRef};

use crate::cache::CommerceCache;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::SessionCache;
use crate::state::AppState;

/// Cart display data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub total: Decimal,
    pub total_display: String,
    pub count: u32,
    pub saved_for_later: Vec<ProductRef>,
}

impl CartView {
    #[must_use]
    pub fn from_cache(cache: &CommerceCache, state: &AppState) -> Self {
        let total = cache.cart_total();
        Self {
            lines: cache.cart().to_vec(),
            total,
            total_display: Price::new(total, state.config().currency).display(),
            count: cache.cart_count(),
            saved_for_later: cache.saved_for_later().to_vec(),
        }
    }
}

/// Form data for adding or updating a cart line.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityForm {
    pub product_id: ProductId,
    pub quantity: Option<u32>,
}

/// Form data naming a single product.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductForm {
    pub product_id: ProductId,
}

/// Show the cart.
#[instrument(skip(state, cache))]
pub async fn show(State(state): State<AppState>, cache: SessionCache) -> Json<CartView> {
    Json(CartView::from_cache(&cache, &state))
}

/// Add a product to the cart.
#[instrument(skip(state, cache))]
pub async fn add(
    State(state): State<AppState>,
    mut cache: SessionCache,
    Json(form): Json<QuantityForm>,
) -> Result<Json<CartView>> {
    let quantity = form.quantity.unwrap_or(1);
    if quantity == 0 {
        return Err(AppError::BadRequest("quantity must be at least 1".to_string()));
    }
    let product = state.catalog().product(&form.product_id).await?;

    cache.add_to_cart(&product.to_ref(), quantity);
    cache.save().await;
    add_breadcrumb("cart", "Added to cart", Some(&[("product_id", form.product_id.as_str())]));

    Ok(Json(CartView::from_cache(&cache, &state)))
}

/// Set a line's quantity; zero removes the line.
#[instrument(skip(state, cache))]
pub async fn update(
    State(state): State<AppState>,
    mut cache: SessionCache,
    Json(form): Json<QuantityForm>,
) -> Result<Json<CartView>> {
    let quantity = form
        .quantity
        .ok_or_else(|| AppError::BadRequest("quantity is required".to_string()))?;

    cache.update_quantity(&form.product_id, quantity);
    cache.save().await;

    Ok(Json(CartView::from_cache(&cache, &state)))
}

/// Remove a line from the cart.
#[instrument(skip(state, cache))]
pub async fn remove(
    State(state): State<AppState>,
    mut cache: SessionCache,
    Json(form): Json<ProductForm>,
) -> Json<CartView> {
    cache.remove_from_cart(&form.product_id);
    cache.save().await;
    Json(CartView::from_cache(&cache, &state))
}

/// Empty the cart.
#[instrument(skip(state, cache))]
pub async fn clear(State(state): State<AppState>, mut cache: SessionCache) -> Json<CartView> {
    cache.clear_cart();
    cache.save().await;
    Json(CartView::from_cache(&cache, &state))
}

/// Move a cart line to saved-for-later.
#[instrument(skip(state, cache))]
pub async fn save_for_later(
    State(state): State<AppState>,
    mut cache: SessionCache,
    Json(form): Json<ProductForm>,
) -> Result<Json<CartView>> {
    if !cache.save_for_later(&form.product_id) {
        return Err(AppError::BadRequest("that product is not in your cart".to_string()));
    }
    cache.save().await;
    Ok(Json(CartView::from_cache(&cache, &state)))
}

/// Move a saved product back into the cart.
#[instrument(skip(state, cache))]
pub async fn move_to_cart(
    State(state): State<AppState>,
    mut cache: SessionCache,
    Json(form): Json<ProductForm>,
) -> Result<Json<CartView>> {
    if !cache.move_to_cart(&form.product_id) {
        return Err(AppError::BadRequest("that product is not saved for later".to_string()));
    }
    cache.save().await;
    Ok(Json(CartView::from_cache(&cache, &state)))
}

/// Drop a saved-for-later product.
#[instrument(skip(state, cache))]
pub async fn remove_saved(
    State(state): State<AppState>,
    mut cache: SessionCache,
    Json(form): Json<ProductForm>,
) -> Json<CartView> {
    cache.remove_saved(&form.product_id);
    cache.save().await;
    Json(CartView::from_cache(&cache, &state))
}
