//! Product route handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::instrument;

use bytestall_core::{ProductId, ProductRef};

use crate::error::{Result, add_breadcrumb};
use crate::middleware::SessionCache;
use crate::models::Product;
use crate::state::AppState;

/// Product detail response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub wishlisted: bool,
    pub in_cart: u32,
}

/// Display a product and record it as recently viewed.
#[instrument(skip(state, cache))]
pub async fn show(
    State(state): State<AppState>,
    mut cache: SessionCache,
    Path(id): Path<ProductId>,
) -> Result<Json<ProductDetail>> {
    let product = state.catalog().product(&id).await?;

    cache.add_to_recently_viewed(&product.to_ref());
    cache.save().await;
    add_breadcrumb("navigation", "Viewed product", Some(&[("product_id", id.as_str())]));

    let in_cart = cache
        .cart()
        .iter()
        .find(|line| line.product_id == id)
        .map_or(0, |line| line.quantity);

    Ok(Json(ProductDetail {
        wishlisted: cache.is_wishlisted(&id),
        in_cart,
        product,
    }))
}

/// Recently viewed products, most recent first.
#[instrument(skip(cache))]
pub async fn recently_viewed(cache: SessionCache) -> Json<Vec<ProductRef>> {
    Json(cache.recently_viewed().to_vec())
}
