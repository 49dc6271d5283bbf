//! Customer order routes.

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use bytestall_core::OrderId;

use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireIdentity;
use crate::orders::{AccessGrant, OrderView};
use crate::state::AppState;

/// The customer's order history, newest first.
#[instrument(skip_all, fields(customer = %identity.email))]
pub async fn index(
    State(state): State<AppState>,
    RequireIdentity(identity): RequireIdentity,
) -> Result<Json<Vec<OrderView>>> {
    let orders = state.lifecycle().list_for_customer(&identity).await?;
    Ok(Json(orders.iter().map(OrderView::customer).collect()))
}

/// One of the customer's orders.
#[instrument(skip_all, fields(customer = %identity.email, order_id = %id))]
pub async fn show(
    State(state): State<AppState>,
    RequireIdentity(identity): RequireIdentity,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderView>> {
    let order = state.lifecycle().get_for_customer(&id, &identity).await?;
    Ok(Json(OrderView::customer(&order)))
}

/// Fetch the download links; completes a verified order.
#[instrument(skip_all, fields(customer = %identity.email, order_id = %id))]
pub async fn access(
    State(state): State<AppState>,
    RequireIdentity(identity): RequireIdentity,
    Path(id): Path<OrderId>,
) -> Result<Json<AccessGrant>> {
    let grant = state.access().exercise_access(&id, &identity).await?;
    add_breadcrumb("orders", "Exercised access", Some(&[("order_id", id.as_str())]));
    Ok(Json(grant))
}
