//! Operator routes for order verification and catalog maintenance.
//!
//! Every handler requires [`RequireOperator`]; the operator's email is what the
//! audit trail records.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use bytestall_core::{OrderId, OrderStatus, ProductId};

use crate::db::AuditEntry;
use crate::error::Result;
use crate::middleware::RequireOperator;
use crate::orders::{Actor, OrderView};
use crate::state::AppState;

/// Query parameters for the order list.
#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
}

/// An order with its audit trail.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    pub order: OrderView,
    pub audit: Vec<AuditEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RejectForm {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: OrderStatus,
    pub reason: Option<String>,
}

/// Recent orders, optionally filtered by status.
#[instrument(skip_all, fields(operator = %operator))]
pub async fn orders(
    State(state): State<AppState>,
    RequireOperator(operator): RequireOperator,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<Vec<OrderView>>> {
    let orders = state.lifecycle().list_recent(query.status).await?;
    Ok(Json(orders.iter().map(OrderView::admin).collect()))
}

/// One order with its audit trail.
#[instrument(skip_all, fields(operator = %operator, order_id = %id))]
pub async fn order(
    State(state): State<AppState>,
    RequireOperator(operator): RequireOperator,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    let order = state.lifecycle().get(&id).await?;
    let audit = state.lifecycle().audit_trail(&id).await?;
    Ok(Json(OrderDetail {
        order: OrderView::admin(&order),
        audit,
    }))
}

/// Confirm payment and grant access.
#[instrument(skip_all, fields(operator = %operator, order_id = %id))]
pub async fn verify(
    State(state): State<AppState>,
    RequireOperator(operator): RequireOperator,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderView>> {
    let order = state
        .lifecycle()
        .verify(&id, &Actor::Operator(operator))
        .await?;
    Ok(Json(OrderView::admin(&order)))
}

/// Cancel an order awaiting verification.
#[instrument(skip_all, fields(operator = %operator, order_id = %id))]
pub async fn reject(
    State(state): State<AppState>,
    RequireOperator(operator): RequireOperator,
    Path(id): Path<OrderId>,
    Json(form): Json<RejectForm>,
) -> Result<Json<OrderView>> {
    let order = state.lifecycle().reject(&id, &operator, &form.reason).await?;
    Ok(Json(OrderView::admin(&order)))
}

/// Administrative status override.
#[instrument(skip_all, fields(operator = %operator, order_id = %id))]
pub async fn set_status(
    State(state): State<AppState>,
    RequireOperator(operator): RequireOperator,
    Path(id): Path<OrderId>,
    Json(form): Json<StatusForm>,
) -> Result<Json<OrderView>> {
    let order = state
        .lifecycle()
        .set_status(&id, form.status, &operator, form.reason.as_deref())
        .await?;
    Ok(Json(OrderView::admin(&order)))
}

/// Hard-delete a cancelled order.
#[instrument(skip_all, fields(operator = %operator, order_id = %id))]
pub async fn delete_order(
    State(state): State<AppState>,
    RequireOperator(operator): RequireOperator,
    Path(id): Path<OrderId>,
) -> Result<StatusCode> {
    state.lifecycle().delete(&id, &operator).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Hide a product from the storefront.
#[instrument(skip_all, fields(operator = %operator, product_id = %id))]
pub async fn archive_product(
    State(state): State<AppState>,
    RequireOperator(operator): RequireOperator,
    Path(id): Path<ProductId>,
) -> Result<StatusCode> {
    state.catalog().archive(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a product no order references.
#[instrument(skip_all, fields(operator = %operator, product_id = %id))]
pub async fn delete_product(
    State(state): State<AppState>,
    RequireOperator(operator): RequireOperator,
    Path(id): Path<ProductId>,
) -> Result<StatusCode> {
    state.catalog().hard_delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
