//! Display views of orders.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use bytestall_core::{Order, OrderStatus, Price};

use super::access::can_access;

/// A purchased line as shown to customers and operators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineView {
    pub product_id: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price: String,
    pub line_total: String,
}

/// An order with display-ready labels and formatted amounts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub status_label: &'static str,
    pub status_tone: &'static str,
    pub can_access: bool,
    pub total: Decimal,
    pub total_display: String,
    pub payment_method: String,
    pub payment_verified: bool,
    pub access_granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub items: Vec<OrderLineView>,
    /// Operator-only fields; omitted from customer views.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<AdminFields>,
}

/// Fields only operators see.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminFields {
    pub user_email: String,
    pub user_name: String,
    pub awaiting_verification: bool,
    pub payment_reference: Option<String>,
    pub payment_proof_ref: Option<String>,
    pub payment_intent_id: Option<String>,
    pub payment_verified_at: Option<DateTime<Utc>>,
    pub payment_verified_by: Option<String>,
    pub revision: i64,
}

impl OrderView {
    /// The customer's view of their order.
    #[must_use]
    pub fn customer(order: &Order) -> Self {
        let items = order
            .items
            .iter()
            .map(|line| OrderLineView {
                product_id: line.product_id.to_string(),
                title: line.title.clone(),
                quantity: line.quantity,
                unit_price: Price::new(line.unit_price_at_purchase, order.currency).display(),
                line_total: Price::new(line.line_total(), order.currency).display(),
            })
            .collect();

        Self {
            id: order.id.to_string(),
            created_at: order.created_at,
            status: order.status,
            status_label: order.status.label(),
            status_tone: order.status.tone(),
            can_access: can_access(order),
            total: order.total,
            total_display: order.total_price().display(),
            payment_method: order.payment_method.clone(),
            payment_verified: order.payment_verified,
            access_granted: order.access_granted,
            notes: order.notes.clone(),
            items,
            admin: None,
        }
    }

    /// The operator's view, including customer and verification details.
    #[must_use]
    pub fn admin(order: &Order) -> Self {
        Self {
            admin: Some(AdminFields {
                user_email: order.user_email.to_string(),
                user_name: order.user_name.clone(),
                awaiting_verification: order.status.is_awaiting_verification(),
                payment_reference: order.payment_reference.clone(),
                payment_proof_ref: order.payment_proof_ref.clone(),
                payment_intent_id: order.payment_intent_id.clone(),
                payment_verified_at: order.payment_verified_at,
                payment_verified_by: order.payment_verified_by.clone(),
                revision: order.revision,
            }),
            ..Self::customer(order)
        }
    }
}
