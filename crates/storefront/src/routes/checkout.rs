//! Checkout route handlers.
//!
//! `GET /checkout` doubles as the payment return URL. When it carries a
//! continuation token the handler resumes the order exactly once, leaves a
//! one-shot notice in the session, and 303-redirects to the same URL without
//! the token so a refresh cannot resume again. A token that cannot be handled
//! is stripped the same way, with a failure notice.

use axum::{
    Json,
    extract::{Multipart, OriginalUri, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use bytestall_core::{EwalletProvider, OrderId, PaymentMethod};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::{RequireIdentity, SessionCache};
use crate::models::session::keys;
use crate::orders::OrderView;
use crate::payments::{CheckoutOutcome, CheckoutRequest, ContinuationToken, ResumeOutcome};
use crate::services::ProofImage;
use crate::state::AppState;

use super::cart::CartView;

/// Where the customer is in the checkout flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    Cart,
    Payment,
    Confirmation,
}

/// A notice left for the next checkout page view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutNotice {
    pub step: CheckoutStep,
    pub kind: NoticeKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Success,
    Processing,
    Cancelled,
    /// The token could not be handled.
    Failed,
}

impl CheckoutNotice {
    fn failed(token: &ContinuationToken, error: &AppError) -> Self {
        Self {
            step: CheckoutStep::Payment,
            kind: NoticeKind::Failed,
            message: format!("We couldn't confirm your payment: {}", error.public_message()),
            order_id: token.order_id.clone(),
        }
    }

    fn from_resume(outcome: &ResumeOutcome) -> Option<Self> {
        match outcome {
            ResumeOutcome::Completed(order) => Some(Self {
                step: CheckoutStep::Confirmation,
                kind: NoticeKind::Success,
                message: "Payment received. Your downloads are ready.".to_owned(),
                order_id: Some(order.id.clone()),
            }),
            ResumeOutcome::Processing(order) => Some(Self {
                step: CheckoutStep::Confirmation,
                kind: NoticeKind::Processing,
                message: "Your payment is still processing. We'll update your order shortly."
                    .to_owned(),
                order_id: Some(order.id.clone()),
            }),
            ResumeOutcome::Cancelled { order_id } => Some(Self {
                step: CheckoutStep::Payment,
                kind: NoticeKind::Cancelled,
                message: "Payment was cancelled. You can try again or pick another method."
                    .to_owned(),
                order_id: order_id.clone(),
            }),
            ResumeOutcome::Replayed => None,
        }
    }
}

/// Checkout page state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutState {
    pub step: CheckoutStep,
    pub signed_in: bool,
    pub cart: CartView,
    pub payment_methods: Vec<PaymentMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<CheckoutNotice>,
}

/// Result of submitting the checkout form.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order: OrderView,
    /// Present when the customer must continue on the provider's page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

/// Show checkout, or resume a redirect payment when the URL carries a token.
#[instrument(skip(state, session, cache))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    mut cache: SessionCache,
    OriginalUri(uri): OriginalUri,
) -> Result<Response> {
    let current = state
        .config()
        .base_url
        .join(&uri.to_string())
        .map_err(|e| AppError::BadRequest(format!("invalid checkout URL: {e}")))?;

    if let Some(token) = ContinuationToken::from_url(&current) {
        let notice = match state.checkout().resume(&mut cache, &token).await {
            Ok(outcome) => {
                add_breadcrumb("checkout", "Resumed redirect payment", None);
                CheckoutNotice::from_resume(&outcome)
            }
            Err(e) => {
                let err = AppError::from(e);
                if err.is_server_error() {
                    sentry::capture_error(&err);
                }
                tracing::warn!(error = %err, "Could not resume redirect payment");
                Some(CheckoutNotice::failed(&token, &err))
            }
        };
        cache.save().await;

        if let Some(notice) = notice {
            session.insert(keys::CHECKOUT_NOTICE, &notice).await?;
        }

        let stripped = ContinuationToken::strip(&current);
        let target = match stripped.query() {
            Some(query) => format!("{}?{query}", stripped.path()),
            None => stripped.path().to_owned(),
        };
        return Ok(Redirect::to(&target).into_response());
    }

    let notice: Option<CheckoutNotice> = session.remove(keys::CHECKOUT_NOTICE).await?;
    let step = match &notice {
        Some(notice) => notice.step,
        None if cache.cart().is_empty() => CheckoutStep::Cart,
        None => CheckoutStep::Payment,
    };

    Ok(Json(CheckoutState {
        step,
        signed_in: cache.user().is_some(),
        cart: CartView::from_cache(&cache, &state),
        payment_methods: state.catalog().payment_methods().await?,
        notice,
    })
    .into_response())
}

/// Payment methods offered at checkout.
#[instrument(skip(state))]
pub async fn payment_methods(State(state): State<AppState>) -> Result<Json<Vec<PaymentMethod>>> {
    Ok(Json(state.catalog().payment_methods().await?))
}

/// Place an order from the cart.
///
/// Multipart fields: `payment_method`, optional `provider`, and for manual
/// methods `proof` (an image file) plus an optional `payment_reference`.
#[instrument(skip_all, fields(customer = %identity.email))]
pub async fn submit(
    State(state): State<AppState>,
    RequireIdentity(identity): RequireIdentity,
    mut cache: SessionCache,
    multipart: Multipart,
) -> Result<Response> {
    let request = read_checkout_form(multipart).await?;
    let outcome = state.checkout().place_order(&mut cache, request).await?;
    cache.save().await;

    add_breadcrumb(
        "checkout",
        "Order placed",
        Some(&[("order_id", outcome.order().id.as_str())]),
    );

    let redirect_url = match &outcome {
        CheckoutOutcome::Redirect { url, .. } => Some(url.to_string()),
        CheckoutOutcome::Submitted(_) | CheckoutOutcome::Verified(_) => None,
    };
    let body = CheckoutResponse {
        order: OrderView::customer(outcome.order()),
        redirect_url,
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

async fn read_checkout_form(mut multipart: Multipart) -> Result<CheckoutRequest> {
    let mut request = CheckoutRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid checkout form: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "payment_method" => {
                request.payment_method = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
            }
            "payment_reference" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                request.payment_reference = Some(text);
            }
            "provider" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                if !text.trim().is_empty() {
                    request.provider = Some(
                        text.trim()
                            .parse::<EwalletProvider>()
                            .map_err(AppError::BadRequest)?,
                    );
                }
            }
            "proof" => {
                let file_name = field.file_name().map(str::to_owned);
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_owned();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                if !bytes.is_empty() {
                    request.proof = Some(ProofImage {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            other => tracing::debug!(field = other, "Ignoring unknown checkout field"),
        }
    }

    if request.payment_method.trim().is_empty() {
        return Err(AppError::BadRequest("choose a payment method".to_string()));
    }
    Ok(request)
}
