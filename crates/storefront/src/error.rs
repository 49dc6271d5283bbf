//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::orders::OrderError;
use crate::payments::{CheckoutError, GatewayError};
use crate::services::UploadError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Order engine error.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Payment proof upload failed.
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// Payment gateway failed.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Database operation failed outside the order engine.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Order(e) => Self::Order(e),
            CheckoutError::Upload(e) => Self::Upload(e),
            CheckoutError::Gateway(e) => Self::Gateway(e),
        }
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Order(err) => match err {
                OrderError::Validation(_) => StatusCode::BAD_REQUEST,
                OrderError::NotFound | OrderError::Unauthorized => StatusCode::NOT_FOUND,
                OrderError::InvalidTransition(_)
                | OrderError::ConcurrentModification
                | OrderError::Consistency(_) => StatusCode::CONFLICT,
                OrderError::AccessDenied(_) => StatusCode::FORBIDDEN,
                OrderError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Upload(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show the customer; internal details are withheld.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Order(OrderError::Repository(_))
            | Self::Database(_)
            | Self::Session(_)
            | Self::Internal(_) => "Internal server error".to_string(),
            Self::Upload(_) => "Could not upload your payment proof; please try again".to_string(),
            Self::Gateway(_) => "The payment provider is unavailable; please try again".to_string(),
            Self::BadRequest(msg) => msg.clone(),
            Self::Order(err) => err.to_string(),
        }
    }

    pub(crate) const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Order(OrderError::Repository(_))
                | Self::Database(_)
                | Self::Session(_)
                | Self::Internal(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else if matches!(self, Self::Gateway(_) | Self::Upload(_)) {
            tracing::warn!(error = %self, "External service error");
        }

        let status = self.status();
        let message = self.public_message();

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added to cart", Some(&[("product_id", "p1")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use bytestall_core::{OrderStatus, TransitionError};

    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");

        let err = AppError::Order(OrderError::Unauthorized);
        assert_eq!(err.to_string(), AppError::Order(OrderError::NotFound).to_string());
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(OrderError::Validation("empty".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(get_status(OrderError::NotFound.into()), StatusCode::NOT_FOUND);
        assert_eq!(get_status(OrderError::Unauthorized.into()), StatusCode::NOT_FOUND);
        assert_eq!(
            get_status(
                OrderError::InvalidTransition(TransitionError::Illegal {
                    from: OrderStatus::Verified,
                    to: OrderStatus::Cancelled,
                })
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(OrderError::ConcurrentModification.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(OrderError::AccessDenied(OrderStatus::Pending).into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::Upload(UploadError::Parse("bad".to_string()))),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            get_status(AppError::Gateway(GatewayError::InvalidAmount("-1".to_string()))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
