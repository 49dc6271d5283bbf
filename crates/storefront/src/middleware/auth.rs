//! Authentication middleware and extractors.
//!
//! The identity provider is an external collaborator; once it vouches for a
//! customer, the [`Identity`] is stored in the session and these extractors
//! read it back. Operators are signed-in identities whose email is on the
//! configured allow-list.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use bytestall_core::{Email, Identity};

use crate::models::session::keys;
use crate::state::AppState;

/// Extractor that requires a signed-in customer.
///
/// If no one is signed in, returns a redirect to the login page.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireIdentity(identity): RequireIdentity,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", identity.name)
/// }
/// ```
pub struct RequireIdentity(pub Identity);

/// Error returned when authentication is required but no one is signed in.
#[derive(Debug)]
pub enum AuthRejection {
    /// Redirect to login page (for browser requests).
    RedirectToLogin,
    /// Unauthorized response (for API requests).
    Unauthorized,
    /// Signed in, but not an operator.
    Forbidden,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/auth/login").into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            Self::Forbidden => StatusCode::FORBIDDEN.into_response(),
        }
    }
}

/// The identity stored in the request's session, if any.
pub async fn current_identity(parts: &Parts) -> Option<Identity> {
    let session = parts.extensions.get::<Session>()?;
    session
        .get::<Identity>(keys::CURRENT_IDENTITY)
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "Failed to read identity from session"))
        .ok()
        .flatten()
}

fn missing_identity(parts: &Parts) -> AuthRejection {
    if parts.uri.path().starts_with("/api/") {
        AuthRejection::Unauthorized
    } else {
        AuthRejection::RedirectToLogin
    }
}

impl<S> FromRequestParts<S> for RequireIdentity
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_identity(parts)
            .await
            .map(Self)
            .ok_or_else(|| missing_identity(parts))
    }
}

/// Extractor that requires a signed-in operator.
///
/// Yields the operator's email, which is what the audit trail records.
pub struct RequireOperator(pub Email);

impl FromRequestParts<AppState> for RequireOperator {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = current_identity(parts)
            .await
            .ok_or_else(|| missing_identity(parts))?;

        if !state.config().is_admin(&identity.email) {
            tracing::warn!(email = %identity.email, path = %parts.uri.path(), "Non-operator tried an admin route");
            return Err(AuthRejection::Forbidden);
        }
        Ok(Self(identity.email))
    }
}

/// Helper to set the signed-in identity in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_identity(
    session: &Session,
    identity: &Identity,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(keys::CURRENT_IDENTITY, identity).await
}

/// Helper to clear the signed-in identity from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_identity(
    session: &Session,
) -> Result<(), tower_sessions::session::Error> {
    session.remove::<Identity>(keys::CURRENT_IDENTITY).await?;
    Ok(())
}
