//! Signed-in customer identity.

use serde::{Deserialize, Serialize};

use super::{Email, UserId};

/// How the identity provider authenticated the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    Google,
    Email,
}

/// Identity produced by the authentication collaborator.
///
/// The order engine only ever compares `email`; `id` keys the remote wishlist
/// record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub email: Email,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub auth_type: AuthType,
}

impl Identity {
    /// Whether this identity owns a record stamped with `email`.
    #[must_use]
    pub fn owns(&self, email: &Email) -> bool {
        &self.email == email
    }
}
