//! Session-related types.
//!
//! The session carries the signed-in identity and the persisted commerce cache.

/// Session keys.
pub mod keys {
    /// Key for the current signed-in identity.
    pub const CURRENT_IDENTITY: &str = "current_identity";

    /// Key for the persisted commerce cache blob.
    pub const COMMERCE_CACHE: &str = "commerce_cache";

    /// Key for the one-shot checkout notice shown after a payment redirect.
    pub const CHECKOUT_NOTICE: &str = "checkout_notice";
}
