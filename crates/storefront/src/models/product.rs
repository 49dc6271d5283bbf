//! Catalog product as read by the order engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bytestall_core::{ProductId, ProductRef};

/// A catalog product.
///
/// Only the fields checkout and delivery need; the rest of the catalog lives in
/// the CMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub slug: String,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Download link unlocked by a verified order. Never serialized to customers.
    #[serde(skip)]
    pub drive_link: Option<String>,
    pub archived: bool,
}

impl Product {
    /// Lightweight reference for the commerce cache.
    #[must_use]
    pub fn to_ref(&self) -> ProductRef {
        ProductRef {
            id: self.id.clone(),
            title: self.title.clone(),
            slug: self.slug.clone(),
            price: self.price,
            category: self.category.clone(),
            image_url: self.image_url.clone(),
        }
    }
}
