//! Cart lines and product references held in the customer's commerce cache.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ProductId;

/// A lightweight reference to a catalog product.
///
/// Stored in the wishlist, saved-for-later and recently-viewed lists. Prices
/// here are informational only; orders always snapshot from cart lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRef {
    pub id: ProductId,
    pub title: String,
    pub slug: String,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// A line in the cart.
///
/// Digital goods conventionally have quantity 1, but lines merge by product id
/// so repeated adds accumulate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub title: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl CartLine {
    /// Build a cart line for `product` with the given quantity.
    #[must_use]
    pub fn from_product(product: &ProductRef, quantity: u32) -> Self {
        Self {
            product_id: product.id.clone(),
            title: product.title.clone(),
            unit_price: product.price,
            quantity,
            category: product.category.clone(),
            slug: product.slug.clone(),
            image_url: product.image_url.clone(),
        }
    }

    /// `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    /// The product reference this line was built from.
    #[must_use]
    pub fn to_product_ref(&self) -> ProductRef {
        ProductRef {
            id: self.product_id.clone(),
            title: self.title.clone(),
            slug: self.slug.clone(),
            price: self.unit_price,
            category: self.category.clone(),
            image_url: self.image_url.clone(),
        }
    }
}
