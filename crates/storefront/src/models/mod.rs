//! Domain models for the storefront.

pub mod product;
pub mod session;

pub use product::Product;
