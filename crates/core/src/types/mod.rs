//! Core types for Bytestall.
//!
//! This module provides type-safe wrappers for common domain concepts and the
//! commerce entities the order engine works with.

pub mod cart;
pub mod email;
pub mod id;
pub mod identity;
pub mod order;
pub mod payment;
pub mod price;
pub mod status;

pub use cart::{CartLine, ProductRef};
pub use email::{Email, EmailError};
pub use id::*;
pub use identity::{AuthType, Identity};
pub use order::{Order, OrderLine, TransitionError};
pub use payment::{EwalletProvider, PAYMONGO_SLUG, PaymentMethod};
pub use price::{CurrencyCode, Price};
pub use status::*;
