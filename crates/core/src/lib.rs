//! Bytestall Core - Shared domain types.
//!
//! This crate provides the types used across all Bytestall components:
//! - `storefront` - Customer-facing store, checkout and order engine
//! - `cli` - Migrations and administrative tooling
//!
//! # Architecture
//!
//! The core crate contains only types and pure state transitions - no I/O, no
//! database access, no HTTP clients. The order state machine lives here so that
//! every caller (HTTP routes, CLI, tests) applies the same transition table.
//!
//! # Modules
//!
//! - [`types`] - Ids, emails, prices, statuses, cart and order entities

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
