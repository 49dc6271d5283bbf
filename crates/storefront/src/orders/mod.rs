//! Orders: lifecycle state machine, delivery gating and display views.

pub mod access;
pub mod lifecycle;
pub mod view;

pub use access::{AccessGate, AccessGrant, Download, can_access};
pub use lifecycle::{Actor, OrderError, OrderLifecycle};
pub use view::OrderView;
