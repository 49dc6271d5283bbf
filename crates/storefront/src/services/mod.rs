//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `tasks` - Ordered, best-effort background queue
//! - `wishlist_sync` - Mirrors wishlist toggles to the remote record
//! - `notifier` - Order notification emails
//! - `assets` - Payment-proof image upload

pub mod assets;
pub mod notifier;
pub mod tasks;
pub mod wishlist_sync;

pub use assets::{AssetUploader, HttpAssetUploader, InvalidProof, ProofImage, UploadError, UploadedAsset};
pub use notifier::{LogNotifier, NotificationDispatcher, Notifier, NotifyError, OrderSummary, SmtpNotifier};
pub use tasks::{QueueStats, TaskQueue};
pub use wishlist_sync::WishlistSync;
