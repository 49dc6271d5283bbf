//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! # Products
//! GET  /products/{id}                  - Product detail (records recently viewed)
//! GET  /recently-viewed                - Recently viewed products
//!
//! # Cart
//! GET  /cart                           - Cart lines, total, count, saved-for-later
//! POST /cart/add                       - Add to cart (merges quantities)
//! POST /cart/update                    - Set quantity (0 removes)
//! POST /cart/remove                    - Remove line
//! POST /cart/clear                     - Empty cart
//! POST /cart/save-for-later            - Move line to saved-for-later
//! POST /cart/move-to-cart              - Move saved product back to cart
//! POST /cart/remove-saved              - Drop saved product
//!
//! # Wishlist
//! GET  /wishlist                       - Local wishlist
//! POST /wishlist/toggle                - Toggle (mirrored remotely when signed in)
//! POST /wishlist/resync                - Push full wishlist to remote (requires auth)
//!
//! # Checkout
//! GET  /checkout                       - Checkout state; resumes ?paymongo= tokens
//! GET  /checkout/payment-methods       - Available payment methods
//! POST /checkout                       - Place order (multipart, requires auth)
//!
//! # Orders (requires auth)
//! GET  /orders                         - Order history
//! GET  /orders/{id}                    - Order detail
//! POST /orders/{id}/access             - Download links (completes verified orders)
//!
//! # Admin (requires operator)
//! GET    /admin/orders?status=         - Recent orders
//! GET    /admin/orders/{id}            - Order with audit trail
//! POST   /admin/orders/{id}/verify     - Verify payment
//! POST   /admin/orders/{id}/reject     - Cancel with reason
//! POST   /admin/orders/{id}/status     - Status override (audited)
//! DELETE /admin/orders/{id}            - Delete cancelled order
//! POST   /admin/products/{id}/archive  - Archive product
//! DELETE /admin/products/{id}          - Delete unreferenced product
//!
//! # Auth
//! GET  /auth/login                     - Sign-in required notice
//! POST /auth/logout                    - Logout
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod orders;
pub mod products;
pub mod wishlist;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::config::StorefrontConfig;
use crate::state::AppState;

/// Multipart overhead allowed on top of the proof image itself.
const CHECKOUT_FORM_OVERHEAD: usize = 64 * 1024;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login))
        .route("/logout", post(auth::logout))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
        .route("/save-for-later", post(cart::save_for_later))
        .route("/move-to-cart", post(cart::move_to_cart))
        .route("/remove-saved", post(cart::remove_saved))
}

/// Create the wishlist routes router.
pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(wishlist::show))
        .route("/toggle", post(wishlist::toggle))
        .route("/resync", post(wishlist::resync))
}

/// Create the checkout routes router.
///
/// The body limit admits a proof image of up to `max_proof_bytes`.
pub fn checkout_routes(max_proof_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(checkout::show)
                .post(checkout::submit)
                .layer(DefaultBodyLimit::max(
                    max_proof_bytes.saturating_add(CHECKOUT_FORM_OVERHEAD),
                )),
        )
        .route("/payment-methods", get(checkout::payment_methods))
}

/// Create the customer order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/{id}", get(orders::show))
        .route("/{id}/access", post(orders::access))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(admin::orders))
        .route("/orders/{id}", get(admin::order).delete(admin::delete_order))
        .route("/orders/{id}/verify", post(admin::verify))
        .route("/orders/{id}/reject", post(admin::reject))
        .route("/orders/{id}/status", post(admin::set_status))
        .route("/products/{id}/archive", post(admin::archive_product))
        .route("/products/{id}", axum::routing::delete(admin::delete_product))
}

/// Create all routes for the storefront.
pub fn routes(config: &StorefrontConfig) -> Router<AppState> {
    Router::new()
        .route("/products/{id}", get(products::show))
        .route("/recently-viewed", get(products::recently_viewed))
        .nest("/cart", cart_routes())
        .nest("/wishlist", wishlist_routes())
        .nest("/checkout", checkout_routes(config.assets.max_bytes))
        .nest("/orders", order_routes())
        .nest("/admin", admin_routes())
        .nest("/auth", auth_routes())
}
