//! Integration tests for Bytestall.
//!
//! The storefront is assembled in-process against in-memory repositories and
//! fake collaborators, so the tests need no database or network.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bytestall-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `checkout_flow` - Manual proof checkout end to end
//! - `redirect_flow` - Redirect e-wallet checkout and continuation tokens
//! - `access_gate` - Download gating and operator actions
//! - `http_routes` - Router-level checks through sessions and extractors

#![allow(clippy::missing_panics_doc, clippy::expect_used)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{Json, Router, routing::post};
use rust_decimal::Decimal;
use secrecy::SecretString;
use tower_sessions::{MemoryStore, Session};
use url::Url;

use bytestall_core::{
    AuthType, CurrencyCode, Email, EwalletProvider, Identity, PaymentMethod, PaymentMethodId,
    ProductId, UserId,
};
use bytestall_storefront::config::{AssetConfig, LogFormat, StorefrontConfig};
use bytestall_storefront::db::{InMemoryCatalog, InMemoryOrders, InMemoryWishlist};
use bytestall_storefront::models::Product;
use bytestall_storefront::payments::{
    AttachOutcome, GatewayError, IntentRequest, IntentStatus, PaymentGateway, PaymentIntent,
};
use bytestall_storefront::services::{
    AssetUploader, Notifier, NotifyError, OrderSummary, ProofImage, TaskQueue, UploadError,
    UploadedAsset,
};
use bytestall_storefront::state::{AppState, Backends};
use bytestall_storefront::{middleware, routes, router, with_layers};

/// Slug of the manual payment method seeded by [`TestContext::new`].
pub const MANUAL_METHOD: &str = "gcash-manual";

/// Operator on the admin allow-list of [`test_config`].
pub const OPERATOR_EMAIL: &str = "ops@bytestall.test";

/// Configuration for in-process tests.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://unused"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 3000,
        base_url: Url::parse("http://shop.test").expect("valid url"),
        currency: CurrencyCode::PHP,
        admin_emails: vec![operator()],
        log_format: LogFormat::Text,
        paymongo: None,
        assets: AssetConfig {
            upload_url: Url::parse("http://assets.test/upload").expect("valid url"),
            token: SecretString::from("test-upload-token"),
            max_bytes: 1024 * 1024,
        },
        email: None,
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// A signed-in customer.
#[must_use]
pub fn customer(name: &str) -> Identity {
    Identity {
        id: UserId::new(format!("user-{name}")),
        email: Email::parse(&format!("{name}@example.com")).expect("valid email"),
        name: name.to_owned(),
        picture: None,
        auth_type: AuthType::Google,
    }
}

/// The allow-listed operator's email.
#[must_use]
pub fn operator() -> Email {
    Email::parse(OPERATOR_EMAIL).expect("valid email")
}

/// A small PNG-typed proof image.
#[must_use]
pub fn proof_image() -> ProofImage {
    ProofImage {
        file_name: Some("receipt.png".to_owned()),
        content_type: "image/png".to_owned(),
        bytes: vec![0x89, b'P', b'N', b'G', 1, 2, 3],
    }
}

// =============================================================================
// Fake collaborators
// =============================================================================

/// Asset store that records uploads and can be made to fail.
#[derive(Default)]
pub struct FakeUploader {
    uploads: Mutex<Vec<ProofImage>>,
    failing: AtomicBool,
}

impl FakeUploader {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.uploads.lock().expect("lock").len()
    }
}

#[async_trait]
impl AssetUploader for FakeUploader {
    async fn upload(&self, image: &ProofImage) -> Result<UploadedAsset, UploadError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(UploadError::Api {
                status: 503,
                message: "asset store offline".to_owned(),
            });
        }
        let mut uploads = self.uploads.lock().expect("lock");
        uploads.push(image.clone());
        let id = format!("image-proof-{}", uploads.len());
        Ok(UploadedAsset {
            url: format!("https://assets.test/{id}.png"),
            id,
        })
    }
}

/// Payment gateway with scripted responses.
pub struct FakeGateway {
    attach: Mutex<AttachOutcome>,
    status: Mutex<IntentStatus>,
    failing: AtomicBool,
    intents: Mutex<Vec<IntentRequest>>,
    status_checks: Mutex<usize>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            attach: Mutex::new(AttachOutcome::Redirect(
                Url::parse("https://pay.test/hosted/gcash").expect("valid url"),
            )),
            status: Mutex::new(IntentStatus::Succeeded),
            failing: AtomicBool::new(false),
            intents: Mutex::new(Vec::new()),
            status_checks: Mutex::new(0),
        }
    }
}

impl FakeGateway {
    /// What `attach_method` returns next.
    pub fn set_attach(&self, outcome: AttachOutcome) {
        *self.attach.lock().expect("lock") = outcome;
    }

    /// What `intent_status` returns next.
    pub fn set_status(&self, status: IntentStatus) {
        *self.status.lock().expect("lock") = status;
    }

    /// Make `create_intent` fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Intent requests received so far.
    #[must_use]
    pub fn intents(&self) -> Vec<IntentRequest> {
        self.intents.lock().expect("lock").clone()
    }

    #[must_use]
    pub fn status_checks(&self) -> usize {
        *self.status_checks.lock().expect("lock")
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: 500,
                message: "gateway down".to_owned(),
            });
        }
        let mut intents = self.intents.lock().expect("lock");
        intents.push(request.clone());
        Ok(PaymentIntent {
            id: format!("pi_{}", intents.len()),
            client_key: format!("pi_{}_client", intents.len()),
        })
    }

    async fn attach_method(
        &self,
        _intent: &PaymentIntent,
        _provider: EwalletProvider,
        _return_url: &Url,
        _customer_name: &str,
        _customer_email: &Email,
    ) -> Result<AttachOutcome, GatewayError> {
        Ok(self.attach.lock().expect("lock").clone())
    }

    async fn intent_status(&self, _intent_id: &str) -> Result<IntentStatus, GatewayError> {
        *self.status_checks.lock().expect("lock") += 1;
        Ok(*self.status.lock().expect("lock"))
    }
}

/// Notifier that records summaries instead of sending mail.
#[derive(Default)]
pub struct RecordingNotifier {
    admin: Mutex<Vec<OrderSummary>>,
    customer: Mutex<Vec<OrderSummary>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn admin_notices(&self) -> Vec<OrderSummary> {
        self.admin.lock().expect("lock").clone()
    }

    #[must_use]
    pub fn customer_notices(&self) -> Vec<OrderSummary> {
        self.customer.lock().expect("lock").clone()
    }

    fn check(&self) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::InvalidAddress("mail relay offline".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_admin(&self, summary: &OrderSummary) -> Result<(), NotifyError> {
        self.check()?;
        self.admin.lock().expect("lock").push(summary.clone());
        Ok(())
    }

    async fn notify_customer(&self, summary: &OrderSummary) -> Result<(), NotifyError> {
        self.check()?;
        self.customer.lock().expect("lock").push(summary.clone());
        Ok(())
    }
}

// =============================================================================
// Test context
// =============================================================================

/// A storefront wired to in-memory backends, with handles on every fake.
pub struct TestContext {
    pub state: AppState,
    pub orders: Arc<InMemoryOrders>,
    pub catalog: Arc<InMemoryCatalog>,
    pub wishlist: Arc<InMemoryWishlist>,
    pub uploader: Arc<FakeUploader>,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub queue: TaskQueue,
    backends: Backends,
}

impl TestContext {
    /// A storefront with the redirect gateway enabled and one manual method.
    pub async fn new() -> Self {
        Self::build(true).await
    }

    /// A storefront without a payment gateway.
    pub async fn without_gateway() -> Self {
        Self::build(false).await
    }

    async fn build(with_gateway: bool) -> Self {
        let orders = Arc::new(InMemoryOrders::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let wishlist = Arc::new(InMemoryWishlist::new());
        let uploader = Arc::new(FakeUploader::default());
        let gateway = Arc::new(FakeGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let queue = TaskQueue::spawn(64);

        catalog
            .put_payment_method(PaymentMethod {
                id: PaymentMethodId::new("pm-gcash"),
                name: "GCash (send money)".to_owned(),
                slug: MANUAL_METHOD.to_owned(),
                account_name: Some("Bytestall".to_owned()),
                account_number: Some("0917 000 0000".to_owned()),
                qr_code_ref: None,
                instructions: Some("Send the exact total, then upload the receipt.".to_owned()),
                is_active: true,
            })
            .await;

        let backends = Backends {
            orders: orders.clone(),
            catalog: catalog.clone(),
            wishlist: wishlist.clone(),
            uploader: uploader.clone(),
            gateway: with_gateway.then(|| gateway.clone() as Arc<dyn PaymentGateway>),
            notifier: notifier.clone(),
            pool: None,
        };
        let state = AppState::new(test_config(), backends.clone(), queue.clone())
            .expect("state should build");

        Self {
            state,
            orders,
            catalog,
            wishlist,
            uploader,
            gateway,
            notifier,
            queue,
            backends,
        }
    }

    /// A second storefront over the same backends, as after a restart or on
    /// another instance: shared storage, fresh in-process state.
    #[must_use]
    pub fn restarted(&self) -> AppState {
        AppState::new(test_config(), self.backends.clone(), self.queue.clone())
            .expect("state should build")
    }

    /// Add a product to the catalog.
    pub async fn seed_product(&self, id: &str, price: Decimal) -> Product {
        let product = Product {
            id: ProductId::new(id),
            title: format!("Product {id}"),
            slug: id.to_owned(),
            price,
            category: Some("templates".to_owned()),
            image_url: None,
            drive_link: Some(format!("https://drive.test/{id}")),
            archived: false,
        };
        self.catalog.put_product(product.clone()).await;
        product
    }

    /// The full router over a memory session store, plus a
    /// `POST /test/sign-in` route that signs in the posted identity.
    #[must_use]
    pub fn router(&self) -> Router {
        let config = self.state.config().clone();
        let router = router(&config).route("/test/sign-in", post(test_sign_in));
        let session_layer = middleware::create_session_layer(MemoryStore::default(), &config);
        with_layers(router, self.state.clone(), session_layer)
    }
}

async fn test_sign_in(
    axum::extract::State(state): axum::extract::State<AppState>,
    session: Session,
    Json(identity): Json<Identity>,
) -> Json<usize> {
    let merged = routes::auth::sign_in(&state, &session, identity)
        .await
        .expect("session should accept identity");
    Json(merged)
}
