//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;
use url::Url;

use crate::catalog::CatalogService;
use crate::config::StorefrontConfig;
use crate::db::{
    CatalogRepository, OrderRepository, PgCatalogRepository, PgOrderRepository, PgRemoteWishlist,
    RemoteWishlist,
};
use crate::orders::{AccessGate, OrderLifecycle};
use crate::payments::{
    Checkout, GatewayError, ManualProof, PayMongoClient, PaymentGateway, RedirectEwallet,
    ReplayGuard,
};
use crate::services::{
    AssetUploader, HttpAssetUploader, LogNotifier, NotificationDispatcher, Notifier, SmtpNotifier,
    TaskQueue, UploadError, WishlistSync,
};

/// Path of the checkout page, which is also the payment return URL.
pub const CHECKOUT_PATH: &str = "/checkout";

/// Error assembling the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("invalid checkout URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("asset uploader: {0}")]
    Uploader(#[from] UploadError),
    #[error("payment gateway: {0}")]
    Gateway(#[from] GatewayError),
    #[error("smtp notifier: {0}")]
    Notifier(#[from] lettre::transport::smtp::Error),
}

/// The collaborators the services run against.
///
/// Production builds these with [`Backends::connect`]; tests assemble them from
/// in-memory implementations and fakes.
#[derive(Clone)]
pub struct Backends {
    pub orders: Arc<dyn OrderRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub wishlist: Arc<dyn RemoteWishlist>,
    pub uploader: Arc<dyn AssetUploader>,
    /// `None` disables redirect e-wallet payments.
    pub gateway: Option<Arc<dyn PaymentGateway>>,
    pub notifier: Arc<dyn Notifier>,
    /// Checked by the readiness probe when present.
    pub pool: Option<PgPool>,
}

impl Backends {
    /// `PostgreSQL` repositories plus the HTTP and SMTP clients from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a client cannot be built.
    pub fn connect(config: &StorefrontConfig, pool: PgPool) -> Result<Self, StateError> {
        let gateway: Option<Arc<dyn PaymentGateway>> = match &config.paymongo {
            Some(paymongo) => Some(Arc::new(PayMongoClient::new(paymongo)?)),
            None => {
                tracing::info!("PAYMONGO_SECRET_KEY not set; redirect payments disabled");
                None
            }
        };
        let notifier: Arc<dyn Notifier> = match &config.email {
            Some(email) => Arc::new(SmtpNotifier::new(email)?),
            None => {
                tracing::info!("SMTP not configured; notifications will only be logged");
                Arc::new(LogNotifier)
            }
        };

        Ok(Self {
            orders: Arc::new(PgOrderRepository::new(pool.clone())),
            catalog: Arc::new(PgCatalogRepository::new(pool.clone())),
            wishlist: Arc::new(PgRemoteWishlist::new(pool.clone())),
            uploader: Arc::new(HttpAssetUploader::new(&config.assets)?),
            gateway,
            notifier,
            pool: Some(pool),
        })
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// services every route works through.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: Option<PgPool>,
    queue: TaskQueue,
    catalog: CatalogService,
    lifecycle: OrderLifecycle,
    checkout: Checkout,
    access: AccessGate,
    wishlist: WishlistSync,
}

impl AppState {
    /// Wire the services over `backends`.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkout return URL cannot be derived from
    /// `config.base_url`.
    pub fn new(
        config: StorefrontConfig,
        backends: Backends,
        queue: TaskQueue,
    ) -> Result<Self, StateError> {
        let Backends {
            orders,
            catalog,
            wishlist,
            uploader,
            gateway,
            notifier,
            pool,
        } = backends;

        let lifecycle = OrderLifecycle::new(Arc::clone(&orders), config.currency);
        let catalog_service =
            CatalogService::new(Arc::clone(&catalog), orders, gateway.is_some());
        let notifications = NotificationDispatcher::new(notifier, queue.clone());

        let manual = ManualProof::new(
            lifecycle.clone(),
            uploader,
            notifications.clone(),
            config.assets.max_bytes,
        );
        let return_url: Url = config.base_url.join(CHECKOUT_PATH)?;
        let ewallet = gateway.map(|gateway| {
            RedirectEwallet::new(
                lifecycle.clone(),
                gateway,
                notifications,
                return_url,
                ReplayGuard::default(),
            )
        });
        let checkout = Checkout::new(catalog_service.clone(), manual, ewallet);

        let access = AccessGate::new(lifecycle.clone(), Arc::clone(&catalog));
        let wishlist = WishlistSync::new(wishlist, catalog, queue.clone());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                queue,
                catalog: catalog_service,
                lifecycle,
                checkout,
                access,
                wishlist,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// The database pool, when running against `PostgreSQL`.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    /// Background queue for best-effort side effects.
    #[must_use]
    pub fn queue(&self) -> &TaskQueue {
        &self.inner.queue
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn lifecycle(&self) -> &OrderLifecycle {
        &self.inner.lifecycle
    }

    #[must_use]
    pub fn checkout(&self) -> &Checkout {
        &self.inner.checkout
    }

    #[must_use]
    pub fn access(&self) -> &AccessGate {
        &self.inner.access
    }

    #[must_use]
    pub fn wishlist(&self) -> &WishlistSync {
        &self.inner.wishlist
    }
}
