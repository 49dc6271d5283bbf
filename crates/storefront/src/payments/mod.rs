//! Payment reconciliation.
//!
//! Checkout picks one of two strategies from the selected payment method:
//!
//! - [`ManualProof`] - the customer uploads a payment screenshot; the order
//!   waits in `payment_submitted` for an operator.
//! - [`RedirectEwallet`] - the customer pays on the gateway's page and comes
//!   back with a [`ContinuationToken`]; the order starts `pending`.
//!
//! Both end in an [`OrderLifecycle`](crate::orders::OrderLifecycle) transition.
//! The cart is cleared only once an order exists and no further customer
//! action is needed (submitted for review, or verified).

pub mod continuation;
pub mod ewallet;
pub mod manual;
pub mod paymongo;

pub use continuation::{ContinuationOutcome, ContinuationToken, ReplayGuard};
pub use ewallet::{RedirectEwallet, ResumeOutcome};
pub use manual::ManualProof;
pub use paymongo::{
    AttachOutcome, GatewayError, IntentRequest, IntentStatus, PayMongoClient, PaymentGateway,
    PaymentIntent,
};

use thiserror::Error;
use url::Url;

use bytestall_core::{CartLine, EwalletProvider, Identity, Order, PaymentMethod};

use crate::cache::CommerceCache;
use crate::catalog::CatalogService;
use crate::orders::OrderError;
use crate::services::{ProofImage, UploadError};

/// Errors that abort a checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Order(#[from] OrderError),

    /// The proof upload failed; no order was created.
    #[error("could not upload your payment proof; please try again")]
    Upload(#[from] UploadError),

    /// The gateway failed; any order already created stays `pending`.
    #[error("the payment provider is unavailable; please try again")]
    Gateway(#[from] GatewayError),
}

/// How a particular order is going to be paid.
#[derive(Debug, Clone)]
pub enum PaymentStrategy {
    ManualProof {
        proof: Option<ProofImage>,
        reference: Option<String>,
    },
    RedirectEwallet {
        provider: EwalletProvider,
    },
}

impl PaymentStrategy {
    /// Pick the strategy for `method`, keeping only the form fields it uses.
    #[must_use]
    pub fn for_method(method: &PaymentMethod, request: CheckoutRequest) -> Self {
        if method.is_manual() {
            Self::ManualProof {
                proof: request.proof,
                reference: request.payment_reference,
            }
        } else {
            Self::RedirectEwallet {
                provider: request.provider.unwrap_or_default(),
            }
        }
    }
}

/// Checkout form contents.
#[derive(Debug, Clone, Default)]
pub struct CheckoutRequest {
    pub payment_method: String,
    pub provider: Option<EwalletProvider>,
    pub proof: Option<ProofImage>,
    /// Transaction number of a manual transfer.
    pub payment_reference: Option<String>,
}

/// Result of a successful checkout submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// Proof submitted; waiting for an operator.
    Submitted(Order),
    /// The customer must continue on the provider's page.
    Redirect { order: Order, url: Url },
    /// The provider confirmed synchronously.
    Verified(Order),
}

impl CheckoutOutcome {
    #[must_use]
    pub const fn order(&self) -> &Order {
        match self {
            Self::Submitted(order) | Self::Verified(order) | Self::Redirect { order, .. } => order,
        }
    }

    /// Whether the customer's part is done and the cart can go.
    #[must_use]
    pub const fn clears_cart(&self) -> bool {
        !matches!(self, Self::Redirect { .. })
    }
}

/// Entry point for placing and resuming orders.
#[derive(Clone)]
pub struct Checkout {
    catalog: CatalogService,
    manual: ManualProof,
    ewallet: Option<RedirectEwallet>,
}

impl Checkout {
    /// `ewallet` is `None` when no gateway is configured.
    #[must_use]
    pub const fn new(
        catalog: CatalogService,
        manual: ManualProof,
        ewallet: Option<RedirectEwallet>,
    ) -> Self {
        Self {
            catalog,
            manual,
            ewallet,
        }
    }

    /// Run `strategy` for the given cart lines.
    ///
    /// # Errors
    ///
    /// Whatever the chosen strategy fails with; a redirect strategy without a
    /// configured gateway is a `Validation` error.
    pub async fn reconcile(
        &self,
        strategy: &PaymentStrategy,
        customer: Option<&Identity>,
        lines: &[CartLine],
        method: &PaymentMethod,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        match strategy {
            PaymentStrategy::ManualProof { proof, reference } => self
                .manual
                .reconcile(customer, lines, method, proof.as_ref(), reference.as_deref())
                .await
                .map(CheckoutOutcome::Submitted),
            PaymentStrategy::RedirectEwallet { provider } => {
                let ewallet = self.ewallet.as_ref().ok_or_else(|| {
                    OrderError::Validation("e-wallet payments are not available".to_owned())
                })?;
                ewallet.reconcile(customer, lines, method, *provider).await
            }
        }
    }

    /// Place an order from the cache's cart.
    ///
    /// On failure the cart is left untouched.
    ///
    /// # Errors
    ///
    /// `Validation` for an unknown payment method or bad input, plus anything
    /// [`Checkout::reconcile`] returns.
    #[tracing::instrument(skip_all, fields(method = %request.payment_method))]
    pub async fn place_order(
        &self,
        cache: &mut CommerceCache,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let method = self.catalog.payment_method(&request.payment_method).await?;
        let strategy = PaymentStrategy::for_method(&method, request);
        let customer = cache.user().cloned();

        let outcome = self
            .reconcile(&strategy, customer.as_ref(), cache.cart(), &method)
            .await?;

        if outcome.clears_cart() {
            cache.clear_cart();
        }
        Ok(outcome)
    }

    /// Resume a redirect checkout from its continuation token.
    ///
    /// The cart is cleared only when the token confirms payment for the first
    /// time.
    ///
    /// # Errors
    ///
    /// `Validation` when signed out or no gateway is configured, plus anything
    /// [`RedirectEwallet::resume`] returns.
    pub async fn resume(
        &self,
        cache: &mut CommerceCache,
        token: &ContinuationToken,
    ) -> Result<ResumeOutcome, CheckoutError> {
        let ewallet = self.ewallet.as_ref().ok_or_else(|| {
            OrderError::Validation("e-wallet payments are not available".to_owned())
        })?;
        let customer = cache
            .user()
            .cloned()
            .ok_or_else(|| OrderError::Validation("sign in to continue checkout".to_owned()))?;

        let outcome = ewallet.resume(token, &customer).await?;
        if matches!(outcome, ResumeOutcome::Completed(_)) {
            cache.clear_cart();
        }
        Ok(outcome)
    }

    #[must_use]
    pub const fn catalog(&self) -> &CatalogService {
        &self.catalog
    }
}
