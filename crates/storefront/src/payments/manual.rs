//! Manual proof-of-payment checkout.
//!
//! The customer pays out of band and uploads a screenshot. The upload happens
//! before the order is created, so a failed upload leaves no order behind. The
//! order then waits in `payment_submitted` for an operator, along with the
//! transaction number the customer typed in, if any.

use std::sync::Arc;

use bytestall_core::{CartLine, Identity, Order, PaymentMethod};

use super::CheckoutError;
use crate::orders::{OrderError, OrderLifecycle};
use crate::services::{AssetUploader, NotificationDispatcher, ProofImage};

/// Longest accepted payment reference.
pub const MAX_REFERENCE_LEN: usize = 64;

/// Trim a customer-entered reference; blank means none.
fn normalize_reference(reference: Option<&str>) -> Result<Option<String>, OrderError> {
    let Some(reference) = reference.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    if reference.chars().count() > MAX_REFERENCE_LEN {
        return Err(OrderError::Validation(format!(
            "payment reference must be at most {MAX_REFERENCE_LEN} characters"
        )));
    }
    Ok(Some(reference.to_owned()))
}

#[derive(Clone)]
pub struct ManualProof {
    lifecycle: OrderLifecycle,
    uploader: Arc<dyn AssetUploader>,
    notifications: NotificationDispatcher,
    max_proof_bytes: usize,
}

impl ManualProof {
    #[must_use]
    pub fn new(
        lifecycle: OrderLifecycle,
        uploader: Arc<dyn AssetUploader>,
        notifications: NotificationDispatcher,
        max_proof_bytes: usize,
    ) -> Self {
        Self {
            lifecycle,
            uploader,
            notifications,
            max_proof_bytes,
        }
    }

    /// Upload the proof, create the order, and queue notifications.
    ///
    /// # Errors
    ///
    /// `Validation` before anything is uploaded; `Upload` if the asset store
    /// fails, in which case no order exists.
    #[tracing::instrument(skip_all, fields(method = %method.slug))]
    pub async fn reconcile(
        &self,
        customer: Option<&Identity>,
        lines: &[CartLine],
        method: &PaymentMethod,
        proof: Option<&ProofImage>,
        reference: Option<&str>,
    ) -> Result<Order, CheckoutError> {
        if customer.is_none() {
            return Err(OrderError::Validation("sign in to check out".to_owned()).into());
        }
        if lines.is_empty() {
            return Err(OrderError::Validation("your cart is empty".to_owned()).into());
        }
        let proof = proof.ok_or_else(|| {
            OrderError::Validation("upload a screenshot of your payment".to_owned())
        })?;
        proof
            .validate(self.max_proof_bytes)
            .map_err(|e| OrderError::Validation(e.to_string()))?;
        let reference = normalize_reference(reference)?;

        let asset = self.uploader.upload(proof).await.inspect_err(|e| {
            tracing::warn!(error = %e, "Payment proof upload failed; no order created");
        })?;

        let order = self
            .lifecycle
            .create(customer, lines, method, Some(asset.id), reference)
            .await?;

        self.notifications.order_placed(&order);
        Ok(order)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_is_trimmed_and_optional() {
        assert_eq!(normalize_reference(None).unwrap(), None);
        assert_eq!(normalize_reference(Some("   ")).unwrap(), None);
        assert_eq!(
            normalize_reference(Some(" 1009 234 5678 ")).unwrap().as_deref(),
            Some("1009 234 5678")
        );
    }

    #[test]
    fn test_overlong_reference_is_rejected() {
        let long = "9".repeat(MAX_REFERENCE_LEN + 1);
        assert!(matches!(
            normalize_reference(Some(&long)),
            Err(OrderError::Validation(_))
        ));
    }
}
