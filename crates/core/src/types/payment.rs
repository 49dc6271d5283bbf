//! Payment methods offered at checkout.

use serde::{Deserialize, Serialize};

use super::PaymentMethodId;

/// Slug of the synthetic payment method backed by the PayMongo redirect flow.
pub const PAYMONGO_SLUG: &str = "paymongo";

/// A payment method shown at checkout.
///
/// Every method except [`PAYMONGO_SLUG`] is a manual method: the customer pays
/// out of band (bank transfer, e-wallet QR) and uploads a proof screenshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub name: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub is_active: bool,
}

impl PaymentMethod {
    /// The synthetic entry representing the redirect e-wallet flow.
    #[must_use]
    pub fn paymongo() -> Self {
        Self {
            id: PaymentMethodId::new(PAYMONGO_SLUG),
            name: "GCash / Maya / GrabPay (PayMongo)".to_owned(),
            slug: PAYMONGO_SLUG.to_owned(),
            account_name: None,
            account_number: None,
            qr_code_ref: None,
            instructions: Some("You will be redirected to complete payment.".to_owned()),
            is_active: true,
        }
    }

    /// Whether the method requires an uploaded proof of payment.
    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.slug != PAYMONGO_SLUG
    }
}

/// E-wallet providers the redirect gateway can attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EwalletProvider {
    #[default]
    Gcash,
    Paymaya,
    GrabPay,
}

impl EwalletProvider {
    /// Gateway payment-method type name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gcash => "gcash",
            Self::Paymaya => "paymaya",
            Self::GrabPay => "grab_pay",
        }
    }
}

impl std::str::FromStr for EwalletProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gcash" => Ok(Self::Gcash),
            "paymaya" | "maya" => Ok(Self::Paymaya),
            "grab_pay" | "grabpay" => Ok(Self::GrabPay),
            other => Err(format!("unsupported e-wallet provider: {other}")),
        }
    }
}
