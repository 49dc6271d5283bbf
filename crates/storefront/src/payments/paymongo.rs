//! PayMongo payment-intent client for redirect e-wallet payments.
//!
//! Flow: create a payment intent for the order total, create a payment method
//! for the chosen e-wallet, then attach it to the intent. The attach response
//! either asks us to redirect the customer to the provider's hosted page or
//! reports that the payment already succeeded.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use url::Url;

use bytestall_core::{Email, EwalletProvider, OrderId, Price};

use crate::config::PayMongoConfig;

/// Errors that can occur when talking to the payment gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The amount cannot be charged.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

/// Parameters for a new payment intent.
#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub order_id: OrderId,
    pub amount: Price,
    pub description: String,
    pub success_url: Url,
    pub cancel_url: Url,
    pub customer_email: Email,
    pub customer_name: String,
}

/// A created payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub client_key: String,
}

/// Result of attaching an e-wallet to an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    /// Send the customer to the provider's hosted page.
    Redirect(Url),
    /// The provider confirmed the payment synchronously.
    Succeeded,
}

/// Gateway-side status of a payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    Succeeded,
    /// Awaiting customer action or still processing.
    InProgress,
    /// The payment failed or was abandoned.
    Failed,
}

impl IntentStatus {
    fn from_api(status: &str) -> Self {
        match status {
            "succeeded" => Self::Succeeded,
            "awaiting_payment_method" | "payment_failed" | "cancelled" => Self::Failed,
            _ => Self::InProgress,
        }
    }
}

/// Payment gateway collaborator.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent for an order.
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, GatewayError>;

    /// Attach an e-wallet to the intent.
    async fn attach_method(
        &self,
        intent: &PaymentIntent,
        provider: EwalletProvider,
        return_url: &Url,
        customer_name: &str,
        customer_email: &Email,
    ) -> Result<AttachOutcome, GatewayError>;

    /// Current status of an intent.
    async fn intent_status(&self, intent_id: &str) -> Result<IntentStatus, GatewayError>;
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Deserialize)]
struct Envelope<T> {
    data: Resource<T>,
}

#[derive(Deserialize)]
struct Resource<T> {
    id: String,
    attributes: T,
}

#[derive(Deserialize)]
struct IntentAttributes {
    #[serde(default)]
    client_key: Option<String>,
    status: String,
    #[serde(default)]
    next_action: Option<NextAction>,
}

#[derive(Deserialize)]
struct NextAction {
    #[serde(default)]
    redirect: Option<RedirectAction>,
}

#[derive(Deserialize)]
struct RedirectAction {
    url: String,
}

#[derive(Deserialize)]
struct MethodAttributes {}

#[derive(Deserialize)]
struct ApiErrors {
    errors: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    detail: String,
}

// =============================================================================
// Client
// =============================================================================

/// PayMongo API client.
#[derive(Clone)]
pub struct PayMongoClient {
    client: reqwest::Client,
    api_base: Url,
}

impl PayMongoClient {
    /// Create a new PayMongo client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &PayMongoConfig) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();

        // Basic auth with the secret key as username and an empty password
        let credentials = STANDARD.encode(format!("{}:", config.secret_key.expose_secret()));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {credentials}"))
                .map_err(|e| GatewayError::Parse(format!("Invalid API key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.api_base.as_str().trim_end_matches('/'))
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<Resource<T>, GatewayError> {
        let response = self.client.post(self.endpoint(path)).json(&body).send().await?;
        Self::parse(response).await
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Resource<T>, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrors>(&text)
                .ok()
                .and_then(|e| e.errors.into_iter().next())
                .map_or(text, |e| e.detail);
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl PaymentGateway for PayMongoClient {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, GatewayError> {
        let amount = request
            .amount
            .to_minor_units()
            .filter(|a| *a > 0)
            .ok_or_else(|| GatewayError::InvalidAmount(request.amount.display()))?;

        let body = json!({
            "data": {
                "attributes": {
                    "amount": amount,
                    "currency": request.amount.currency_code.code(),
                    "capture_type": "automatic",
                    "payment_method_allowed": ["gcash", "paymaya", "grab_pay"],
                    "description": request.description,
                    "statement_descriptor": "Bytestall",
                    "metadata": {
                        "order_id": request.order_id.as_str(),
                        "customer_email": request.customer_email.as_str(),
                        "customer_name": request.customer_name,
                        "success_url": request.success_url.as_str(),
                        "cancel_url": request.cancel_url.as_str(),
                    }
                }
            }
        });

        let resource: Resource<IntentAttributes> = self.post("payment_intents", body).await?;
        let client_key = resource
            .attributes
            .client_key
            .ok_or_else(|| GatewayError::Parse("payment intent without client_key".to_owned()))?;

        tracing::info!(intent_id = %resource.id, amount, "Payment intent created");
        Ok(PaymentIntent {
            id: resource.id,
            client_key,
        })
    }

    #[tracing::instrument(skip(self, intent, customer_name, customer_email), fields(intent_id = %intent.id))]
    async fn attach_method(
        &self,
        intent: &PaymentIntent,
        provider: EwalletProvider,
        return_url: &Url,
        customer_name: &str,
        customer_email: &Email,
    ) -> Result<AttachOutcome, GatewayError> {
        let method: Resource<MethodAttributes> = self
            .post(
                "payment_methods",
                json!({
                    "data": {
                        "attributes": {
                            "type": provider.as_str(),
                            "billing": {
                                "name": customer_name,
                                "email": customer_email.as_str(),
                            }
                        }
                    }
                }),
            )
            .await?;

        let attached: Resource<IntentAttributes> = self
            .post(
                &format!("payment_intents/{}/attach", intent.id),
                json!({
                    "data": {
                        "attributes": {
                            "payment_method": method.id,
                            "client_key": intent.client_key,
                            "return_url": return_url.as_str(),
                        }
                    }
                }),
            )
            .await?;

        if attached.attributes.status == "succeeded" {
            return Ok(AttachOutcome::Succeeded);
        }

        let redirect = attached
            .attributes
            .next_action
            .and_then(|action| action.redirect)
            .ok_or_else(|| {
                GatewayError::Parse(format!(
                    "attach returned status {} without a redirect",
                    attached.attributes.status
                ))
            })?;
        let url = Url::parse(&redirect.url).map_err(|e| GatewayError::Parse(e.to_string()))?;
        Ok(AttachOutcome::Redirect(url))
    }

    async fn intent_status(&self, intent_id: &str) -> Result<IntentStatus, GatewayError> {
        let response = self
            .client
            .get(self.endpoint(&format!("payment_intents/{intent_id}")))
            .send()
            .await?;
        let resource: Resource<IntentAttributes> = Self::parse(response).await?;
        Ok(IntentStatus::from_api(&resource.attributes.status))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use secrecy::SecretString;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use bytestall_core::CurrencyCode;

    fn client(server: &MockServer) -> PayMongoClient {
        PayMongoClient::new(&PayMongoConfig {
            secret_key: SecretString::from("sk_test_key"),
            api_base: Url::parse(&format!("{}/v1", server.uri())).unwrap(),
        })
        .unwrap()
    }

    fn request() -> IntentRequest {
        IntentRequest {
            order_id: OrderId::new("ord_1"),
            amount: Price::new(Decimal::new(249_950, 2), CurrencyCode::PHP),
            description: "Order ord_1".to_owned(),
            success_url: Url::parse("https://shop.example/checkout?paymongo=success&orderId=ord_1")
                .unwrap(),
            cancel_url: Url::parse("https://shop.example/checkout?paymongo=cancel&orderId=ord_1")
                .unwrap(),
            customer_email: Email::parse("buyer@example.com").unwrap(),
            customer_name: "Buyer".to_owned(),
        }
    }

    fn intent() -> PaymentIntent {
        PaymentIntent {
            id: "pi_123".to_owned(),
            client_key: "pi_123_client_abc".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_create_intent_sends_centavos_with_basic_auth() {
        let server = MockServer::start().await;
        // base64("sk_test_key:")
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .and(header("authorization", "Basic c2tfdGVzdF9rZXk6"))
            .and(body_partial_json(json!({
                "data": { "attributes": {
                    "amount": 249_950,
                    "currency": "PHP",
                    "metadata": { "order_id": "ord_1" }
                }}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "id": "pi_123", "attributes": {
                    "client_key": "pi_123_client_abc",
                    "status": "awaiting_payment_method"
                }}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = client(&server).create_intent(&request()).await.unwrap();
        assert_eq!(created, intent());
    }

    #[tokio::test]
    async fn test_attach_returns_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_methods"))
            .and(body_partial_json(json!({ "data": { "attributes": { "type": "gcash" }}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "id": "pm_1", "attributes": {} }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents/pi_123/attach"))
            .and(body_partial_json(json!({ "data": { "attributes": {
                "payment_method": "pm_1",
                "client_key": "pi_123_client_abc"
            }}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "id": "pi_123", "attributes": {
                    "status": "awaiting_next_action",
                    "next_action": { "type": "redirect", "redirect": {
                        "url": "https://pm.link/gcash/authorize",
                        "return_url": "https://shop.example/checkout"
                    }}
                }}
            })))
            .mount(&server)
            .await;

        let outcome = client(&server)
            .attach_method(
                &intent(),
                EwalletProvider::Gcash,
                &request().success_url,
                "Buyer",
                &request().customer_email,
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            AttachOutcome::Redirect(Url::parse("https://pm.link/gcash/authorize").unwrap())
        );
    }

    #[tokio::test]
    async fn test_api_error_detail_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "errors": [{ "code": "parameter_below_minimum", "detail": "amount is below 2000" }]
            })))
            .mount(&server)
            .await;

        let err = client(&server).create_intent(&request()).await.unwrap_err();
        match err {
            GatewayError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "amount is below 2000");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_intent_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payment_intents/pi_123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "id": "pi_123", "attributes": { "status": "succeeded" }}
            })))
            .mount(&server)
            .await;

        assert_eq!(
            client(&server).intent_status("pi_123").await.unwrap(),
            IntentStatus::Succeeded
        );
        assert_eq!(IntentStatus::from_api("processing"), IntentStatus::InProgress);
        assert_eq!(IntentStatus::from_api("payment_failed"), IntentStatus::Failed);
    }
}
