//! Router-level tests: sessions, extractors, and status codes.
//!
//! Run with: `cargo test -p bytestall-integration-tests --test http_routes`

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tower::ServiceExt;

use bytestall_core::{Identity, OrderStatus, PAYMONGO_SLUG};
use bytestall_integration_tests::{
    MANUAL_METHOD, TestContext, customer, operator,
};
use bytestall_storefront::cache::CommerceCache;
use bytestall_storefront::payments::{CheckoutOutcome, CheckoutRequest};

const SESSION_COOKIE: &str = "bs_session";
const BOUNDARY: &str = "bytestall-test-boundary";

/// A browser stand-in that carries the session cookie between requests.
struct Browser {
    router: Router,
    cookie: Option<String>,
}

impl Browser {
    fn new(ctx: &TestContext) -> Self {
        Self {
            router: ctx.router(),
            cookie: None,
        }
    }

    async fn send(&mut self, mut request: Request<Body>) -> Response {
        if let Some(cookie) = &self.cookie {
            request
                .headers_mut()
                .insert(header::COOKIE, cookie.parse().unwrap());
        }
        let response = self.router.clone().oneshot(request).await.unwrap();
        for value in response.headers().get_all(header::SET_COOKIE) {
            let value = value.to_str().unwrap();
            if let Some(pair) = value.split(';').next()
                && pair.starts_with(SESSION_COOKIE)
            {
                self.cookie = Some(pair.to_owned());
            }
        }
        response
    }

    async fn get(&mut self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post_json(&mut self, uri: &str, body: &Value) -> Response {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn sign_in(&mut self, identity: &Identity) {
        let response = self
            .post_json("/test/sign-in", &serde_json::to_value(identity).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

fn checkout_form(fields: &[(&str, &str)], proof: Option<&[u8]>) -> Body {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(bytes) = proof {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"proof\"; filename=\"receipt.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

fn multipart_post(uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(body)
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoints() {
    let ctx = TestContext::new().await;
    let mut browser = Browser::new(&ctx);

    let response = browser.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    // No database pool in memory mode.
    let response = browser.get("/health/ready").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_response_carries_request_id() {
    let ctx = TestContext::new().await;
    let mut browser = Browser::new(&ctx);

    let response = browser
        .send(
            Request::get("/health")
                .header("x-request-id", "upstream-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "upstream-123"
    );
}

#[tokio::test]
async fn test_cart_persists_across_requests() {
    let ctx = TestContext::new().await;
    ctx.seed_product("starter-kit", Decimal::new(1000, 0)).await;
    ctx.seed_product("icon-pack", Decimal::new(500, 0)).await;
    let mut browser = Browser::new(&ctx);

    let response = browser
        .post_json("/cart/add", &json!({ "productId": "starter-kit", "quantity": 2 }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    browser
        .post_json("/cart/add", &json!({ "productId": "icon-pack" }))
        .await;

    let cart = json_body(browser.get("/cart").await).await;
    assert_eq!(cart["count"], 3);
    assert_eq!(cart["lines"].as_array().unwrap().len(), 2);

    browser
        .post_json("/cart/update", &json!({ "productId": "icon-pack", "quantity": 0 }))
        .await;
    browser
        .post_json("/cart/save-for-later", &json!({ "productId": "starter-kit" }))
        .await;

    let cart = json_body(browser.get("/cart").await).await;
    assert_eq!(cart["count"], 0);
    assert_eq!(cart["savedForLater"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let ctx = TestContext::new().await;
    let mut browser = Browser::new(&ctx);

    let response = browser
        .post_json("/cart/add", &json!({ "productId": "no-such-thing" }))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = browser.get("/products/no-such-thing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_signed_out_order_history_redirects_to_login() {
    let ctx = TestContext::new().await;
    let mut browser = Browser::new(&ctx);

    let response = browser.get("/orders").await;
    assert!(response.status().is_redirection());
    assert_eq!(location(&response), "/auth/login");
}

#[tokio::test]
async fn test_admin_routes_require_an_operator() {
    let ctx = TestContext::new().await;
    let mut browser = Browser::new(&ctx);
    browser.sign_in(&customer("ana")).await;

    let response = browser.get("/admin/orders").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let mut ops = Browser::new(&ctx);
    let mut identity = customer("ops");
    identity.email = operator();
    ops.sign_in(&identity).await;

    let response = ops.get("/admin/orders").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_multipart_checkout_then_operator_verifies() {
    let ctx = TestContext::new().await;
    ctx.seed_product("starter-kit", Decimal::new(1000, 0)).await;

    let mut browser = Browser::new(&ctx);
    browser
        .post_json("/cart/add", &json!({ "productId": "starter-kit" }))
        .await;
    browser.sign_in(&customer("ana")).await;

    let response = browser
        .send(multipart_post(
            "/checkout",
            checkout_form(
                &[
                    ("payment_method", MANUAL_METHOD),
                    ("payment_reference", " 1009 234 5678 "),
                ],
                Some(b"\x89PNG proof"),
            ),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let placed = json_body(response).await;
    assert_eq!(placed["order"]["status"], "payment_submitted");
    assert!(placed.get("redirectUrl").is_none());
    let order_id = placed["order"]["id"].as_str().unwrap().to_owned();

    let cart = json_body(browser.get("/cart").await).await;
    assert_eq!(cart["count"], 0);

    let response = browser
        .send(
            Request::post(format!("/orders/{order_id}/access"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let mut ops = Browser::new(&ctx);
    let mut identity = customer("ops");
    identity.email = operator();
    ops.sign_in(&identity).await;
    let response = ops
        .send(
            Request::post(format!("/admin/orders/{order_id}/verify"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let detail = json_body(ops.get(&format!("/admin/orders/{order_id}")).await).await;
    let admin = &detail["order"]["admin"];
    assert_eq!(admin["paymentReference"], "1009 234 5678");
    assert_eq!(admin["awaitingVerification"], false);

    let response = ops
        .post_json(
            &format!("/admin/orders/{order_id}/reject"),
            &json!({ "reason": "too late" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = browser
        .send(
            Request::post(format!("/orders/{order_id}/access"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let grant = json_body(response).await;
    assert_eq!(grant["status"], "completed");
}

#[tokio::test]
async fn test_checkout_without_proof_is_bad_request() {
    let ctx = TestContext::new().await;
    ctx.seed_product("starter-kit", Decimal::new(1000, 0)).await;
    let mut browser = Browser::new(&ctx);
    browser.sign_in(&customer("ana")).await;
    browser
        .post_json("/cart/add", &json!({ "productId": "starter-kit" }))
        .await;

    let response = browser
        .send(multipart_post(
            "/checkout",
            checkout_form(&[("payment_method", MANUAL_METHOD)], None),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let cart = json_body(browser.get("/cart").await).await;
    assert_eq!(cart["count"], 1);
}

#[tokio::test]
async fn test_continuation_token_resumes_once_and_redirects() {
    let ctx = TestContext::new().await;
    let product = ctx.seed_product("starter-kit", Decimal::new(1000, 0)).await;

    let buyer = customer("ana");
    let mut browser = Browser::new(&ctx);
    browser.sign_in(&buyer).await;
    browser
        .post_json("/cart/add", &json!({ "productId": "starter-kit" }))
        .await;

    // The order is started out of band; the browser only sees the return trip.
    let mut cache = CommerceCache::new();
    cache.set_user(Some(buyer));
    cache.add_to_cart(&product.to_ref(), 1);
    let outcome = ctx
        .state
        .checkout()
        .place_order(
            &mut cache,
            CheckoutRequest {
                payment_method: PAYMONGO_SLUG.to_owned(),
                ..CheckoutRequest::default()
            },
        )
        .await
        .unwrap();
    let CheckoutOutcome::Redirect { order, .. } = outcome else {
        panic!("expected a redirect");
    };

    let return_url = format!("/checkout?paymongo=success&orderId={}&ref=mail", order.id);
    let response = browser.get(&return_url).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/checkout?ref=mail");

    let state = json_body(browser.get("/checkout?ref=mail").await).await;
    assert_eq!(state["step"], "confirmation");
    assert_eq!(state["notice"]["kind"], "success");
    assert_eq!(state["notice"]["orderId"], order.id.to_string());
    assert_eq!(state["cart"]["count"], 0);

    // The notice is shown once.
    let state = json_body(browser.get("/checkout").await).await;
    assert!(state.get("notice").is_none());
    assert_eq!(state["step"], "cart");

    // Replaying the token changes nothing.
    browser
        .post_json("/cart/add", &json!({ "productId": "starter-kit" }))
        .await;
    let response = browser.get(&return_url).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let state = json_body(browser.get("/checkout").await).await;
    assert!(state.get("notice").is_none());
    assert_eq!(state["cart"]["count"], 1);

    let stored = ctx.state.lifecycle().get(&order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Verified);
}

#[tokio::test]
async fn test_unusable_token_is_stripped_with_failure_notice() {
    let ctx = TestContext::new().await;
    let mut browser = Browser::new(&ctx);
    browser.sign_in(&customer("ana")).await;

    let response = browser
        .get("/checkout?paymongo=success&orderId=ord_missing&ref=mail")
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/checkout?ref=mail");

    let state = json_body(browser.get("/checkout?ref=mail").await).await;
    assert_eq!(state["step"], "payment");
    assert_eq!(state["notice"]["kind"], "failed");
    assert_eq!(state["notice"]["orderId"], "ord_missing");
    assert_eq!(ctx.gateway.status_checks(), 0);
}

#[tokio::test]
async fn test_logout_keeps_cart_but_forgets_identity() {
    let ctx = TestContext::new().await;
    ctx.seed_product("starter-kit", Decimal::new(1000, 0)).await;
    let mut browser = Browser::new(&ctx);
    browser.sign_in(&customer("ana")).await;
    browser
        .post_json("/cart/add", &json!({ "productId": "starter-kit" }))
        .await;

    let response = browser
        .send(Request::post("/auth/logout").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let cart = json_body(browser.get("/cart").await).await;
    assert_eq!(cart["count"], 1);
    let response = browser.get("/orders").await;
    assert!(response.status().is_redirection());
}
