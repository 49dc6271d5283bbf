//! Manual proof checkout, end to end through the service layer.
//!
//! Run with: `cargo test -p bytestall-integration-tests --test checkout_flow`

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use rust_decimal::Decimal;

use bytestall_core::{OrderStatus, ProductId};
use bytestall_integration_tests::{
    MANUAL_METHOD, TestContext, customer, operator, proof_image,
};
use bytestall_storefront::cache::CommerceCache;
use bytestall_storefront::orders::{Actor, OrderError};
use bytestall_storefront::payments::{CheckoutError, CheckoutOutcome, CheckoutRequest};

fn manual_request() -> CheckoutRequest {
    CheckoutRequest {
        payment_method: MANUAL_METHOD.to_owned(),
        provider: None,
        proof: Some(proof_image()),
        payment_reference: Some("1009 234 5678".to_owned()),
    }
}

#[tokio::test]
async fn test_manual_checkout_submits_order_and_clears_cart() {
    let ctx = TestContext::new().await;
    let starter = ctx.seed_product("starter-kit", Decimal::new(1000, 0)).await;
    let icons = ctx.seed_product("icon-pack", Decimal::new(500, 0)).await;

    let mut cache = CommerceCache::new();
    cache.set_user(Some(customer("ana")));
    cache.add_to_cart(&starter.to_ref(), 2);
    cache.add_to_cart(&icons.to_ref(), 1);
    assert_eq!(cache.cart_total(), Decimal::new(2500, 0));

    let outcome = ctx
        .state
        .checkout()
        .place_order(&mut cache, manual_request())
        .await
        .unwrap();

    let CheckoutOutcome::Submitted(order) = outcome else {
        panic!("manual checkout should submit for review");
    };
    assert_eq!(order.status, OrderStatus::PaymentSubmitted);
    assert_eq!(order.total, Decimal::new(2500, 0));
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.payment_method, MANUAL_METHOD);
    assert_eq!(order.payment_proof_ref.as_deref(), Some("image-proof-1"));
    assert_eq!(order.payment_reference.as_deref(), Some("1009 234 5678"));
    assert!(!order.payment_verified);
    assert!(!order.access_granted);
    assert!(cache.cart().is_empty());
    assert_eq!(ctx.uploader.upload_count(), 1);

    ctx.queue.flush().await;
    let admin = ctx.notifier.admin_notices();
    assert_eq!(admin.len(), 1);
    assert_eq!(admin[0].order_id, order.id.to_string());
    assert_eq!(ctx.notifier.customer_notices().len(), 1);
}

#[tokio::test]
async fn test_order_lines_keep_purchase_price_after_catalog_change() {
    let ctx = TestContext::new().await;
    let product = ctx.seed_product("starter-kit", Decimal::new(1000, 0)).await;

    let mut cache = CommerceCache::new();
    cache.set_user(Some(customer("ana")));
    cache.add_to_cart(&product.to_ref(), 1);
    let order = ctx
        .state
        .checkout()
        .place_order(&mut cache, manual_request())
        .await
        .unwrap()
        .order()
        .clone();

    ctx.seed_product("starter-kit", Decimal::new(4000, 0)).await;

    let stored = ctx.state.lifecycle().get(&order.id).await.unwrap();
    assert_eq!(stored.items[0].unit_price_at_purchase, Decimal::new(1000, 0));
    assert_eq!(stored.total, Decimal::new(1000, 0));
}

#[tokio::test]
async fn test_upload_failure_creates_no_order_and_keeps_cart() {
    let ctx = TestContext::new().await;
    let product = ctx.seed_product("starter-kit", Decimal::new(1000, 0)).await;
    ctx.uploader.set_failing(true);

    let buyer = customer("ana");
    let mut cache = CommerceCache::new();
    cache.set_user(Some(buyer.clone()));
    cache.add_to_cart(&product.to_ref(), 1);

    let err = ctx
        .state
        .checkout()
        .place_order(&mut cache, manual_request())
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Upload(_)));
    assert_eq!(cache.cart().len(), 1);
    let orders = ctx.state.lifecycle().list_for_customer(&buyer).await.unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn test_checkout_requires_sign_in_proof_and_items() {
    let ctx = TestContext::new().await;
    let product = ctx.seed_product("starter-kit", Decimal::new(1000, 0)).await;

    let mut anonymous = CommerceCache::new();
    anonymous.add_to_cart(&product.to_ref(), 1);
    let err = ctx
        .state
        .checkout()
        .place_order(&mut anonymous, manual_request())
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Order(OrderError::Validation(_))));

    let mut empty = CommerceCache::new();
    empty.set_user(Some(customer("ana")));
    let err = ctx
        .state
        .checkout()
        .place_order(&mut empty, manual_request())
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Order(OrderError::Validation(_))));

    let mut no_proof = CommerceCache::new();
    no_proof.set_user(Some(customer("ana")));
    no_proof.add_to_cart(&product.to_ref(), 1);
    let request = CheckoutRequest {
        proof: None,
        ..manual_request()
    };
    let err = ctx
        .state
        .checkout()
        .place_order(&mut no_proof, request)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Order(OrderError::Validation(_))));
    assert_eq!(no_proof.cart().len(), 1);
    assert_eq!(ctx.uploader.upload_count(), 0);
}

#[tokio::test]
async fn test_unknown_payment_method_is_rejected() {
    let ctx = TestContext::new().await;
    let product = ctx.seed_product("starter-kit", Decimal::new(1000, 0)).await;

    let mut cache = CommerceCache::new();
    cache.set_user(Some(customer("ana")));
    cache.add_to_cart(&product.to_ref(), 1);

    let request = CheckoutRequest {
        payment_method: "bank-of-nowhere".to_owned(),
        ..manual_request()
    };
    let err = ctx
        .state
        .checkout()
        .place_order(&mut cache, request)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Order(OrderError::Validation(_))));
}

#[tokio::test]
async fn test_operator_verify_then_reject_conflicts() {
    let ctx = TestContext::new().await;
    let product = ctx.seed_product("starter-kit", Decimal::new(1000, 0)).await;

    let mut cache = CommerceCache::new();
    cache.set_user(Some(customer("ana")));
    cache.add_to_cart(&product.to_ref(), 1);
    let order = ctx
        .state
        .checkout()
        .place_order(&mut cache, manual_request())
        .await
        .unwrap()
        .order()
        .clone();

    let lifecycle = ctx.state.lifecycle();
    let verified = lifecycle
        .verify(&order.id, &Actor::Operator(operator()))
        .await
        .unwrap();
    assert_eq!(verified.status, OrderStatus::Verified);
    assert!(verified.payment_verified);
    assert!(verified.access_granted);
    assert_eq!(
        verified.payment_verified_by.as_deref(),
        Some(operator().as_str())
    );

    let err = lifecycle
        .reject(&order.id, &operator(), "duplicate receipt")
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::InvalidTransition(_)));

    let err = lifecycle
        .verify(&order.id, &Actor::Operator(operator()))
        .await
        .unwrap_err();
    assert!(err.is_already(OrderStatus::Verified));

    let trail = lifecycle.audit_trail(&order.id).await.unwrap();
    assert!(
        trail
            .iter()
            .any(|entry| entry.to_status == OrderStatus::Verified)
    );
}

#[tokio::test]
async fn test_rejected_order_cannot_be_verified_and_can_be_deleted() {
    let ctx = TestContext::new().await;
    let product = ctx.seed_product("starter-kit", Decimal::new(1000, 0)).await;

    let mut cache = CommerceCache::new();
    cache.set_user(Some(customer("ana")));
    cache.add_to_cart(&product.to_ref(), 1);
    let order = ctx
        .state
        .checkout()
        .place_order(&mut cache, manual_request())
        .await
        .unwrap()
        .order()
        .clone();

    let lifecycle = ctx.state.lifecycle();
    let err = lifecycle.reject(&order.id, &operator(), "   ").await.unwrap_err();
    assert!(matches!(err, OrderError::Validation(_)));

    let rejected = lifecycle
        .reject(&order.id, &operator(), "receipt amount does not match")
        .await
        .unwrap();
    assert_eq!(rejected.status, OrderStatus::Cancelled);
    assert_eq!(
        rejected.notes.as_deref(),
        Some("receipt amount does not match")
    );

    let err = lifecycle
        .verify(&order.id, &Actor::Operator(operator()))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::InvalidTransition(_)));

    // The product is still referenced until the order is gone.
    let err = ctx
        .state
        .catalog()
        .hard_delete(&ProductId::new("starter-kit"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Consistency(_)));

    lifecycle.delete(&order.id, &operator()).await.unwrap();
    assert!(matches!(
        lifecycle.get(&order.id).await.unwrap_err(),
        OrderError::NotFound
    ));
    ctx.state
        .catalog()
        .hard_delete(&ProductId::new("starter-kit"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_notification_failure_does_not_fail_checkout() {
    let ctx = TestContext::new().await;
    let product = ctx.seed_product("starter-kit", Decimal::new(1000, 0)).await;
    ctx.notifier.set_failing(true);

    let mut cache = CommerceCache::new();
    cache.set_user(Some(customer("ana")));
    cache.add_to_cart(&product.to_ref(), 1);
    let outcome = ctx
        .state
        .checkout()
        .place_order(&mut cache, manual_request())
        .await;
    assert!(outcome.is_ok());

    ctx.queue.flush().await;
    let stats = ctx.queue.stats();
    assert_eq!(stats.failed, 2);
    assert!(ctx.notifier.admin_notices().is_empty());
}
