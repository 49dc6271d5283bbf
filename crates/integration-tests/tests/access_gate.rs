//! Download gating and operator overrides.
//!
//! Run with: `cargo test -p bytestall-integration-tests --test access_gate`

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use rust_decimal::Decimal;

use bytestall_core::{Order, OrderStatus, ProductId};
use bytestall_integration_tests::{
    MANUAL_METHOD, TestContext, customer, operator, proof_image,
};
use bytestall_storefront::cache::CommerceCache;
use bytestall_storefront::orders::{Actor, OrderError, can_access};
use bytestall_storefront::payments::CheckoutRequest;

async fn submitted_order(ctx: &TestContext, buyer: &str) -> Order {
    let product = ctx.seed_product("starter-kit", Decimal::new(1000, 0)).await;
    let mut cache = CommerceCache::new();
    cache.set_user(Some(customer(buyer)));
    cache.add_to_cart(&product.to_ref(), 1);

    ctx.state
        .checkout()
        .place_order(
            &mut cache,
            CheckoutRequest {
                payment_method: MANUAL_METHOD.to_owned(),
                provider: None,
                proof: Some(proof_image()),
                payment_reference: None,
            },
        )
        .await
        .unwrap()
        .order()
        .clone()
}

#[tokio::test]
async fn test_unverified_order_is_denied() {
    let ctx = TestContext::new().await;
    let order = submitted_order(&ctx, "ana").await;
    assert!(!can_access(&order));

    let err = ctx
        .state
        .access()
        .exercise_access(&order.id, &customer("ana"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrderError::AccessDenied(OrderStatus::PaymentSubmitted)
    ));
}

#[tokio::test]
async fn test_first_access_completes_order_and_later_access_is_stable() {
    let ctx = TestContext::new().await;
    let order = submitted_order(&ctx, "ana").await;
    ctx.state
        .lifecycle()
        .verify(&order.id, &Actor::Operator(operator()))
        .await
        .unwrap();

    let grant = ctx
        .state
        .access()
        .exercise_access(&order.id, &customer("ana"))
        .await
        .unwrap();
    assert_eq!(grant.status, OrderStatus::Completed);
    assert_eq!(grant.downloads.len(), 1);
    assert_eq!(grant.downloads[0].product_id, ProductId::new("starter-kit"));
    assert_eq!(
        grant.downloads[0].drive_link.as_deref(),
        Some("https://drive.test/starter-kit")
    );

    let again = ctx
        .state
        .access()
        .exercise_access(&order.id, &customer("ana"))
        .await
        .unwrap();
    assert_eq!(again, grant);

    let trail = ctx.state.lifecycle().audit_trail(&order.id).await.unwrap();
    let completions = trail
        .iter()
        .filter(|entry| entry.to_status == OrderStatus::Completed)
        .count();
    assert_eq!(completions, 1);
}

#[tokio::test]
async fn test_other_customers_cannot_see_the_order() {
    let ctx = TestContext::new().await;
    let order = submitted_order(&ctx, "ana").await;
    ctx.state
        .lifecycle()
        .verify(&order.id, &Actor::Operator(operator()))
        .await
        .unwrap();

    let err = ctx
        .state
        .access()
        .exercise_access(&order.id, &customer("mallory"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Unauthorized));

    let stored = ctx.state.lifecycle().get(&order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Verified);
}

#[tokio::test]
async fn test_customers_cannot_verify_their_own_orders() {
    let ctx = TestContext::new().await;
    let order = submitted_order(&ctx, "ana").await;

    let err = ctx
        .state
        .lifecycle()
        .verify(&order.id, &Actor::Customer(customer("ana")))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Unauthorized));
}

#[tokio::test]
async fn test_status_override_revokes_access_and_is_audited() {
    let ctx = TestContext::new().await;
    let order = submitted_order(&ctx, "ana").await;
    let lifecycle = ctx.state.lifecycle();
    lifecycle
        .verify(&order.id, &Actor::Operator(operator()))
        .await
        .unwrap();

    let overridden = lifecycle
        .set_status(
            &order.id,
            OrderStatus::Cancelled,
            &operator(),
            Some("chargeback"),
        )
        .await
        .unwrap();
    assert_eq!(overridden.status, OrderStatus::Cancelled);
    assert!(overridden.payment_verified);
    assert!(!can_access(&overridden));

    let err = ctx
        .state
        .access()
        .exercise_access(&order.id, &customer("ana"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::AccessDenied(OrderStatus::Cancelled)));

    let trail = lifecycle.audit_trail(&order.id).await.unwrap();
    let last = trail.last().unwrap();
    assert_eq!(last.from_status, OrderStatus::Verified);
    assert_eq!(last.to_status, OrderStatus::Cancelled);
    assert_eq!(last.reason.as_deref(), Some("chargeback"));
    assert_eq!(last.actor, format!("operator:{}", operator()));
}

#[tokio::test]
async fn test_archived_product_still_delivers_to_buyers() {
    let ctx = TestContext::new().await;
    let order = submitted_order(&ctx, "ana").await;
    ctx.state
        .lifecycle()
        .verify(&order.id, &Actor::Operator(operator()))
        .await
        .unwrap();
    ctx.state
        .catalog()
        .archive(&ProductId::new("starter-kit"))
        .await
        .unwrap();

    assert!(matches!(
        ctx.state
            .catalog()
            .product(&ProductId::new("starter-kit"))
            .await
            .unwrap_err(),
        OrderError::NotFound
    ));

    let grant = ctx
        .state
        .access()
        .exercise_access(&order.id, &customer("ana"))
        .await
        .unwrap();
    assert!(grant.downloads[0].drive_link.is_some());
}
