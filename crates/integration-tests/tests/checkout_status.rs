//! Integration tests for status lookups and pending-page reconciliation.
//!
//! The pending page's script is emulated here: it requests
//! `/pending/status` with the counts from the previous block until the block
//! stops asking for another poll.

#![allow(clippy::unwrap_used)]

use hosted_checkout_integration_tests::{BROKEN, CONFIRMED, SETTLING, TestContext, data_attr};
use reqwest::StatusCode;
use serde_json::Value;

async fn poll(ctx: &TestContext, checkout_id: &str, auto: &str, manual: &str, trigger: &str) -> String {
    ctx.get(&format!(
        "/pending/status?checkoutId={checkout_id}&auto={auto}&manual={manual}&trigger={trigger}"
    ))
    .await
    .text()
    .await
    .unwrap()
}

#[tokio::test]
async fn test_check_status_proxy() {
    let ctx = TestContext::new().await;

    let response = ctx
        .get(&format!("/api/payment/check-status?checkoutId={CONFIRMED}"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["subscription"]["plan"]["name"], "Pro");

    let response = ctx
        .get(&format!("/api/payment/check-status?checkoutId={BROKEN}"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Failed to check payment status");

    let response = ctx.get("/api/payment/check-status").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(ctx.backend.calls(), 2);
}

#[tokio::test]
async fn test_confirmed_lookups_are_cached() {
    let ctx = TestContext::new().await;

    for _ in 0..3 {
        let response = ctx
            .get(&format!("/api/payment/check-status?checkoutId={CONFIRMED}"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(ctx.backend.calls(), 1);
}

#[tokio::test]
async fn test_pending_loop_runs_until_confirmed() {
    let ctx = TestContext::new().await;

    let page = ctx
        .get(&format!("/pending?checkoutId={SETTLING}"))
        .await
        .text()
        .await
        .unwrap();
    assert_eq!(data_attr(&page, "auto"), Some("0"));
    assert_eq!(data_attr(&page, "next-poll-ms"), Some("30000"));
    assert_eq!(ctx.backend.calls(), 0);

    let (mut auto, mut manual) = ("0".to_string(), "0".to_string());
    let mut block = String::new();
    for _ in 0..5 {
        block = poll(&ctx, SETTLING, &auto, &manual, "auto").await;
        auto = data_attr(&block, "auto").unwrap().to_owned();
        manual = data_attr(&block, "manual").unwrap().to_owned();
        if data_attr(&block, "next-poll-ms").is_none() {
            break;
        }
    }

    assert_eq!(data_attr(&block, "confirmed"), Some("true"));
    assert_eq!(auto, "3");
    assert!(block.contains("Payment Successful!"));
    assert!(block.contains("Pro"));
    assert_eq!(ctx.backend.calls(), 3);
}

#[tokio::test]
async fn test_pending_loop_stops_after_budget() {
    let ctx = TestContext::with_env(&[("POLL_MAX_ATTEMPTS", "2"), ("POLL_INTERVAL_SECS", "5")]).await;

    let first = poll(&ctx, "still-pending", "0", "0", "auto").await;
    assert_eq!(data_attr(&first, "next-poll-ms"), Some("5000"));

    let second = poll(&ctx, "still-pending", "1", "0", "auto").await;
    assert_eq!(data_attr(&second, "auto"), Some("2"));
    assert_eq!(data_attr(&second, "max-auto"), Some("2"));
    assert!(data_attr(&second, "next-poll-ms").is_none());
    assert!(second.contains("Automatic checks have stopped"));

    // A stray automatic poll past the budget does not reach the backend.
    let stray = poll(&ctx, "still-pending", "2", "0", "auto").await;
    assert_eq!(data_attr(&stray, "auto"), Some("2"));
    assert_eq!(ctx.backend.calls(), 2);

    // Manual checks keep working.
    let manual = poll(&ctx, "still-pending", "2", "0", "manual").await;
    assert_eq!(data_attr(&manual, "manual"), Some("1"));
    assert_eq!(ctx.backend.calls(), 3);
}

#[tokio::test]
async fn test_backend_failures_keep_polling() {
    let ctx = TestContext::new().await;

    let block = poll(&ctx, BROKEN, "0", "0", "auto").await;
    assert_eq!(data_attr(&block, "auto"), Some("1"));
    assert_eq!(data_attr(&block, "confirmed"), Some("false"));
    assert_eq!(data_attr(&block, "next-poll-ms"), Some("30000"));
    assert!(block.contains("data-last-error"));
}

#[tokio::test]
async fn test_status_lookups_are_rate_limited() {
    let ctx = TestContext::new().await;

    let mut limited = 0;
    for _ in 0..30 {
        let response = ctx
            .get(&format!("/api/payment/check-status?checkoutId={CONFIRMED}"))
            .await;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            limited += 1;
        }
    }
    assert!(limited > 0);

    // Pages are not behind the limiter.
    assert_eq!(ctx.get("/success").await.status(), StatusCode::OK);
}
