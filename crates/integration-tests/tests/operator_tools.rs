//! Integration tests for the nonce probe, policy audit and reconciliation
//! driver against a live checkout server.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use hosted_checkout::config::BackendConfig;
use hosted_checkout::services::{BackendClient, Reconciler, fetch_page_nonce, probe_page};
use hosted_checkout_core::CheckoutId;
use hosted_checkout_core::policy::{ContentSecurityPolicy, PolicyTemplate};
use hosted_checkout_core::reconcile::ReconcilePolicy;
use hosted_checkout_integration_tests::{SETTLING, TestContext};

fn template() -> PolicyTemplate {
    PolicyTemplate::new("https://eu-test.oppwa.com", "https://code.jquery.com")
}

#[tokio::test]
async fn test_probe_of_payment_page_is_consistent_and_compliant() {
    let ctx = TestContext::new().await;

    let probe = probe_page(&ctx.client, &ctx.url("/?checkoutId=abc123")).await;
    assert!(!probe.nonce.is_empty());
    assert!(probe.is_consistent());

    let policy = ContentSecurityPolicy::parse(probe.policy.as_deref().unwrap());
    let checks = template().audit(&policy);
    assert!(!checks.is_empty());
    assert!(checks.iter().all(|c| c.passed), "{checks:?}");
}

#[tokio::test]
async fn test_probe_of_api_path_finds_no_nonce() {
    let ctx = TestContext::new().await;

    let probe = probe_page(&ctx.client, &ctx.url("/api/test")).await;
    assert!(probe.nonce.is_empty());
    assert!(probe.policy.is_none());
    assert!(!probe.is_consistent());
}

#[tokio::test]
async fn test_each_probe_sees_a_new_nonce() {
    let ctx = TestContext::new().await;

    let first = fetch_page_nonce(&ctx.client, &ctx.url("/success")).await;
    let second = fetch_page_nonce(&ctx.client, &ctx.url("/success")).await;
    assert!(!first.is_empty());
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_unreachable_page_yields_empty_nonce() {
    let client = reqwest::Client::new();
    assert_eq!(fetch_page_nonce(&client, "http://127.0.0.1:9/").await, "");
}

#[tokio::test]
async fn test_reconciler_confirms_against_backend() {
    let ctx = TestContext::new().await;
    let client = BackendClient::new(&BackendConfig {
        base_url: ctx.backend.url.parse().unwrap(),
        status_path: "/payment/hyperpay/status".to_string(),
        timeout: Duration::from_secs(5),
    })
    .unwrap();

    let policy = ReconcilePolicy::new(Duration::from_millis(20), 10);
    let handle = Reconciler::new(client, policy).spawn(CheckoutId::parse(SETTLING).unwrap());

    let last = tokio::time::timeout(Duration::from_secs(5), handle.join())
        .await
        .unwrap();
    assert!(last.is_terminal());
    assert_eq!(last.auto_attempts(), 3);
    assert_eq!(
        last.subscription().map(|s| s.plan_display_name().to_owned()),
        Some("Pro".to_string())
    );
    assert_eq!(ctx.backend.calls(), 3);
}

#[tokio::test]
async fn test_reconciler_manual_check_is_counted_separately() {
    let ctx = TestContext::new().await;
    let client = BackendClient::new(&BackendConfig {
        base_url: ctx.backend.url.parse().unwrap(),
        status_path: "/payment/hyperpay/status".to_string(),
        timeout: Duration::from_secs(5),
    })
    .unwrap();

    let policy = ReconcilePolicy::new(Duration::from_secs(3600), 10);
    let handle = Reconciler::new(client, policy).spawn(CheckoutId::parse("waiting").unwrap());
    let mut updates = handle.subscribe();

    assert!(handle.check_now().await);
    updates.changed().await.unwrap();

    let state = handle.snapshot();
    assert_eq!(state.manual_attempts(), 1);
    assert_eq!(state.auto_attempts(), 0);
    assert!(!state.is_terminal());

    let last = handle.shutdown().await;
    assert_eq!(last.manual_attempts(), 1);
}
