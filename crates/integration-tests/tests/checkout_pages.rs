//! Integration tests for the policy headers and nonce tagging of served
//! pages.
//!
//! Run with: cargo test -p hosted-checkout-integration-tests

#![allow(clippy::unwrap_used)]

use std::collections::HashSet;

use hosted_checkout_core::policy::ContentSecurityPolicy;
use hosted_checkout_integration_tests::{TestContext, data_attr};
use reqwest::StatusCode;
use reqwest::header::{CACHE_CONTROL, CONTENT_SECURITY_POLICY, CONTENT_TYPE};

const NONCE_HEADER: &str = "x-csp-nonce";

fn header(response: &reqwest::Response, name: impl reqwest::header::AsHeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .map(|v| v.to_str().unwrap().to_owned())
}

#[tokio::test]
async fn test_every_payment_surface_tags_its_scripts() {
    let ctx = TestContext::new().await;

    for path in [
        "/?checkoutId=8ac7a4a28f1c2d3e",
        "/success?transactionId=tx-1&amount=10.5",
        "/failure?errorCode=800.100.151&errorMessage=invalid%20card",
        "/pending?checkoutId=8ac7a4a28f1c2d3e",
    ] {
        let response = ctx.get(path).await;
        assert_eq!(response.status(), StatusCode::OK, "{path}");

        let nonce = header(&response, NONCE_HEADER).unwrap();
        let policy = ContentSecurityPolicy::parse(&header(&response, CONTENT_SECURITY_POLICY).unwrap());
        assert_eq!(policy.script_nonce(), Some(nonce.as_str()), "{path}");
        assert_eq!(policy.count("script-src"), 1, "{path}");

        let body = response.text().await.unwrap();
        let scripts = body.matches("<script").count();
        assert!(scripts > 0, "{path}");
        assert_eq!(
            body.matches(&format!("nonce=\"{nonce}\"")).count(),
            scripts,
            "{path}"
        );
    }
}

#[tokio::test]
async fn test_nonce_is_fresh_per_response() {
    let ctx = TestContext::new().await;

    let mut seen = HashSet::new();
    for _ in 0..5 {
        let response = ctx.get("/success").await;
        seen.insert(header(&response, NONCE_HEADER).unwrap());
    }
    assert_eq!(seen.len(), 5);
}

#[tokio::test]
async fn test_inbound_nonce_header_is_ignored() {
    let ctx = TestContext::new().await;

    let response = ctx
        .client
        .get(ctx.url("/success"))
        .header(NONCE_HEADER, "attacker")
        .send()
        .await
        .unwrap();

    let nonce = header(&response, NONCE_HEADER).unwrap();
    assert_ne!(nonce, "attacker");
    assert!(!response.text().await.unwrap().contains("attacker"));
}

#[tokio::test]
async fn test_payment_page_loads_widget_in_order() {
    let ctx = TestContext::new().await;

    let body = ctx
        .get("/?checkoutId=8ac7a4a28f1c2d3e")
        .await
        .text()
        .await
        .unwrap();

    assert_eq!(data_attr(&body, "nonce-source"), Some("server"));
    assert_eq!(data_attr(&body, "checkout-id"), Some("8ac7a4a28f1c2d3e"));

    let manifest = body.find("id=\"widget-manifest\"").unwrap();
    let loader = body.find("<script src=\"/static/js/widget-loader.js\"").unwrap();
    let dependency = body
        .find("<script src=\"https://code.jquery.com/jquery.js\"")
        .unwrap();
    assert!(manifest < loader);
    assert!(loader < dependency);
    assert!(body.contains("paymentWidgets.js?checkoutId=8ac7a4a28f1c2d3e"));
    assert!(body.contains("action=\"/pending?checkoutId=8ac7a4a28f1c2d3e\""));
}

#[tokio::test]
async fn test_payment_page_without_checkout_loads_nothing() {
    let ctx = TestContext::new().await;

    let response = ctx.get("/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("Missing checkout ID"));
    assert_eq!(data_attr(&body, "widget-state"), Some("error"));
    assert!(body.contains("data-load-error>missing checkout reference<"));
    assert!(!body.contains("paymentWidgets.js"));
    assert!(!body.contains("widget-loader.js"));
}

#[tokio::test]
async fn test_non_payment_paths_have_no_policy() {
    let ctx = TestContext::new().await;

    for path in [
        "/api/test",
        "/api/csp-test",
        "/static/css/main.css",
        "/static/js/pending.js",
    ] {
        let response = ctx.get(path).await;
        assert_eq!(response.status(), StatusCode::OK, "{path}");
        assert!(header(&response, CONTENT_SECURITY_POLICY).is_none(), "{path}");
        assert!(header(&response, NONCE_HEADER).is_none(), "{path}");
    }
}

#[tokio::test]
async fn test_health_is_a_policy_surface() {
    let ctx = TestContext::new().await;

    let response = ctx.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header(&response, CONTENT_SECURITY_POLICY).is_some());
    assert!(header(&response, NONCE_HEADER).is_some());
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_well_known_artifacts() {
    let ctx = TestContext::new().await;
    std::fs::write(
        ctx.well_known_dir
            .join("apple-developer-merchantid-domain-association.txt"),
        "7b2270737022",
    )
    .unwrap();

    let response = ctx
        .get("/.well-known/apple-developer-merchantid-domain-association.txt")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, CONTENT_TYPE).as_deref(), Some("text/plain"));
    assert_eq!(
        header(&response, CACHE_CONTROL).as_deref(),
        Some("public, max-age=86400")
    );
    assert_eq!(response.text().await.unwrap(), "7b2270737022");

    let report: serde_json::Value = ctx
        .get("/api/apple-pay-domain-test")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(report["success"], true);
    assert_eq!(report["contentLength"], 12);
}

#[tokio::test]
async fn test_well_known_missing_file() {
    let ctx = TestContext::new().await;

    let response = ctx.get("/.well-known/missing.txt").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        header(&response, CACHE_CONTROL).as_deref(),
        Some("no-store, max-age=0")
    );

    let response = ctx.get("/api/apple-pay-domain-test").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_diagnostics_page_audits_itself() {
    let ctx = TestContext::new().await;

    let response = ctx.get("/csp-test").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header(&response, CONTENT_SECURITY_POLICY).is_some());

    let body = response.text().await.unwrap();
    assert!(body.contains("data-passed=\"true\""));
    assert!(!body.contains("data-passed=\"false\""));
}
