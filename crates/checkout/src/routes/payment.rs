//! Payment page.
//!
//! Renders the hosted widget for a checkout. The loader runs once on the
//! server to settle the initial state and emit the dependency script; the
//! rest of the sequence continues in `widget-loader.js`, driven by the
//! manifest embedded in the page.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, header::ACCEPT_LANGUAGE},
    response::{IntoResponse, Response},
};
use hosted_checkout_core::widget::{
    LoadState, Locale, RecordingHost, ScriptElement, WidgetLoader,
    callbacks::MADA_BRAND,
};
use hosted_checkout_core::{CheckoutId, resolve_nonce};
use serde::Deserialize;
use tracing::instrument;

use crate::error::add_breadcrumb;
use crate::filters;
use crate::middleware::server_nonce;
use crate::state::AppState;

/// Query parameters accepted by the payment page.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentQuery {
    pub checkout_id: Option<String>,
    pub brand: Option<String>,
    pub integrity: Option<String>,
}

/// An external script rendered directly into the page.
#[derive(Debug, Clone)]
pub struct ScriptTag {
    pub kind: &'static str,
    pub src: String,
    pub nonce: String,
}

impl ScriptTag {
    fn from_element(element: &ScriptElement) -> Option<Self> {
        Some(Self {
            kind: element.kind.as_str(),
            src: element.src.clone()?,
            nonce: element.nonce.clone(),
        })
    }
}

/// Payment page template.
#[derive(Template, WebTemplate)]
#[template(path = "payment.html")]
pub struct PaymentTemplate {
    pub nonce: String,
    pub nonce_source: &'static str,
    pub checkout_id: Option<String>,
    pub brands: String,
    pub is_mada: bool,
    pub locale: &'static str,
    pub load_state: &'static str,
    pub error: Option<String>,
    pub dependency: Option<ScriptTag>,
    pub manifest_json: String,
}

/// Serialize the loader manifest for embedding in a JSON script block.
fn manifest_json(elements: &[ScriptElement]) -> String {
    serde_json::to_string(elements)
        .unwrap_or_else(|_| "[]".to_string())
        .replace('<', "\\u003c")
}

/// Payment page handler.
#[instrument(skip(state, headers), fields(checkout_id = tracing::field::Empty))]
pub async fn payment_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PaymentQuery>,
) -> Response {
    let checkout_id = CheckoutId::from_query(query.checkout_id.as_deref());
    if let Some(id) = &checkout_id {
        tracing::Span::current().record("checkout_id", id.as_str());
    }

    let resolved = resolve_nonce(server_nonce(&headers), "");
    let locale = Locale::from_accept_language(
        headers.get(ACCEPT_LANGUAGE).and_then(|v| v.to_str().ok()),
    );

    let mut loader = WidgetLoader::new(state.widget().clone(), checkout_id, resolved.nonce)
        .with_integrity(query.integrity)
        .with_locale(locale);
    let mut host = RecordingHost::new();
    loader.start(&mut host);

    if let LoadState::Error(reason) = loader.state() {
        tracing::warn!(reason = %reason, "Payment page rendered without a widget");
    } else if let Some(id) = loader.checkout_id() {
        add_breadcrumb(
            "checkout",
            "Rendered payment page",
            Some(&[("checkout_id", id.as_str())]),
        );
    }

    let brands = query
        .brand
        .filter(|b| !b.trim().is_empty())
        .unwrap_or_else(|| MADA_BRAND.to_string());

    let dependency = host.attached().find_map(ScriptTag::from_element);

    PaymentTemplate {
        nonce: loader.nonce().value().to_owned(),
        nonce_source: resolved.source.as_str(),
        checkout_id: loader.checkout_id().map(|id| id.as_str().to_owned()),
        is_mada: brands.split_whitespace().any(|b| b == MADA_BRAND),
        brands,
        locale: loader.locale().as_str(),
        load_state: loader.state().as_str(),
        error: loader.state().error().map(ToString::to_string),
        dependency,
        manifest_json: manifest_json(&loader.manifest()),
    }
    .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::StatusCode;
    use hosted_checkout_core::widget::{ScriptKind, WidgetConfig};
    use hosted_checkout_core::{Nonce, message::Origin};

    use super::*;
    use crate::middleware::NONCE_HEADER;
    use crate::routes::test_support::{body_string, get, offline_app};

    #[tokio::test]
    async fn test_renders_loading_dependency_with_checkout() {
        let response = get(offline_app(), "/?checkoutId=abc123").await;
        assert_eq!(response.status(), StatusCode::OK);

        let nonce = response.headers().get(NONCE_HEADER).unwrap().to_str().unwrap().to_owned();
        let body = body_string(response).await;

        assert!(body.contains("data-widget-state=\"loading-dependency\""));
        assert!(body.contains("data-nonce-source=\"server\""));
        assert!(body.contains("Complete Your Payment"));
        assert!(body.contains(&format!(
            "<script src=\"https://code.jquery.com/jquery.js\" nonce=\"{nonce}\""
        )));
        assert!(body.contains("paymentWidgets.js?checkoutId=abc123"));
        assert!(body.contains("class=\"paymentWidgets\" data-brands=\"MADA\""));
    }

    #[tokio::test]
    async fn test_missing_checkout_renders_error_without_scripts() {
        let response = get(offline_app(), "/").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_string(response).await;
        assert!(body.contains("data-widget-state=\"error\""));
        assert!(body.contains("Payment Error"));
        assert!(body.contains("Missing checkout ID"));
        assert!(body.contains("<p class=\"muted\" data-load-error>missing checkout reference</p>"));
        assert!(!body.contains("code.jquery.com"));
        assert!(!body.contains("paymentWidgets.js"));
    }

    #[tokio::test]
    async fn test_brand_override() {
        let body = body_string(get(offline_app(), "/?checkoutId=abc123&brand=VISA%20MASTER").await).await;
        assert!(body.contains("data-brands=\"VISA MASTER\""));
        assert!(!body.contains("MADA Debit Card"));
    }

    #[test]
    fn test_manifest_json_escapes_markup() {
        let config = WidgetConfig {
            widget_origin: "https://eu-test.oppwa.com".to_string(),
            dependency_src: "https://code.jquery.com/jquery.js".to_string(),
            parent_origin: Origin::parse("https://pay.example.com").unwrap(),
            payment_target: "_top".to_string(),
        };
        let loader = WidgetLoader::new(
            config,
            CheckoutId::parse("abc123").ok(),
            Nonce::from_value("n0nce").unwrap(),
        )
        .with_integrity(Some("sha384-abc".to_string()));

        let json = manifest_json(&loader.manifest());
        assert!(!json.contains('<'));

        let parsed: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[1]["kind"], ScriptKind::Config.as_str());
        assert_eq!(parsed[2]["integrity"], "sha384-abc");
        assert_eq!(parsed[2]["crossOrigin"], "anonymous");
    }
}
