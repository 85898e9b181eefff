//! Pending outcome page and its reconciliation fragment.
//!
//! The page renders the interim state and hands the polling schedule to
//! `pending.js`. Each poll (automatic or manual) requests
//! `/pending/status`, which runs exactly one backend check and returns the
//! re-rendered status block. The attempt counts travel with the request, so
//! the server holds no per-checkout state:
//!
//! ```text
//! GET /pending/status?checkoutId=<id>&auto=<n>&manual=<m>&trigger=auto|manual
//! ```
//!
//! The block carries `data-next-poll-ms` only while automatic polling is
//! still due; once the payment is confirmed or the automatic budget is spent
//! the client stops scheduling.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use hosted_checkout_core::CheckoutId;
use hosted_checkout_core::reconcile::{Reconciliation, Trigger};
use serde::Deserialize;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::CspNonce;
use crate::routes::outcome::present;
use crate::state::AppState;

/// Query parameters of the pending redirect.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingQuery {
    pub checkout_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// Query parameters of a status poll.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub checkout_id: Option<String>,
    #[serde(default)]
    pub auto: u32,
    #[serde(default)]
    pub manual: u32,
    pub trigger: Option<String>,
}

/// Display data for the status block.
#[derive(Debug, Clone)]
pub struct StatusView {
    pub checkout_id: String,
    pub auto_attempts: u32,
    pub manual_attempts: u32,
    pub max_auto_attempts: u32,
    pub interval_secs: u64,
    pub next_poll_ms: Option<u128>,
    pub last_checked: Option<String>,
    pub last_error: Option<String>,
    pub plan_name: Option<String>,
}

impl StatusView {
    /// Build the view for one reconciliation snapshot.
    #[must_use]
    pub fn new(checkout_id: &CheckoutId, reconciliation: &Reconciliation) -> Self {
        Self {
            checkout_id: checkout_id.as_str().to_owned(),
            auto_attempts: reconciliation.auto_attempts(),
            manual_attempts: reconciliation.manual_attempts(),
            max_auto_attempts: reconciliation.max_auto_attempts(),
            interval_secs: reconciliation.policy().interval.as_secs(),
            next_poll_ms: reconciliation.next_auto_delay().map(|d| d.as_millis()),
            last_checked: reconciliation
                .last_checked()
                .map(|t| t.format("%H:%M:%S UTC").to_string()),
            last_error: reconciliation.last_error().map(String::from),
            plan_name: reconciliation
                .subscription()
                .map(|s| s.plan_display_name().to_owned()),
        }
    }

    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        self.plan_name.is_some()
    }
}

/// Pending page template.
#[derive(Template, WebTemplate)]
#[template(path = "pending.html")]
pub struct PendingTemplate {
    pub nonce: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub status: Option<StatusView>,
}

/// Status block fragment.
#[derive(Template, WebTemplate)]
#[template(path = "partials/pending_status.html")]
pub struct PendingStatusTemplate {
    pub status: StatusView,
}

/// Pending page handler.
///
/// Without a checkout reference the page still renders, but nothing polls.
#[instrument(skip(state, nonce))]
pub async fn pending_page(
    State(state): State<AppState>,
    CspNonce(nonce): CspNonce,
    Query(query): Query<PendingQuery>,
) -> Response {
    let checkout_id = CheckoutId::from_query(query.checkout_id.as_deref());
    if checkout_id.is_none() {
        tracing::warn!("Pending page without a checkout reference; status polling disabled");
    }

    let reconciliation = Reconciliation::new(state.reconcile_policy());

    PendingTemplate {
        nonce,
        error_code: present(query.error_code),
        error_message: present(query.error_message),
        status: checkout_id
            .as_ref()
            .map(|id| StatusView::new(id, &reconciliation)),
    }
    .into_response()
}

/// Run one status check and render the updated block.
///
/// Automatic polls past the budget are answered without calling the backend.
/// Backend failures are counted and shown, never returned as errors.
///
/// # Errors
///
/// Returns `AppError::BadRequest` without a valid checkout reference.
#[instrument(skip(state), fields(checkout_id = ?query.checkout_id))]
pub async fn status_fragment(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Response> {
    let checkout_id = CheckoutId::from_query(query.checkout_id.as_deref())
        .ok_or_else(|| AppError::BadRequest("Checkout ID is required".to_string()))?;
    let trigger = Trigger::from_query(query.trigger.as_deref());

    let mut reconciliation =
        Reconciliation::resume(state.reconcile_policy(), query.auto, query.manual);

    if trigger == Trigger::Auto && !reconciliation.should_auto_poll() {
        tracing::debug!(
            auto = reconciliation.auto_attempts(),
            "Automatic poll after the budget was spent; skipping backend"
        );
    } else {
        let outcome = state.backend().check(&checkout_id).await;
        reconciliation.record(trigger, outcome, Utc::now());
    }

    Ok(PendingStatusTemplate {
        status: StatusView::new(&checkout_id, &reconciliation),
    }
    .into_response())
}
