//! Backend status commands.
//!
//! # Usage
//!
//! ```bash
//! # One lookup, printed as JSON
//! hc-cli status 8ac7a4a28f1c2d3e
//!
//! # Poll until confirmed; press Enter for an immediate check
//! hc-cli watch 8ac7a4a28f1c2d3e
//! ```
//!
//! # Environment Variables
//!
//! - `BACKEND_URL` - Payment backend base URL
//! - `BACKEND_STATUS_PATH` - Status lookup path
//! - `POLL_INTERVAL_SECS` / `POLL_MAX_ATTEMPTS` - Watch schedule

use std::time::Duration;

use hosted_checkout::config::BackendConfig;
use hosted_checkout::services::{BackendClient, BackendError, Reconciler};
use hosted_checkout_core::reconcile::{ReconcilePolicy, Reconciliation};
use hosted_checkout_core::{CheckoutId, CheckoutIdError};
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Errors from the status commands.
#[derive(Debug, Error)]
pub enum StatusError {
    /// The checkout reference is malformed.
    #[error("Invalid checkout ID: {0}")]
    InvalidCheckout(#[from] CheckoutIdError),

    /// The backend could not be reached or answered with an error.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// The watch schedule is unusable.
    #[error("Invalid poll schedule: {0}")]
    InvalidSchedule(&'static str),

    /// Output could not be serialized.
    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

/// Final state of a watched checkout.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WatchReport {
    pub checkout_id: String,
    pub confirmed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    pub auto_attempts: u32,
    pub manual_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl WatchReport {
    fn new(checkout_id: &CheckoutId, state: &Reconciliation) -> Self {
        Self {
            checkout_id: checkout_id.as_str().to_owned(),
            confirmed: state.is_terminal(),
            plan: state
                .subscription()
                .map(|s| s.plan_display_name().to_owned()),
            auto_attempts: state.auto_attempts(),
            manual_attempts: state.manual_attempts(),
            last_error: state.last_error().map(str::to_owned),
        }
    }
}

/// Build the watch schedule from command-line values.
///
/// # Errors
///
/// Returns `StatusError::InvalidSchedule` for a zero interval.
pub const fn watch_policy(interval_secs: u64, max_attempts: u32) -> Result<ReconcilePolicy, StatusError> {
    if interval_secs == 0 {
        return Err(StatusError::InvalidSchedule("interval must be greater than zero"));
    }
    Ok(ReconcilePolicy::new(
        Duration::from_secs(interval_secs),
        max_attempts,
    ))
}

/// Look up a checkout's status once and print the backend's answer.
///
/// # Errors
///
/// Returns an error if the checkout reference is invalid or the lookup fails.
pub async fn once(config: &BackendConfig, checkout_id: &str) -> Result<(), StatusError> {
    let checkout_id = CheckoutId::parse(checkout_id)?;
    let client = BackendClient::new(config)?;

    info!(url = %client.status_url(&checkout_id), "Checking status");
    let payload = client.check_status(&checkout_id).await?;

    match payload.subscription() {
        Some(subscription) => info!(
            plan = subscription.plan_display_name(),
            "Payment confirmed"
        ),
        None => info!("Payment still pending"),
    }

    emit(&serde_json::to_string_pretty(payload.as_json())?);
    Ok(())
}

/// Reconcile a checkout until it is confirmed, the operator interrupts, or
/// the automatic budget runs out and stdin closes.
///
/// Each line on stdin requests an immediate check.
///
/// # Errors
///
/// Returns an error if the checkout reference is invalid or the backend
/// client cannot be built. Failed checks are counted, not returned.
pub async fn watch(
    config: &BackendConfig,
    checkout_id: &str,
    policy: ReconcilePolicy,
) -> Result<(), StatusError> {
    let checkout_id = CheckoutId::parse(checkout_id)?;
    let client = BackendClient::new(config)?;

    let handle = Reconciler::new(client, policy).spawn(checkout_id.clone());
    let mut updates = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    info!(
        checkout_id = %checkout_id,
        interval_secs = policy.interval.as_secs(),
        max_attempts = policy.max_auto_attempts,
        "Watching checkout (Enter to check now, Ctrl+C to stop)"
    );

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                report_progress(&state);
                if state.is_terminal() {
                    break;
                }
                if !state.should_auto_poll() && !stdin_open {
                    warn!("Automatic checks exhausted and stdin closed; stopping");
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(_)) => {
                    if !handle.check_now().await {
                        break;
                    }
                }
                Ok(None) | Err(_) => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    let last = handle.shutdown().await;
    emit(&serde_json::to_string_pretty(&WatchReport::new(
        &checkout_id,
        &last,
    ))?);
    Ok(())
}

fn report_progress(state: &Reconciliation) {
    if let Some(subscription) = state.subscription() {
        info!(plan = subscription.plan_display_name(), "Payment confirmed");
    } else if let Some(error) = state.last_error() {
        warn!(
            auto = state.auto_attempts(),
            manual = state.manual_attempts(),
            error,
            "Status check failed"
        );
    } else {
        info!(
            auto = state.auto_attempts(),
            max = state.max_auto_attempts(),
            manual = state.manual_attempts(),
            "Still pending"
        );
    }
}

#[allow(clippy::print_stdout)]
fn emit(output: &str) {
    println!("{output}");
}
