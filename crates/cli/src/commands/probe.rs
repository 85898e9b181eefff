//! Nonce and policy probes against a deployed page.
//!
//! Each probe is a fresh `HEAD` request, so the nonce printed belongs to the
//! probe response only. What matters is that one is present and that the
//! carrier header and the policy agree.

use hosted_checkout::services::{NonceProbe, fetch_page_nonce, probe_page};
use hosted_checkout_core::message::Origin;
use hosted_checkout_core::policy::{ComplianceCheck, ContentSecurityPolicy, PolicyTemplate};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

/// Errors from the probe commands.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// An expected origin could not be derived.
    #[error("Invalid origin {0}: {1}")]
    Origin(String, String),

    /// The page is missing its nonce or policy, or they disagree.
    #[error("Page failed {0} of {1} policy checks")]
    Failed(usize, usize),

    /// Output could not be serialized.
    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

/// Result of probing one page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub url: String,
    #[serde(flatten)]
    pub probe: NonceProbe,
    pub consistent: bool,
    pub checks: Vec<ComplianceCheck>,
}

impl ProbeReport {
    /// Audit a probe against the template the page should be served with.
    #[must_use]
    pub fn new(url: &Url, probe: NonceProbe, template: &PolicyTemplate) -> Self {
        let checks = probe
            .policy
            .as_deref()
            .map(|header| template.audit(&ContentSecurityPolicy::parse(header)))
            .unwrap_or_default();
        Self {
            url: url.to_string(),
            consistent: probe.is_consistent(),
            probe,
            checks,
        }
    }

    /// Number of failed checks, counting a missing or mismatched nonce.
    #[must_use]
    pub fn failures(&self) -> usize {
        let failed = self.checks.iter().filter(|c| !c.passed).count();
        failed + usize::from(!self.consistent)
    }

    fn total(&self) -> usize {
        self.checks.len() + 1
    }
}

fn origin(url: &Url) -> Result<Origin, ProbeError> {
    Origin::parse(url.as_str()).map_err(|e| ProbeError::Origin(url.to_string(), e.to_string()))
}

fn client() -> Result<reqwest::Client, ProbeError> {
    Ok(reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?)
}

/// Probe a page and audit the policy it is served with.
///
/// # Errors
///
/// Returns `ProbeError::Failed` when any check fails, after printing the
/// full report.
pub async fn audit(url: &Url, widget_origin: &Url, dependency_url: &Url) -> Result<(), ProbeError> {
    let template = PolicyTemplate::new(
        origin(widget_origin)?.as_str(),
        origin(dependency_url)?.as_str(),
    );

    let probe = probe_page(&client()?, url.as_str()).await;
    let report = ProbeReport::new(url, probe, &template);

    for check in &report.checks {
        if check.passed {
            info!(check = check.name, "Passed");
        } else {
            warn!(check = check.name, expected = %check.expected, "Failed");
        }
    }
    if !report.consistent {
        warn!("Nonce header missing or does not match the policy");
    }

    emit(&serde_json::to_string_pretty(&report)?);

    match report.failures() {
        0 => Ok(()),
        n => Err(ProbeError::Failed(n, report.total())),
    }
}

/// Print the nonce a page is served with, or nothing when it has none.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub async fn nonce(url: &Url) -> Result<(), ProbeError> {
    let nonce = fetch_page_nonce(&client()?, url.as_str()).await;
    if nonce.is_empty() {
        warn!(%url, "No nonce found in response headers");
    }
    emit(&nonce);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn emit(output: &str) {
    println!("{output}");
}
