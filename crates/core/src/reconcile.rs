//! Reconciliation of a pending payment against the backend.
//!
//! A redirect that lands on the pending page only means the payment provider
//! has not settled yet. The backend is the authority: the front end asks it
//! for the checkout status on a timer and on demand, and stops as soon as
//! the answer carries an active subscription.
//!
//! This module holds the bookkeeping only. Timers and HTTP live in the
//! checkout crate's `Reconciler` driver, which feeds results into
//! [`Reconciliation::record`].
//!
//! # Rules
//!
//! - Automatic checks run every [`ReconcilePolicy::interval`] until the
//!   payment is confirmed or [`ReconcilePolicy::max_auto_attempts`] checks
//!   have been made.
//! - Manual checks are always allowed, are counted separately, and never
//!   consume the automatic budget.
//! - A failed check is not terminal. It is counted and the payment stays
//!   pending.
//! - Once confirmed, further results are ignored.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;

use crate::types::{StatusPayload, Subscription};

/// Default delay between automatic checks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of automatic checks before the loop gives up.
pub const DEFAULT_MAX_AUTO_ATTEMPTS: u32 = 10;

/// What caused a status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Scheduled by the poll timer.
    Auto,
    /// Requested by the customer.
    Manual,
}

impl Trigger {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }

    /// Parse the query-string form. Anything other than `manual` is `auto`.
    #[must_use]
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("manual") => Self::Manual,
            _ => Self::Auto,
        }
    }
}

/// Result of one status check.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// The backend answered with a body.
    Payload(StatusPayload),
    /// The check failed (transport error, non-2xx, unparseable body).
    Failed(String),
}

/// How the delay between automatic checks grows.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Backoff {
    /// Every check waits exactly the base interval.
    #[default]
    Fixed,
    /// The interval doubles after each automatic check, capped at `max`.
    ///
    /// `jitter` in `0.0..=1.0` shortens each delay by a random fraction of
    /// at most that much.
    Exponential { max: Duration, jitter: f64 },
}

/// Timing and budget of the reconciliation loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcilePolicy {
    pub interval: Duration,
    pub max_auto_attempts: u32,
    pub backoff: Backoff,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_auto_attempts: DEFAULT_MAX_AUTO_ATTEMPTS,
            backoff: Backoff::Fixed,
        }
    }
}

impl ReconcilePolicy {
    #[must_use]
    pub const fn new(interval: Duration, max_auto_attempts: u32) -> Self {
        Self {
            interval,
            max_auto_attempts,
            backoff: Backoff::Fixed,
        }
    }

    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay before the next automatic check, given how many have run.
    #[must_use]
    pub fn delay_for(&self, completed_auto: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential { max, jitter } => {
                let factor = 2u32.saturating_pow(completed_auto);
                let delay = self.interval.saturating_mul(factor).min(max);
                let jitter = jitter.clamp(0.0, 1.0);
                if jitter <= 0.0 {
                    return delay;
                }
                let cut = rand::rng().random_range(0.0..=jitter);
                delay.mul_f64(1.0 - cut)
            }
        }
    }
}

/// Progress of one checkout's reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    policy: ReconcilePolicy,
    auto_attempts: u32,
    manual_attempts: u32,
    last_checked: Option<DateTime<Utc>>,
    last_payload: Option<StatusPayload>,
    last_error: Option<String>,
    subscription: Option<Subscription>,
}

impl Reconciliation {
    /// Start a fresh reconciliation.
    #[must_use]
    pub const fn new(policy: ReconcilePolicy) -> Self {
        Self {
            policy,
            auto_attempts: 0,
            manual_attempts: 0,
            last_checked: None,
            last_payload: None,
            last_error: None,
            subscription: None,
        }
    }

    /// Continue from counts carried by a previous request.
    ///
    /// The automatic count is clamped to the budget.
    #[must_use]
    pub fn resume(policy: ReconcilePolicy, auto_attempts: u32, manual_attempts: u32) -> Self {
        Self {
            auto_attempts: auto_attempts.min(policy.max_auto_attempts),
            manual_attempts,
            ..Self::new(policy)
        }
    }

    /// Fold one check result into the state.
    ///
    /// Returns `true` when the result was counted. Results after
    /// confirmation, and automatic results once the budget is spent, are
    /// dropped.
    pub fn record(&mut self, trigger: Trigger, outcome: CheckOutcome, now: DateTime<Utc>) -> bool {
        if self.is_terminal() {
            tracing::debug!(trigger = trigger.as_str(), "Ignoring check after confirmation");
            return false;
        }
        if trigger == Trigger::Auto && self.auto_budget_spent() {
            tracing::debug!("Ignoring automatic check beyond the attempt budget");
            return false;
        }

        match trigger {
            Trigger::Auto => self.auto_attempts += 1,
            Trigger::Manual => self.manual_attempts += 1,
        }
        self.last_checked = Some(now);

        match outcome {
            CheckOutcome::Payload(payload) => {
                self.last_error = None;
                if let Some(subscription) = payload.subscription() {
                    tracing::info!(
                        plan = subscription.plan_display_name(),
                        attempts = self.total_attempts(),
                        "Payment confirmed"
                    );
                    self.subscription = Some(subscription);
                } else {
                    tracing::debug!(
                        auto = self.auto_attempts,
                        manual = self.manual_attempts,
                        "Payment still pending"
                    );
                }
                self.last_payload = Some(payload);
            }
            CheckOutcome::Failed(error) => {
                tracing::warn!(
                    trigger = trigger.as_str(),
                    error = %error,
                    "Payment status check failed"
                );
                self.last_error = Some(error);
            }
        }
        true
    }

    /// Whether another automatic check should be scheduled.
    #[must_use]
    pub const fn should_auto_poll(&self) -> bool {
        !self.is_terminal() && !self.auto_budget_spent()
    }

    /// Delay before the next automatic check, or `None` when polling is over.
    #[must_use]
    pub fn next_auto_delay(&self) -> Option<Duration> {
        self.should_auto_poll()
            .then(|| self.policy.delay_for(self.auto_attempts))
    }

    /// Whether the payment has been confirmed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.subscription.is_some()
    }

    #[must_use]
    pub const fn auto_budget_spent(&self) -> bool {
        self.auto_attempts >= self.policy.max_auto_attempts
    }

    #[must_use]
    pub const fn policy(&self) -> &ReconcilePolicy {
        &self.policy
    }

    #[must_use]
    pub const fn auto_attempts(&self) -> u32 {
        self.auto_attempts
    }

    #[must_use]
    pub const fn manual_attempts(&self) -> u32 {
        self.manual_attempts
    }

    #[must_use]
    pub const fn total_attempts(&self) -> u32 {
        self.auto_attempts.saturating_add(self.manual_attempts)
    }

    #[must_use]
    pub const fn max_auto_attempts(&self) -> u32 {
        self.policy.max_auto_attempts
    }

    #[must_use]
    pub const fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.last_checked
    }

    #[must_use]
    pub const fn last_payload(&self) -> Option<&StatusPayload> {
        self.last_payload.as_ref()
    }

    /// Error from the most recent check, cleared by the next successful one.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The activated subscription, once confirmed.
    #[must_use]
    pub const fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }
}
