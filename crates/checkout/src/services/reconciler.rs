//! Async driver for the status reconciliation loop.
//!
//! Wraps [`Reconciliation`] with a timer and a manual-trigger channel. All
//! checks, automatic and manual, run one at a time on a single task, so two
//! checks never overlap and no count is lost. The next automatic check is
//! scheduled one delay after the latest check of either kind.
//!
//! The loop ends when the payment is confirmed or the handle cancels it
//! (explicitly or by being dropped). Once the automatic budget is spent the
//! task stays alive to serve manual checks. A check already in flight is
//! allowed to finish before cancellation is observed.

use std::future::Future;

use chrono::Utc;
use hosted_checkout_core::CheckoutId;
use hosted_checkout_core::reconcile::{CheckOutcome, ReconcilePolicy, Reconciliation, Trigger};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::BackendClient;

/// Something that can answer a status check.
pub trait StatusSource: Send + Sync + 'static {
    fn status(&self, checkout_id: &CheckoutId) -> impl Future<Output = CheckOutcome> + Send;
}

impl StatusSource for BackendClient {
    async fn status(&self, checkout_id: &CheckoutId) -> CheckOutcome {
        self.check(checkout_id).await
    }
}

/// Spawns reconciliation loops.
#[derive(Debug, Clone)]
pub struct Reconciler<S> {
    source: S,
    policy: ReconcilePolicy,
}

impl<S: StatusSource + Clone> Reconciler<S> {
    pub const fn new(source: S, policy: ReconcilePolicy) -> Self {
        Self { source, policy }
    }

    /// Start reconciling a checkout on a new task.
    ///
    /// The first automatic check runs after one interval.
    #[must_use]
    pub fn spawn(&self, checkout_id: CheckoutId) -> ReconcilerHandle {
        let (manual_tx, manual_rx) = mpsc::channel(8);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let state = Reconciliation::new(self.policy);
        let (updates_tx, updates_rx) = watch::channel(state.clone());

        let span = tracing::info_span!("reconcile", checkout_id = %checkout_id);
        let task = tokio::spawn(
            run(
                self.source.clone(),
                checkout_id,
                state,
                manual_rx,
                cancel_rx,
                updates_tx,
            )
            .instrument(span),
        );

        ReconcilerHandle {
            manual: manual_tx,
            cancel: cancel_tx,
            updates: updates_rx,
            task,
        }
    }
}

/// Control over a running reconciliation loop.
///
/// Dropping the handle cancels the loop.
#[derive(Debug)]
pub struct ReconcilerHandle {
    manual: mpsc::Sender<()>,
    cancel: watch::Sender<bool>,
    updates: watch::Receiver<Reconciliation>,
    task: JoinHandle<Reconciliation>,
}

impl ReconcilerHandle {
    /// Request a manual check.
    ///
    /// Returns `false` when the loop has already finished.
    pub async fn check_now(&self) -> bool {
        self.manual.send(()).await.is_ok()
    }

    /// The state after the most recent check.
    #[must_use]
    pub fn snapshot(&self) -> Reconciliation {
        self.updates.borrow().clone()
    }

    /// A receiver notified after every check.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Reconciliation> {
        self.updates.clone()
    }

    /// Whether the loop task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the loop to stop after any in-flight check.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Wait for the loop to end on its own and return the final state.
    pub async fn join(self) -> Reconciliation {
        let Self {
            manual,
            cancel,
            updates,
            task,
        } = self;
        let last = updates.borrow().clone();
        let result = task.await;
        drop((manual, cancel));
        result.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Reconciliation task failed");
            last
        })
    }

    /// Cancel the loop and return the final state.
    pub async fn shutdown(self) -> Reconciliation {
        self.cancel();
        self.join().await
    }
}

async fn run<S: StatusSource>(
    source: S,
    checkout_id: CheckoutId,
    mut state: Reconciliation,
    mut manual: mpsc::Receiver<()>,
    mut cancel: watch::Receiver<bool>,
    updates: watch::Sender<Reconciliation>,
) -> Reconciliation {
    tracing::info!(
        interval_secs = state.policy().interval.as_secs(),
        max_auto_attempts = state.max_auto_attempts(),
        "Reconciliation started"
    );

    loop {
        if state.is_terminal() {
            break;
        }

        let delay = state.next_auto_delay();
        let tick = async {
            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending().await,
            }
        };

        let trigger = tokio::select! {
            biased;
            _ = cancel.changed() => break,
            request = manual.recv() => match request {
                Some(()) => Trigger::Manual,
                None => break,
            },
            () = tick => Trigger::Auto,
        };

        let outcome = source.status(&checkout_id).await;
        state.record(trigger, outcome, Utc::now());
        updates.send_replace(state.clone());

        if delay.is_some() && !state.should_auto_poll() && !state.is_terminal() {
            tracing::info!(
                attempts = state.auto_attempts(),
                "Automatic status checks exhausted; waiting for manual checks"
            );
        }
    }

    tracing::info!(
        confirmed = state.is_terminal(),
        auto = state.auto_attempts(),
        manual = state.manual_attempts(),
        "Reconciliation stopped"
    );
    state
}
