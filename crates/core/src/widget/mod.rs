//! Ordered, nonce-tagged loading of the hosted payment widget.
//!
//! # Load sequence
//!
//! ```text
//! Idle ──start──▶ LoadingDependency ──dep loaded──▶ LoadingConfig
//!                                                       │ config applied
//!                                                       ▼
//!                        Ready ◀──widget loaded── LoadingWidget
//!
//! any Loading* ──script error──▶ Error(reason) ──retry──▶ LoadingDependency
//! ```
//!
//! - The configuration block is inserted only after the dependency
//!   library's load event.
//! - Every inserted element carries the response nonce.
//! - The widget script carries `integrity` and `crossorigin="anonymous"`
//!   when integrity material was supplied with the checkout.
//! - A missing checkout reference fails immediately without inserting
//!   anything.
//! - Script errors are terminal for the attempt; there is no automatic
//!   retry.
//!
//! The loader never touches a real document. It drives a [`ScriptHost`]
//! and is driven by load and error notifications, so the same machine backs
//! the server-rendered page and the tests.

pub mod callbacks;
pub mod config_script;
pub mod script;

use core::fmt;

use serde::Serialize;

use crate::message::{MessageSink, Origin};
use crate::types::{CheckoutId, Nonce};

pub use callbacks::{
    SUCCESS_RESULT_CODE, TracingCallbacks, WidgetCallbacks, WidgetEvent, WidgetResponse,
    WidgetSessions,
};
pub use config_script::Locale;
pub use script::{HostOp, RecordingHost, ScriptElement, ScriptHandle, ScriptHost, ScriptKind};

/// Why a load attempt failed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LoadError {
    #[error("missing checkout reference")]
    MissingCheckoutReference,
    #[error("failed to load {0}")]
    ScriptFailed(ScriptKind),
}

/// Where the loader is in the load sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    LoadingDependency,
    LoadingConfig,
    LoadingWidget,
    Ready,
    Error(LoadError),
}

impl LoadState {
    /// Stable kebab-case name for markup and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::LoadingDependency => "loading-dependency",
            Self::LoadingConfig => "loading-config",
            Self::LoadingWidget => "loading-widget",
            Self::Ready => "ready",
            Self::Error(_) => "error",
        }
    }

    /// Whether a script load is outstanding.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(
            self,
            Self::LoadingDependency | Self::LoadingConfig | Self::LoadingWidget
        )
    }

    /// The failure reason, in the error state.
    #[must_use]
    pub const fn error(&self) -> Option<&LoadError> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(e) => write!(f, "error({e})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Deployment-wide widget settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetConfig {
    /// Origin serving the widget script, e.g. `https://eu-test.oppwa.com`.
    pub widget_origin: String,
    /// Full URL of the dependency library.
    pub dependency_src: String,
    /// Origin allowed to receive cross-window messages.
    pub parent_origin: Origin,
    /// Browsing context the widget submits into.
    pub payment_target: String,
}

impl WidgetConfig {
    /// URL of the widget script for a checkout.
    #[must_use]
    pub fn widget_src(&self, checkout_id: &CheckoutId) -> String {
        format!(
            "{}/v1/paymentWidgets.js?checkoutId={checkout_id}",
            self.widget_origin.trim_end_matches('/')
        )
    }
}

/// Drives the load sequence for one checkout session.
pub struct WidgetLoader {
    config: WidgetConfig,
    checkout_id: Option<CheckoutId>,
    nonce: Nonce,
    integrity: Option<String>,
    locale: Locale,
    state: LoadState,
    inserted: Vec<(ScriptKind, ScriptHandle)>,
    callbacks: Box<dyn WidgetCallbacks>,
}

impl fmt::Debug for WidgetLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetLoader")
            .field("checkout_id", &self.checkout_id)
            .field("state", &self.state)
            .field("locale", &self.locale)
            .field("inserted", &self.inserted)
            .finish_non_exhaustive()
    }
}

impl WidgetLoader {
    /// Create an idle loader. Callbacks default to [`TracingCallbacks`].
    #[must_use]
    pub fn new(config: WidgetConfig, checkout_id: Option<CheckoutId>, nonce: Nonce) -> Self {
        let callbacks = Box::new(TracingCallbacks::new(checkout_id.as_ref()));
        Self {
            config,
            checkout_id,
            nonce,
            integrity: None,
            locale: Locale::default(),
            state: LoadState::Idle,
            inserted: Vec::new(),
            callbacks,
        }
    }

    /// Subresource-integrity hash for the widget script.
    #[must_use]
    pub fn with_integrity(mut self, integrity: Option<String>) -> Self {
        self.integrity = integrity.filter(|i| !i.trim().is_empty());
        self
    }

    #[must_use]
    pub const fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    /// Replace the callback table.
    #[must_use]
    pub fn with_callbacks(mut self, callbacks: Box<dyn WidgetCallbacks>) -> Self {
        self.callbacks = callbacks;
        self
    }

    #[must_use]
    pub const fn state(&self) -> &LoadState {
        &self.state
    }

    #[must_use]
    pub const fn checkout_id(&self) -> Option<&CheckoutId> {
        self.checkout_id.as_ref()
    }

    #[must_use]
    pub const fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    #[must_use]
    pub const fn locale(&self) -> Locale {
        self.locale
    }

    /// Build the element for one step of the sequence.
    ///
    /// Returns `None` without a checkout reference.
    #[must_use]
    pub fn element(&self, kind: ScriptKind) -> Option<ScriptElement> {
        let checkout_id = self.checkout_id.as_ref()?;
        let nonce = self.nonce.value();

        let element = match kind {
            ScriptKind::Dependency => {
                ScriptElement::external(kind, self.config.dependency_src.clone(), nonce)
            }
            ScriptKind::Config => ScriptElement::inline(
                kind,
                config_script::render(
                    self.locale,
                    &self.config.payment_target,
                    &self.config.parent_origin,
                ),
                nonce,
            ),
            ScriptKind::Widget => {
                let mut element =
                    ScriptElement::external(kind, self.config.widget_src(checkout_id), nonce);
                element.is_async = true;
                if let Some(integrity) = &self.integrity {
                    element.integrity = Some(integrity.clone());
                    element.cross_origin = Some("anonymous".to_owned());
                }
                element
            }
        };
        Some(element)
    }

    /// All three elements in load order. Empty without a checkout reference.
    #[must_use]
    pub fn manifest(&self) -> Vec<ScriptElement> {
        [ScriptKind::Dependency, ScriptKind::Config, ScriptKind::Widget]
            .into_iter()
            .filter_map(|kind| self.element(kind))
            .collect()
    }

    /// Begin loading by inserting the dependency library.
    ///
    /// Only valid from `Idle`; other states are left unchanged.
    pub fn start(&mut self, host: &mut dyn ScriptHost) -> &LoadState {
        if self.state != LoadState::Idle {
            tracing::debug!(state = %self.state, "Ignoring start on a loader that is not idle");
            return &self.state;
        }

        if self.checkout_id.is_none() {
            tracing::warn!("Payment widget cannot load without a checkout reference");
            self.state = LoadState::Error(LoadError::MissingCheckoutReference);
            return &self.state;
        }

        if self.integrity.is_none() {
            tracing::warn!(
                checkout_id = ?self.checkout_id,
                "No integrity value supplied for the widget script"
            );
        }

        self.insert(ScriptKind::Dependency, host);
        self.state = LoadState::LoadingDependency;
        &self.state
    }

    /// A script fired its load event.
    ///
    /// Notifications that do not match the current step are ignored.
    pub fn script_loaded(&mut self, kind: ScriptKind, host: &mut dyn ScriptHost) -> &LoadState {
        match (&self.state, kind) {
            (LoadState::LoadingDependency, ScriptKind::Dependency) => {
                self.insert(ScriptKind::Config, host);
                self.state = LoadState::LoadingConfig;
            }
            (LoadState::LoadingConfig, ScriptKind::Config) => {
                self.insert(ScriptKind::Widget, host);
                self.state = LoadState::LoadingWidget;
            }
            (LoadState::LoadingWidget, ScriptKind::Widget) => {
                tracing::info!(checkout_id = ?self.checkout_id, "Payment widget script loaded");
                self.state = LoadState::Ready;
            }
            (state, kind) => {
                tracing::debug!(%state, ?kind, "Ignoring out-of-sequence load notification");
            }
        }
        &self.state
    }

    /// A script fired its error event. Terminal for this attempt.
    pub fn script_failed(&mut self, kind: ScriptKind, _host: &mut dyn ScriptHost) -> &LoadState {
        let ours = self.inserted.iter().any(|(k, _)| *k == kind);
        if self.state.is_loading() && ours {
            tracing::warn!(checkout_id = ?self.checkout_id, %kind, "Script failed to load");
            self.state = LoadState::Error(LoadError::ScriptFailed(kind));
        } else {
            tracing::debug!(state = %self.state, ?kind, "Ignoring error for a script not in flight");
        }
        &self.state
    }

    /// Reset after an error and start over from the dependency.
    ///
    /// Only valid from `Error`.
    pub fn retry(&mut self, host: &mut dyn ScriptHost) -> &LoadState {
        if self.state.error().is_none() {
            tracing::debug!(state = %self.state, "Ignoring retry outside the error state");
            return &self.state;
        }
        self.remove_inserted(host);
        self.state = LoadState::Idle;
        self.start(host)
    }

    /// Remove every element this loader inserted and return to `Idle`.
    pub fn teardown(&mut self, host: &mut dyn ScriptHost) {
        self.remove_inserted(host);
        self.state = LoadState::Idle;
    }

    /// Deliver a widget hook invocation to this loader's callbacks.
    ///
    /// A successful `onResponse` also posts `PAYMENT_SUCCESS` to the
    /// embedding page, restricted to the configured parent origin.
    pub fn handle_event(&mut self, event: WidgetEvent, sink: &mut dyn MessageSink) {
        match event {
            WidgetEvent::Ready => self.callbacks.on_ready(),
            WidgetEvent::Error(error) => self.callbacks.on_error(&error),
            WidgetEvent::DetectBrand(brands) => self.callbacks.on_detect_brand(&brands),
            WidgetEvent::BeforeSubmit => self.callbacks.on_before_submit(),
            WidgetEvent::Response(response) => {
                self.callbacks.on_response(&response);
                if let Some(message) = response.success_message() {
                    sink.post(message, &self.config.parent_origin);
                }
            }
        }
    }

    fn insert(&mut self, kind: ScriptKind, host: &mut dyn ScriptHost) {
        if let Some(element) = self.element(kind) {
            let handle = host.insert(element);
            self.inserted.push((kind, handle));
        }
    }

    fn remove_inserted(&mut self, host: &mut dyn ScriptHost) {
        for (_, handle) in self.inserted.drain(..) {
            host.remove(handle);
        }
    }
}
