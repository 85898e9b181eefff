//! Application state shared across handlers.

use std::sync::Arc;

use hosted_checkout_core::policy::PolicyTemplate;
use hosted_checkout_core::reconcile::ReconcilePolicy;
use hosted_checkout_core::widget::WidgetConfig;

use crate::config::{CheckoutConfig, ConfigError};
use crate::services::{BackendClient, BackendError};

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("backend client error: {0}")]
    Backend(#[from] BackendError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the backend client and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: CheckoutConfig,
    backend: BackendClient,
    policy: PolicyTemplate,
    widget: WidgetConfig,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the widget origins are unusable or the backend
    /// client cannot be built.
    pub fn new(config: CheckoutConfig) -> Result<Self, StateError> {
        let backend = BackendClient::new(&config.backend)?;
        let dependency_origin = config.widget.dependency_origin()?;
        let policy = PolicyTemplate::new(
            config.widget.origin.as_str(),
            dependency_origin.as_str(),
        );
        let widget = WidgetConfig {
            widget_origin: config.widget.origin.to_string(),
            dependency_src: config.widget.dependency_url.to_string(),
            parent_origin: config.widget.parent_origin.clone(),
            payment_target: "_top".to_string(),
        };

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                policy,
                widget,
            }),
        })
    }

    /// Get a reference to the checkout configuration.
    #[must_use]
    pub fn config(&self) -> &CheckoutConfig {
        &self.inner.config
    }

    /// Get a reference to the backend status client.
    #[must_use]
    pub fn backend(&self) -> &BackendClient {
        &self.inner.backend
    }

    /// Get the payment-page policy template.
    #[must_use]
    pub fn policy(&self) -> &PolicyTemplate {
        &self.inner.policy
    }

    /// Get the widget loader settings.
    #[must_use]
    pub fn widget(&self) -> &WidgetConfig {
        &self.inner.widget
    }

    /// Get the reconciliation policy for status polling.
    #[must_use]
    pub fn reconcile_policy(&self) -> ReconcilePolicy {
        self.inner.config.poll.policy()
    }
}
