//! Callback contract between the loader and the hosted widget.
//!
//! The widget calls five hooks: `onReady`, `onError(error)`,
//! `onDetectBrand(brands)`, `onBeforeSubmit()` and `onResponse(response)`.
//! Each loader owns its own callback table instead of sharing one global
//! options object, so several widget instances can coexist.

use std::collections::HashMap;

use serde::Deserialize;

use crate::message::{MessageSink, ParentMessage};
use crate::types::CheckoutId;

use super::WidgetLoader;

/// Result code the widget reports for a successful transaction.
pub const SUCCESS_RESULT_CODE: &str = "000.100.110";

/// Resource path used when a successful response carries none.
pub const DEFAULT_RESOURCE_PATH: &str = "/success";

/// Brand identifier of the Saudi national debit scheme.
pub const MADA_BRAND: &str = "MADA";

/// Result block of a widget response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResultCode {
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Payload passed to `onResponse`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct WidgetResponse {
    #[serde(default)]
    pub result: Option<ResultCode>,
    #[serde(rename = "resourcePath", default)]
    pub resource_path: Option<String>,
}

impl WidgetResponse {
    /// Whether the response carries the success result code.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result
            .as_ref()
            .is_some_and(|r| r.code == SUCCESS_RESULT_CODE)
    }

    /// The message to post to the embedding page, if this is a success.
    #[must_use]
    pub fn success_message(&self) -> Option<ParentMessage> {
        self.is_success().then(|| ParentMessage::PaymentSuccess {
            resource_path: self
                .resource_path
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_RESOURCE_PATH.to_owned()),
        })
    }
}

/// An invocation of one of the widget hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEvent {
    Ready,
    Error(String),
    DetectBrand(Vec<String>),
    BeforeSubmit,
    Response(WidgetResponse),
}

/// Handlers for the widget hooks. Every method defaults to a no-op.
pub trait WidgetCallbacks: Send {
    fn on_ready(&mut self) {}

    fn on_error(&mut self, _error: &str) {}

    fn on_detect_brand(&mut self, _brands: &[String]) {}

    fn on_before_submit(&mut self) {}

    fn on_response(&mut self, _response: &WidgetResponse) {}
}

/// Default callback table: records each hook in the trace log.
#[derive(Debug, Clone, Default)]
pub struct TracingCallbacks {
    checkout_id: Option<String>,
}

impl TracingCallbacks {
    #[must_use]
    pub fn new(checkout_id: Option<&CheckoutId>) -> Self {
        Self {
            checkout_id: checkout_id.map(ToString::to_string),
        }
    }

    fn id(&self) -> &str {
        self.checkout_id.as_deref().unwrap_or("-")
    }
}

impl WidgetCallbacks for TracingCallbacks {
    fn on_ready(&mut self) {
        tracing::info!(checkout_id = %self.id(), "Payment widget ready");
    }

    fn on_error(&mut self, error: &str) {
        tracing::warn!(checkout_id = %self.id(), error, "Payment widget reported an error");
    }

    fn on_detect_brand(&mut self, brands: &[String]) {
        if brands.iter().any(|b| b == MADA_BRAND) {
            tracing::debug!(checkout_id = %self.id(), "MADA card detected");
        } else {
            tracing::debug!(checkout_id = %self.id(), ?brands, "Card brand detected");
        }
    }

    fn on_before_submit(&mut self) {
        tracing::info!(checkout_id = %self.id(), "Payment form submitted");
    }

    fn on_response(&mut self, response: &WidgetResponse) {
        tracing::info!(
            checkout_id = %self.id(),
            result_code = response.result.as_ref().map(|r| r.code.as_str()),
            "Payment widget response"
        );
    }
}

/// Loaders keyed by checkout session.
///
/// Routes widget events to the loader that owns the session, so two widgets
/// on one page never see each other's callbacks.
#[derive(Default)]
pub struct WidgetSessions {
    loaders: HashMap<CheckoutId, WidgetLoader>,
}

impl WidgetSessions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loader under its checkout id.
    ///
    /// Returns the loader back if it has no checkout id to key it by.
    ///
    /// # Errors
    ///
    /// Returns the loader unchanged when it has no checkout reference.
    pub fn register(&mut self, loader: WidgetLoader) -> Result<(), Box<WidgetLoader>> {
        let Some(id) = loader.checkout_id().cloned() else {
            return Err(Box::new(loader));
        };
        if self.loaders.insert(id.clone(), loader).is_some() {
            tracing::warn!(checkout_id = %id, "Replaced an existing widget session");
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: &CheckoutId) -> Option<&WidgetLoader> {
        self.loaders.get(id)
    }

    pub fn get_mut(&mut self, id: &CheckoutId) -> Option<&mut WidgetLoader> {
        self.loaders.get_mut(id)
    }

    /// Remove a session, returning its loader so the caller can tear it down.
    pub fn remove(&mut self, id: &CheckoutId) -> Option<WidgetLoader> {
        self.loaders.remove(id)
    }

    /// Deliver a widget event to the session's callbacks.
    ///
    /// Returns `false` when no session is registered under `id`.
    pub fn dispatch(
        &mut self,
        id: &CheckoutId,
        event: WidgetEvent,
        sink: &mut dyn MessageSink,
    ) -> bool {
        match self.loaders.get_mut(id) {
            Some(loader) => {
                loader.handle_event(event, sink);
                true
            }
            None => {
                tracing::debug!(checkout_id = %id, "Widget event for unknown session");
                false
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_deserializes_widget_shape() {
        let response: WidgetResponse = serde_json::from_str(
            r#"{"result":{"code":"000.100.110","description":"Request successfully processed"},"resourcePath":"/v1/checkouts/abc/payment"}"#,
        )
        .expect("json");
        assert!(response.is_success());
        assert_eq!(
            response.success_message(),
            Some(ParentMessage::PaymentSuccess {
                resource_path: "/v1/checkouts/abc/payment".to_string()
            })
        );
    }

    #[test]
    fn test_success_without_resource_path_defaults() {
        let response: WidgetResponse =
            serde_json::from_str(r#"{"result":{"code":"000.100.110"}}"#).expect("json");
        assert_eq!(
            response.success_message(),
            Some(ParentMessage::PaymentSuccess {
                resource_path: DEFAULT_RESOURCE_PATH.to_string()
            })
        );
    }

    #[test]
    fn test_other_codes_are_not_success() {
        for body in [
            r#"{"result":{"code":"800.100.151"}}"#,
            r#"{"result":{"code":"000.200.000"}}"#,
            r"{}",
        ] {
            let response: WidgetResponse = serde_json::from_str(body).expect("json");
            assert!(!response.is_success(), "{body}");
            assert!(response.success_message().is_none());
        }
    }
}
