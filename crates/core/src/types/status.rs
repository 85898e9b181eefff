//! Checkout status payloads returned by the payment backend.
//!
//! The backend answers a status lookup with an arbitrary JSON object. The
//! only field the front end interprets is `subscription`: when it is present
//! (and truthy) the payment has completed and the subscription is active.
//! Every other shape means "still pending".

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw status response from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusPayload(Value);

impl StatusPayload {
    /// Wrap a JSON body.
    #[must_use]
    pub const fn new(body: Value) -> Self {
        Self(body)
    }

    /// The activated subscription, if the payment has completed.
    #[must_use]
    pub fn subscription(&self) -> Option<Subscription> {
        let subscription = self.0.get("subscription").filter(|v| is_truthy(v))?;
        let plan_name = subscription
            .get("plan")
            .and_then(|plan| plan.get("name"))
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(String::from);
        Some(Subscription { plan_name })
    }

    /// Whether this payload is the terminal success signal.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.subscription().is_some()
    }

    /// The raw JSON body.
    #[must_use]
    pub const fn as_json(&self) -> &Value {
        &self.0
    }

    /// Consume the payload and return the raw JSON body.
    #[must_use]
    pub fn into_json(self) -> Value {
        self.0
    }
}

impl From<Value> for StatusPayload {
    fn from(body: Value) -> Self {
        Self(body)
    }
}

/// The parts of an activated subscription shown on the outcome page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub plan_name: Option<String>,
}

impl Subscription {
    /// Plan name for display.
    #[must_use]
    pub fn plan_display_name(&self) -> &str {
        self.plan_name.as_deref().unwrap_or("Unknown Plan")
    }
}

/// JSON truthiness: `null`, `false`, `0` and `""` are falsy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_subscription_with_plan() {
        let payload = StatusPayload::new(json!({"subscription": {"plan": {"name": "Pro"}}}));
        let sub = payload.subscription().expect("confirmed");
        assert_eq!(sub.plan_display_name(), "Pro");
        assert!(payload.is_confirmed());
    }

    #[test]
    fn test_subscription_without_plan() {
        let payload = StatusPayload::new(json!({"subscription": {"id": 7}}));
        let sub = payload.subscription().expect("confirmed");
        assert_eq!(sub.plan_display_name(), "Unknown Plan");
    }

    #[test]
    fn test_pending_shapes() {
        for body in [
            json!({}),
            json!({"status": "pending"}),
            json!({"subscription": null}),
            json!({"subscription": false}),
            json!([]),
            json!("ok"),
        ] {
            assert!(!StatusPayload::new(body.clone()).is_confirmed(), "{body}");
        }
    }

    #[test]
    fn test_transparent_serde() {
        let payload: StatusPayload =
            serde_json::from_str(r#"{"subscription":{"plan":{"name":"Pro"}}}"#).expect("json");
        assert!(payload.is_confirmed());
        assert_eq!(
            serde_json::to_value(&payload).expect("serialize"),
            json!({"subscription": {"plan": {"name": "Pro"}}})
        );
    }
}
