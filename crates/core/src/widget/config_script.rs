//! Generates the inline configuration block read by the hosted widget.
//!
//! The widget looks for a global `wpwlOptions` object when it boots. The
//! block sets the locale, wires the five hooks to the page's loader
//! bridge (`window.hostedCheckout`, defined in `widget-loader.js`) and posts
//! `PAYMENT_SUCCESS` to the embedding page, restricted to its origin.

use serde::Serialize;

use crate::message::Origin;

use super::callbacks::{DEFAULT_RESOURCE_PATH, SUCCESS_RESULT_CODE};

/// Widget display language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Ar,
}

impl Locale {
    /// Pick the locale from an `Accept-Language` header value.
    ///
    /// Only the first listed language counts: Arabic when it starts with
    /// `ar`, English otherwise.
    #[must_use]
    pub fn from_accept_language(header: Option<&str>) -> Self {
        let first = header
            .and_then(|h| h.split(',').next())
            .map(|tag| tag.trim().to_ascii_lowercase())
            .unwrap_or_default();
        if first.starts_with("ar") {
            Self::Ar
        } else {
            Self::En
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ar => "ar",
        }
    }
}

/// Encode a string as a JavaScript literal that is safe inside `<script>`.
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_owned())
        .to_string()
        .replace("</", "<\\/")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

/// Render the configuration block.
#[must_use]
pub fn render(locale: Locale, payment_target: &str, parent_origin: &Origin) -> String {
    let locale = js_string(locale.as_str());
    let target = js_string(payment_target);
    let origin = js_string(parent_origin.as_str());
    let success = js_string(SUCCESS_RESULT_CODE);
    let default_path = js_string(DEFAULT_RESOURCE_PATH);

    format!(
        r#"(function () {{
  var bridge = window.hostedCheckout || {{ emit: function () {{}} }};
  window.wpwlOptions = {{
    locale: {locale},
    paymentTarget: {target},
    onReady: function () {{
      if (window.wpwlOptions.locale === "ar" && window.jQuery) {{
        jQuery(".wpwl-group").css("direction", "ltr");
        jQuery(".wpwl-control-cardNumber").css({{ "direction": "ltr", "text-align": "right" }});
        jQuery(".wpwl-brand-card").css("right", "200px");
      }}
      bridge.emit("ready");
    }},
    onError: function (error) {{
      bridge.emit("error", error);
    }},
    onDetectBrand: function (brands) {{
      bridge.emit("detectBrand", brands);
    }},
    onBeforeSubmit: function () {{
      bridge.emit("beforeSubmit");
    }},
    onResponse: function (response) {{
      bridge.emit("response", response);
      if (response && response.result && response.result.code === {success} && window.parent !== window) {{
        window.parent.postMessage({{
          type: "PAYMENT_SUCCESS",
          data: {{ resourcePath: response.resourcePath || {default_path} }}
        }}, {origin});
      }}
    }}
  }};
}})();"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Origin {
        Origin::parse("https://merchant.example").expect("origin")
    }

    #[test]
    fn test_locale_from_accept_language() {
        assert_eq!(Locale::from_accept_language(None), Locale::En);
        assert_eq!(Locale::from_accept_language(Some("ar-SA,en;q=0.8")), Locale::Ar);
        assert_eq!(Locale::from_accept_language(Some("en-US,ar;q=0.5")), Locale::En);
        assert_eq!(Locale::from_accept_language(Some("AR")), Locale::Ar);
    }

    #[test]
    fn test_render_registers_all_hooks() {
        let js = render(Locale::En, "_top", &origin());
        for hook in ["onReady", "onError", "onDetectBrand", "onBeforeSubmit", "onResponse"] {
            assert!(js.contains(hook), "missing {hook}");
        }
        assert!(js.contains("window.wpwlOptions"));
        assert!(js.contains(r#"locale: "en""#));
        assert!(js.contains(r#"paymentTarget: "_top""#));
    }

    #[test]
    fn test_render_restricts_post_message_origin() {
        let js = render(Locale::En, "_top", &origin());
        assert!(js.contains(r#"}, "https://merchant.example");"#));
        assert!(!js.contains(r#""*""#));
        assert!(js.contains(r#""000.100.110""#));
    }

    #[test]
    fn test_js_string_escapes_script_close() {
        assert_eq!(js_string("</script>"), r#""<\/script>""#);
        assert_eq!(js_string("a\"b"), r#""a\"b""#);
    }
}
