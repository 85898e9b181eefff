//! Content-Security-Policy construction for payment pages.
//!
//! Card-industry rules require every script on a payment page to be
//! explicitly authorized. The policy allows `'self'`, a fixed set of trusted
//! third-party origins and exactly one per-response nonce:
//!
//! ```text
//! default-src 'self';
//! script-src 'self' <widget> <dependency> 'unsafe-eval' 'nonce-<n>';
//! style-src 'self' <widget> 'unsafe-inline';
//! frame-src 'self' <widget>;
//! connect-src 'self' <widget>;
//! img-src 'self' <widget>;
//! object-src 'none';
//! base-uri 'self';
//! form-action 'self' <widget>;
//! frame-ancestors 'self'
//! ```
//!
//! `'unsafe-eval'` is required because the hosted widget evaluates code at
//! runtime.

use core::fmt;

use serde::Serialize;

use crate::types::Nonce;

pub const SELF: &str = "'self'";
pub const NONE: &str = "'none'";
pub const UNSAFE_EVAL: &str = "'unsafe-eval'";
pub const UNSAFE_INLINE: &str = "'unsafe-inline'";

pub const SCRIPT_SRC: &str = "script-src";

/// One directive: a name and its allowed sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    name: String,
    sources: Vec<String>,
}

impl Directive {
    /// Create a directive from a name and sources.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            sources: sources.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Whether the directive lists `source` verbatim.
    #[must_use]
    pub fn allows(&self, source: &str) -> bool {
        self.sources.iter().any(|s| s == source)
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for source in &self.sources {
            write!(f, " {source}")?;
        }
        Ok(())
    }
}

/// An ordered list of directives, rendered as a single header value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentSecurityPolicy {
    directives: Vec<Directive>,
}

impl ContentSecurityPolicy {
    /// Parse a `Content-Security-Policy` header value.
    ///
    /// Empty segments are skipped; directive names are lowercased.
    #[must_use]
    pub fn parse(header: &str) -> Self {
        let directives = header
            .split(';')
            .filter_map(|segment| {
                let mut parts = segment.split_whitespace();
                let name = parts.next()?.to_ascii_lowercase();
                Some(Directive::new(name, parts))
            })
            .collect();
        Self { directives }
    }

    #[must_use]
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// The first directive with the given name.
    #[must_use]
    pub fn directive(&self, name: &str) -> Option<&Directive> {
        self.directives.iter().find(|d| d.name == name)
    }

    /// Number of directives with the given name.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.directives.iter().filter(|d| d.name == name).count()
    }

    /// The nonce value authorized by `script-src`, if any.
    #[must_use]
    pub fn script_nonce(&self) -> Option<&str> {
        self.directive(SCRIPT_SRC)?.sources.iter().find_map(|s| {
            s.strip_prefix("'nonce-")
                .and_then(|rest| rest.strip_suffix('\''))
        })
    }

    /// Render the header value.
    #[must_use]
    pub fn header_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ContentSecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, directive) in self.directives.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{directive}")?;
        }
        Ok(())
    }
}

/// The fixed part of the payment-page policy.
///
/// Built once from configuration; [`Self::for_nonce`] stamps a fresh nonce
/// into it for each response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTemplate {
    widget_origin: String,
    script_origins: Vec<String>,
}

impl PolicyTemplate {
    /// Create a template trusting the widget origin for scripts, frames,
    /// connections, images, styles and form posts, and the dependency
    /// origin for scripts only.
    #[must_use]
    pub fn new(widget_origin: impl Into<String>, dependency_origin: impl Into<String>) -> Self {
        let widget_origin = widget_origin.into();
        let dependency_origin = dependency_origin.into();

        let mut script_origins = vec![widget_origin.clone()];
        if dependency_origin != widget_origin {
            script_origins.push(dependency_origin);
        }

        Self {
            widget_origin,
            script_origins,
        }
    }

    /// Trusted third-party script origins, in policy order.
    #[must_use]
    pub fn script_origins(&self) -> &[String] {
        &self.script_origins
    }

    /// Build the policy for one response.
    #[must_use]
    pub fn for_nonce(&self, nonce: &Nonce) -> ContentSecurityPolicy {
        let widget = self.widget_origin.as_str();

        let mut script_src = vec![SELF.to_owned()];
        script_src.extend(self.script_origins.iter().cloned());
        script_src.push(UNSAFE_EVAL.to_owned());
        script_src.push(nonce.source_expression());

        ContentSecurityPolicy {
            directives: vec![
                Directive::new("default-src", [SELF]),
                Directive::new(SCRIPT_SRC, script_src),
                Directive::new("style-src", [SELF, widget, UNSAFE_INLINE]),
                Directive::new("frame-src", [SELF, widget]),
                Directive::new("connect-src", [SELF, widget]),
                Directive::new("img-src", [SELF, widget]),
                Directive::new("object-src", [NONE]),
                Directive::new("base-uri", [SELF]),
                Directive::new("form-action", [SELF, widget]),
                Directive::new("frame-ancestors", [SELF]),
            ],
        }
    }
}

/// One line of a policy audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplianceCheck {
    pub name: &'static str,
    pub passed: bool,
    pub expected: String,
}

impl ComplianceCheck {
    fn new(name: &'static str, passed: bool, expected: impl Into<String>) -> Self {
        Self {
            name,
            passed,
            expected: expected.into(),
        }
    }
}

impl PolicyTemplate {
    /// Check a served policy against what this template requires.
    ///
    /// Works on any parsed header, so it can audit a remote page as well as
    /// one of ours.
    #[must_use]
    pub fn audit(&self, policy: &ContentSecurityPolicy) -> Vec<ComplianceCheck> {
        let widget = self.widget_origin.as_str();
        let script_src = policy.directive(SCRIPT_SRC);
        let allows = |directive: Option<&Directive>, source: &str| {
            directive.is_some_and(|d| d.allows(source))
        };

        let mut checks = vec![
            ComplianceCheck::new(
                "Single Script Directive",
                policy.count(SCRIPT_SRC) == 1,
                "exactly one script-src directive",
            ),
            ComplianceCheck::new(
                "Widget Script Source",
                allows(script_src, widget),
                format!("script-src allows {widget}"),
            ),
        ];
        for origin in self.script_origins.iter().filter(|o| *o != widget) {
            checks.push(ComplianceCheck::new(
                "Dependency Script Source",
                allows(script_src, origin),
                format!("script-src allows {origin}"),
            ));
        }
        checks.extend([
            ComplianceCheck::new(
                "Nonce Support",
                policy.script_nonce().is_some(),
                "script-src carries a 'nonce-' source",
            ),
            ComplianceCheck::new(
                "Unsafe Eval Support",
                allows(script_src, UNSAFE_EVAL),
                format!("script-src allows {UNSAFE_EVAL}"),
            ),
            ComplianceCheck::new(
                "Frame Source",
                allows(policy.directive("frame-src"), widget),
                format!("frame-src allows {widget}"),
            ),
            ComplianceCheck::new(
                "Form Action",
                allows(policy.directive("form-action"), widget),
                format!("form-action allows {widget}"),
            ),
            ComplianceCheck::new(
                "Object Source",
                policy
                    .directive("object-src")
                    .is_some_and(|d| d.sources() == [NONE]),
                format!("object-src {NONE}"),
            ),
        ]);
        checks
    }
}
