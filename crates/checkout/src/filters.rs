//! Custom Askama template filters.

/// Returns the content hash for main.css.
///
/// The hash is computed at build time from the CSS file content, and the
/// stylesheet is copied to `static/css/derived/main.<hash>.css`.
///
/// Usage in templates: `{{ ""|css_hash }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn css_hash(
    _value: impl std::fmt::Display,
    _env: &dyn askama::Values,
) -> askama::Result<&'static str> {
    Ok(env!("CSS_HASH"))
}
