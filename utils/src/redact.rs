//! Redaction for secrets that end up in log fields.

/// Number of leading characters kept visible.
const VISIBLE_PREFIX: usize = 4;

/// Tokens at or below this length are hidden entirely.
const MIN_PARTIAL_LENGTH: usize = 12;

/// Render a bearer token for logs: a short prefix plus its length.
///
/// Short tokens are fully masked.
#[must_use]
pub fn redact_token(token: &str) -> String {
    let len = token.chars().count();
    if len == 0 {
        return "<empty>".to_string();
    }
    if len <= MIN_PARTIAL_LENGTH {
        return format!("<redacted:{len}>");
    }
    let prefix: String = token.chars().take(VISIBLE_PREFIX).collect();
    format!("{prefix}…<redacted:{len}>")
}
