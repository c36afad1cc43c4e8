use std::time::Duration;

use serde_json::Value;
use wicket_store::StoreError;

/// Every failure a backend exchange can surface. Each variant renders a
/// message fit for display as-is.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Network error: please ensure the backend is running and reachable.")]
    Network {
        #[source]
        source: reqwest::Error,
    },
    #[error("The request timed out after {} seconds.", .0.as_secs())]
    Timeout(Duration),
    #[error("Invalid username or password.")]
    InvalidCredentials,
    #[error("Too many attempts. Please wait a minute and try again.")]
    RateLimited,
    #[error("{message}")]
    ValidationFailed { message: String },
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("{message}")]
    Unauthorized { message: String },
    #[error("Request failed ({status}): {message}")]
    Http {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("Demo limit reached for {feature}. Upgrade to keep using AI features.")]
    QuotaExhausted { feature: String },
    #[error("Session storage failed: {0}")]
    Store(#[from] StoreError),
}

impl ClientError {
    /// Structured error code carried by the response, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Http { code, .. } => code.as_deref(),
            Self::QuotaExhausted { .. } => Some(crate::DEMO_AI_LIMIT_CODE),
            _ => None,
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::InvalidCredentials => Some(401),
            Self::RateLimited => Some(429),
            Self::Server { status, .. } | Self::Http { status, .. } => Some(*status),
            Self::QuotaExhausted { .. } => Some(403),
            _ => None,
        }
    }
}

/// Message and code extracted from an error response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDetail {
    pub message: Option<String>,
    pub code: Option<String>,
}

impl ErrorDetail {
    /// Parse a JSON error body.
    ///
    /// The message is taken from the first of `detail` (string), `detail.message`,
    /// `detail[0].msg` (validation lists), `message`, `error` (string) and
    /// `error.message`. The code comes from `detail.code` or `code`.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        let Ok(payload) = serde_json::from_str::<Value>(body) else {
            let trimmed = body.trim();
            return Self {
                message: (!trimmed.is_empty() && !trimmed.starts_with('<'))
                    .then(|| trimmed.to_string()),
                code: None,
            };
        };

        let message = [
            "/detail",
            "/detail/message",
            "/detail/0/msg",
            "/message",
            "/error",
            "/error/message",
        ]
        .iter()
        .find_map(|pointer| payload.pointer(pointer).and_then(Value::as_str))
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(ToString::to_string);

        let code = ["/detail/code", "/code"]
            .iter()
            .find_map(|pointer| payload.pointer(pointer))
            .and_then(|value| match value {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        Self { message, code }
    }

    /// The extracted message, or `fallback` when the body carried none.
    #[must_use]
    pub fn message_or(&self, fallback: &str) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| fallback.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_string_wins() {
        let detail = ErrorDetail::parse(r#"{"detail": "Username already registered", "message": "x"}"#);
        assert_eq!(detail.message.as_deref(), Some("Username already registered"));
        assert_eq!(detail.code, None);
    }

    #[test]
    fn structured_detail_keeps_code() {
        let detail = ErrorDetail::parse(
            r#"{"detail": {"message": "Upgrade required", "code": "SUBSCRIPTION_REQUIRED"}}"#,
        );
        assert_eq!(detail.message.as_deref(), Some("Upgrade required"));
        assert_eq!(detail.code.as_deref(), Some("SUBSCRIPTION_REQUIRED"));
    }

    #[test]
    fn validation_list_uses_first_msg() {
        let detail = ErrorDetail::parse(
            r#"{"detail": [{"loc": ["body", "username"], "msg": "field required"}]}"#,
        );
        assert_eq!(detail.message.as_deref(), Some("field required"));
    }

    #[test]
    fn falls_back_through_message_and_error() {
        assert_eq!(
            ErrorDetail::parse(r#"{"message": "m"}"#).message.as_deref(),
            Some("m")
        );
        assert_eq!(
            ErrorDetail::parse(r#"{"error": "e"}"#).message.as_deref(),
            Some("e")
        );
        assert_eq!(
            ErrorDetail::parse(r#"{"error": {"message": "nested"}}"#)
                .message
                .as_deref(),
            Some("nested")
        );
    }

    #[test]
    fn plain_text_and_html_bodies() {
        assert_eq!(
            ErrorDetail::parse("Bad Gateway").message.as_deref(),
            Some("Bad Gateway")
        );
        assert_eq!(ErrorDetail::parse("<html>oops</html>").message, None);
        assert_eq!(ErrorDetail::parse("").message_or("Server Error"), "Server Error");
    }

    #[test]
    fn error_messages_are_specific() {
        assert_eq!(
            ClientError::RateLimited.to_string(),
            "Too many attempts. Please wait a minute and try again."
        );
        assert_eq!(
            ClientError::InvalidCredentials.to_string(),
            "Invalid username or password."
        );
        assert_eq!(
            ClientError::Timeout(Duration::from_secs(30)).to_string(),
            "The request timed out after 30 seconds."
        );
    }

    #[test]
    fn quota_error_reports_paywall_code() {
        let err = ClientError::QuotaExhausted {
            feature: "chat".to_string(),
        };
        assert_eq!(err.code(), Some("DEMO_AI_LIMIT"));
        assert_eq!(err.status(), Some(403));
    }
}
