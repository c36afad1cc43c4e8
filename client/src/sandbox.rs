//! Demo sandbox: mutating calls from demo sessions never reach the backend.

use reqwest::Method;
use serde_json::{Value, json};
use wicket_types::{DEMO_SESSION_TOKEN, Session};

/// Paths demo sessions may still call with a mutating method.
pub const DEFAULT_ALLOWLIST: [&str; 2] = ["/db/test-connection", "/nexus/upload"];

#[derive(Debug, Clone, PartialEq)]
pub enum SandboxDecision {
    Forward,
    /// Answer locally with this payload.
    Intercept(Value),
}

#[derive(Debug, Clone)]
pub struct DemoSandbox {
    demo_token: String,
    allowlist: Vec<String>,
}

impl Default for DemoSandbox {
    fn default() -> Self {
        Self::new(
            DEMO_SESSION_TOKEN,
            DEFAULT_ALLOWLIST.iter().map(ToString::to_string).collect(),
        )
    }
}

impl DemoSandbox {
    #[must_use]
    pub fn new(demo_token: impl Into<String>, allowlist: Vec<String>) -> Self {
        Self {
            demo_token: demo_token.into(),
            allowlist,
        }
    }

    #[must_use]
    pub fn demo_token(&self) -> &str {
        &self.demo_token
    }

    #[must_use]
    pub fn is_mutating(method: &Method) -> bool {
        matches!(
            *method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }

    fn is_allowlisted(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.allowlist
            .iter()
            .any(|allowed| normalize_path(allowed) == path)
    }

    /// Decide for one outgoing request against the session active right now.
    #[must_use]
    pub fn evaluate(&self, method: &Method, path: &str, session: Option<&Session>) -> SandboxDecision {
        let Some(session) = session else {
            return SandboxDecision::Forward;
        };
        if !Self::is_mutating(method)
            || !session.is_demo(&self.demo_token)
            || self.is_allowlisted(path)
        {
            return SandboxDecision::Forward;
        }

        tracing::info!(%method, path, "Demo session: mutating call intercepted");
        SandboxDecision::Intercept(synthetic_success())
    }
}

/// Payload returned in place of an intercepted call.
#[must_use]
pub fn synthetic_success() -> Value {
    json!({ "message": "changes not persisted", "demo": true })
}

/// Query string and trailing slash do not affect allowlist matching.
fn normalize_path(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}
