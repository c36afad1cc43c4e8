//! Backend clients for wicket.
//!
//! # Architecture
//!
//! - [`CredentialClient`] - login, registration, demo login and developer unlock;
//!   implements [`Authenticator`], the seam the access flow is generic over
//! - [`ApiClient`] - the single choke point for authenticated calls. Every call
//!   re-reads the active session, passes through the [`DemoSandbox`], and turns
//!   401/403 responses into [`AccessEvent`]s
//! - [`retry`] - backoff policy for idempotent calls
//!
//! # Error Handling
//!
//! Every failure is a [`ClientError`]. Error bodies are read with a size cap and
//! reduced to a message and an optional structured code (see [`ErrorDetail`]).

mod api;
mod credentials;
mod demo;
mod error;
mod events;
pub mod retry;
mod sandbox;

use std::time::Duration;

pub use api::{ApiClient, ApiRequest, RequestClass};
pub use credentials::{
    Authenticator, CredentialClient, DEMO_LOGIN_PATH, DEV_SECRET_HEADER, DEV_UNLOCK_PATH,
    LOGIN_PATH, REGISTER_PATH,
};
pub use demo::canned_response;
pub use error::{ClientError, ErrorDetail};
pub use events::{AccessEvent, AccessEvents};
pub use sandbox::{DEFAULT_ALLOWLIST, DemoSandbox, SandboxDecision, synthetic_success};

/// Paywall code emitted when a demo session runs out of AI calls.
pub const DEMO_AI_LIMIT_CODE: &str = "DEMO_AI_LIMIT";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_MAX_IDLE_PER_HOST: usize = 16;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

fn base_client_builder(connect_timeout: Duration) -> reqwest::ClientBuilder {
    use reqwest::header::{HeaderMap, HeaderValue};

    let mut default_headers = HeaderMap::new();
    default_headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_static(concat!("wicket/", env!("CARGO_PKG_VERSION"))),
    );

    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
        .default_headers(default_headers)
}

/// HTTP client bound to one backend base URL.
#[derive(Debug, Clone)]
pub struct Backend {
    http: reqwest::Client,
    base_url: String,
}

impl Backend {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        Self::with_connect_timeout(base_url, Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
    }

    pub fn with_connect_timeout(
        base_url: &str,
        connect_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = base_client_builder(connect_timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `path` is appended verbatim, so a base URL with a path prefix
    /// (`https://host/api`) keeps it.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }
}

/// Read at most 32 KiB of an error response body.
pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}
