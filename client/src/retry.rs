//! Retry for idempotent backend reads.
//!
//! `ApiClient` routes GET requests through [`send_with_retry`]. Everything else
//! (credential exchanges, mutations, AI calls) is sent exactly once with
//! [`send_once`].
//!
//! A read is retried when the backend is unreachable or answers 408, 429, 502,
//! 503 or 504. The wait doubles from [`RetryPolicy::base_delay`] up to
//! [`RetryPolicy::max_delay`], or follows a `Retry-After` header given in
//! seconds. All attempts of one call share an `X-Request-ID`.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::debug;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Longest `Retry-After` the client is willing to wait for.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Wait before retry number `retry` (1-based).
    ///
    /// A server-provided wait wins; otherwise the doubled base delay, capped,
    /// with the lower half randomized so parallel clients spread out.
    fn delay(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(wait) = retry_after {
            return wait;
        }
        let doubled = self
            .base_delay
            .saturating_mul(1 << retry.saturating_sub(1).min(16));
        let capped = doubled.min(self.max_delay);
        let half = capped / 2;
        half + half.mul_f64(rand::random::<f64>())
    }
}

/// Statuses worth another attempt on a read.
#[must_use]
pub fn is_transient(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 502 | 503 | 504)
}

/// `Retry-After` as whole seconds, if present and at most 30 s.
#[must_use]
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let seconds: u64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    let wait = Duration::from_secs(seconds);
    (wait <= MAX_RETRY_AFTER).then_some(wait)
}

/// What came back from the backend.
#[derive(Debug)]
pub enum Sent {
    /// A 2xx response.
    Ok(Response),
    /// Any other response, after retries were spent.
    Rejected(Response),
    /// No response at all.
    Unreachable(reqwest::Error),
}

impl Sent {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

fn classify(result: Result<Response, reqwest::Error>) -> Sent {
    match result {
        Ok(response) if response.status().is_success() => Sent::Ok(response),
        Ok(response) => Sent::Rejected(response),
        Err(err) => Sent::Unreachable(err),
    }
}

/// Send one request, no retry.
pub async fn send_once(builder: RequestBuilder) -> Sent {
    classify(builder.send().await)
}

/// Send a read, retrying transient failures per `policy`.
///
/// `build` is called once per attempt since a `RequestBuilder` is consumed by
/// sending.
pub async fn send_with_retry<F>(build: F, policy: &RetryPolicy) -> Sent
where
    F: Fn() -> RequestBuilder,
{
    let request_id = format!("wicket-{}", Uuid::new_v4());
    let mut retry = 0;
    loop {
        let sent = classify(
            build()
                .header(REQUEST_ID_HEADER, request_id.as_str())
                .send()
                .await,
        );

        let server_wait = match &sent {
            Sent::Ok(_) => return sent,
            Sent::Rejected(response) if is_transient(response.status()) => {
                retry_after(response.headers())
            }
            Sent::Unreachable(err) if err.is_connect() || err.is_timeout() => None,
            Sent::Rejected(_) | Sent::Unreachable(_) => return sent,
        };
        if retry >= policy.max_retries {
            return sent;
        }

        retry += 1;
        let wait = policy.delay(retry, server_wait);
        debug!(
            request_id = request_id.as_str(),
            retry,
            wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            "Retrying read"
        );
        tokio::time::sleep(wait).await;
    }
}
