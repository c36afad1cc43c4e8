//! Authenticated backend calls.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use wicket_store::{DemoQuota, QuotaOutcome, SessionStore};
use wicket_types::Session;

use crate::demo::canned_response;
use crate::error::{ClientError, ErrorDetail};
use crate::events::{AccessEvent, AccessEvents};
use crate::retry::{RetryPolicy, Sent, send_once, send_with_retry};
use crate::sandbox::{DemoSandbox, SandboxDecision};
use crate::{Backend, DEMO_AI_LIMIT_CODE, read_capped_error_body};

const DEFAULT_AI_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_AI_QUOTA: u32 = 3;

/// Body fields that may carry the user's question for an AI call.
const QUERY_FIELDS: [&str; 4] = ["query", "message", "question", "prompt"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestClass {
    Standard,
    /// AI-backed call: bounded by the AI timeout and answered locally for
    /// demo-like sessions.
    Ai { feature: String },
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub class: RequestClass,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            class: RequestClass::Standard,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// `POST` to an AI endpoint.
    #[must_use]
    pub fn ai(feature: impl Into<String>, path: impl Into<String>, body: Value) -> Self {
        Self {
            class: RequestClass::Ai {
                feature: feature.into(),
            },
            ..Self::post(path, body)
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    fn query(&self) -> &str {
        self.body
            .as_ref()
            .and_then(|body| {
                QUERY_FIELDS
                    .iter()
                    .find_map(|field| body.get(field).and_then(Value::as_str))
            })
            .unwrap_or_default()
    }
}

/// Outbound choke point for every authenticated call.
///
/// The active session is read from the store on every call, never cached.
#[derive(Debug, Clone)]
pub struct ApiClient {
    backend: Backend,
    store: SessionStore,
    sandbox: DemoSandbox,
    events: AccessEvents,
    quota: DemoQuota,
    retry: RetryPolicy,
    ai_timeout: Duration,
}

impl ApiClient {
    #[must_use]
    pub fn new(backend: Backend, store: SessionStore) -> Self {
        Self {
            backend,
            quota: DemoQuota::new(store.clone(), DEFAULT_AI_QUOTA),
            store,
            sandbox: DemoSandbox::default(),
            events: AccessEvents::new(),
            retry: RetryPolicy::default(),
            ai_timeout: DEFAULT_AI_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_sandbox(mut self, sandbox: DemoSandbox) -> Self {
        self.sandbox = sandbox;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: AccessEvents) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn with_ai_quota(mut self, limit: u32) -> Self {
        self.quota = DemoQuota::new(self.store.clone(), limit);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_ai_timeout(mut self, timeout: Duration) -> Self {
        self.ai_timeout = timeout;
        self
    }

    #[must_use]
    pub fn events(&self) -> &AccessEvents {
        &self.events
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Tell the backend the session is over, then clear it locally.
    ///
    /// The local clear happens even when the backend call fails.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let session = self.store.read()?.map(|active| active.session);
        if let Some(session) = session.as_ref()
            && !session.is_demo(self.sandbox.demo_token())
        {
            let request = ApiRequest::new(Method::POST, "/auth/logout");
            let outcome = send_once(self.build(&request, Some(session))).await;
            if !outcome.is_ok() {
                debug!("Backend logout did not succeed; clearing locally");
            }
        }
        self.store.clear()?;
        Ok(())
    }

    /// Send one request on behalf of the active session.
    ///
    /// Returns the parsed JSON body (`Value::Null` for an empty body), a local
    /// answer for sandboxed or demo AI calls, or a [`ClientError`].
    pub async fn send(&self, request: ApiRequest) -> Result<Value, ClientError> {
        let session = self.store.read()?.map(|active| active.session);

        if let RequestClass::Ai { feature } = &request.class {
            if let Some(active) = session.as_ref()
                && active.is_demo_like(self.sandbox.demo_token())
            {
                return self.answer_demo_ai(feature, request.query());
            }

            let exchange = async {
                let outcome = send_once(self.build(&request, session.as_ref())).await;
                self.handle(outcome, session.as_ref()).await
            };
            return match tokio::time::timeout(self.ai_timeout, exchange).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(feature = feature.as_str(), path = %request.path, "AI request timed out");
                    Err(ClientError::Timeout(self.ai_timeout))
                }
            };
        }

        if let SandboxDecision::Intercept(payload) =
            self.sandbox
                .evaluate(&request.method, &request.path, session.as_ref())
        {
            return Ok(payload);
        }

        let outcome = if request.method == Method::GET {
            send_with_retry(|| self.build(&request, session.as_ref()), &self.retry).await
        } else {
            send_once(self.build(&request, session.as_ref())).await
        };
        self.handle(outcome, session.as_ref()).await
    }

    fn build(&self, request: &ApiRequest, session: Option<&Session>) -> RequestBuilder {
        let mut builder = self
            .backend
            .http()
            .request(request.method.clone(), self.backend.url(&request.path));
        if let Some(session) = session {
            builder = builder.bearer_auth(session.token.expose_secret());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder
    }

    fn answer_demo_ai(&self, feature: &str, query: &str) -> Result<Value, ClientError> {
        match self.quota.consume(feature)? {
            QuotaOutcome::Granted { remaining, .. } => {
                info!(feature, remaining, "Demo AI call answered locally");
                Ok(json!({ "response": canned_response(feature, query), "demo": true }))
            }
            QuotaOutcome::Exhausted { limit } => {
                info!(feature, limit, "Demo AI quota exhausted");
                self.events.publish(AccessEvent::paywall(DEMO_AI_LIMIT_CODE));
                Err(ClientError::QuotaExhausted {
                    feature: feature.to_string(),
                })
            }
        }
    }

    async fn handle(
        &self,
        outcome: Sent,
        session: Option<&Session>,
    ) -> Result<Value, ClientError> {
        let response = match outcome {
            Sent::Ok(response) => return parse_success(response).await,
            Sent::Rejected(response) => response,
            Sent::Unreachable(source) => return Err(ClientError::Network { source }),
        };

        let status = response.status();
        let body = read_capped_error_body(response).await;
        let detail = ErrorDetail::parse(&body);

        if status == StatusCode::UNAUTHORIZED {
            self.on_unauthorized(session)?;
        } else if status == StatusCode::FORBIDDEN
            && let Some(code) = &detail.code
        {
            self.events.publish(AccessEvent::paywall(code.clone()));
        }

        Err(ClientError::Http {
            status: status.as_u16(),
            message: detail.message_or(status.canonical_reason().unwrap_or("Request failed")),
            code: detail.code,
        })
    }

    /// A 401 invalidates the session that made the call, unless it is a demo
    /// session or a different session has been stored since.
    fn on_unauthorized(&self, sent_with: Option<&Session>) -> Result<(), ClientError> {
        if let Some(session) = sent_with
            && session.is_demo(self.sandbox.demo_token())
        {
            warn!("Demo session call returned 401; keeping session");
            return Ok(());
        }

        let current = self.store.read()?.map(|active| active.session);
        let replaced = matches!(
            (sent_with, current.as_ref()),
            (Some(sent), Some(current)) if sent.token != current.token
        );
        if replaced {
            debug!("401 for a replaced session; ignoring");
            return Ok(());
        }

        self.store.clear()?;
        self.events.publish(AccessEvent::unauthorized());
        Ok(())
    }
}

async fn parse_success(response: reqwest::Response) -> Result<Value, ClientError> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|source| ClientError::Network { source })?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|_| ClientError::Server {
        status: status.as_u16(),
        message: "Unexpected response from server.".to_string(),
    })
}
