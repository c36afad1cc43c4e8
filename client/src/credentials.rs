//! Credential exchanges: login, registration, demo login and developer unlock.
//!
//! None of these calls are retried. A failed exchange is reported once with a
//! [`ClientError`] whose message can be shown as-is.

use std::future::Future;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use wicket_types::{Credential, RegistrationProfile, Role, Session, SessionToken, SubscriptionStatus};

use crate::error::{ClientError, ErrorDetail};
use crate::retry::{Sent, send_once};
use crate::{Backend, read_capped_error_body};

pub const LOGIN_PATH: &str = "/login";
pub const REGISTER_PATH: &str = "/register";
pub const DEMO_LOGIN_PATH: &str = "/auth/demo";
pub const DEV_UNLOCK_PATH: &str = "/internal/dev/unlock";
pub const DEV_SECRET_HEADER: &str = "X-Internal-Dev-Secret";

const DEVELOPER_DISPLAY_NAME: &str = "Developer Session";
const DEMO_DISPLAY_NAME: &str = "Demo Session";

/// The credential exchanges the access flow depends on.
pub trait Authenticator: Send + Sync + 'static {
    fn login(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<Session, ClientError>> + Send;

    /// Create an account. Does not establish a session.
    fn register(
        &self,
        profile: &RegistrationProfile,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn demo_login(&self, role: &Role) -> impl Future<Output = Result<Session, ClientError>> + Send;

    /// Privileged channel; the returned session is always role `developer`.
    fn developer_unlock(
        &self,
        identifier: &str,
        secret: &str,
    ) -> impl Future<Output = Result<Session, ClientError>> + Send;
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct DemoRequest<'a> {
    role: &'a str,
}

#[derive(Debug, Serialize)]
struct DevUnlockRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    password: &'a str,
    name: &'a str,
    role: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    grade_level: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    child_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    invite_code: Option<String>,
}

impl<'a> RegisterRequest<'a> {
    fn from_profile(profile: &'a RegistrationProfile) -> Self {
        let (email, phone) = profile.contact();
        let fields = profile.role_fields();
        Self {
            username: profile.credential.identifier.as_str(),
            password: profile.credential.expose_secret(),
            name: profile.display_name.as_str(),
            role: profile.role.as_str(),
            email,
            phone,
            grade_level: fields.grade_level,
            class_name: fields.class_name,
            subject: fields.subject,
            child_name: fields.child_name,
            invite_code: fields.invite_code,
        }
    }
}

/// Token response. Every field is optional on the wire; defaults are applied
/// per exchange.
#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    role: Option<String>,
    name: Option<String>,
    subscription_status: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| {
        let v = v.trim();
        !v.is_empty() && v != "null" && v != "undefined"
    })
}

impl TokenResponse {
    fn token(&mut self, status: StatusCode) -> Result<SessionToken, ClientError> {
        present(self.access_token.take())
            .map(SessionToken::new)
            .ok_or_else(|| ClientError::Server {
                status: status.as_u16(),
                message: "The server response did not include an access token.".to_string(),
            })
    }
}

// ============================================================================
// CredentialClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct CredentialClient {
    backend: Backend,
}

/// Which exchange a failure came from; decides the error mapping.
#[derive(Debug, Clone, Copy)]
enum Exchange {
    Login,
    Demo,
    Register,
    DevUnlock,
}

impl Exchange {
    const fn fallback_message(self) -> &'static str {
        match self {
            Self::Login => "Authentication failed",
            Self::Demo => "Demo authentication failed",
            Self::Register => "Registration failed",
            Self::DevUnlock => "Developer unlock failed",
        }
    }

    fn map_status(self, status: StatusCode, detail: &ErrorDetail) -> ClientError {
        let message = detail.message_or(self.fallback_message());
        match (self, status.as_u16()) {
            (Self::Login | Self::Demo, 401) => ClientError::InvalidCredentials,
            (Self::Login | Self::Demo | Self::Register, 429) => ClientError::RateLimited,
            (Self::DevUnlock, 401 | 403) => ClientError::Unauthorized {
                message: detail.message_or("Invalid developer secret."),
            },
            // Sign-up is unauthenticated, so a 401 there is a backend fault.
            (Self::Register, 400..=499) if status != StatusCode::UNAUTHORIZED => {
                ClientError::ValidationFailed { message }
            }
            (_, code) => ClientError::Server {
                status: code,
                message,
            },
        }
    }
}

impl CredentialClient {
    #[must_use]
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    async fn exchange<B: Serialize + ?Sized>(
        &self,
        kind: Exchange,
        path: &str,
        body: &B,
        secret: Option<&str>,
    ) -> Result<(StatusCode, reqwest::Response), ClientError> {
        let mut builder = self.backend.http().post(self.backend.url(path)).json(body);
        if let Some(secret) = secret {
            builder = builder.header(DEV_SECRET_HEADER, secret);
        }

        match send_once(builder).await {
            Sent::Ok(response) => Ok((response.status(), response)),
            Sent::Rejected(response) => {
                let status = response.status();
                let body = read_capped_error_body(response).await;
                let detail = ErrorDetail::parse(&body);
                debug!(path, status = status.as_u16(), ?kind, "Credential exchange rejected");
                Err(kind.map_status(status, &detail))
            }
            Sent::Unreachable(source) => {
                debug!(path, error = %source, "Credential exchange transport failure");
                Err(ClientError::Network { source })
            }
        }
    }

    async fn token_exchange<B: Serialize + ?Sized>(
        &self,
        kind: Exchange,
        path: &str,
        body: &B,
        secret: Option<&str>,
    ) -> Result<(StatusCode, TokenResponse), ClientError> {
        let (status, response) = self.exchange(kind, path, body, secret).await?;
        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|_| ClientError::Server {
                status: status.as_u16(),
                message: "Unexpected response from server.".to_string(),
            })?;
        Ok((status, token))
    }
}

impl Authenticator for CredentialClient {
    async fn login(&self, credential: &Credential) -> Result<Session, ClientError> {
        let body = LoginRequest {
            username: credential.identifier.as_str(),
            password: credential.expose_secret(),
        };
        let (status, mut response) = self
            .token_exchange(Exchange::Login, LOGIN_PATH, &body, None)
            .await?;

        let session = Session::new(
            response.token(status)?,
            Role::new(&present(response.role).unwrap_or_default()),
            present(response.name).unwrap_or_else(|| credential.identifier.to_string()),
            present(response.subscription_status)
                .map_or_else(SubscriptionStatus::free, |s| SubscriptionStatus::new(&s)),
        );
        info!(
            role = session.role.as_str(),
            subscription = session.subscription.as_str(),
            "Login succeeded"
        );
        Ok(session)
    }

    async fn register(&self, profile: &RegistrationProfile) -> Result<(), ClientError> {
        let body = RegisterRequest::from_profile(profile);
        self.exchange(Exchange::Register, REGISTER_PATH, &body, None)
            .await?;
        info!(role = profile.role.as_str(), "Registration accepted");
        Ok(())
    }

    async fn demo_login(&self, role: &Role) -> Result<Session, ClientError> {
        let requested = if role.as_str().is_empty() {
            Role::new(Role::DEMO)
        } else {
            role.clone()
        };
        let body = DemoRequest {
            role: requested.as_str(),
        };
        let (status, mut response) = self
            .token_exchange(Exchange::Demo, DEMO_LOGIN_PATH, &body, None)
            .await?;

        let session = Session::new(
            response.token(status)?,
            present(response.role).map_or(requested, |r| Role::new(&r)),
            present(response.name).unwrap_or_else(|| DEMO_DISPLAY_NAME.to_string()),
            present(response.subscription_status)
                .map_or_else(SubscriptionStatus::demo, |s| SubscriptionStatus::new(&s)),
        );
        info!(role = session.role.as_str(), "Demo login succeeded");
        Ok(session)
    }

    async fn developer_unlock(&self, identifier: &str, secret: &str) -> Result<Session, ClientError> {
        let body = DevUnlockRequest { email: identifier };
        let (status, mut response) = self
            .token_exchange(Exchange::DevUnlock, DEV_UNLOCK_PATH, &body, Some(secret))
            .await?;

        info!("Developer unlock succeeded");
        Ok(Session::new(
            response.token(status)?,
            Role::developer(),
            DEVELOPER_DISPLAY_NAME,
            SubscriptionStatus::active(),
        ))
    }
}
