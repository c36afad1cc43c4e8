//! Session value types.
//!
//! A [`Session`] is the four-field record the store persists: token, role,
//! display name and subscription status. Role and subscription status are kept
//! normalized (trimmed, ASCII-lowercased) so every comparison downstream is a
//! plain string match.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed token handed out to sandboxed demo sessions.
///
/// A session carrying this token is a demo session regardless of its role.
pub const DEMO_SESSION_TOKEN: &str = "demo_session_token";

// ============================================================================
// SessionToken
// ============================================================================

/// Bearer token for the active session.
///
/// `Debug` is manually implemented to redact the value, preventing accidental
/// credential disclosure in logs or error messages.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken(<redacted>)")
    }
}

impl SessionToken {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

// ============================================================================
// Role & SubscriptionStatus
// ============================================================================

/// Normalized account role (`teacher`, `student`, `admin`, `demo`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Role(String);

impl Role {
    pub const DEVELOPER: &'static str = "developer";
    pub const OWNER: &'static str = "owner";
    pub const ADMIN: &'static str = "admin";
    pub const DEMO: &'static str = "demo";

    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_lowercase())
    }

    #[must_use]
    pub fn developer() -> Self {
        Self(Self::DEVELOPER.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Roles that are always admitted, whatever the subscription says.
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        matches!(self.0.as_str(), Self::DEVELOPER | Self::OWNER | Self::ADMIN)
    }

    #[must_use]
    pub fn is_demo(&self) -> bool {
        self.0 == Self::DEMO
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized billing state reported by the backend (`active`, `free`, `demo`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SubscriptionStatus(String);

impl SubscriptionStatus {
    pub const FREE: &'static str = "free";
    pub const DEMO: &'static str = "demo";
    pub const ACTIVE: &'static str = "active";

    /// Statuses that admit a session into the protected area.
    pub const ENTITLED: [&'static str; 5] = ["active", "enterprise", "pro", "basic", "demo"];

    /// Statuses treated as "not really paying" for AI feature gating.
    const DEMO_LIKE: [&'static str; 7] =
        ["", "demo", "free", "visitor", "expired", "inactive", "trial"];

    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_lowercase())
    }

    #[must_use]
    pub fn free() -> Self {
        Self(Self::FREE.to_string())
    }

    #[must_use]
    pub fn demo() -> Self {
        Self(Self::DEMO.to_string())
    }

    #[must_use]
    pub fn active() -> Self {
        Self(Self::ACTIVE.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_entitled(&self) -> bool {
        Self::ENTITLED.contains(&self.0.as_str())
    }

    #[must_use]
    pub fn is_demo_like(&self) -> bool {
        Self::DEMO_LIKE.contains(&self.0.as_str())
    }
}

impl From<String> for SubscriptionStatus {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for SubscriptionStatus {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<SubscriptionStatus> for String {
    fn from(value: SubscriptionStatus) -> Self {
        value.0
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// StorageTier & Session
// ============================================================================

/// Where a session lives. Exactly one tier holds the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageTier {
    /// Dropped when the hosting process/browsing session ends.
    Ephemeral,
    /// Survives restarts.
    Persistent,
}

impl StorageTier {
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Ephemeral => Self::Persistent,
            Self::Persistent => Self::Ephemeral,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ephemeral => "ephemeral",
            Self::Persistent => "persistent",
        }
    }

    /// Tier chosen by a "remember me" preference.
    #[must_use]
    pub const fn from_remember_me(remember: bool) -> Self {
        if remember {
            Self::Persistent
        } else {
            Self::Ephemeral
        }
    }
}

impl fmt::Display for StorageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: SessionToken,
    pub role: Role,
    pub display_name: String,
    pub subscription: SubscriptionStatus,
}

impl Session {
    #[must_use]
    pub fn new(
        token: SessionToken,
        role: Role,
        display_name: impl Into<String>,
        subscription: SubscriptionStatus,
    ) -> Self {
        Self {
            token,
            role,
            display_name: display_name.into(),
            subscription,
        }
    }

    /// A demo session carries the sentinel token or the `demo` role.
    #[must_use]
    pub fn is_demo(&self, demo_token: &str) -> bool {
        self.token.expose_secret() == demo_token || self.role.is_demo()
    }

    /// Demo sessions plus sessions whose subscription is not a paying one.
    #[must_use]
    pub fn is_demo_like(&self, demo_token: &str) -> bool {
        self.is_demo(demo_token) || self.subscription.is_demo_like()
    }
}
