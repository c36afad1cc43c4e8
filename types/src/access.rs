use std::fmt;

use serde::{Deserialize, Serialize};

/// Stage of the login/access flow. Transient, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessState {
    #[default]
    Idle,
    Authenticating,
    Granted,
    Denied,
    Welcome,
}

impl AccessState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Authenticating => "authenticating",
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Welcome => "welcome",
        }
    }

    /// Whether a new submission may start from this state.
    #[must_use]
    pub const fn accepts_submit(self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl fmt::Display for AccessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
