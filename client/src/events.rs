//! Access events published when the backend rejects the active session.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 32;

/// `{type: "auth", status: 401}` or `{type: "paywall", status: 403, code}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AccessEvent {
    /// The session was invalidated and cleared.
    Auth { status: u16 },
    /// The session lacks the entitlement named by `code`.
    Paywall { status: u16, code: String },
}

impl AccessEvent {
    #[must_use]
    pub const fn unauthorized() -> Self {
        Self::Auth { status: 401 }
    }

    #[must_use]
    pub fn paywall(code: impl Into<String>) -> Self {
        Self::Paywall {
            status: 403,
            code: code.into(),
        }
    }
}

/// Broadcast bus for [`AccessEvent`]s. Clones publish to the same subscribers.
#[derive(Debug, Clone)]
pub struct AccessEvents {
    tx: broadcast::Sender<AccessEvent>,
}

impl Default for AccessEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessEvents {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AccessEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: AccessEvent) {
        tracing::info!(?event, "Access event");
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}
