//! Per-feature usage counters for demo sessions.
//!
//! Counters live in the ephemeral tier under the store's counter prefix, so a
//! logout sweeps them together with the session.

use tracing::debug;
use wicket_types::StorageTier;

use crate::{SessionStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaOutcome {
    /// The call may proceed; `remaining` uses are left after this one.
    Granted { used: u32, remaining: u32 },
    Exhausted { limit: u32 },
}

impl QuotaOutcome {
    #[must_use]
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted { .. })
    }
}

/// Counts AI calls per feature against a fixed limit.
#[derive(Debug, Clone)]
pub struct DemoQuota {
    store: SessionStore,
    limit: u32,
}

impl DemoQuota {
    #[must_use]
    pub fn new(store: SessionStore, limit: u32) -> Self {
        Self { store, limit }
    }

    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    pub fn used(&self, feature: &str) -> Result<u32, StoreError> {
        let raw = self
            .store
            .tier(StorageTier::Ephemeral)
            .get(&self.store.counter_key(feature))?;
        // Unparseable counters restart from zero.
        Ok(raw.and_then(|v| v.trim().parse().ok()).unwrap_or(0))
    }

    /// Record one use of `feature` unless the limit is already reached.
    pub fn consume(&self, feature: &str) -> Result<QuotaOutcome, StoreError> {
        let used = self.used(feature)?;
        if used >= self.limit {
            debug!(feature, used, limit = self.limit, "Demo quota exhausted");
            return Ok(QuotaOutcome::Exhausted { limit: self.limit });
        }

        let used = used + 1;
        let key = self.store.counter_key(feature);
        self.store
            .tier(StorageTier::Ephemeral)
            .put_all(&[(key.as_str(), used.to_string().as_str())])?;
        debug!(feature, used, limit = self.limit, "Demo quota consumed");
        Ok(QuotaOutcome::Granted {
            used,
            remaining: self.limit - used,
        })
    }
}
