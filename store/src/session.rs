use std::sync::Arc;

use tracing::{info, warn};
use wicket_types::{Role, Session, SessionToken, StorageTier, SubscriptionStatus};

use crate::StoreError;
use crate::tier::{KeyValueTier, MemoryTier};

pub const DEFAULT_KEY_PREFIX: &str = "wicket_";
pub const DEFAULT_COUNTER_PREFIX: &str = "wicket_demo_ai_quota:";

/// Storage serialization artifacts that mean "no value".
const ABSENT_MARKERS: [&str; 2] = ["null", "undefined"];

/// Names of the four session keys under a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeys {
    pub token: String,
    pub role: String,
    pub user: String,
    pub subscription: String,
}

impl SessionKeys {
    #[must_use]
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            token: format!("{prefix}token"),
            role: format!("{prefix}role"),
            user: format!("{prefix}user"),
            subscription: format!("{prefix}subscription"),
        }
    }

    #[must_use]
    pub fn all(&self) -> [&str; 4] {
        [&self.token, &self.role, &self.user, &self.subscription]
    }
}

/// A stored session and the tier it was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub session: Session,
    pub tier: StorageTier,
}

/// Dual-tier session persistence.
///
/// Exactly one tier holds the active session: [`SessionStore::write`] removes
/// the session keys from the other tier in the same call. Cheap to clone; all
/// clones share the same tiers.
#[derive(Clone)]
pub struct SessionStore {
    ephemeral: Arc<dyn KeyValueTier>,
    persistent: Arc<dyn KeyValueTier>,
    keys: SessionKeys,
    counter_prefix: String,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("keys", &self.keys)
            .field("counter_prefix", &self.counter_prefix)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new(ephemeral: Arc<dyn KeyValueTier>, persistent: Arc<dyn KeyValueTier>) -> Self {
        Self {
            ephemeral,
            persistent,
            keys: SessionKeys::with_prefix(DEFAULT_KEY_PREFIX),
            counter_prefix: DEFAULT_COUNTER_PREFIX.to_string(),
        }
    }

    /// Both tiers in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryTier::new()), Arc::new(MemoryTier::new()))
    }

    #[must_use]
    pub fn with_key_prefix(mut self, prefix: &str) -> Self {
        self.keys = SessionKeys::with_prefix(prefix);
        self
    }

    #[must_use]
    pub fn with_counter_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.counter_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    #[must_use]
    pub fn counter_prefix(&self) -> &str {
        &self.counter_prefix
    }

    #[must_use]
    pub fn tier(&self, tier: StorageTier) -> &dyn KeyValueTier {
        match tier {
            StorageTier::Ephemeral => self.ephemeral.as_ref(),
            StorageTier::Persistent => self.persistent.as_ref(),
        }
    }

    /// Store all four fields into `tier` and drop them from the other tier.
    pub fn write(&self, session: &Session, tier: StorageTier) -> Result<(), StoreError> {
        self.tier(tier).put_all(&[
            (self.keys.token.as_str(), session.token.expose_secret()),
            (self.keys.role.as_str(), session.role.as_str()),
            (self.keys.user.as_str(), session.display_name.as_str()),
            (self.keys.subscription.as_str(), session.subscription.as_str()),
        ])?;
        self.tier(tier.other()).remove_all(&self.keys.all())?;
        info!(
            tier = tier.as_str(),
            role = session.role.as_str(),
            subscription = session.subscription.as_str(),
            "Session stored"
        );
        Ok(())
    }

    /// The active session, ephemeral tier first.
    ///
    /// A tier counts as holding a session only when its token is non-blank and
    /// not a `"null"`/`"undefined"` artifact.
    pub fn read(&self) -> Result<Option<ActiveSession>, StoreError> {
        for tier in [StorageTier::Ephemeral, StorageTier::Persistent] {
            if let Some(session) = self.read_tier(tier)? {
                return Ok(Some(ActiveSession { session, tier }));
            }
        }
        Ok(None)
    }

    fn read_tier(&self, tier: StorageTier) -> Result<Option<Session>, StoreError> {
        let store = self.tier(tier);
        let Some(token) = present(store.get(&self.keys.token)?) else {
            return Ok(None);
        };

        let mut missing = Vec::new();
        let mut field = |key: &str| -> Result<String, StoreError> {
            Ok(present(store.get(key)?).unwrap_or_else(|| {
                missing.push(key.to_string());
                String::new()
            }))
        };
        let role = field(&self.keys.role)?;
        let user = field(&self.keys.user)?;
        let subscription = field(&self.keys.subscription)?;
        if !missing.is_empty() {
            warn!(
                tier = tier.as_str(),
                ?missing,
                "Session token present without companion fields"
            );
        }

        Ok(Some(Session::new(
            SessionToken::new(token),
            Role::new(&role),
            user,
            SubscriptionStatus::new(&subscription),
        )))
    }

    /// Remove the session from both tiers plus every counter key.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut swept = 0;
        for tier in [StorageTier::Ephemeral, StorageTier::Persistent] {
            let store = self.tier(tier);
            store.remove_all(&self.keys.all())?;
            swept += store.remove_prefix(&self.counter_prefix)?;
        }
        info!(counters = swept, "Session cleared");
        Ok(())
    }

    pub(crate) fn counter_key(&self, feature: &str) -> String {
        format!("{}{feature}", self.counter_prefix)
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| {
        let trimmed = v.trim();
        !trimmed.is_empty() && !ABSENT_MARKERS.contains(&trimmed)
    })
}
