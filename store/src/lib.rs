//! Session persistence for wicket.
//!
//! - [`SessionStore`]: the four session fields in exactly one of two tiers
//! - [`KeyValueTier`]: the tier abstraction, with [`MemoryTier`] and [`FileTier`]
//! - [`DemoQuota`]: per-feature AI counters for demo sessions, swept on logout

mod quota;
mod session;
mod tier;

use std::path::PathBuf;

pub use quota::{DemoQuota, QuotaOutcome};
pub use session::{
    ActiveSession, DEFAULT_COUNTER_PREFIX, DEFAULT_KEY_PREFIX, SessionKeys, SessionStore,
};
pub use tier::{FileTier, KeyValueTier, MemoryTier};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session storage at {} is not accessible: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize session storage: {0}")]
    Serialize(serde_json::Error),
}
