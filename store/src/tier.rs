//! Key/value storage tiers.
//!
//! A tier is a flat string map. [`MemoryTier`] lives only as long as the
//! process; [`FileTier`] is a JSON object on disk rewritten atomically on
//! every mutation.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use wicket_utils::{atomic_write, recover_bak_file};

use crate::StoreError;

/// A flat string map backing one storage tier.
///
/// Multi-key mutations are applied as a single unit: a reader never observes
/// half of a `put_all`.
pub trait KeyValueTier: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn put_all(&self, entries: &[(&str, &str)]) -> Result<(), StoreError>;

    fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError>;

    /// Remove every key starting with `prefix`, returning how many were removed.
    fn remove_prefix(&self, prefix: &str) -> Result<usize, StoreError>;

    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn remove_matching(map: &mut BTreeMap<String, String>, prefix: &str) -> usize {
    let before = map.len();
    map.retain(|key, _| !key.starts_with(prefix));
    before - map.len()
}

// ============================================================================
// MemoryTier
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryTier {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryTier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueTier for MemoryTier {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn put_all(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut map = lock(&self.entries);
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut map = lock(&self.entries);
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }

    fn remove_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        Ok(remove_matching(&mut lock(&self.entries), prefix))
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(lock(&self.entries).keys().cloned().collect())
    }
}

// ============================================================================
// FileTier
// ============================================================================

/// JSON-object file tier. The file is re-read on every access so edits made by
/// another process are picked up (last write wins).
#[derive(Debug)]
pub struct FileTier {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileTier {
    /// Open the tier at `path`, restoring a backup left by an interrupted write.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        recover_bak_file(&path);
        Self {
            path,
            guard: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        match serde_json::from_str(&content) {
            Ok(map) => Ok(map),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "Ignoring malformed session file: {err}"
                );
                Ok(BTreeMap::new())
            }
        }
    }

    fn save(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(map).map_err(StoreError::Serialize)?;
        atomic_write(&self.path, &bytes).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> R,
    ) -> Result<R, StoreError> {
        let _guard = lock(&self.guard);
        let mut map = self.load()?;
        let before = map.clone();
        let out = f(&mut map);
        if map != before {
            self.save(&map)?;
        }
        Ok(out)
    }
}

impl KeyValueTier for FileTier {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = lock(&self.guard);
        Ok(self.load()?.remove(key))
    }

    fn put_all(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        self.mutate(|map| {
            for (key, value) in entries {
                map.insert((*key).to_string(), (*value).to_string());
            }
        })
    }

    fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError> {
        self.mutate(|map| {
            for key in keys {
                map.remove(*key);
            }
        })
    }

    fn remove_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        self.mutate(|map| remove_matching(map, prefix))
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let _guard = lock(&self.guard);
        Ok(self.load()?.into_keys().collect())
    }
}
