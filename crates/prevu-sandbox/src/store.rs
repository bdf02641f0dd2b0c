//! The persistent mock data store.
//!
//! One store per preview session, created before the first sandbox mount
//! and re-attached — by reference, not copied — to every subsequent sandbox
//! instance, so mutations survive remounts. In durable mode every mutating
//! call also snapshots the whole map to a JSON file keyed by project
//! identity, so data survives a full host restart as well. The store is
//! dropped when the session ends.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;

/// Snapshot format version.
const STORE_SCHEMA_VERSION: u32 = 1;

/// Shared handle to one session's store. The only resource intentionally
/// shared across sandbox remounts.
pub type SharedStore = Rc<RefCell<PersistentStore>>;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    values: BTreeMap<String, serde_json::Value>,
}

/// String-keyed JSON document store.
#[derive(Debug, Default)]
pub struct PersistentStore {
    values: BTreeMap<String, serde_json::Value>,
    snapshot_path: Option<PathBuf>,
}

impl PersistentStore {
    /// A store that lives only as long as the session.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// A durable store snapshotted under the platform data directory,
    /// keyed by project identity. Existing contents are loaded eagerly.
    #[must_use]
    pub fn durable(project_id: &str) -> Self {
        Self::durable_at(store_dir().join(format!("{project_id}.json")))
    }

    /// A durable store at an explicit snapshot path.
    #[must_use]
    pub fn durable_at(path: PathBuf) -> Self {
        let values = load_snapshot(&path).unwrap_or_default();
        Self {
            values,
            snapshot_path: Some(path),
        }
    }

    /// Wrap into the shared handle passed to sandboxes.
    #[must_use]
    pub fn shared(self) -> SharedStore {
        Rc::new(RefCell::new(self))
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.values.get(key).cloned()
    }

    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.values.insert(key.into(), value);
        self.flush();
    }

    /// Remove a key. Returns `true` if it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        let existed = self.values.remove(key).is_some();
        if existed {
            self.flush();
        }
        existed
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Write the snapshot if this store is durable. Mutations are already
    /// serialized by the single-threaded session, so each flush sees a
    /// complete map — never a half-applied statement.
    fn flush(&self) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        let snapshot = Snapshot {
            version: STORE_SCHEMA_VERSION,
            values: self.values.clone(),
        };
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let data = serde_json::to_vec(&snapshot)?;
            std::fs::write(path, data)
        })();
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "failed to flush store snapshot");
        }
    }
}

fn load_snapshot(path: &std::path::Path) -> Option<BTreeMap<String, serde_json::Value>> {
    let data = std::fs::read(path).ok()?;
    let snapshot: Snapshot = serde_json::from_slice(&data).ok()?;
    if snapshot.version != STORE_SCHEMA_VERSION {
        tracing::warn!(path = %path.display(), version = snapshot.version, "ignoring store snapshot with unknown version");
        return None;
    }
    Some(snapshot.values)
}

/// Platform data directory for store snapshots.
fn store_dir() -> PathBuf {
    let base = dirs_next::data_dir().map_or_else(
        || {
            dirs_next::home_dir().map_or_else(
                || PathBuf::from(".prevu-data"),
                |p| p.join(".local").join("share").join("prevu"),
            )
        },
        |p| p.join("prevu"),
    );
    base.join("store")
}
