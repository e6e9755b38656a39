//! The durable metadata store for `pk` stack state.
//!
//! Stack metadata lives in `.pancake/stacks.json`, schema-versioned, with
//! unknown fields preserved round-trip so older `pk` binaries do not destroy
//! newer state. Writes are atomic: serialize to a sibling temp file, fsync,
//! rename over the target, fsync the directory. A lock file serializes whole
//! operations across `pk` processes; readers take lock-free snapshots.

use crate::{
    constants::{JOURNAL_FILE_NAME, LOCK_FILE_NAME, PANCAKE_DIR, STACKS_FILE_NAME},
    errors::{PkError, PkResult},
    tree::{StackTree, TrackedBranch},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

pub mod notes;

/// Current schema version of `stacks.json`.
pub const SCHEMA_VERSION: u32 = 1;

/// The on-disk form of the stack tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StacksFile {
    pub version: u32,
    pub branches: Vec<TrackedBranch>,
    /// Fields written by newer versions of `pk`, preserved round-trip.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StacksFile {
    /// Flattens a [StackTree] into its persisted form. Branch order is the
    /// arena's key order, which keeps writes byte-stable. File-level unknown
    /// fields ride along on the tree and are written back verbatim.
    pub fn from_tree(tree: &StackTree) -> Self {
        Self {
            version: SCHEMA_VERSION,
            branches: tree.branches.values().cloned().collect(),
            extra: tree.extra.clone(),
        }
    }

    /// Rebuilds the in-memory tree. The trunk node is the branch with a null
    /// parent; `trunk_name` from config wins when the file disagrees.
    pub fn into_tree(self, trunk_name: &str) -> PkResult<StackTree> {
        let mut branches: BTreeMap<String, TrackedBranch> = self
            .branches
            .into_iter()
            .map(|b| (b.name.clone(), b))
            .collect();
        if !branches.contains_key(trunk_name) {
            branches.insert(
                trunk_name.to_string(),
                TrackedBranch::new(trunk_name, None, "", None),
            );
        }
        Ok(StackTree {
            trunk_name: trunk_name.to_string(),
            branches,
            extra: self.extra,
        })
    }
}

/// Handle on the `.pancake/` state directory.
pub struct MetadataStore {
    dir: PathBuf,
}

impl MetadataStore {
    pub fn new(repo_root: &Path) -> Self {
        Self {
            dir: repo_root.join(PANCAKE_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stacks_path(&self) -> PathBuf {
        self.dir.join(STACKS_FILE_NAME)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE_NAME)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.dir.join(JOURNAL_FILE_NAME)
    }

    /// Whether the metadata file exists on disk.
    pub fn exists(&self) -> bool {
        self.stacks_path().exists()
    }

    /// Reads the raw stacks file, if present. Parse failures surface as
    /// [PkError::MetadataCorrupt] so callers can offer the notes-based
    /// recovery path.
    pub fn try_load_file(&self) -> PkResult<Option<StacksFile>> {
        let path = self.stacks_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| PkError::MetadataCorrupt(err.to_string()))
    }

    /// Loads the stack tree; a missing file yields a fresh tree containing
    /// only the trunk.
    pub fn load(&self, trunk_name: &str) -> PkResult<StackTree> {
        match self.try_load_file()? {
            Some(file) => file.into_tree(trunk_name),
            None => Ok(StackTree::new(trunk_name)),
        }
    }

    /// Persists the tree with an atomic replace.
    pub fn save(&self, tree: &StackTree) -> PkResult<()> {
        fs::create_dir_all(&self.dir)?;
        let file = StacksFile::from_tree(tree);
        let payload = serde_json::to_string_pretty(&file)?;

        let target = self.stacks_path();
        let tmp = target.with_extension("json.tmp");
        {
            let mut f = File::create(&tmp)?;
            f.write_all(payload.as_bytes())?;
            f.write_all(b"\n")?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &target)?;
        fsync_dir(&self.dir)?;
        Ok(())
    }

    /// Acquires the metadata lock, failing fast with [PkError::Busy] when
    /// another live `pk` process holds it. Locks whose owning pid is gone are
    /// broken after a staleness check on the recorded start time.
    pub fn lock(&self) -> PkResult<LockGuard> {
        fs::create_dir_all(&self.dir)?;
        let path = self.lock_path();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let meta = LockMeta {
                        pid: std::process::id(),
                        started_at: Utc::now(),
                    };
                    file.write_all(serde_json::to_string(&meta)?.as_bytes())?;
                    file.sync_all()?;
                    return Ok(LockGuard {
                        path,
                        released: false,
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    let holder = fs::read_to_string(&path)
                        .ok()
                        .and_then(|raw| serde_json::from_str::<LockMeta>(&raw).ok());
                    match holder {
                        Some(meta) if meta.is_stale() => {
                            // Dead owner; break the lock and retry.
                            fs::remove_file(&path)?;
                            continue;
                        }
                        Some(meta) => return Err(PkError::Busy { pid: meta.pid }),
                        // Unreadable lock: treat as held to stay safe.
                        None => return Err(PkError::Busy { pid: 0 }),
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Contents of `.pancake/lock`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockMeta {
    pid: u32,
    started_at: DateTime<Utc>,
}

impl LockMeta {
    /// A lock is stale when its owning process is gone, confirmed by the
    /// start timestamp being in the past (guards against pid reuse races on
    /// a freshly written lock).
    fn is_stale(&self) -> bool {
        if self.pid == std::process::id() {
            return false;
        }
        if process_alive(self.pid) {
            return false;
        }
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds()
            > 1
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    // No portable liveness probe without extra deps; rely on the timestamp.
    false
}

/// RAII guard over `.pancake/lock`. Dropping releases the lock.
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    pub fn release(mut self) -> PkResult<()> {
        if !self.released {
            fs::remove_file(&self.path)?;
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn fsync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tree::InsertPos;
    use tempfile::TempDir;

    fn store() -> (TempDir, MetadataStore) {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn missing_file_yields_fresh_tree() {
        let (_dir, store) = store();
        let tree = store.load("main").unwrap();
        assert_eq!(tree.trunk_name, "main");
        assert_eq!(tree.branches.len(), 1);
    }

    #[test]
    fn save_and_load_round_trip() {
        let (_dir, store) = store();
        let mut tree = StackTree::new("main");
        tree.insert(
            "main",
            TrackedBranch::new("feat", None, "abc123", Some("def456")),
            InsertPos::Last,
        )
        .unwrap();
        store.save(&tree).unwrap();

        let loaded = store.load("main").unwrap();
        assert_eq!(loaded, tree);
        // No temp file left behind.
        assert!(!store.stacks_path().with_extension("json.tmp").exists());
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let (_dir, store) = store();
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(
            store.stacks_path(),
            r#"{
              "version": 1,
              "future_field": {"nested": true},
              "branches": [
                {"name": "main", "children": ["x"], "head": "m", "created_at": "2026-01-01T00:00:00Z", "pet": "turtle"},
                {"name": "x", "parent": "main", "children": [], "head": "h", "created_at": "2026-01-01T00:00:00Z"}
              ]
            }"#,
        )
        .unwrap();

        let file = store.try_load_file().unwrap().unwrap();
        assert!(file.extra.contains_key("future_field"));
        let tree = file.into_tree("main").unwrap();
        assert_eq!(
            tree.get("main").unwrap().extra.get("pet").unwrap(),
            "turtle"
        );

        // Both the file-level and branch-level unknowns must survive a
        // full load -> save cycle.
        store.save(&tree).unwrap();
        let reloaded = store.try_load_file().unwrap().unwrap();
        assert_eq!(
            reloaded.extra.get("future_field").unwrap(),
            &serde_json::json!({"nested": true})
        );
        assert_eq!(reloaded.branches[0].extra.get("pet").unwrap(), "turtle");
    }

    #[test]
    fn corrupt_file_is_reported_as_such() {
        let (_dir, store) = store();
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.stacks_path(), "{not json").unwrap();
        assert!(matches!(
            store.try_load_file(),
            Err(PkError::MetadataCorrupt(_))
        ));
    }

    #[test]
    fn lock_is_exclusive() {
        let (_dir, store) = store();
        let guard = store.lock().unwrap();
        assert!(matches!(store.lock(), Err(PkError::Busy { .. })));
        guard.release().unwrap();
        store.lock().unwrap();
    }

    #[test]
    fn stale_lock_is_broken() {
        let (_dir, store) = store();
        fs::create_dir_all(store.dir()).unwrap();
        // A pid that cannot be alive, with an old timestamp.
        fs::write(
            store.lock_path(),
            r#"{"pid": 4294967294, "started_at": "2020-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        store.lock().expect("stale lock should be broken");
    }
}
