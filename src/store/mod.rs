// Copyright (c) 2024-2025 Swipegate Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! User/vote store.
//!
//! The core only ever needs the narrow [`UserStore`] contract: two lookup
//! predicates and two mutators, all safe to call with an id that has never
//! been seen (unknown ids read as `false`). Every method is fallible so a
//! remote or file-backed store degrades fail-closed — a lookup error is a
//! denial, never a grant.
//!
//! Two implementations ship: [`MemoryStore`] for tests and embedding, and
//! [`JsonStore`], which persists the same map as a JSON file guarded by an
//! exclusive file lock so two kiosk processes cannot interleave writes.

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::thread;
use std::time::{Duration, Instant};

use crate::security::{resilient_read, resilient_write};
use crate::types::CardId;

/// How long to keep retrying for the store file lock before giving up.
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Per-card record held by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub is_admin: bool,
    pub has_voted: bool,
}

/// The narrow store contract the access core depends on.
pub trait UserStore: Send + Sync {
    fn is_admin(&self, id: &CardId) -> Result<bool>;
    fn has_voted(&self, id: &CardId) -> Result<bool>;
    fn set_admin(&self, id: &CardId, value: bool) -> Result<()>;
    fn set_voted(&self, id: &CardId, value: bool) -> Result<()>;
}

/// In-memory store. Insertion order is preserved so exports list cards in
/// enrollment order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<IndexMap<String, UserRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cards the store has seen.
    pub fn len(&self) -> usize {
        resilient_read(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, id: &CardId) -> UserRecord {
        resilient_read(&self.records)
            .get(id.as_str())
            .copied()
            .unwrap_or_default()
    }

    fn update(&self, id: &CardId, f: impl FnOnce(&mut UserRecord)) {
        let mut records = resilient_write(&self.records);
        let record = records.entry(id.as_str().to_string()).or_default();
        f(record);
    }
}

impl UserStore for MemoryStore {
    fn is_admin(&self, id: &CardId) -> Result<bool> {
        Ok(self.get(id).is_admin)
    }

    fn has_voted(&self, id: &CardId) -> Result<bool> {
        Ok(self.get(id).has_voted)
    }

    fn set_admin(&self, id: &CardId, value: bool) -> Result<()> {
        self.update(id, |r| r.is_admin = value);
        Ok(())
    }

    fn set_voted(&self, id: &CardId, value: bool) -> Result<()> {
        self.update(id, |r| r.has_voted = value);
        Ok(())
    }
}

/// File-backed store: the full map is loaded at startup and rewritten on
/// every mutation under an exclusive lock on a sibling `.lock` file.
pub struct JsonStore {
    path: PathBuf,
    records: RwLock<IndexMap<String, UserRecord>>,
}

impl JsonStore {
    /// Open the store at `path`, creating an empty one if the file does not
    /// exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read user store {:?}", path))?;
            serde_json::from_str(&content)
                .with_context(|| format!("User store {:?} is not valid JSON", path))?
        } else {
            IndexMap::new()
        };

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    /// Acquire the exclusive store lock, retrying until [`LOCK_TIMEOUT`].
    fn acquire_lock(&self) -> Result<File> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create store directory {:?}", parent))?;
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {:?}", lock_path))?;

        let start = Instant::now();
        loop {
            match lock_file.try_lock_exclusive() {
                Ok(()) => return Ok(lock_file),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() >= LOCK_TIMEOUT {
                        bail!(
                            "Timed out waiting for exclusive lock on {:?} after {:?}. \
                             Another kiosk process may be writing the store.",
                            lock_path,
                            LOCK_TIMEOUT
                        );
                    }
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to acquire exclusive lock on {:?}", lock_path)
                    });
                }
            }
        }
    }

    /// Persist the current map. Called with the in-memory write guard still
    /// held by the caller so readers never observe a half-applied mutation.
    fn save(&self, records: &IndexMap<String, UserRecord>) -> Result<()> {
        let lock_file = self.acquire_lock()?;

        let json = serde_json::to_string_pretty(records)
            .context("Failed to serialize user store")?;
        let mut file = File::create(&self.path)
            .with_context(|| format!("Failed to create user store {:?}", self.path))?;
        file.write_all(json.as_bytes())
            .with_context(|| format!("Failed to write user store {:?}", self.path))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync user store {:?}", self.path))?;

        let _ = lock_file.unlock();
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UserStore for JsonStore {
    fn is_admin(&self, id: &CardId) -> Result<bool> {
        Ok(resilient_read(&self.records)
            .get(id.as_str())
            .map(|r| r.is_admin)
            .unwrap_or(false))
    }

    fn has_voted(&self, id: &CardId) -> Result<bool> {
        Ok(resilient_read(&self.records)
            .get(id.as_str())
            .map(|r| r.has_voted)
            .unwrap_or(false))
    }

    fn set_admin(&self, id: &CardId, value: bool) -> Result<()> {
        let mut records = resilient_write(&self.records);
        records.entry(id.as_str().to_string()).or_default().is_admin = value;
        self.save(&records)
    }

    fn set_voted(&self, id: &CardId, value: bool) -> Result<()> {
        let mut records = resilient_write(&self.records);
        records.entry(id.as_str().to_string()).or_default().has_voted = value;
        self.save(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(tag: char) -> CardId {
        CardId::raw(tag.to_string().repeat(crate::types::ID_LENGTH))
    }

    #[test]
    fn test_unknown_id_reads_false() {
        let store = MemoryStore::new();
        let id = card('A');

        assert!(!store.is_admin(&id).unwrap());
        assert!(!store.has_voted(&id).unwrap());
    }

    #[test]
    fn test_set_admin_roundtrip() {
        let store = MemoryStore::new();
        let id = card('B');

        store.set_admin(&id, true).unwrap();
        assert!(store.is_admin(&id).unwrap());
        assert!(!store.has_voted(&id).unwrap());

        store.set_admin(&id, false).unwrap();
        assert!(!store.is_admin(&id).unwrap());
    }

    #[test]
    fn test_set_voted_independent_of_admin() {
        let store = MemoryStore::new();
        let id = card('C');

        store.set_voted(&id, true).unwrap();
        assert!(store.has_voted(&id).unwrap());
        assert!(!store.is_admin(&id).unwrap());
    }

    #[test]
    fn test_json_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let id = card('D');

        {
            let store = JsonStore::open(&path).unwrap();
            store.set_admin(&id, true).unwrap();
            store.set_voted(&id, true).unwrap();
        }

        let reopened = JsonStore::open(&path).unwrap();
        assert!(reopened.is_admin(&id).unwrap());
        assert!(reopened.has_voted(&id).unwrap());
    }

    #[test]
    fn test_json_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, "not json at all").unwrap();

        assert!(JsonStore::open(&path).is_err());
    }

    #[test]
    fn test_json_store_starts_empty_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("users.json")).unwrap();
        assert!(!store.is_admin(&card('E')).unwrap());
    }
}
