use crate::account::Account;
use crate::state::{ChainContext, MemoryStore, StateStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Full state of a [`MemoryStore`], accounts sorted by address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub chain: ChainContext,
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub chain_entries: BTreeMap<String, Vec<u8>>,
}

impl PersistedSnapshot {
    pub fn capture(store: &MemoryStore) -> Self {
        Self {
            chain: store.chain_context().clone(),
            accounts: store.accounts().cloned().collect(),
            chain_entries: store.chain_entries().clone(),
        }
    }

    pub fn restore(self) -> MemoryStore {
        MemoryStore::from_parts(self.chain, self.accounts, self.chain_entries)
    }
}

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self, StorageError> {
        fs::create_dir_all(&data_dir)?;
        Ok(Self {
            path: data_dir.as_ref().join("state_snapshot.json"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<MemoryStore>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path)?;
        let snap = serde_json::from_slice::<PersistedSnapshot>(&data)?;
        info!(
            path = %self.path.display(),
            height = snap.chain.last_block_height,
            accounts = snap.accounts.len(),
            "state snapshot loaded"
        );
        Ok(Some(snap.restore()))
    }

    /// Atomic replace: temp file, then rename.
    pub fn save(&self, store: &MemoryStore) -> Result<(), StorageError> {
        let snapshot = PersistedSnapshot::capture(store);
        let data = serde_json::to_vec_pretty(&snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, data)?;
        fs::rename(&tmp_path, &self.path)?;
        info!(
            path = %self.path.display(),
            height = snapshot.chain.last_block_height,
            accounts = snapshot.accounts.len(),
            "state snapshot saved"
        );
        Ok(())
    }
}
