//! Access-key record storage.
//!
//! Provides the [`AccessKeyStore`] trait consumed by token issuance and
//! [`MemoryAccessKeyStore`], a thread-safe in-memory implementation that can
//! optionally snapshot its contents to a JSON file.

use std::fs;
use std::path::PathBuf;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::fs::write_owner_only;
use crate::types::AccessKeyRecord;

/// Errors raised by an access-key store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The access key is already bound to another application instance.
    #[error("access key {access_key} is already used by application instance {app_instance_id}")]
    DuplicateAccessKey {
        /// The conflicting access key.
        access_key: String,
        /// The application instance currently owning it.
        app_instance_id: String,
    },

    /// Reading or writing the snapshot file failed.
    #[error("access key store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot file could not be (de)serialized.
    #[error("access key store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage of [`AccessKeyRecord`]s.
///
/// Lookup by access key distinguishes "not found" (`Ok(None)`) from a real
/// storage failure (`Err`).
pub trait AccessKeyStore: Send + Sync {
    /// Look up the record owning `access_key`.
    fn read_by_access_key(&self, access_key: &str) -> Result<Option<AccessKeyRecord>, StoreError>;

    /// Insert the record, replacing any record of the same application instance.
    fn upsert(&self, record: AccessKeyRecord) -> Result<(), StoreError>;

    /// Delete the record of `app_instance_id`. Returns whether one existed.
    fn delete(&self, app_instance_id: &str) -> Result<bool, StoreError>;
}

/// In-memory [`AccessKeyStore`] indexed by access key.
///
/// Reads are lock-free through `DashMap`; writes are serialized so the
/// access-key index and the application-instance index never disagree.
///
/// # Examples
///
/// ```
/// use mepauth_core::{AccessKeyRecord, AccessKeyStore, MemoryAccessKeyStore};
///
/// let store = MemoryAccessKeyStore::new();
/// store
///     .upsert(AccessKeyRecord {
///         app_instance_id: "app-1".to_owned(),
///         access_key: "QVUJMSUMgS0VZLS0tLS0".to_owned(),
///         secret_key: "00".to_owned(),
///         nonce: "00".to_owned(),
///     })
///     .unwrap();
/// assert!(store.read_by_access_key("QVUJMSUMgS0VZLS0tLS0").unwrap().is_some());
/// ```
#[derive(Debug, Default)]
pub struct MemoryAccessKeyStore {
    by_access_key: DashMap<String, AccessKeyRecord>,
    by_app_instance: DashMap<String, String>,
    writer: Mutex<()>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryAccessKeyStore {
    /// Create a new empty, non-persistent store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store backed by the JSON snapshot at `path`.
    ///
    /// Existing records are loaded; every later write rewrites the snapshot.
    pub fn with_persistence(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let store = Self {
            snapshot_path: Some(path.clone()),
            ..Self::default()
        };

        if path.exists() {
            let data = fs::read(&path)?;
            let records: Vec<AccessKeyRecord> = serde_json::from_slice(&data)?;
            for record in records {
                store
                    .by_app_instance
                    .insert(record.app_instance_id.clone(), record.access_key.clone());
                store.by_access_key.insert(record.access_key.clone(), record);
            }
            info!(path = %path.display(), records = store.len(), "loaded access key records");
        }

        Ok(store)
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_access_key.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_access_key.is_empty()
    }

    /// Write the snapshot as it will look once `removed` is dropped and
    /// `added` is stored. The maps are only changed after this succeeds.
    fn persist_with(
        &self,
        removed: Option<&str>,
        added: Option<&AccessKeyRecord>,
    ) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let mut records: Vec<AccessKeyRecord> = self
            .by_access_key
            .iter()
            .filter(|r| {
                Some(r.key().as_str()) != removed
                    && added.is_none_or(|a| a.access_key != *r.key())
            })
            .map(|r| r.value().clone())
            .collect();
        records.extend(added.cloned());
        records.sort_by(|a, b| a.app_instance_id.cmp(&b.app_instance_id));

        let data = serde_json::to_vec_pretty(&records)?;
        write_owner_only(path, &data)?;

        debug!(path = %path.display(), records = records.len(), "persisted access key records");
        Ok(())
    }
}

impl AccessKeyStore for MemoryAccessKeyStore {
    fn read_by_access_key(&self, access_key: &str) -> Result<Option<AccessKeyRecord>, StoreError> {
        Ok(self.by_access_key.get(access_key).map(|r| r.value().clone()))
    }

    fn upsert(&self, record: AccessKeyRecord) -> Result<(), StoreError> {
        let _guard = self.writer.lock();

        let owner = self
            .by_access_key
            .get(&record.access_key)
            .map(|r| r.app_instance_id.clone());
        if let Some(owner) = owner {
            if owner != record.app_instance_id {
                return Err(StoreError::DuplicateAccessKey {
                    access_key: record.access_key,
                    app_instance_id: owner,
                });
            }
        }

        let previous = self
            .by_app_instance
            .get(&record.app_instance_id)
            .map(|r| r.value().clone());
        self.persist_with(previous.as_deref(), Some(&record))?;

        if let Some(previous) = previous {
            if previous != record.access_key {
                self.by_access_key.remove(&previous);
            }
        }
        self.by_app_instance
            .insert(record.app_instance_id.clone(), record.access_key.clone());
        self.by_access_key.insert(record.access_key.clone(), record);
        Ok(())
    }

    fn delete(&self, app_instance_id: &str) -> Result<bool, StoreError> {
        let _guard = self.writer.lock();

        let access_key = self
            .by_app_instance
            .get(app_instance_id)
            .map(|r| r.value().clone());
        let Some(access_key) = access_key else {
            return Ok(false);
        };
        self.persist_with(Some(&access_key), None)?;

        self.by_app_instance.remove(app_instance_id);
        self.by_access_key.remove(&access_key);
        Ok(true)
    }
}
