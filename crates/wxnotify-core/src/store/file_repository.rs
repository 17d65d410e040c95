// # File Subscription Repository
//
// File-based implementation of SubscriptionRepository with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: write to `<file>.tmp`, then rename over the original
// - Backup: the previous good file is copied to `<file>.backup` before each rename
// - Recovery: a file that fails to parse is replaced by its backup on load
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "subscriptions": [
//     {"id": 1, "email": "a@example.com", "city": "Kyiv", "frequency": "hourly",
//      "confirmed": true, "last_sent_at": "2025-01-09T12:00:00Z"}
//   ]
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::model::{Frequency, Subscription};
use crate::traits::SubscriptionRepository;

/// Used for future migration if the format changes
const FILE_VERSION: &str = "1.0";

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct RepositoryFile {
    version: String,
    subscriptions: Vec<Subscription>,
}

/// File-backed subscription repository
///
/// Every `last_sent_at` change is written to disk before
/// `update_last_sent` returns.
#[derive(Debug)]
pub struct FileSubscriptionRepository {
    path: PathBuf,
    records: RwLock<BTreeMap<u64, Subscription>>,
}

impl FileSubscriptionRepository {
    /// Open (or create) the repository file at `path`
    ///
    /// Parent directories are created when missing. A missing file is an
    /// empty repository; a corrupted one is recovered from its backup, or
    /// started empty when the backup is unusable too.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create repository directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let subscriptions = Self::load_with_recovery(&path).await?;
        let records = subscriptions.into_iter().map(|s| (s.id, s)).collect();

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    /// Insert or replace a subscription and persist
    pub async fn insert(&self, subscription: Subscription) -> Result<(), Error> {
        let mut records = self.records.write().await;
        let id = subscription.id;
        let previous = records.insert(id, subscription);
        if let Err(e) = self.persist(&records).await {
            Self::restore(&mut records, id, previous);
            return Err(e);
        }
        Ok(())
    }

    /// Look up a subscription by id
    pub async fn get(&self, id: u64) -> Option<Subscription> {
        self.records.read().await.get(&id).cloned()
    }

    async fn load_with_recovery(path: &Path) -> Result<Vec<Subscription>, Error> {
        match Self::load(path).await {
            Ok(subscriptions) => {
                tracing::debug!(
                    path = %path.display(),
                    subscriptions = subscriptions.len(),
                    "Loaded subscription file"
                );
                Ok(subscriptions)
            }
            Err(Error::Decode(msg)) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %msg,
                    "Subscription file corrupted, attempting recovery from backup"
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found, starting empty");
                    return Ok(Vec::new());
                }

                match Self::load(&backup_path).await {
                    Ok(subscriptions) => {
                        tracing::info!(
                            subscriptions = subscriptions.len(),
                            "Recovered subscriptions from backup"
                        );
                        if let Err(e) = fs::copy(&backup_path, path).await {
                            tracing::error!(error = %e, "Failed to restore subscription file from backup");
                        }
                        Ok(subscriptions)
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Backup also unusable, starting empty");
                        Ok(Vec::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<Vec<Subscription>, Error> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::repository(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let file: RepositoryFile = serde_json::from_str(&content)
            .map_err(|e| Error::decode(format!("Failed to parse {}: {}", path.display(), e)))?;

        if file.version != FILE_VERSION {
            tracing::warn!(
                expected = FILE_VERSION,
                found = %file.version,
                "Subscription file version mismatch, loading anyway"
            );
        }

        Ok(file.subscriptions)
    }

    /// Write `records` atomically; caller holds the write lock
    async fn persist(&self, records: &BTreeMap<u64, Subscription>) -> Result<(), Error> {
        let file = RepositoryFile {
            version: FILE_VERSION.to_string(),
            subscriptions: records.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let temp_path = self.temp_path();
        {
            let mut out = fs::File::create(&temp_path).await.map_err(|e| {
                Error::repository(format!("Failed to create {}: {}", temp_path.display(), e))
            })?;
            out.write_all(json.as_bytes()).await.map_err(|e| {
                Error::repository(format!("Failed to write {}: {}", temp_path.display(), e))
            })?;
            out.flush().await.map_err(|e| {
                Error::repository(format!("Failed to flush {}: {}", temp_path.display(), e))
            })?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!(error = %e, "Failed to create subscription backup");
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::repository(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!(path = %self.path.display(), "Subscription file written");
        Ok(())
    }

    /// Undo an in-memory change whose write failed, keeping memory and disk in step
    fn restore(records: &mut BTreeMap<u64, Subscription>, id: u64, previous: Option<Subscription>) {
        match previous {
            Some(subscription) => records.insert(id, subscription),
            None => records.remove(&id),
        };
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl SubscriptionRepository for FileSubscriptionRepository {
    async fn get_confirmed_by_frequency(
        &self,
        frequency: Frequency,
    ) -> Result<Vec<Subscription>, Error> {
        let records = self.records.read().await;
        Ok(super::confirmed_by_frequency(&records, frequency))
    }

    async fn update_last_sent(&self, id: u64, at: DateTime<Utc>) -> Result<(), Error> {
        let mut records = self.records.write().await;
        let previous = records.get(&id).cloned();
        if super::advance_last_sent(&mut records, id, at)?
            && let Err(e) = self.persist(&records).await
        {
            Self::restore(&mut records, id, previous);
            return Err(e);
        }
        Ok(())
    }
}
