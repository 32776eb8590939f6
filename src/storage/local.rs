//! File-backed seen-set store.
//!
//! The persisted form is a flat JSON array of listing ids:
//!
//! ```text
//! ["liste-details-ad-10234", "https://www.wg-gesucht.de/…", …]
//! ```
//!
//! Writes go to a sibling `.tmp` file first and are renamed over the
//! previous state, so an interrupted write leaves the last durable set intact.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::SeenStore;

/// Seen set persisted to a local JSON file.
#[derive(Debug, Clone)]
pub struct SeenSetStore {
    path: PathBuf,
    ids: HashSet<String>,
    dirty: bool,
}

impl SeenSetStore {
    /// Create an empty store that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ids: HashSet::new(),
            dirty: false,
        }
    }

    /// Load the persisted set, starting empty on any read or format error.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let mut store = Self::new(path);
        match Self::read_ids(&store.path).await {
            Ok(Some(ids)) => {
                log::info!(
                    "Loaded {} seen ids from {}",
                    ids.len(),
                    store.path.display()
                );
                store.ids = ids;
            }
            Ok(None) => {
                log::info!(
                    "No seen set at {}, starting empty",
                    store.path.display()
                );
            }
            Err(e) => {
                log::warn!(
                    "Seen set at {} is unreadable ({}), starting empty",
                    store.path.display(),
                    e
                );
            }
        }
        store
    }

    /// Path of the persisted file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read ids from disk, returning None if the file doesn't exist.
    async fn read_ids(path: &Path) -> Result<Option<HashSet<String>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let ids: Vec<String> = serde_json::from_slice(&bytes)?;
                Ok(Some(ids.into_iter().collect()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Persist the full set, sorted so the file diffs cleanly.
    async fn persist(&self) -> Result<()> {
        let mut ids: Vec<&String> = self.ids.iter().collect();
        ids.sort();
        let bytes = serde_json::to_vec_pretty(&ids)?;
        self.write_bytes(&bytes).await
    }
}

#[async_trait]
impl SeenStore for SeenSetStore {
    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn mark(&mut self, id: &str) -> bool {
        let inserted = self.ids.insert(id.to_string());
        if inserted {
            self.dirty = true;
        }
        inserted
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    async fn flush(&mut self) -> bool {
        match self.persist().await {
            Ok(()) => {
                self.dirty = false;
                log::debug!(
                    "Flushed {} seen ids to {}",
                    self.ids.len(),
                    self.path.display()
                );
                true
            }
            Err(e) => {
                log::error!(
                    "Failed to persist seen set to {}: {}",
                    self.path.display(),
                    e
                );
                false
            }
        }
    }
}
