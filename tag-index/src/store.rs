//! Reverse-index store abstraction and providers.
//!
//! The real index lives in an external keyed table with a primary (by tag)
//! and secondary (by route) ordering; this module specifies only that
//! boundary. Keys are already project-scoped by the caller.

use crate::index::MAX_BATCH;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("index serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("batch of {0} entries exceeds the {MAX_BATCH} entry limit")]
    BatchTooLarge(usize),

    #[error("index store error: {0}")]
    Store(String),
}

/// One `(tag, route)` pair. Both sides carry the `project|value` scoping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub tag: String,
    pub route: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexWrite {
    Put(IndexEntry),
    Delete(IndexEntry),
}

#[async_trait]
pub trait TagIndexStore: Send + Sync {
    /// All tag keys recorded for a route key (secondary access path).
    async fn tags_for_route(&self, route_key: &str) -> Result<Vec<String>, IndexError>;

    /// All route keys recorded for a tag key (primary access path).
    async fn routes_for_tag(&self, tag_key: &str) -> Result<Vec<String>, IndexError>;

    /// Apply one bounded batch of writes. Implementations reject batches
    /// larger than [`MAX_BATCH`].
    async fn apply(&self, batch: &[IndexWrite]) -> Result<(), IndexError>;
}

#[derive(Debug, Default)]
struct Tables {
    by_tag: BTreeMap<String, BTreeSet<String>>,
    by_route: BTreeMap<String, BTreeSet<String>>,
}

impl Tables {
    fn apply(&mut self, batch: &[IndexWrite]) {
        for write in batch {
            match write {
                IndexWrite::Put(entry) => {
                    self.by_tag
                        .entry(entry.tag.clone())
                        .or_default()
                        .insert(entry.route.clone());
                    self.by_route
                        .entry(entry.route.clone())
                        .or_default()
                        .insert(entry.tag.clone());
                }
                IndexWrite::Delete(entry) => {
                    if let Some(routes) = self.by_tag.get_mut(&entry.tag) {
                        routes.remove(&entry.route);
                        if routes.is_empty() {
                            self.by_tag.remove(&entry.tag);
                        }
                    }
                    if let Some(tags) = self.by_route.get_mut(&entry.route) {
                        tags.remove(&entry.tag);
                        if tags.is_empty() {
                            self.by_route.remove(&entry.route);
                        }
                    }
                }
            }
        }
    }

    fn entries(&self) -> Vec<IndexEntry> {
        self.by_tag
            .iter()
            .flat_map(|(tag, routes)| {
                routes.iter().map(|route| IndexEntry {
                    tag: tag.clone(),
                    route: route.clone(),
                })
            })
            .collect()
    }

    fn from_entries(entries: Vec<IndexEntry>) -> Self {
        let mut tables = Tables::default();
        let writes: Vec<IndexWrite> = entries.into_iter().map(IndexWrite::Put).collect();
        tables.apply(&writes);
        tables
    }
}

fn check_batch(batch: &[IndexWrite]) -> Result<(), IndexError> {
    if batch.len() > MAX_BATCH {
        return Err(IndexError::BatchTooLarge(batch.len()));
    }
    Ok(())
}

/// In-memory store keeping both orderings, mirroring the table's primary and
/// secondary indexes. Used in tests and as a scratch index; supports failure
/// injection to exercise partially applied batches.
#[derive(Debug, Default)]
pub struct MemoryTagIndexStore {
    tables: RwLock<Tables>,
    apply_failures: AtomicUsize,
}

impl MemoryTagIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls to `apply` fail.
    pub fn fail_next_applies(&self, n: usize) {
        self.apply_failures.store(n, Ordering::SeqCst);
    }

    pub async fn entry_count(&self) -> usize {
        let tables = self.tables.read().await;
        tables.by_tag.values().map(BTreeSet::len).sum()
    }
}

#[async_trait]
impl TagIndexStore for MemoryTagIndexStore {
    async fn tags_for_route(&self, route_key: &str) -> Result<Vec<String>, IndexError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_route
            .get(route_key)
            .map(|tags| tags.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn routes_for_tag(&self, tag_key: &str) -> Result<Vec<String>, IndexError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_tag
            .get(tag_key)
            .map(|routes| routes.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn apply(&self, batch: &[IndexWrite]) -> Result<(), IndexError> {
        check_batch(batch)?;

        if self.apply_failures.load(Ordering::SeqCst) > 0 {
            self.apply_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(IndexError::Store("injected apply failure".into()));
        }

        let mut tables = self.tables.write().await;
        tables.apply(batch);
        Ok(())
    }
}

/// File-backed store: the full entry list persisted as JSON on every batch.
/// Lets standalone runs compose across process invocations. Single-writer by
/// design; a rebuild run is the only writer while it is active.
#[derive(Debug)]
pub struct FilesystemTagIndexStore {
    path: PathBuf,
}

impl FilesystemTagIndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<Tables, IndexError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => {
                let entries: Vec<IndexEntry> = serde_json::from_slice(&bytes)?;
                Ok(Tables::from_entries(entries))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Tables::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, tables: &Tables) -> Result<(), IndexError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec(&tables.entries())?)?;
        Ok(())
    }
}

#[async_trait]
impl TagIndexStore for FilesystemTagIndexStore {
    async fn tags_for_route(&self, route_key: &str) -> Result<Vec<String>, IndexError> {
        let tables = self.load()?;
        Ok(tables
            .by_route
            .get(route_key)
            .map(|tags| tags.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn routes_for_tag(&self, tag_key: &str) -> Result<Vec<String>, IndexError> {
        let tables = self.load()?;
        Ok(tables
            .by_tag
            .get(tag_key)
            .map(|routes| routes.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn apply(&self, batch: &[IndexWrite]) -> Result<(), IndexError> {
        check_batch(batch)?;
        let mut tables = self.load()?;
        tables.apply(batch);
        self.save(&tables)
    }
}
