//! Snapshot object store abstraction and providers.
//!
//! Snapshots are keyed `{projectId}/{base64url(path)}/{state}.json`; the
//! same convention the edge router rewrites requests to. The durable store
//! is an external collaborator behind [`SnapshotStore`].

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("snapshot store error: {0}")]
    Other(String),
}

/// Object key a route snapshot is stored, and served, under. The path is
/// unpadded URL-safe base64 so arbitrary route paths survive as one key
/// segment.
pub fn object_key(project_id: &str, path: &str, state: &str) -> String {
    format!("{project_id}/{}/{state}.json", URL_SAFE_NO_PAD.encode(path))
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn put(&self, key: &str, body: &[u8]) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Mirror the staging tree into the store under `prefix`: objects with a
    /// staged counterpart are overwritten, objects without one are deleted.
    /// Reconciles routes that disappeared from the sitemap since the last
    /// full rebuild.
    async fn sync_mirror(&self, staging: &Path, prefix: &str) -> Result<(), StoreError>;
}

/// Collect all files under `dir` as `(relative-key, contents)` pairs.
fn collect_files(dir: &Path) -> Result<BTreeMap<String, Vec<u8>>, StoreError> {
    let mut files = BTreeMap::new();
    if !dir.exists() {
        return Ok(files);
    }

    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else {
                let rel = path
                    .strip_prefix(dir)
                    .map_err(|err| StoreError::Other(err.to_string()))?;
                let key = rel
                    .components()
                    .map(|component| component.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.insert(key, std::fs::read(&path)?);
            }
        }
    }
    Ok(files)
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn put(&self, key: &str, body: &[u8]) -> Result<(), StoreError> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), body.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn sync_mirror(&self, staging: &Path, prefix: &str) -> Result<(), StoreError> {
        let staged = collect_files(&staging.join(prefix))?;
        let scope = format!("{prefix}/");

        let mut objects = self.objects.write().await;
        objects.retain(|key, _| !key.starts_with(&scope));
        for (rel, body) in staged {
            objects.insert(format!("{prefix}/{rel}"), body);
        }
        Ok(())
    }
}

/// Store rooted in a local directory; object keys map directly onto file
/// paths. The production object store sits behind the same trait.
#[derive(Debug)]
pub struct FilesystemSnapshotStore {
    root: PathBuf,
}

impl FilesystemSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SnapshotStore for FilesystemSnapshotStore {
    async fn put(&self, key: &str, body: &[u8]) -> Result<(), StoreError> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, body)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match std::fs::read(self.root.join(key)) {
            Ok(body) => Ok(Some(body)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.root.join(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn sync_mirror(&self, staging: &Path, prefix: &str) -> Result<(), StoreError> {
        let staged = collect_files(&staging.join(prefix))?;

        let destination = self.root.join(prefix);
        match std::fs::remove_dir_all(&destination) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        for (rel, body) in staged {
            let path = destination.join(&rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, body)?;
        }
        Ok(())
    }
}
