//! CDN invalidation control-plane boundary.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(thiserror::Error, Debug)]
pub enum InvalidationError {
    #[error("invalidation submission failed: {0}")]
    Submit(String),
}

/// Submits one batch of path patterns to invalidate. Full rebuilds submit
/// the project wildcard; partial rebuilds submit exact object paths only.
#[async_trait]
pub trait CdnInvalidator: Send + Sync {
    async fn invalidate(&self, paths: &[String]) -> Result<(), InvalidationError>;
}

/// Logs the batch without contacting a control plane. Used by standalone
/// runs where the CDN is managed out-of-band.
pub struct LogInvalidator;

#[async_trait]
impl CdnInvalidator for LogInvalidator {
    async fn invalidate(&self, paths: &[String]) -> Result<(), InvalidationError> {
        tracing::info!(?paths, "submitting invalidation batch");
        Ok(())
    }
}

/// Records submitted batches; stands in for the control plane in tests.
#[derive(Default)]
pub struct MemoryInvalidator {
    batches: Mutex<Vec<Vec<String>>>,
    fail_next: AtomicBool,
}

impl MemoryInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next submission fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub async fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().await.clone()
    }
}

#[async_trait]
impl CdnInvalidator for MemoryInvalidator {
    async fn invalidate(&self, paths: &[String]) -> Result<(), InvalidationError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(InvalidationError::Submit("injected failure".into()));
        }
        self.batches.lock().await.push(paths.to_vec());
        Ok(())
    }
}
