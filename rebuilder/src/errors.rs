use crate::config::ConfigError;
use crate::invalidation::InvalidationError;
use crate::snapshot::StoreError;
use crate::upstream::UpstreamError;
use tag_index::IndexError;
use thiserror::Error;

/// Errors a rebuild run can hit. Discovery-stage errors are fatal for the
/// run; inside the per-route loop the same variants are caught, logged, and
/// counted instead.
#[derive(Error, Debug)]
pub enum RebuildError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("snapshot store error: {0}")]
    Store(#[from] StoreError),

    #[error("tag index error: {0}")]
    Index(#[from] IndexError),

    #[error("invalidation error: {0}")]
    Invalidation(#[from] InvalidationError),

    #[error("no project map found")]
    NoProjectMap,

    #[error("{0} routes failed to render, leaving the snapshot store untouched")]
    IncompleteRender(usize),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
