//! Dependency Tag Index
//!
//! Reverse index answering "which routes depend on tag T" and "which tags
//! does route R carry". Rendered routes report the upstream content they
//! were built from as a dependency set; each dependency normalizes to a
//! canonical tag string, and the index stores `(tag, route)` pairs scoped
//! per project, queryable from either side.

pub mod dependencies;
pub mod index;
pub mod store;

pub use dependencies::{Dependencies, DependencyId, canonical_json, dependency_tags};
pub use index::{MAX_BATCH, TagIndex};
pub use store::{
    FilesystemTagIndexStore, IndexEntry, IndexError, IndexWrite, MemoryTagIndexStore, TagIndexStore,
};
