//! Route rendering and invalidation fan-out.
//!
//! The engine re-renders routes through the upstream composition API and
//! keeps three things consistent per route: the snapshot object, the
//! dependency tag index entries, and the CDN cache. A full rebuild discovers
//! every route from the project map and mirror-syncs the store; a partial
//! rebuild fans out from changed dependencies to exactly the affected routes
//! and invalidates exactly their object paths.

pub mod config;
pub mod engine;
pub mod errors;
pub mod invalidation;
pub mod metrics_defs;
pub mod snapshot;
pub mod upstream;

#[cfg(test)]
pub(crate) mod testutils;

pub use engine::{Rebuilder, RunReport};
pub use errors::RebuildError;
