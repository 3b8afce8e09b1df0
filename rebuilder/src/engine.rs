//! Invalidation fan-out engine.
//!
//! One run is either a full rebuild (discover every route from the project
//! map, render all, mirror-sync the store, invalidate the project wildcard)
//! or a partial rebuild (fan out from changed dependencies to the affected
//! routes, point-write or point-delete their snapshots, invalidate exactly
//! those paths). A run always produces a [`RunReport`] carrying the ordered
//! log, even when the work failed outright.

use crate::config::Config;
use crate::errors::RebuildError;
use crate::invalidation::CdnInvalidator;
use crate::metrics_defs;
use crate::snapshot::{SnapshotStore, object_key};
use crate::upstream::{ProjectMapNode, RouteResult, UpstreamClient};
use serde::Serialize;
use shared::run_log::RunLog;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tag_index::{Dependencies, TagIndex, dependency_tags};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const LOCALE_PLACEHOLDER: &str = ":locale";

/// Outcome of one rebuild run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// The parsed changed-dependency payload, when the run was partial.
    pub dependencies: Option<Dependencies>,
    pub logs: RunLog,
    pub error_count: usize,
}

/// Where a rendered composition body goes.
#[derive(Clone)]
enum RouteSink {
    /// Full rebuild: bodies are staged locally and bulk-synced afterwards.
    Staging(Arc<PathBuf>),
    /// Partial rebuild: bodies are point-written, stale objects deleted.
    Store,
}

struct RouteOutcome {
    invalidation_path: Option<String>,
    log: RunLog,
}

#[derive(Clone)]
pub struct Rebuilder {
    config: Config,
    upstream: UpstreamClient,
    snapshots: Arc<dyn SnapshotStore>,
    index: TagIndex,
    cdn: Arc<dyn CdnInvalidator>,
}

impl Rebuilder {
    pub fn new(
        config: Config,
        upstream: UpstreamClient,
        snapshots: Arc<dyn SnapshotStore>,
        index: TagIndex,
        cdn: Arc<dyn CdnInvalidator>,
    ) -> Self {
        Self {
            config,
            upstream,
            snapshots,
            index,
            cdn,
        }
    }

    /// Dispatch one run. A payload that parses as a dependency set selects a
    /// partial rebuild; no payload, or a malformed one, selects a full
    /// rebuild. Exactly one mode runs per invocation.
    pub async fn run(&self, payload: Option<&str>) -> RunReport {
        let mut logs = RunLog::new();

        let dependencies = payload.and_then(|raw| match serde_json::from_str::<Dependencies>(raw) {
            Ok(dependencies) => Some(dependencies),
            Err(_) => {
                logs.info("Payload could not be parsed as dependencies, will render all");
                None
            }
        });

        let result = match &dependencies {
            Some(dependencies) => self.render_affected(dependencies, &mut logs).await,
            None => self.render_and_sync_all(&mut logs).await,
        };

        match result {
            Ok(0) => logs.info("Completed"),
            Ok(route_errors) => logs.info(format!("Completed with {route_errors} route errors")),
            Err(err) => logs.error(format!("Failed to render and sync: {err}")),
        }

        RunReport {
            dependencies,
            error_count: logs.error_count(),
            logs,
        }
    }

    /// Full rebuild: discover, render everything, mirror-sync, invalidate
    /// the project wildcard. Any render failure aborts the run before the
    /// mirror-sync; an incomplete staging tree would otherwise delete the
    /// healthy snapshots of the routes that failed.
    pub async fn render_and_sync_all(&self, logs: &mut RunLog) -> Result<usize, RebuildError> {
        let locales = self.upstream.locales().await?;
        logs.info(format!("Found {} locales", locales.len()));

        let maps = self.upstream.project_maps().await?;
        let project_map_id = maps
            .iter()
            .find(|map| map.default)
            .or_else(|| maps.first())
            .map(|map| map.id.clone())
            .ok_or(RebuildError::NoProjectMap)?;

        let nodes = self.upstream.project_map_nodes(&project_map_id).await?;
        let paths = expand_paths(&nodes, &locales);
        logs.info(format!("Rendering {} paths", paths.len()));

        let staging = tempfile::tempdir()?;
        let sink = RouteSink::Staging(Arc::new(staging.path().to_path_buf()));
        let (_, route_errors) = self.process_routes(paths, sink, logs).await;
        if route_errors > 0 {
            return Err(RebuildError::IncompleteRender(route_errors));
        }

        self.snapshots
            .sync_mirror(staging.path(), &self.config.project_id)
            .await?;
        logs.info(format!(
            "Synchronized snapshot store for {}",
            self.config.project_id
        ));

        let wildcard = format!("/{}/*", self.config.project_id);
        self.cdn.invalidate(std::slice::from_ref(&wildcard)).await?;
        metrics::counter!(metrics_defs::INVALIDATION_PATHS.name).increment(1);
        logs.info(format!("Invalidated {wildcard}"));

        Ok(route_errors)
    }

    /// Partial rebuild: changed dependencies fan out through the tag index
    /// to the affected routes; only those are re-rendered and only their
    /// object paths are invalidated.
    pub async fn render_affected(
        &self,
        dependencies: &Dependencies,
        logs: &mut RunLog,
    ) -> Result<usize, RebuildError> {
        let tags = dependency_tags(dependencies);
        logs.info(format!("Affected tags: {}", join(&tags)));

        let affected = self
            .index
            .routes_for_tags(&self.config.project_id, &tags)
            .await?;
        logs.info(format!("Affected paths: {}", join(&affected)));

        let (invalidations, route_errors) = self
            .process_routes(affected.into_iter().collect(), RouteSink::Store, logs)
            .await;

        if invalidations.is_empty() {
            logs.info("No snapshot paths to invalidate");
        } else {
            let paths: Vec<String> = invalidations.into_iter().collect();
            self.cdn.invalidate(&paths).await?;
            metrics::counter!(metrics_defs::INVALIDATION_PATHS.name)
                .increment(paths.len() as u64);
            logs.info(format!("Invalidated {} paths", paths.len()));
        }

        Ok(route_errors)
    }

    /// Render a set of routes through a bounded worker pool. Per-route
    /// failures are logged and counted; they never abort the other routes.
    /// Returns the deduplicated invalidation paths and the error count.
    async fn process_routes(
        &self,
        paths: Vec<String>,
        sink: RouteSink,
        logs: &mut RunLog,
    ) -> (BTreeSet<String>, usize) {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut workers = JoinSet::new();

        for path in paths {
            let engine = self.clone();
            let sink = sink.clone();
            let semaphore = semaphore.clone();
            workers.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");
                engine.process_route(path, sink).await
            });
        }

        let mut invalidations = BTreeSet::new();
        let mut route_errors = 0;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => {
                    if outcome.log.error_count() > 0 {
                        route_errors += 1;
                    }
                    logs.extend(outcome.log);
                    if let Some(path) = outcome.invalidation_path {
                        invalidations.insert(path);
                    }
                }
                Err(err) => {
                    logs.error(format!("Route worker panicked: {err}"));
                    route_errors += 1;
                }
            }
        }
        (invalidations, route_errors)
    }

    async fn process_route(&self, path: String, sink: RouteSink) -> RouteOutcome {
        let mut log = RunLog::new();
        log.info(format!("Rendering {path}"));

        match self.render_and_apply(&path, &sink, &mut log).await {
            Ok(invalidation_path) => {
                metrics::counter!(metrics_defs::ROUTES_RENDERED.name).increment(1);
                RouteOutcome {
                    invalidation_path,
                    log,
                }
            }
            Err(err) => {
                metrics::counter!(metrics_defs::ROUTE_FAILURES.name).increment(1);
                log.error(format!("Failed to process {path}: {err}"));
                RouteOutcome {
                    invalidation_path: None,
                    log,
                }
            }
        }
    }

    /// One route's pipeline, strictly sequential: render, then snapshot
    /// write/delete, then index update. Returns the object path to
    /// invalidate when the sink point-writes to the store.
    async fn render_and_apply(
        &self,
        path: &str,
        sink: &RouteSink,
        log: &mut RunLog,
    ) -> Result<Option<String>, RebuildError> {
        let result = self.upstream.render_route(path).await?;
        let key = object_key(&self.config.project_id, path, &self.config.state);
        let mut invalidation_path = None;

        let new_tags = match &result {
            RouteResult::Composition(composition) => dependency_tags(&composition.dependencies),
            RouteResult::NotFound | RouteResult::Redirect => BTreeSet::new(),
        };

        match sink {
            RouteSink::Staging(dir) => {
                if let RouteResult::Composition(composition) = &result {
                    let file = dir.join(&key);
                    if let Some(parent) = file.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&file, serde_json::to_vec(&composition.snapshot_body())?)?;
                    log.info(format!("Staged {key}"));
                }
            }
            RouteSink::Store => {
                // The stale cached body must be evicted from the edge even
                // when the route stopped being a composition.
                invalidation_path = Some(format!("/{key}"));
                match &result {
                    RouteResult::Composition(composition) => {
                        self.snapshots
                            .put(&key, &serde_json::to_vec(&composition.snapshot_body())?)
                            .await?;
                        metrics::counter!(metrics_defs::SNAPSHOTS_WRITTEN.name).increment(1);
                        log.info(format!("Wrote {key}"));
                    }
                    RouteResult::NotFound | RouteResult::Redirect => {
                        self.snapshots.delete(&key).await?;
                        metrics::counter!(metrics_defs::SNAPSHOTS_DELETED.name).increment(1);
                        log.info(format!("Deleted {key}"));
                    }
                }
            }
        }

        self.index
            .replace_tags(&self.config.project_id, path, &new_tags)
            .await?;

        Ok(invalidation_path)
    }
}

/// Expand locale-parameterized node paths into concrete render paths:
/// one path per locale, using the per-locale override when present, with
/// any path still carrying an unresolved placeholder discarded.
pub fn expand_paths(nodes: &[ProjectMapNode], locales: &[String]) -> Vec<String> {
    let mut paths = Vec::new();
    for node in nodes {
        if node.path.contains(LOCALE_PLACEHOLDER) {
            for locale in locales {
                let template = node
                    .locales
                    .get(locale)
                    .and_then(|entry| entry.path.as_deref())
                    .unwrap_or(&node.path);
                paths.push(template.replace(LOCALE_PLACEHOLDER, locale));
            }
        } else {
            paths.push(node.path.clone());
        }
    }
    paths.retain(|path| !path.contains(':'));
    paths
}

fn join(values: &BTreeSet<String>) -> String {
    values.iter().cloned().collect::<Vec<_>>().join(", ")
}
