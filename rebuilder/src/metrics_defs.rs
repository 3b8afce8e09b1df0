use shared::metrics_defs::{MetricDef, MetricType};

pub const ROUTES_RENDERED: MetricDef = MetricDef {
    name: "rebuild.routes_rendered",
    metric_type: MetricType::Counter,
    description: "Routes processed end-to-end (render, store, index) across full and partial rebuilds",
};

pub const ROUTE_FAILURES: MetricDef = MetricDef {
    name: "rebuild.route_failures",
    metric_type: MetricType::Counter,
    description: "Routes skipped because render, store, or index work failed",
};

pub const SNAPSHOTS_WRITTEN: MetricDef = MetricDef {
    name: "rebuild.snapshots_written",
    metric_type: MetricType::Counter,
    description: "Snapshot objects point-written during partial rebuilds",
};

pub const SNAPSHOTS_DELETED: MetricDef = MetricDef {
    name: "rebuild.snapshots_deleted",
    metric_type: MetricType::Counter,
    description: "Snapshot objects point-deleted after not-found or redirect renders",
};

pub const INVALIDATION_PATHS: MetricDef = MetricDef {
    name: "rebuild.invalidation_paths",
    metric_type: MetricType::Counter,
    description: "Path patterns submitted to the CDN invalidation control plane",
};

pub const ALL_METRICS: &[MetricDef] = &[
    ROUTES_RENDERED,
    ROUTE_FAILURES,
    SNAPSHOTS_WRITTEN,
    SNAPSHOTS_DELETED,
    INVALIDATION_PATHS,
];
