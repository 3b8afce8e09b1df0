use crate::config::Config;
use crate::engine::Rebuilder;
use crate::invalidation::MemoryInvalidator;
use crate::snapshot::MemorySnapshotStore;
use crate::upstream::UpstreamClient;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::Arc;
use tag_index::{MemoryTagIndexStore, TagIndex};
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

pub fn test_config(origin: &str) -> Config {
    Config {
        project_id: "proj-1".into(),
        api_key: "key".into(),
        origin: Url::parse(origin).expect("test origin"),
        state: "64".into(),
        concurrency: 4,
    }
}

/// Engine wired against in-memory collaborators and a mock upstream.
pub struct TestHarness {
    pub engine: Rebuilder,
    pub snapshots: Arc<MemorySnapshotStore>,
    pub index: TagIndex,
    pub cdn: Arc<MemoryInvalidator>,
}

impl TestHarness {
    pub fn new(origin: &str) -> Self {
        let config = test_config(origin);
        let snapshots = Arc::new(MemorySnapshotStore::new());
        let index = TagIndex::new(Arc::new(MemoryTagIndexStore::new()));
        let cdn = Arc::new(MemoryInvalidator::new());

        let engine = Rebuilder::new(
            config.clone(),
            UpstreamClient::new(&config),
            snapshots.clone(),
            index.clone(),
            cdn.clone(),
        );

        Self {
            engine,
            snapshots,
            index,
            cdn,
        }
    }

    /// Seed the index as if `route_path` had been rendered with `tags`.
    pub async fn seed_tags(&self, route_path: &str, tags: &[&str]) {
        let tags: BTreeSet<String> = tags.iter().map(|tag| tag.to_string()).collect();
        self.index
            .replace_tags("proj-1", route_path, &tags)
            .await
            .expect("seeding tags");
    }
}

/// Mock for one `/api/v1/route` render.
pub fn route_mock(route_path: &str, body: Value) -> Mock {
    Mock::given(method("GET"))
        .and(path("/api/v1/route"))
        .and(query_param("path", route_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
}

/// A minimal composition response with the given dependency set.
pub fn composition_body(matched_route: &str, dependencies: Value) -> Value {
    json!({
        "type": "composition",
        "matchedRoute": matched_route,
        "dynamicInputs": {},
        "compositionApiResponse": { "composition": { "_name": matched_route } },
        "dependencies": dependencies
    })
}
