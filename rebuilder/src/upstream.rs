//! Client for the upstream composition API.
//!
//! One request per operation, always with cache-bypass semantics so renders
//! reflect current upstream data. Route renders additionally request the
//! dependency metadata the tag index is built from. No retries here; that is
//! the caller's or the transport's concern.

use crate::config::Config;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tag_index::Dependencies;
use thiserror::Error;
use url::Url;

/// Header asking the upstream to attach dependency metadata to a render.
pub const DEPS_HEADER: &str = "x-uniform-deps";

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("upstream response violated the expected schema: {0}")]
    Schema(String),
}

/// Classification of one rendered route.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RouteResult {
    NotFound,
    Redirect,
    Composition(CompositionRoute),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionRoute {
    pub matched_route: String,
    #[serde(default)]
    pub dynamic_inputs: IndexMap<String, String>,
    pub composition_api_response: Value,
    /// Required: a composition without dependency metadata cannot be
    /// indexed, so a response missing it fails deserialization and is
    /// treated as a schema violation for that route.
    pub dependencies: Dependencies,
}

impl CompositionRoute {
    /// The served artifact: the composition with the dependency metadata
    /// stripped. Dependencies feed the index, not the snapshot body.
    pub fn snapshot_body(&self) -> Value {
        serde_json::json!({
            "type": "composition",
            "matchedRoute": self.matched_route,
            "dynamicInputs": self.dynamic_inputs,
            "compositionApiResponse": self.composition_api_response,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LocalesResponse {
    results: Vec<LocaleEntry>,
}

#[derive(Debug, Deserialize)]
struct LocaleEntry {
    locale: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectMapsResponse {
    project_maps: Vec<ProjectMap>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectMap {
    pub id: String,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Deserialize)]
struct ProjectMapNodesResponse {
    nodes: Vec<ProjectMapNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectMapNode {
    pub id: String,
    pub path: String,
    /// Per-locale path overrides, keyed by locale.
    #[serde(default)]
    pub locales: IndexMap<String, LocaleOverride>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocaleOverride {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    origin: Url,
    edge_origin: Url,
    api_key: String,
    project_id: String,
    state: String,
}

/// Route renders are served by the delivery host of the same deployment:
/// the management host under `.app` maps to `.global`.
fn edge_origin(origin: &Url) -> Url {
    Url::parse(&origin.as_str().replace(".app", ".global")).unwrap_or_else(|_| origin.clone())
}

impl UpstreamClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            origin: config.origin.clone(),
            edge_origin: edge_origin(&config.origin),
            api_key: config.api_key.clone(),
            project_id: config.project_id.clone(),
            state: config.state.clone(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        base: &Url,
        path: &str,
        query: &[(&str, &str)],
        extra_headers: &[(&str, &str)],
    ) -> Result<T, UpstreamError> {
        let mut url = base.clone();
        url.set_path(path);

        let mut request = self
            .client
            .get(url.clone())
            .query(query)
            .header("x-api-key", &self.api_key)
            .header("x-bypass-cache", "true");
        for (name, value) in extra_headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(UpstreamError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|err| UpstreamError::Schema(err.to_string()))
    }

    /// Configured locales of the project.
    pub async fn locales(&self) -> Result<Vec<String>, UpstreamError> {
        let response: LocalesResponse = self
            .get_json(
                &self.origin,
                "/api/v1/locales",
                &[("projectId", self.project_id.as_str())],
                &[],
            )
            .await?;
        Ok(response
            .results
            .into_iter()
            .map(|entry| entry.locale)
            .collect())
    }

    pub async fn project_maps(&self) -> Result<Vec<ProjectMap>, UpstreamError> {
        let response: ProjectMapsResponse = self
            .get_json(
                &self.origin,
                "/api/v1/project-map",
                &[("projectId", self.project_id.as_str())],
                &[],
            )
            .await?;
        Ok(response.project_maps)
    }

    /// Expanded node tree of one project map.
    pub async fn project_map_nodes(
        &self,
        project_map_id: &str,
    ) -> Result<Vec<ProjectMapNode>, UpstreamError> {
        let response: ProjectMapNodesResponse = self
            .get_json(
                &self.origin,
                "/api/v1/project-map-nodes",
                &[
                    ("projectId", self.project_id.as_str()),
                    ("projectMapId", project_map_id),
                    ("expanded", "true"),
                ],
                &[],
            )
            .await?;
        Ok(response.nodes)
    }

    /// Render one route at the fixed snapshot state, with dependency
    /// metadata attached.
    pub async fn render_route(&self, path: &str) -> Result<RouteResult, UpstreamError> {
        self.get_json(
            &self.edge_origin,
            "/api/v1/route",
            &[
                ("projectId", self.project_id.as_str()),
                ("state", self.state.as_str()),
                ("path", path),
            ],
            &[(DEPS_HEADER, "true")],
        )
        .await
    }
}
