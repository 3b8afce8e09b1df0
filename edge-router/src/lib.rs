//! Edge Router Function
//!
//! Synchronous, per-request rewrite executed at the CDN edge. It maps a
//! route-lookup request onto the snapshot object key convention and rejects
//! any request shape that was never precomputed, so the edge can never
//! silently serve wrong content. No external calls, no retained state; the
//! only knowledge it carries is the key convention shared with the rebuild
//! engine.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http::StatusCode;
use std::collections::HashMap;

/// The one logical endpoint served from cache.
pub const ROUTE_ENDPOINT: &str = "/api/v1/route";

/// The single snapshot state token that is ever rendered.
pub const SUPPORTED_STATE: &str = "64";

/// Parameters a cacheable request must carry.
pub const REQUIRED_PARAMS: [&str; 3] = ["projectId", "path", "state"];

/// Advanced parameters that select request shapes which are never
/// precomputed; their presence means the snapshot would be wrong.
pub const DENIED_PARAMS: [&str; 5] = [
    "projectMapId",
    "withComponentIDs",
    "withContentSourceMap",
    "releaseId",
    "dataResourcesVariant",
];

/// Inbound request as handed over by the edge runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRequest {
    pub uri: String,
    pub query: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeResponse {
    pub status: StatusCode,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EdgeOutcome {
    /// Pass through to the origin store with the rewritten URI.
    Forward(EdgeRequest),
    /// Reject before the origin is consulted.
    Respond(EdgeResponse),
}

fn reject(status: StatusCode, message: impl Into<String>) -> EdgeOutcome {
    EdgeOutcome::Respond(EdgeResponse {
        status,
        body: serde_json::json!({ "message": message.into() }),
    })
}

/// Rewrite a route-lookup request to its snapshot object key, or reject it.
///
/// On success the URI becomes `/{projectId}/{base64url(path)}/64.json` and
/// everything else about the request is preserved.
pub fn rewrite(mut request: EdgeRequest) -> EdgeOutcome {
    let is_route_request = request.uri == ROUTE_ENDPOINT
        || request
            .uri
            .strip_prefix(ROUTE_ENDPOINT)
            .is_some_and(|rest| rest.starts_with('?'));
    if !is_route_request {
        return reject(StatusCode::NOT_IMPLEMENTED, "Not Implemented");
    }

    for name in REQUIRED_PARAMS {
        // An empty value counts as missing; it would otherwise encode into
        // a key no rebuild ever writes.
        if request.query.get(name).is_none_or(String::is_empty) {
            return reject(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("{name} is required"),
            );
        }
    }

    if request.query.get("state").map(String::as_str) != Some(SUPPORTED_STATE) {
        return reject(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("state must be {SUPPORTED_STATE}"),
        );
    }

    for name in DENIED_PARAMS {
        if request.query.contains_key(name) {
            return reject(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("{name} is not allowed"),
            );
        }
    }

    let project_id = request
        .query
        .get("projectId")
        .map(String::as_str)
        .unwrap_or_default();
    let encoded = URL_SAFE_NO_PAD.encode(
        request
            .query
            .get("path")
            .map(String::as_str)
            .unwrap_or_default(),
    );

    request.uri = format!("/{project_id}/{encoded}/{SUPPORTED_STATE}.json");
    EdgeOutcome::Forward(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, params: &[(&str, &str)]) -> EdgeRequest {
        EdgeRequest {
            uri: uri.to_string(),
            query: params
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        }
    }

    fn well_formed() -> EdgeRequest {
        request(
            ROUTE_ENDPOINT,
            &[("projectId", "proj-1"), ("path", "/home"), ("state", "64")],
        )
    }

    fn rejection_message(outcome: EdgeOutcome) -> (StatusCode, String) {
        match outcome {
            EdgeOutcome::Respond(response) => (
                response.status,
                response.body["message"].as_str().unwrap_or_default().into(),
            ),
            EdgeOutcome::Forward(request) => panic!("expected rejection, got {request:?}"),
        }
    }

    #[test]
    fn rewrites_to_object_key() {
        match rewrite(well_formed()) {
            EdgeOutcome::Forward(forwarded) => {
                assert_eq!(forwarded.uri, "/proj-1/L2hvbWU/64.json");
            }
            other => panic!("expected forward, got {other:?}"),
        }
    }

    #[test]
    fn rewrite_preserves_query_params() {
        let original = well_formed();
        match rewrite(original.clone()) {
            EdgeOutcome::Forward(forwarded) => assert_eq!(forwarded.query, original.query),
            other => panic!("expected forward, got {other:?}"),
        }
    }

    #[test]
    fn accepts_endpoint_with_query_string_uri() {
        let mut req = well_formed();
        req.uri = format!("{ROUTE_ENDPOINT}?projectId=proj-1");
        assert!(matches!(rewrite(req), EdgeOutcome::Forward(_)));
    }

    #[test]
    fn other_endpoints_are_not_implemented() {
        let (status, message) = rejection_message(rewrite(request("/api/v1/other", &[])));
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(message, "Not Implemented");

        // Prefix alone is not enough; only the exact endpoint is served.
        let (status, _) = rejection_message(rewrite(request("/api/v1/routes", &[])));
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    }

    #[test]
    fn missing_path_names_the_parameter() {
        let req = request(
            ROUTE_ENDPOINT,
            &[("projectId", "proj-1"), ("state", "64")],
        );
        let (status, message) = rejection_message(rewrite(req));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(message, "path is required");
    }

    #[test]
    fn empty_valued_parameter_counts_as_missing() {
        for name in REQUIRED_PARAMS {
            let mut req = well_formed();
            req.query.insert(name.to_string(), String::new());
            let (status, message) = rejection_message(rewrite(req));
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(message, format!("{name} is required"));
        }
    }

    #[test]
    fn unsupported_state_is_rejected() {
        let mut req = well_formed();
        req.query.insert("state".into(), "65".into());
        let (status, message) = rejection_message(rewrite(req));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(message, "state must be 64");
    }

    #[test]
    fn denylisted_parameters_are_rejected() {
        for name in DENIED_PARAMS {
            let mut req = well_formed();
            req.query.insert(name.into(), "abc".into());
            let (status, message) = rejection_message(rewrite(req));
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(message, format!("{name} is not allowed"));
        }
    }

    #[test]
    fn encodes_path_as_unpadded_base64url() {
        let mut req = well_formed();
        req.query.insert("path".into(), "/de/über-uns?x=1".into());
        match rewrite(req) {
            EdgeOutcome::Forward(forwarded) => {
                // URL-safe alphabet, no '=' padding.
                assert!(!forwarded.uri.contains('='));
                assert!(!forwarded.uri.contains('+'));
                assert!(!forwarded.uri.contains("//"));
                assert!(forwarded.uri.ends_with("/64.json"));
            }
            other => panic!("expected forward, got {other:?}"),
        }
    }
}
