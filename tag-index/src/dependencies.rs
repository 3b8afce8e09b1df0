//! Dependency sets and tag derivation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// One upstream content dependency identifier: either a plain string or a
/// structured object that normalizes to canonical JSON. Any other JSON
/// shape fails deserialization, so a payload carrying one never dispatches
/// a partial rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyId {
    Text(String),
    Structured(Map<String, Value>),
}

/// Dependency-kind to identifiers, as reported by the composition API for a
/// rendered route or supplied in a change-notification payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dependencies(pub IndexMap<String, Vec<DependencyId>>);

/// Serialize a JSON value with object keys sorted recursively and no
/// insignificant whitespace. Two structurally equal values always produce
/// the same string, regardless of key insertion order, so structured
/// dependency identifiers round-trip to identical tags.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical_object(map: &Map<String, Value>, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::from(key.as_str()).to_string());
        out.push(':');
        write_canonical(&map[key.as_str()], out);
    }
    out.push('}');
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_canonical_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Derive the tag set of a dependency set: `kind + "!" + normalized id`.
pub fn dependency_tags(dependencies: &Dependencies) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    for (kind, ids) in &dependencies.0 {
        for id in ids {
            let normalized = match id {
                DependencyId::Text(text) => text.clone(),
                DependencyId::Structured(map) => {
                    let mut out = String::new();
                    write_canonical_object(map, &mut out);
                    out
                }
            };
            tags.insert(format!("{kind}!{normalized}"));
        }
    }
    tags
}
