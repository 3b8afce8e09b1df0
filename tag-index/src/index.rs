//! Diff-and-replace algorithm over a [`TagIndexStore`].

use crate::store::{IndexEntry, IndexError, IndexWrite, TagIndexStore};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Largest batch the underlying table accepts per write call.
pub const MAX_BATCH: usize = 25;

const SCOPE_SEPARATOR: char = '|';

fn scoped(project_id: &str, value: &str) -> String {
    format!("{project_id}{SCOPE_SEPARATOR}{value}")
}

/// Strip the project scope from a stored key. Keys without a separator are
/// malformed and skipped by callers.
fn unscoped(stored: &str) -> Option<&str> {
    stored.split_once(SCOPE_SEPARATOR).map(|(_, rest)| rest)
}

/// Project-scoped view over the reverse index.
#[derive(Clone)]
pub struct TagIndex {
    store: Arc<dyn TagIndexStore>,
}

impl TagIndex {
    pub fn new(store: Arc<dyn TagIndexStore>) -> Self {
        Self { store }
    }

    /// Tags currently recorded for a route; empty if the route was never
    /// rendered as a composition.
    pub async fn tags_for_route(
        &self,
        project_id: &str,
        path: &str,
    ) -> Result<BTreeSet<String>, IndexError> {
        let stored = self.store.tags_for_route(&scoped(project_id, path)).await?;
        Ok(stored
            .iter()
            .filter_map(|key| unscoped(key))
            .map(str::to_owned)
            .collect())
    }

    /// Routes depending on one tag.
    pub async fn routes_for_tag(
        &self,
        project_id: &str,
        tag: &str,
    ) -> Result<BTreeSet<String>, IndexError> {
        let stored = self.store.routes_for_tag(&scoped(project_id, tag)).await?;
        Ok(stored
            .iter()
            .filter_map(|key| unscoped(key))
            .map(str::to_owned)
            .collect())
    }

    /// Fan-out query: the deduplicated union of routes across a changed-tag
    /// set.
    pub async fn routes_for_tags(
        &self,
        project_id: &str,
        tags: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>, IndexError> {
        let mut routes = BTreeSet::new();
        for tag in tags {
            routes.extend(self.routes_for_tag(project_id, tag).await?);
        }
        Ok(routes)
    }

    /// Reconcile the index to `new_tags` for one route: add `new − old`,
    /// delete `old − new`, in batches of at most [`MAX_BATCH`].
    ///
    /// Insertions are applied before deletions. If a later batch fails, the
    /// route is left with stale extra tags (over-invalidated on the next
    /// change) rather than a window with no tags at all, and the next
    /// successful render reconverges the entry set.
    ///
    /// Calling with an empty `new_tags` clears the route's entries, which is
    /// how not-found and redirect renders are recorded.
    pub async fn replace_tags(
        &self,
        project_id: &str,
        path: &str,
        new_tags: &BTreeSet<String>,
    ) -> Result<(), IndexError> {
        let old_tags = self.tags_for_route(project_id, path).await?;
        let route_key = scoped(project_id, path);

        let mut writes: Vec<IndexWrite> = Vec::new();
        for tag in new_tags.difference(&old_tags) {
            writes.push(IndexWrite::Put(IndexEntry {
                tag: scoped(project_id, tag),
                route: route_key.clone(),
            }));
        }
        for tag in old_tags.difference(new_tags) {
            writes.push(IndexWrite::Delete(IndexEntry {
                tag: scoped(project_id, tag),
                route: route_key.clone(),
            }));
        }

        tracing::debug!(
            path,
            additions = new_tags.difference(&old_tags).count(),
            deletions = old_tags.difference(new_tags).count(),
            "replacing route tags"
        );

        for chunk in writes.chunks(MAX_BATCH) {
            self.store.apply(chunk).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTagIndexStore;

    const PROJECT: &str = "proj";

    fn tags(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn index_with_store() -> (TagIndex, Arc<MemoryTagIndexStore>) {
        let store = Arc::new(MemoryTagIndexStore::new());
        (TagIndex::new(store.clone()), store)
    }

    #[tokio::test]
    async fn replace_tags_applies_exact_diff() {
        let (index, store) = index_with_store();

        index
            .replace_tags(PROJECT, "/home", &tags(&["component!Hero", "component!Nav"]))
            .await
            .unwrap();
        index
            .replace_tags(PROJECT, "/home", &tags(&["component!Nav", "dataType!news"]))
            .await
            .unwrap();

        assert_eq!(
            index.tags_for_route(PROJECT, "/home").await.unwrap(),
            tags(&["component!Nav", "dataType!news"])
        );
        assert!(
            index
                .routes_for_tag(PROJECT, "component!Hero")
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(store.entry_count().await, 2);
    }

    #[tokio::test]
    async fn replace_tags_is_idempotent() {
        let (index, store) = index_with_store();
        let wanted = tags(&["component!Hero"]);

        index.replace_tags(PROJECT, "/home", &wanted).await.unwrap();
        index.replace_tags(PROJECT, "/home", &wanted).await.unwrap();

        assert_eq!(index.tags_for_route(PROJECT, "/home").await.unwrap(), wanted);
        assert_eq!(store.entry_count().await, 1);
    }

    #[tokio::test]
    async fn empty_new_tags_clears_the_route() {
        let (index, store) = index_with_store();
        index
            .replace_tags(PROJECT, "/home", &tags(&["component!Hero", "dataType!news"]))
            .await
            .unwrap();

        index
            .replace_tags(PROJECT, "/home", &BTreeSet::new())
            .await
            .unwrap();

        assert!(index.tags_for_route(PROJECT, "/home").await.unwrap().is_empty());
        assert_eq!(store.entry_count().await, 0);
    }

    #[tokio::test]
    async fn large_tag_sets_are_chunked() {
        let (index, _store) = index_with_store();
        let many: BTreeSet<String> = (0..MAX_BATCH * 2 + 3).map(|i| format!("kind!{i:03}")).collect();

        index.replace_tags(PROJECT, "/home", &many).await.unwrap();
        assert_eq!(index.tags_for_route(PROJECT, "/home").await.unwrap(), many);

        // Replacing with a disjoint set drives both phases through chunking.
        let replacement: BTreeSet<String> =
            (0..MAX_BATCH + 1).map(|i| format!("other!{i:03}")).collect();
        index
            .replace_tags(PROJECT, "/home", &replacement)
            .await
            .unwrap();
        assert_eq!(
            index.tags_for_route(PROJECT, "/home").await.unwrap(),
            replacement
        );
    }

    #[tokio::test]
    async fn fan_out_union_deduplicates() {
        let (index, _store) = index_with_store();
        index
            .replace_tags(PROJECT, "/home", &tags(&["component!Hero", "dataType!news"]))
            .await
            .unwrap();
        index
            .replace_tags(PROJECT, "/about", &tags(&["component!Hero"]))
            .await
            .unwrap();

        let affected = index
            .routes_for_tags(PROJECT, &tags(&["component!Hero", "dataType!news"]))
            .await
            .unwrap();
        assert_eq!(affected, tags(&["/about", "/home"]));
    }

    #[tokio::test]
    async fn projects_are_isolated() {
        let (index, _store) = index_with_store();
        index
            .replace_tags("alpha", "/home", &tags(&["component!Hero"]))
            .await
            .unwrap();

        assert!(
            index
                .routes_for_tag("beta", "component!Hero")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn partial_batch_failure_heals_on_next_render() {
        let (index, store) = index_with_store();
        let many: BTreeSet<String> = (0..MAX_BATCH * 2).map(|i| format!("kind!{i:03}")).collect();
        index.replace_tags(PROJECT, "/home", &many).await.unwrap();

        // Re-render with the first chunk failing: the replace surfaces the
        // error and leaves the old entries in place (stale, never empty).
        let next: BTreeSet<String> = (0..3).map(|i| format!("fresh!{i}")).collect();
        store.fail_next_applies(1);
        assert!(index.replace_tags(PROJECT, "/home", &next).await.is_err());
        assert_eq!(index.tags_for_route(PROJECT, "/home").await.unwrap(), many);

        // The next successful render reconverges the entry set.
        index.replace_tags(PROJECT, "/home", &next).await.unwrap();
        assert_eq!(index.tags_for_route(PROJECT, "/home").await.unwrap(), next);
        assert_eq!(store.entry_count().await, next.len());
    }
}
