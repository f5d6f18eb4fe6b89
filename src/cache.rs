//! Cached views of fetched data and their invalidation.
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tracing::debug;

use crate::model::{ListQuery, RecordId, ResourceKind};

/// Invalidations kept for inspection; older ones are dropped.
pub const INVALIDATION_LOG_CAP: usize = 256;

/// A fetched view the UI renders from. Collection and stats views hold one
/// entry per query; invalidating the view covers all of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ViewKey {
    Record(ResourceKind, RecordId),
    Collection(ResourceKind),
    Stats(ResourceKind),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    stale: bool,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<ViewKey, HashMap<ListQuery, Entry>>,
    /// Views invalidated before anything was fetched for them.
    unfetched: HashSet<ViewKey>,
    /// Most recent invalidations, oldest first.
    log: VecDeque<ViewKey>,
}

/// Shared view cache. Invalidation only marks entries stale; the next read
/// through [`QueryCache::get_fresh`] misses and the caller refetches.
#[derive(Debug, Default)]
pub struct QueryCache {
    inner: Mutex<Inner>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut *guard)
    }

    /// Stores the result of fetching `key` with `query`. Record views use
    /// the default query.
    pub fn put(&self, key: ViewKey, query: &ListQuery, value: Value) {
        self.with(|inner| {
            inner.unfetched.remove(&key);
            inner
                .entries
                .entry(key)
                .or_default()
                .insert(query.clone(), Entry { value, stale: false });
        });
    }

    /// Returns the value cached for exactly this query unless it is missing
    /// or stale.
    pub fn get_fresh(&self, key: &ViewKey, query: &ListQuery) -> Option<Value> {
        self.with(|inner| {
            inner
                .entries
                .get(key)
                .and_then(|by_query| by_query.get(query))
                .filter(|e| !e.stale)
                .map(|e| e.value.clone())
        })
    }

    /// Marks every fetched query of a view stale. Views never fetched have
    /// nothing to refetch; the invalidation is only remembered.
    pub fn invalidate(&self, key: ViewKey) {
        debug!(?key, "invalidating view");
        self.with(|inner| {
            match inner.entries.get_mut(&key) {
                Some(by_query) => by_query.values_mut().for_each(|e| e.stale = true),
                None => {
                    inner.unfetched.insert(key.clone());
                }
            }
            if inner.log.len() == INVALIDATION_LOG_CAP {
                inner.log.pop_front();
            }
            inner.log.push_back(key);
        });
    }

    /// Invalidates the collection and stats views of a resource.
    pub fn invalidate_kind(&self, kind: ResourceKind) {
        self.invalidate(ViewKey::Collection(kind));
        self.invalidate(ViewKey::Stats(kind));
    }

    /// True when any fetched query of the view is stale, or when an
    /// unfetched view has been invalidated.
    pub fn is_stale(&self, key: &ViewKey) -> bool {
        self.with(|inner| match inner.entries.get(key) {
            Some(by_query) => by_query.values().any(|e| e.stale),
            None => inner.unfetched.contains(key),
        })
    }

    /// Recent invalidations, oldest first, at most [`INVALIDATION_LOG_CAP`].
    pub fn invalidations(&self) -> Vec<ViewKey> {
        self.with(|inner| inner.log.iter().cloned().collect())
    }

    /// Fetched views that should be refetched, each with the query that
    /// produced it.
    pub fn stale_keys(&self) -> Vec<(ViewKey, ListQuery)> {
        self.with(|inner| {
            inner
                .entries
                .iter()
                .flat_map(|(key, by_query)| {
                    by_query
                        .iter()
                        .filter(|(_, e)| e.stale)
                        .map(move |(query, _)| (key.clone(), query.clone()))
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReviewStatus;
    use serde_json::json;

    fn any() -> ListQuery {
        ListQuery::default()
    }

    #[test]
    fn invalidate_marks_stale_and_get_fresh_misses() {
        let cache = QueryCache::new();
        let key = ViewKey::Collection(ResourceKind::Listing);
        cache.put(key.clone(), &any(), json!([1, 2]));
        assert_eq!(cache.get_fresh(&key, &any()), Some(json!([1, 2])));
        cache.invalidate(key.clone());
        assert!(cache.is_stale(&key));
        assert_eq!(cache.get_fresh(&key, &any()), None);
        cache.put(key.clone(), &any(), json!([1]));
        assert!(!cache.is_stale(&key));
    }

    #[test]
    fn entries_are_per_query_and_invalidated_together() {
        let cache = QueryCache::new();
        let key = ViewKey::Collection(ResourceKind::Listing);
        let approved = ListQuery {
            page: Some(2),
            ..ListQuery::default().with_status(ReviewStatus::Approved)
        };
        cache.put(key.clone(), &any(), json!(["L1"]));
        assert_eq!(cache.get_fresh(&key, &approved), None);

        cache.put(key.clone(), &approved, json!(["L9"]));
        assert_eq!(cache.get_fresh(&key, &any()), Some(json!(["L1"])));
        assert_eq!(cache.get_fresh(&key, &approved), Some(json!(["L9"])));

        cache.invalidate(key.clone());
        let mut stale = cache.stale_keys();
        stale.sort_by_key(|(_, q)| q.page);
        assert_eq!(stale, vec![(key.clone(), any()), (key, approved)]);
    }

    #[test]
    fn invalidating_unfetched_view_is_recorded() {
        let cache = QueryCache::new();
        let key = ViewKey::Record(ResourceKind::Verification, "V1".into());
        assert!(!cache.is_stale(&key));
        cache.invalidate(key.clone());
        assert!(cache.is_stale(&key));
        assert_eq!(cache.invalidations(), vec![key.clone()]);
        assert!(cache.stale_keys().is_empty());

        cache.put(key.clone(), &any(), json!({ "id": "V1" }));
        assert!(!cache.is_stale(&key));
    }

    #[test]
    fn invalidation_log_is_bounded() {
        let cache = QueryCache::new();
        for i in 0..INVALIDATION_LOG_CAP + 10 {
            cache.invalidate(ViewKey::Record(ResourceKind::Listing, i.to_string()));
        }
        let log = cache.invalidations();
        assert_eq!(log.len(), INVALIDATION_LOG_CAP);
        assert_eq!(log[0], ViewKey::Record(ResourceKind::Listing, "10".into()));
    }

    #[test]
    fn invalidate_kind_covers_collection_and_stats() {
        let cache = QueryCache::new();
        cache.put(ViewKey::Collection(ResourceKind::User), &any(), json!([]));
        cache.put(ViewKey::Stats(ResourceKind::User), &any(), json!({}));
        cache.put(ViewKey::Stats(ResourceKind::Listing), &any(), json!({}));
        cache.invalidate_kind(ResourceKind::User);
        let mut stale: Vec<ViewKey> = cache.stale_keys().into_iter().map(|(k, _)| k).collect();
        stale.sort_by_key(|k| format!("{k:?}"));
        assert_eq!(
            stale,
            vec![
                ViewKey::Collection(ResourceKind::User),
                ViewKey::Stats(ResourceKind::User)
            ]
        );
    }
}
