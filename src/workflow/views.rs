use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::ResourceApi;
use crate::cache::{QueryCache, ViewKey};
use crate::error::ApiError;
use crate::model::{ListQuery, Page, ResourceKind, ReviewableRecord};
use crate::workflow::stats::StatsPresenter;

/// Read side of the workflow: serves views from the cache and refetches
/// whatever an invalidation marked stale.
pub struct ViewLoader<A> {
    api: A,
    cache: Arc<QueryCache>,
    stats: StatsPresenter<A>,
}

impl<A: ResourceApi + Clone> ViewLoader<A> {
    pub fn new(api: A, cache: Arc<QueryCache>) -> Self {
        let stats = StatsPresenter::new(api.clone(), Arc::clone(&cache));
        Self { api, cache, stats }
    }

    pub fn stats(&self) -> &StatsPresenter<A> {
        &self.stats
    }

    /// Page of a collection for `query`, served from the cache while fresh.
    pub async fn collection(
        &self,
        kind: ResourceKind,
        query: &ListQuery,
    ) -> Result<Page<ReviewableRecord>, ApiError> {
        let key = ViewKey::Collection(kind);
        if let Some(page) = self
            .cache
            .get_fresh(&key, query)
            .and_then(|v| serde_json::from_value(v).ok())
        {
            return Ok(page);
        }
        let page = self.api.list(kind, query).await?;
        self.cache.put(key, query, serde_json::to_value(&page)?);
        Ok(page)
    }

    pub async fn record(&self, kind: ResourceKind, id: &str) -> Result<ReviewableRecord, ApiError> {
        let key = ViewKey::Record(kind, id.to_string());
        let query = ListQuery::default();
        if let Some(record) = self
            .cache
            .get_fresh(&key, &query)
            .and_then(|v| serde_json::from_value(v).ok())
        {
            return Ok(record);
        }
        let record = self.api.get(kind, id).await?;
        self.cache.put(key, &query, serde_json::to_value(&record)?);
        Ok(record)
    }

    /// Refetches every stale view concurrently, each with the query it was
    /// first fetched with. Views that fail to load stay stale. Returns how
    /// many were refreshed.
    pub async fn refresh_stale(&self) -> usize {
        let stale = self.cache.stale_keys();
        debug!(count = stale.len(), "refreshing stale views");
        let fetches = stale.into_iter().map(|(key, query)| async move {
            let result = match &key {
                ViewKey::Record(kind, id) => self.record(*kind, id).await.map(|_| ()),
                ViewKey::Collection(kind) => self.collection(*kind, &query).await.map(|_| ()),
                ViewKey::Stats(kind) => {
                    self.stats.load(*kind, &query).await;
                    Ok(())
                }
            };
            if let Err(err) = &result {
                warn!(?key, %err, "view refresh failed");
            }
            result.is_ok()
        });
        join_all(fetches).await.into_iter().filter(|ok| *ok).count()
    }
}
