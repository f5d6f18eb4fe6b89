use std::sync::Arc;
use tracing::{instrument, warn};

use crate::api::ResourceApi;
use crate::cache::{QueryCache, ViewKey};
use crate::model::{
    ListQuery, ResourceKind, ReviewCounts, ReviewStatus, ReviewableRecord, StatsSnapshot,
    StatsSource,
};

/// Counts records per review status. Records in any other state (a sold
/// listing, say) are not counted.
pub fn compute_counts(records: &[ReviewableRecord]) -> ReviewCounts {
    records
        .iter()
        .fold(ReviewCounts::default(), |mut counts, record| {
            match record.status.review() {
                Some(ReviewStatus::Pending) => counts.pending += 1,
                Some(ReviewStatus::Approved) => counts.approved += 1,
                Some(ReviewStatus::Rejected) => counts.rejected += 1,
                None => {}
            }
            counts
        })
}

/// Text for the pending badge; nothing when there is nothing to review.
pub fn badge(counts: &ReviewCounts) -> Option<String> {
    match counts.pending {
        0 => None,
        n if n > 99 => Some("99+".to_string()),
        n => Some(n.to_string()),
    }
}

/// Loads counts for dashboards and badges.
pub struct StatsPresenter<A> {
    api: A,
    cache: Arc<QueryCache>,
}

impl<A: ResourceApi> StatsPresenter<A> {
    pub fn new(api: A, cache: Arc<QueryCache>) -> Self {
        Self { api, cache }
    }

    /// Uses the stats endpoint, falling back to counting the current page
    /// when the endpoint errors. The fallback only sees one page of records,
    /// so its numbers are not global totals. Always produces a snapshot.
    #[instrument(skip_all, fields(kind = %kind))]
    pub async fn load(&self, kind: ResourceKind, query: &ListQuery) -> StatsSnapshot {
        let key = ViewKey::Stats(kind);
        if let Some(snapshot) = self
            .cache
            .get_fresh(&key, query)
            .and_then(|v| serde_json::from_value::<StatsSnapshot>(v).ok())
        {
            return snapshot;
        }

        let snapshot = match self.api.stats(kind, query).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(%err, "stats endpoint failed; deriving counts from current page");
                let records = match self.api.list(kind, query).await {
                    Ok(page) => page.items,
                    Err(err) => {
                        warn!(%err, "collection fetch failed; counts default to zero");
                        Vec::new()
                    }
                };
                let counts = compute_counts(&records);
                StatsSnapshot {
                    counts,
                    total: counts.total(),
                    source: StatsSource::Derived,
                }
            }
        };

        if let Ok(value) = serde_json::to_value(&snapshot) {
            self.cache.put(key, query, value);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: usize, status: &str) -> ReviewableRecord {
        serde_json::from_value(json!({ "id": id.to_string(), "status": status })).unwrap()
    }

    #[test]
    fn empty_input_counts_zero() {
        assert_eq!(
            compute_counts(&[]),
            ReviewCounts {
                pending: 0,
                approved: 0,
                rejected: 0
            }
        );
    }

    #[test]
    fn counts_sum_to_record_count() {
        let statuses = ["pending", "approved", "rejected", "pending", "pending", "rejected"];
        for n in 0..=statuses.len() {
            let records: Vec<_> = statuses[..n]
                .iter()
                .enumerate()
                .map(|(i, s)| record(i, s))
                .collect();
            let counts = compute_counts(&records);
            assert_eq!(counts.total(), n as u64);
        }
        let all: Vec<_> = statuses.iter().enumerate().map(|(i, s)| record(i, s)).collect();
        let counts = compute_counts(&all);
        assert_eq!((counts.pending, counts.approved, counts.rejected), (3, 1, 2));
    }

    #[test]
    fn records_outside_review_are_skipped() {
        let records = vec![record(1, "pending"), record(2, "sold"), record(3, "active")];
        let counts = compute_counts(&records);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.total(), 1);
    }

    #[test]
    fn badge_caps_and_hides_zero() {
        assert_eq!(badge(&ReviewCounts::default()), None);
        let mut counts = ReviewCounts {
            pending: 7,
            ..Default::default()
        };
        assert_eq!(badge(&counts).as_deref(), Some("7"));
        counts.pending = 140;
        assert_eq!(badge(&counts).as_deref(), Some("99+"));
    }
}
