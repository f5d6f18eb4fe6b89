use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

use crate::api::ResourceApi;
use crate::cache::{QueryCache, ViewKey};
use crate::error::{ReviewError, ValidationError};
use crate::model::{
    BulkSummary, RecordId, ResourceKind, ReviewAction, ReviewDecision, ReviewableRecord,
};
use crate::notify::{Notification, Notifier};
use crate::session::SessionContext;
use crate::workflow::modal::ReviewTarget;
use crate::workflow::selection::SelectionSet;

type FlightKey = (ResourceKind, RecordId);

/// Result of dispatching a modal decision.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOutcome {
    Single(ReviewableRecord),
    Bulk(BulkSummary),
}

/// Applies review decisions through the remote client and keeps cached
/// views honest afterwards.
///
/// Mutation always resolves before any invalidation, and nothing is
/// invalidated when it fails. A target that is already being reviewed is
/// refused rather than sent twice.
pub struct ReviewOrchestrator<A, N> {
    api: A,
    notifier: N,
    cache: Arc<QueryCache>,
    session: Arc<SessionContext>,
    in_flight: Arc<Mutex<HashSet<FlightKey>>>,
}

/// Releases in-flight ids when the request resolves, however it resolves.
struct FlightGuard {
    keys: Vec<FlightKey>,
    registry: Arc<Mutex<HashSet<FlightKey>>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.registry.lock() {
            for key in &self.keys {
                set.remove(key);
            }
        }
    }
}

impl<A, N> ReviewOrchestrator<A, N>
where
    A: ResourceApi,
    N: Notifier,
{
    pub fn new(api: A, notifier: N, cache: Arc<QueryCache>, session: Arc<SessionContext>) -> Self {
        Self {
            api,
            notifier,
            cache,
            session,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Whether a review for this record is awaiting its response.
    pub fn is_in_flight(&self, kind: ResourceKind, id: &str) -> bool {
        self.in_flight
            .lock()
            .map(|set| set.contains(&(kind, id.to_string())))
            .unwrap_or(false)
    }

    fn begin_flight(&self, kind: ResourceKind, ids: &[RecordId]) -> Result<FlightGuard, ReviewError> {
        let mut set = match self.in_flight.lock() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(busy) = ids.iter().find(|id| set.contains(&(kind, (*id).clone()))) {
            return Err(ReviewError::InFlight(format!("{} {}", kind, busy)));
        }
        let keys: Vec<FlightKey> = ids.iter().map(|id| (kind, id.clone())).collect();
        set.extend(keys.iter().cloned());
        Ok(FlightGuard {
            keys,
            registry: Arc::clone(&self.in_flight),
        })
    }

    fn fail<T>(&self, kind: ResourceKind, err: ReviewError) -> Result<T, ReviewError> {
        match &err {
            // Field errors stay with the form; double submits are swallowed.
            ReviewError::Validation(_) | ReviewError::InFlight(_) => {}
            _ => self.notifier.notify(Notification::error(err.user_message(kind))),
        }
        Err(err)
    }

    fn invalidate_views(&self, kind: ResourceKind, ids: &[RecordId]) {
        for id in ids {
            self.cache.invalidate(ViewKey::Record(kind, id.clone()));
        }
        self.cache.invalidate(ViewKey::Collection(kind));
        self.cache.invalidate(ViewKey::Stats(kind));
    }

    /// Approves or rejects one record.
    #[instrument(skip_all, fields(kind = %kind, id = %id))]
    pub async fn review_single(
        &self,
        kind: ResourceKind,
        id: &str,
        decision: ReviewDecision,
    ) -> Result<ReviewableRecord, ReviewError> {
        if let Err(err) = self.session.moderation_scope() {
            return self.fail(kind, err);
        }
        let ids = [id.to_string()];
        let _guard = match self.begin_flight(kind, &ids) {
            Ok(guard) => guard,
            Err(err) => return self.fail(kind, err),
        };

        match self.api.review(kind, id, &decision).await {
            Ok(record) => {
                self.invalidate_views(kind, &ids);
                info!(status = record.status.as_str(), "review applied");
                self.notifier.notify(Notification::success(format!(
                    "{} {}",
                    capitalized(kind),
                    past_tense(decision.action())
                )));
                Ok(record)
            }
            Err(err) => self.fail(kind, err.into()),
        }
    }

    /// Applies one decision to many records in a single request.
    #[instrument(skip_all, fields(kind = %kind, count = ids.len()))]
    pub async fn review_ids(
        &self,
        kind: ResourceKind,
        ids: &[RecordId],
        decision: ReviewDecision,
    ) -> Result<BulkSummary, ReviewError> {
        if ids.is_empty() {
            return self.fail(
                kind,
                ValidationError::new("selection", format!("Select at least one {}", kind)).into(),
            );
        }
        if let Err(err) = self.session.moderation_scope() {
            return self.fail(kind, err);
        }
        let _guard = match self.begin_flight(kind, ids) {
            Ok(guard) => guard,
            Err(err) => return self.fail(kind, err),
        };

        match self.api.bulk_review(kind, ids, &decision).await {
            Ok(summary) => {
                self.invalidate_views(kind, ids);
                let verb = past_tense(decision.action());
                if summary.is_partial() {
                    let failed: Vec<String> = summary
                        .failed
                        .iter()
                        .map(|f| format!("{} ({})", f.id, f.message))
                        .collect();
                    warn!(updated = summary.updated.len(), failed = summary.failed.len(), "bulk review partially applied");
                    self.notifier.notify(Notification::warning(format!(
                        "{} of {} {} {}; not updated: {}",
                        summary.updated.len(),
                        summary.requested,
                        kind.plural(),
                        verb,
                        failed.join(", ")
                    )));
                } else {
                    info!(updated = summary.updated.len(), "bulk review applied");
                    self.notifier.notify(Notification::success(format!(
                        "{} {} {}",
                        summary.updated.len(),
                        kind.plural(),
                        verb
                    )));
                }
                Ok(summary)
            }
            Err(err) => self.fail(kind, err.into()),
        }
    }

    /// Bulk review of the current selection. On success the selection is
    /// cleared and the bulk menu closed; ids the server reports as failed
    /// stay selected for a retry.
    pub async fn review_bulk(
        &self,
        kind: ResourceKind,
        selection: &mut SelectionSet,
        decision: ReviewDecision,
    ) -> Result<BulkSummary, ReviewError> {
        let ids = selection.ids();
        let summary = self.review_ids(kind, &ids, decision).await?;
        settle_selection(selection, &summary);
        Ok(summary)
    }

    /// Dispatches a decision produced by the review modal.
    pub async fn submit(
        &self,
        kind: ResourceKind,
        target: ReviewTarget,
        decision: ReviewDecision,
        selection: &mut SelectionSet,
    ) -> Result<ReviewOutcome, ReviewError> {
        match target {
            ReviewTarget::Single(id) => self
                .review_single(kind, &id, decision)
                .await
                .map(ReviewOutcome::Single),
            ReviewTarget::Bulk(ids) => {
                let summary = self.review_ids(kind, &ids, decision).await?;
                settle_selection(selection, &summary);
                Ok(ReviewOutcome::Bulk(summary))
            }
        }
    }

    /// Marks a listing sold. Not part of the review flow but refreshes the
    /// same views.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn mark_sold(&self, id: &str) -> Result<ReviewableRecord, ReviewError> {
        let kind = ResourceKind::Listing;
        let ids = [id.to_string()];
        let _guard = match self.begin_flight(kind, &ids) {
            Ok(guard) => guard,
            Err(err) => return self.fail(kind, err),
        };
        match self.api.mark_sold(id).await {
            Ok(record) => {
                self.invalidate_views(kind, &ids);
                self.notifier
                    .notify(Notification::success("Listing marked as sold"));
                Ok(record)
            }
            Err(err) => self.fail(kind, err.into()),
        }
    }
}

fn settle_selection(selection: &mut SelectionSet, summary: &BulkSummary) {
    if summary.is_partial() {
        selection.select_all(summary.failed.iter().map(|f| f.id.clone()), true);
        selection.close_menu();
    } else {
        selection.clear();
    }
}

fn capitalized(kind: ResourceKind) -> String {
    let name = kind.as_str();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn past_tense(action: ReviewAction) -> &'static str {
    match action {
        ReviewAction::Approve => "approved",
        ReviewAction::Reject => "rejected",
    }
}
