#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use campus_moderator::api::ResourceApi;
use campus_moderator::cache::QueryCache;
use campus_moderator::error::ApiError;
use campus_moderator::model::{
    BulkSummary, ListQuery, Page, RecordId, ResourceKind, ReviewDecision, ReviewableRecord, Role,
    SessionUser, StatsSnapshot,
};
use campus_moderator::notify::RecordingNotifier;
use campus_moderator::session::SessionContext;
use campus_moderator::workflow::ReviewOrchestrator;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List(ResourceKind, ListQuery),
    Get(ResourceKind, String),
    Review(ResourceKind, String, ReviewDecision),
    BulkReview(ResourceKind, Vec<RecordId>, ReviewDecision),
    Stats(ResourceKind),
    MarkSold(String),
}

/// Stub client that records every call and replays queued responses.
#[derive(Clone, Default)]
pub struct RecordingApi {
    calls: Arc<Mutex<Vec<Call>>>,
    reviews: Arc<Mutex<VecDeque<Result<ReviewableRecord, ApiError>>>>,
    bulks: Arc<Mutex<VecDeque<Result<BulkSummary, ApiError>>>>,
    lists: Arc<Mutex<VecDeque<Result<Page<ReviewableRecord>, ApiError>>>>,
    stats: Arc<Mutex<VecDeque<Result<StatsSnapshot, ApiError>>>>,
    gate: Option<Arc<Notify>>,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reviews wait for [`RecordingApi::release`] before answering.
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Notify::new())),
            ..Default::default()
        }
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub async fn push_review(&self, response: Result<ReviewableRecord, ApiError>) {
        self.reviews.lock().await.push_back(response);
    }

    pub async fn push_bulk(&self, response: Result<BulkSummary, ApiError>) {
        self.bulks.lock().await.push_back(response);
    }

    /// Queued pages are served in order, whatever the query.
    pub async fn push_list(&self, response: Result<Page<ReviewableRecord>, ApiError>) {
        self.lists.lock().await.push_back(response);
    }

    pub async fn push_stats(&self, response: Result<StatsSnapshot, ApiError>) {
        self.stats.lock().await.push_back(response);
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    async fn record_call(&self, call: Call) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl ResourceApi for RecordingApi {
    async fn list(
        &self,
        kind: ResourceKind,
        query: &ListQuery,
    ) -> Result<Page<ReviewableRecord>, ApiError> {
        self.record_call(Call::List(kind, query.clone())).await;
        self.lists
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(Page::empty(1)))
    }

    async fn get(&self, kind: ResourceKind, id: &str) -> Result<ReviewableRecord, ApiError> {
        self.record_call(Call::Get(kind, id.to_string())).await;
        Ok(record(id, "pending"))
    }

    async fn review(
        &self,
        kind: ResourceKind,
        id: &str,
        decision: &ReviewDecision,
    ) -> Result<ReviewableRecord, ApiError> {
        self.record_call(Call::Review(kind, id.to_string(), decision.clone()))
            .await;
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.reviews
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(record(id, decision.status().as_str())))
    }

    async fn bulk_review(
        &self,
        kind: ResourceKind,
        ids: &[RecordId],
        decision: &ReviewDecision,
    ) -> Result<BulkSummary, ApiError> {
        self.record_call(Call::BulkReview(kind, ids.to_vec(), decision.clone()))
            .await;
        self.bulks
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(BulkSummary::all_succeeded(ids)))
    }

    async fn stats(
        &self,
        kind: ResourceKind,
        _query: &ListQuery,
    ) -> Result<StatsSnapshot, ApiError> {
        self.record_call(Call::Stats(kind)).await;
        self.stats
            .lock()
            .await
            .pop_front()
            .unwrap_or(Err(ApiError::EndpointUnavailable { status: 404 }))
    }

    async fn mark_sold(&self, id: &str) -> Result<ReviewableRecord, ApiError> {
        self.record_call(Call::MarkSold(id.to_string())).await;
        Ok(record(id, "sold"))
    }
}

pub fn record(id: &str, status: &str) -> ReviewableRecord {
    serde_json::from_value(json!({
        "id": id,
        "status": status,
        "created_at": "2024-05-01T09:30:00Z",
        "title": format!("record {id}"),
    }))
    .unwrap()
}

pub fn page_of(records: Vec<ReviewableRecord>) -> Page<ReviewableRecord> {
    let total = records.len() as u64;
    Page {
        items: records,
        total,
        page: 1,
        pages: 1,
    }
}

pub fn session_for(role: Role, campus: Option<&str>) -> Arc<SessionContext> {
    let session = Arc::new(SessionContext::new());
    session.login(
        SessionUser {
            id: "admin-1".into(),
            email: "moderator@campus.edu".into(),
            name: Some("Mod".into()),
            role,
            campus_id: campus.map(str::to_string),
        },
        "token-123".into(),
    );
    session
}

pub struct Harness {
    pub api: RecordingApi,
    pub notifier: Arc<RecordingNotifier>,
    pub cache: Arc<QueryCache>,
    pub orchestrator: ReviewOrchestrator<RecordingApi, Arc<RecordingNotifier>>,
}

pub fn harness_with(api: RecordingApi, session: Arc<SessionContext>) -> Harness {
    let notifier = Arc::new(RecordingNotifier::new());
    let cache = Arc::new(QueryCache::new());
    let orchestrator = ReviewOrchestrator::new(
        api.clone(),
        Arc::clone(&notifier),
        Arc::clone(&cache),
        session,
    );
    Harness {
        api,
        notifier,
        cache,
        orchestrator,
    }
}

pub fn harness() -> Harness {
    harness_with(RecordingApi::new(), session_for(Role::SuperAdmin, None))
}
