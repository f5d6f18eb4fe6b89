use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::ValidationError;

/// Server-side identifier of a reviewable record.
pub type RecordId = String;

/// Reviewable resource collections exposed by the admin API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Listing,
    Verification,
    User,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Listing => "listing",
            ResourceKind::Verification => "verification",
            ResourceKind::User => "user",
        }
    }

    /// Collection path relative to the API base URL.
    pub fn collection_path(&self) -> &'static str {
        match self {
            ResourceKind::Listing => "admin/listings",
            ResourceKind::Verification => "admin/verifications",
            ResourceKind::User => "admin/users",
        }
    }

    /// Name of the id array in bulk-review bodies, e.g. `listing_ids`.
    pub fn bulk_ids_field(&self) -> &'static str {
        match self {
            ResourceKind::Listing => "listing_ids",
            ResourceKind::Verification => "verification_ids",
            ResourceKind::User => "user_ids",
        }
    }

    /// Plural key some endpoints wrap their collections in.
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Listing => "listings",
            ResourceKind::Verification => "verifications",
            ResourceKind::User => "users",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "listing" | "listings" => Ok(ResourceKind::Listing),
            "verification" | "verifications" => Ok(ResourceKind::Verification),
            "user" | "users" => Ok(ResourceKind::User),
            other => Err(format!("unknown resource kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ReviewStatus::Pending),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            other => Err(format!("unknown review status: {other}")),
        }
    }
}

/// Status of a record as the server reports it. Resources carry lifecycle
/// states outside the review flow (a listing can be `sold` or `active`);
/// those are kept verbatim instead of failing the whole response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RecordStatus {
    Review(ReviewStatus),
    Other(String),
}

impl RecordStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RecordStatus::Review(status) => status.as_str(),
            RecordStatus::Other(raw) => raw,
        }
    }

    /// The review status, when the record is in one.
    pub fn review(&self) -> Option<ReviewStatus> {
        match self {
            RecordStatus::Review(status) => Some(*status),
            RecordStatus::Other(_) => None,
        }
    }
}

impl From<ReviewStatus> for RecordStatus {
    fn from(status: ReviewStatus) -> Self {
        RecordStatus::Review(status)
    }
}

impl PartialEq<ReviewStatus> for RecordStatus {
    fn eq(&self, other: &ReviewStatus) -> bool {
        self.review() == Some(*other)
    }
}

/// A server-owned record subject to approve/reject moderation.
///
/// Fields the workflow does not interpret (title, price, owner, ...) are kept
/// in `extra` so the record can be redisplayed untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewableRecord {
    #[serde(deserialize_with = "de_id")]
    pub id: RecordId,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_note: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ReviewableRecord {
    /// Whether the record satisfies "rejected records carry a review note".
    pub fn is_consistent(&self) -> bool {
        match self.status.review() {
            Some(ReviewStatus::Rejected) => self
                .review_note
                .as_deref()
                .map(|n| !n.trim().is_empty())
                .unwrap_or(false),
            _ => true,
        }
    }

    /// Best-effort display label taken from common title-ish fields.
    pub fn label(&self) -> String {
        ["title", "name", "full_name", "email"]
            .iter()
            .find_map(|k| self.extra.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| self.id.clone())
    }
}

/// Ids arrive as strings from some endpoints and as integers from others.
fn de_id<'de, D>(deserializer: D) -> Result<RecordId, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "record id must be a string or number, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Approve,
    Reject,
}

impl ReviewAction {
    /// Status the record moves to when this action is applied.
    pub fn target_status(&self) -> ReviewStatus {
        match self {
            ReviewAction::Approve => ReviewStatus::Approved,
            ReviewAction::Reject => ReviewStatus::Rejected,
        }
    }
}

/// A single approve/reject decision, consumed once by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewDecision {
    action: ReviewAction,
    reason: String,
}

impl ReviewDecision {
    /// Approval never requires a reason; the reason is always empty.
    pub fn approve() -> Self {
        Self {
            action: ReviewAction::Approve,
            reason: String::new(),
        }
    }

    /// Rejection requires a non-blank reason. The reason is stored verbatim.
    pub fn reject(reason: impl Into<String>) -> Result<Self, ValidationError> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(ValidationError::missing_reason());
        }
        Ok(Self {
            action: ReviewAction::Reject,
            reason,
        })
    }

    pub fn action(&self) -> ReviewAction {
        self.action
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn status(&self) -> ReviewStatus {
        self.action.target_status()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewCounts {
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}

impl ReviewCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.approved + self.rejected
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatsSource {
    /// Global numbers from the dedicated stats endpoint.
    Endpoint,
    /// Counted from the current page only; an approximation.
    Derived,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub counts: ReviewCounts,
    pub total: u64,
    pub source: StatsSource,
}

/// Canonical paginated collection shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub pages: u32,
}

impl<T> Page<T> {
    pub fn empty(page: u32) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page,
            pages: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkFailure {
    pub id: RecordId,
    pub message: String,
}

/// Outcome of a bulk review, reported per id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkSummary {
    pub requested: usize,
    pub updated: Vec<RecordId>,
    pub failed: Vec<BulkFailure>,
}

impl BulkSummary {
    /// Summary for a server that only acknowledges the request as a whole.
    pub fn all_succeeded(ids: &[RecordId]) -> Self {
        Self {
            requested: ids.len(),
            updated: ids.to_vec(),
            failed: Vec::new(),
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Filters for collection and stats requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ListQuery {
    pub status: Option<ReviewStatus>,
    pub search: Option<String>,
    pub campus_id: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ListQuery {
    pub fn with_status(mut self, status: ReviewStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_campus(mut self, campus_id: Option<String>) -> Self {
        self.campus_id = campus_id;
        self
    }

    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
            pairs.push(("search", search.trim().to_string()));
        }
        if let Some(campus) = &self.campus_id {
            pairs.push(("campus_id", campus.clone()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    CampusAdmin,
    SuperAdmin,
}

impl Role {
    /// Resolve a role from the `roles` array, falling back to the legacy
    /// single `role` string. The most privileged role wins.
    pub fn resolve(roles: &[String], legacy: Option<&str>) -> Role {
        let names = roles.iter().map(String::as_str).chain(legacy);
        names
            .map(Role::from_name)
            .max_by_key(|r| r.rank())
            .unwrap_or(Role::Student)
    }

    fn from_name(name: &str) -> Role {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "super_admin" | "superadmin" | "admin" => Role::SuperAdmin,
            "campus_admin" | "campusadmin" => Role::CampusAdmin,
            _ => Role::Student,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Role::Student => 0,
            Role::CampusAdmin => 1,
            Role::SuperAdmin => 2,
        }
    }

    pub fn is_admin(&self) -> bool {
        !matches!(self, Role::Student)
    }
}

/// User as returned by the auth endpoints, with the role already resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub campus_id: Option<String>,
}

/// Raw user payload as the server sends it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawUser {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, alias = "full_name")]
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub campus_id: Option<String>,
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "campus id must be a string or number, got {other}"
        ))),
    }
}

impl From<RawUser> for SessionUser {
    fn from(raw: RawUser) -> Self {
        let role = Role::resolve(&raw.roles, raw.role.as_deref());
        SessionUser {
            id: raw.id,
            email: raw.email,
            name: raw.name,
            role,
            campus_id: raw.campus_id,
        }
    }
}
