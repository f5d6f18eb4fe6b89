use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::ApiError;
use crate::model::{
    BulkSummary, ListQuery, Page, RawUser, RecordId, ResourceKind, ReviewDecision,
    ReviewableRecord, SessionUser, StatsSnapshot,
};
use crate::session::SessionContext;

pub mod normalize;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote collection operations the review workflow depends on.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn list(
        &self,
        kind: ResourceKind,
        query: &ListQuery,
    ) -> Result<Page<ReviewableRecord>, ApiError>;

    async fn get(&self, kind: ResourceKind, id: &str) -> Result<ReviewableRecord, ApiError>;

    async fn review(
        &self,
        kind: ResourceKind,
        id: &str,
        decision: &ReviewDecision,
    ) -> Result<ReviewableRecord, ApiError>;

    async fn bulk_review(
        &self,
        kind: ResourceKind,
        ids: &[RecordId],
        decision: &ReviewDecision,
    ) -> Result<BulkSummary, ApiError>;

    async fn stats(&self, kind: ResourceKind, query: &ListQuery)
        -> Result<StatsSnapshot, ApiError>;

    /// Listing-only transition outside the review flow.
    async fn mark_sold(&self, _id: &str) -> Result<ReviewableRecord, ApiError> {
        Err(ApiError::Unsupported("mark_sold"))
    }
}

#[async_trait]
impl<T: ResourceApi + ?Sized> ResourceApi for Arc<T> {
    async fn list(
        &self,
        kind: ResourceKind,
        query: &ListQuery,
    ) -> Result<Page<ReviewableRecord>, ApiError> {
        (**self).list(kind, query).await
    }

    async fn get(&self, kind: ResourceKind, id: &str) -> Result<ReviewableRecord, ApiError> {
        (**self).get(kind, id).await
    }

    async fn review(
        &self,
        kind: ResourceKind,
        id: &str,
        decision: &ReviewDecision,
    ) -> Result<ReviewableRecord, ApiError> {
        (**self).review(kind, id, decision).await
    }

    async fn bulk_review(
        &self,
        kind: ResourceKind,
        ids: &[RecordId],
        decision: &ReviewDecision,
    ) -> Result<BulkSummary, ApiError> {
        (**self).bulk_review(kind, ids, decision).await
    }

    async fn stats(
        &self,
        kind: ResourceKind,
        query: &ListQuery,
    ) -> Result<StatsSnapshot, ApiError> {
        (**self).stats(kind, query).await
    }

    async fn mark_sold(&self, id: &str) -> Result<ReviewableRecord, ApiError> {
        (**self).mark_sold(id).await
    }
}

/// Body for the single-record review endpoint.
pub fn build_review_body(decision: &ReviewDecision) -> Value {
    json!({
        "status": decision.status().as_str(),
        "review_note": decision.reason(),
    })
}

/// Body for the bulk review endpoint, e.g. `{listing_ids: [...], status, review_note}`.
pub fn build_bulk_body(kind: ResourceKind, ids: &[RecordId], decision: &ReviewDecision) -> Value {
    let mut body = build_review_body(decision);
    if let Value::Object(map) = &mut body {
        map.insert(kind.bulk_ids_field().to_string(), json!(ids));
    }
    body
}

/// Maps a non-success response to an error. A 401 carrying an "email not
/// verified" message is returned to the caller; any other 401 ends the session.
pub fn classify_failure(status: StatusCode, body: &str, session: &SessionContext) -> ApiError {
    let message = normalize::error_message(body).unwrap_or_else(|| body.trim().to_string());
    match status {
        StatusCode::UNAUTHORIZED if is_email_not_verified(&message) => {
            ApiError::EmailNotVerified(message)
        }
        StatusCode::UNAUTHORIZED => {
            session.expire();
            ApiError::Unauthorized
        }
        StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED => ApiError::EndpointUnavailable {
            status: status.as_u16(),
        },
        _ => ApiError::Server {
            status: status.as_u16(),
            message,
        },
    }
}

fn is_email_not_verified(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    (lower.contains("not verified") && lower.contains("email"))
        || lower.contains("email_not_verified")
        || lower.contains("verify your email")
}

#[derive(Deserialize)]
struct SignInResponse {
    user: RawUser,
    #[serde(alias = "access_token")]
    token: String,
}

#[derive(Clone)]
pub struct HttpResourceClient {
    http: Client,
    base_url: Url,
    session: Arc<SessionContext>,
}

impl fmt::Debug for HttpResourceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResourceClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpResourceClient {
    pub fn new(
        base_url: Url,
        timeout: Duration,
        session: Arc<SessionContext>,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(concat!("campus-moderator/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    pub fn from_config(cfg: &Config, session: Arc<SessionContext>) -> anyhow::Result<Self> {
        Ok(Self::new(cfg.base_url()?, cfg.timeout(), session)?)
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::Transport(format!("invalid endpoint {path}: {e}")))
    }

    /// Builds a request with the bearer token of the current session attached.
    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        query: &[(&'static str, String)],
        body: Option<&Value>,
    ) -> Result<reqwest::Request, ApiError> {
        let mut url = self.endpoint(path)?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        let mut builder = self
            .http
            .request(method, url)
            .header("Accept", "application/json");
        if let Some(token) = self.session.token() {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.build()?)
    }

    /// Sends a request through the shared response interceptor.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&'static str, String)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let request = self.build_request(method, path, query, body)?;
        debug!(method = %request.method(), url = %request.url(), "api request");
        let res = self.http.execute(request).await?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            warn!(%status, path, body = %text, "api request failed");
            return Err(classify_failure(status, &text, &self.session));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn record_from(kind: ResourceKind, body: Value) -> Result<ReviewableRecord, ApiError> {
        Ok(serde_json::from_value(normalize::unwrap_single(kind, body))?)
    }

    /// Exchanges credentials for a token and returns the signed-in user.
    #[instrument(skip_all)]
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(SessionUser, String), ApiError> {
        let body = json!({ "email": email, "password": password });
        let value = self.send(Method::POST, "auth/login", &[], Some(&body)).await?;
        let value = match value.get("data") {
            Some(inner) if inner.get("token").is_some() || inner.get("access_token").is_some() => {
                inner.clone()
            }
            _ => value,
        };
        let payload: SignInResponse = serde_json::from_value(value)?;
        let user = SessionUser::from(payload.user);
        info!(user_id = %user.id, role = ?user.role, "authenticated");
        Ok((user, payload.token))
    }
}

#[async_trait]
impl ResourceApi for HttpResourceClient {
    #[instrument(skip_all, fields(kind = %kind))]
    async fn list(
        &self,
        kind: ResourceKind,
        query: &ListQuery,
    ) -> Result<Page<ReviewableRecord>, ApiError> {
        let requested_page = query.page.unwrap_or(1);
        match self
            .send(Method::GET, kind.collection_path(), &query.to_pairs(), None)
            .await
        {
            Ok(body) => normalize::normalize_page(kind, body, requested_page, query.limit),
            Err(err) if err.is_endpoint_unavailable() => {
                warn!(%err, "collection endpoint unavailable; showing empty list");
                Ok(Page::empty(requested_page))
            }
            Err(err) => Err(err),
        }
    }

    #[instrument(skip_all, fields(kind = %kind, id = %id))]
    async fn get(&self, kind: ResourceKind, id: &str) -> Result<ReviewableRecord, ApiError> {
        let path = format!("{}/{}", kind.collection_path(), id);
        let body = self.send(Method::GET, &path, &[], None).await?;
        Self::record_from(kind, body)
    }

    #[instrument(skip_all, fields(kind = %kind, id = %id))]
    async fn review(
        &self,
        kind: ResourceKind,
        id: &str,
        decision: &ReviewDecision,
    ) -> Result<ReviewableRecord, ApiError> {
        let path = format!("{}/{}/review", kind.collection_path(), id);
        let body = build_review_body(decision);
        let value = self.send(Method::PATCH, &path, &[], Some(&body)).await?;
        Self::record_from(kind, value)
    }

    #[instrument(skip_all, fields(kind = %kind, count = ids.len()))]
    async fn bulk_review(
        &self,
        kind: ResourceKind,
        ids: &[RecordId],
        decision: &ReviewDecision,
    ) -> Result<BulkSummary, ApiError> {
        let path = format!("{}/bulk-review", kind.collection_path());
        let body = build_bulk_body(kind, ids, decision);
        let value = self.send(Method::POST, &path, &[], Some(&body)).await?;
        Ok(normalize::normalize_bulk(ids, value))
    }

    #[instrument(skip_all, fields(kind = %kind))]
    async fn stats(
        &self,
        kind: ResourceKind,
        query: &ListQuery,
    ) -> Result<StatsSnapshot, ApiError> {
        let path = format!("{}/stats", kind.collection_path());
        let mut pairs = query.to_pairs();
        pairs.retain(|(k, _)| *k != "page" && *k != "limit" && *k != "status");
        let value = self.send(Method::GET, &path, &pairs, None).await?;
        normalize::normalize_stats(value)
    }

    #[instrument(skip_all, fields(id = %id))]
    async fn mark_sold(&self, id: &str) -> Result<ReviewableRecord, ApiError> {
        let path = format!("listings/{}/sold", id);
        let value = self.send(Method::PATCH, &path, &[], None).await?;
        Self::record_from(ResourceKind::Listing, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn client_with_token(token: Option<&str>) -> HttpResourceClient {
        let session = Arc::new(SessionContext::new());
        if let Some(token) = token {
            session.login(
                SessionUser {
                    id: "1".into(),
                    email: "root@campus.edu".into(),
                    name: None,
                    role: Role::SuperAdmin,
                    campus_id: None,
                },
                token.into(),
            );
        }
        HttpResourceClient::new(
            Url::parse("http://localhost:8000/api/v1/").unwrap(),
            DEFAULT_TIMEOUT,
            session,
        )
        .unwrap()
    }

    #[test]
    fn review_body_maps_action_to_status() {
        let body = build_review_body(&ReviewDecision::approve());
        assert_eq!(body, json!({ "status": "approved", "review_note": "" }));
        let body = build_review_body(&ReviewDecision::reject("spam").unwrap());
        assert_eq!(body["status"], "rejected");
        assert_eq!(body["review_note"], "spam");
    }

    #[test]
    fn bulk_body_uses_resource_id_field() {
        let ids = vec!["V1".to_string(), "V2".to_string()];
        let body = build_bulk_body(ResourceKind::Verification, &ids, &ReviewDecision::approve());
        assert_eq!(body["verification_ids"], json!(["V1", "V2"]));
        assert_eq!(body["status"], "approved");
        assert!(body.get("listing_ids").is_none());
    }

    #[test]
    fn build_request_sets_bearer_and_query() {
        let client = client_with_token(Some("secret"));
        let query = ListQuery::default().with_status(crate::model::ReviewStatus::Pending);
        let request = client
            .build_request(Method::GET, "admin/listings", &query.to_pairs(), None)
            .unwrap();
        assert_eq!(request.url().path(), "/api/v1/admin/listings");
        assert_eq!(request.url().query(), Some("status=pending"));
        assert_eq!(
            request
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer secret"
        );
    }

    #[test]
    fn build_request_without_session_has_no_auth_header() {
        let client = client_with_token(None);
        let body = json!({ "status": "approved" });
        let request = client
            .build_request(Method::PATCH, "admin/listings/L1/review", &[], Some(&body))
            .unwrap();
        assert_eq!(request.method(), Method::PATCH);
        assert!(request.headers().get("Authorization").is_none());
        assert_eq!(
            request
                .headers()
                .get("Content-Type")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "application/json"
        );
    }

    #[test]
    fn unauthorized_expires_session() {
        let client = client_with_token(Some("stale"));
        let err = classify_failure(
            StatusCode::UNAUTHORIZED,
            r#"{"message":"token expired"}"#,
            client.session(),
        );
        assert!(matches!(err, ApiError::Unauthorized));
        assert!(client.session().signed_out());
        assert!(client.session().token().is_none());
    }

    #[test]
    fn email_not_verified_passes_through() {
        let client = client_with_token(Some("fresh"));
        let err = classify_failure(
            StatusCode::UNAUTHORIZED,
            r#"{"message":"Email not verified"}"#,
            client.session(),
        );
        assert!(matches!(err, ApiError::EmailNotVerified(_)));
        assert!(!client.session().signed_out());
        assert_eq!(client.session().token().as_deref(), Some("fresh"));
    }

    #[test]
    fn missing_endpoints_and_server_errors() {
        let session = SessionContext::new();
        assert!(classify_failure(StatusCode::METHOD_NOT_ALLOWED, "", &session)
            .is_endpoint_unavailable());
        match classify_failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"message":"DB unavailable"}"#,
            &session,
        ) {
            ApiError::Server { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "DB unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        match classify_failure(StatusCode::BAD_GATEWAY, "upstream down", &session) {
            ApiError::Server { message, .. } => assert_eq!(message, "upstream down"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
