//! Response-shape normalization for the admin endpoints.
//!
//! Endpoints disagree on envelopes: some return a bare array, some wrap items
//! in `items`, `data`, `results` or a plural resource key, and some nest the
//! whole payload under `data`. Everything is reduced here so callers only see
//! [`Page`], [`BulkSummary`] and [`StatsSnapshot`].

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;
use crate::model::{
    BulkFailure, BulkSummary, Page, RecordId, ResourceKind, ReviewCounts, StatsSnapshot,
    StatsSource,
};

const ITEM_KEYS: [&str; 3] = ["items", "data", "results"];

pub fn normalize_page<T: DeserializeOwned>(
    kind: ResourceKind,
    body: Value,
    requested_page: u32,
    requested_limit: Option<u32>,
) -> Result<Page<T>, ApiError> {
    let (items_value, meta) = split_items(kind, body)?;
    let items: Vec<T> = serde_json::from_value(items_value)?;

    let meta = meta.as_ref();
    let total = meta
        .and_then(|m| read_u64(m, &["total", "count", "total_count"]))
        .unwrap_or(items.len() as u64);
    let page = meta
        .and_then(|m| read_u64(m, &["page", "current_page"]))
        .map(|p| p as u32)
        .unwrap_or(requested_page);
    let limit = meta
        .and_then(|m| read_u64(m, &["limit", "per_page", "page_size"]))
        .map(|l| l as u32)
        .or(requested_limit);
    let pages = meta
        .and_then(|m| read_u64(m, &["pages", "total_pages"]))
        .map(|p| p as u32)
        .unwrap_or_else(|| page_count(total, limit, items.len()));

    Ok(Page {
        items,
        total,
        page,
        pages,
    })
}

fn page_count(total: u64, limit: Option<u32>, fetched: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let per_page = limit
        .filter(|l| *l > 0)
        .map(u64::from)
        .unwrap_or_else(|| fetched.max(1) as u64);
    total.div_ceil(per_page) as u32
}

/// Returns the item array and the object that carries pagination metadata.
fn split_items(kind: ResourceKind, body: Value) -> Result<(Value, Option<Value>), ApiError> {
    match body {
        Value::Array(_) => Ok((body, None)),
        Value::Object(mut map) => {
            let plural = kind.plural();
            for key in ITEM_KEYS.iter().chain(std::iter::once(&plural)) {
                let (is_array, is_object) = match map.get(*key) {
                    Some(v) => (v.is_array(), v.is_object()),
                    None => (false, false),
                };
                if is_array {
                    let items = map.remove(*key).unwrap_or(Value::Null);
                    return Ok((items, Some(Value::Object(map))));
                }
                if is_object {
                    // `{data: {items: [...], total}}`
                    if let Some(inner) = map.remove(*key) {
                        return split_items(kind, inner);
                    }
                }
            }
            Err(ApiError::Decode(format!(
                "no {} collection in response",
                kind.plural()
            )))
        }
        other => Err(ApiError::Decode(format!(
            "expected array or object, got {other}"
        ))),
    }
}

fn read_u64(map: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| match map.get(*k) {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

/// Unwraps `{data: {...}}` or `{record: {...}}` around a single record.
pub fn unwrap_single(kind: ResourceKind, body: Value) -> Value {
    if let Value::Object(map) = &body {
        if !map.contains_key("id") {
            for key in ["data", kind.as_str(), "record", "item"] {
                if let Some(inner @ Value::Object(_)) = map.get(key) {
                    return inner.clone();
                }
            }
        }
    }
    body
}

/// Interprets a bulk-review response as per-id results.
///
/// Accepted shapes: `{results: [{id, success, message}]}`,
/// `{updated: [ids], failed: [{id, message}]}`, or any acknowledgement
/// without detail, which is read as every id succeeding.
pub fn normalize_bulk(ids: &[RecordId], body: Value) -> BulkSummary {
    let body = match body {
        Value::Object(mut map) if map.contains_key("data") && !map.contains_key("results") => {
            match map.remove("data") {
                Some(inner @ Value::Object(_)) => inner,
                Some(other) => {
                    map.insert("data".into(), other);
                    Value::Object(map)
                }
                None => Value::Object(map),
            }
        }
        other => other,
    };

    if let Some(Value::Array(results)) = body.get("results") {
        let mut summary = BulkSummary {
            requested: ids.len(),
            ..Default::default()
        };
        for entry in results {
            let Some(id) = entry.get("id").and_then(id_string) else {
                continue;
            };
            let ok = entry
                .get("success")
                .or_else(|| entry.get("ok"))
                .and_then(Value::as_bool)
                .unwrap_or_else(|| entry.get("error").is_none());
            if ok {
                summary.updated.push(id);
            } else {
                let message = entry
                    .get("message")
                    .or_else(|| entry.get("error"))
                    .and_then(Value::as_str)
                    .unwrap_or("not updated")
                    .to_string();
                summary.failed.push(BulkFailure { id, message });
            }
        }
        return summary;
    }

    let updated = body.get("updated").and_then(Value::as_array);
    let failed = body.get("failed").and_then(Value::as_array);
    if updated.is_some() || failed.is_some() {
        let failed: Vec<BulkFailure> = failed
            .into_iter()
            .flatten()
            .filter_map(|f| match f {
                Value::Object(_) => Some(BulkFailure {
                    id: f.get("id").and_then(id_string)?,
                    message: f
                        .get("message")
                        .or_else(|| f.get("error"))
                        .and_then(Value::as_str)
                        .unwrap_or("not updated")
                        .to_string(),
                }),
                other => id_string(other).map(|id| BulkFailure {
                    id,
                    message: "not updated".into(),
                }),
            })
            .collect();
        let updated: Vec<RecordId> = match updated {
            Some(list) => list.iter().filter_map(id_string).collect(),
            None => ids
                .iter()
                .filter(|id| !failed.iter().any(|f| &f.id == *id))
                .cloned()
                .collect(),
        };
        return BulkSummary {
            requested: ids.len(),
            updated,
            failed,
        };
    }

    BulkSummary::all_succeeded(ids)
}

fn id_string(v: &Value) -> Option<RecordId> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn normalize_stats(body: Value) -> Result<StatsSnapshot, ApiError> {
    let stats = ["data", "stats"]
        .iter()
        .find_map(|k| body.get(*k).filter(|v| v.is_object()))
        .unwrap_or(&body);
    if !stats.is_object() {
        return Err(ApiError::Decode("stats response is not an object".into()));
    }
    let counts = ReviewCounts {
        pending: read_u64(stats, &["pending", "pending_count"]).unwrap_or(0),
        approved: read_u64(stats, &["approved", "approved_count", "active"]).unwrap_or(0),
        rejected: read_u64(stats, &["rejected", "rejected_count"]).unwrap_or(0),
    };
    let total = read_u64(stats, &["total", "total_count"]).unwrap_or_else(|| counts.total());
    Ok(StatsSnapshot {
        counts,
        total,
        source: StatsSource::Endpoint,
    })
}

/// Extracts a human-readable message from an error body.
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let pick = |v: &Value| -> Option<String> {
        ["message", "error", "detail"].iter().find_map(|k| match v.get(*k) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(inner @ Value::Object(_)) => inner
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
    };
    pick(&value)
}
