//! API route definitions.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::state::AppState;
use super::ApiError;
use crate::history::{JobKey, TriggerKey, DEFAULT_GROUP};
use crate::scheduler::TriggerEvent;
use crate::storage::range_or_all;
use crate::store::{PersistenceError, TriggerHistoryStore};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/history", get(list_history))
        .route("/history/in-flight", get(list_in_flight))
        .route("/history/fire/{fire_instance_id}", get(history_by_fire_instance))
        .route("/history/{id}", get(history_by_id))
        .route("/events", post(ingest_event))
}

/// Run a store read on the blocking pool.
async fn read<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Connection, &dyn TriggerHistoryStore) -> Result<T, PersistenceError>
        + Send
        + 'static,
{
    let pool = state.pool.clone();
    let store = Arc::clone(&state.store);
    let out = tokio::task::spawn_blocking(move || -> Result<T, PersistenceError> {
        let conn = pool.get()?;
        f(&*conn, store.as_ref())
    })
    .await??;
    Ok(out)
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RangeField {
    #[default]
    Start,
    End,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryQuery {
    job_group: Option<String>,
    job_name: Option<String>,
    trigger_group: Option<String>,
    trigger_name: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    #[serde(default)]
    by: RangeField,
    limit: Option<usize>,
}

/// Job key wins over trigger key, which wins over the time range. A group
/// without its name is rejected rather than ignored.
async fn list_history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    if q.job_group.is_some() && q.job_name.is_none() {
        return Err(ApiError::BadRequest("'job_group' requires 'job_name'".to_string()));
    }
    if q.trigger_group.is_some() && q.trigger_name.is_none() {
        return Err(ApiError::BadRequest(
            "'trigger_group' requires 'trigger_name'".to_string(),
        ));
    }

    let limit = clamp_limit(q.limit);

    let list = if let Some(name) = q.job_name {
        let key = JobKey::new(q.job_group.unwrap_or_else(|| DEFAULT_GROUP.to_string()), name);
        read(&state, move |conn, store| store.find_by_job_key(conn, &key, limit)).await?
    } else if let Some(name) = q.trigger_name {
        let key = TriggerKey::new(
            q.trigger_group.unwrap_or_else(|| DEFAULT_GROUP.to_string()),
            name,
        );
        read(&state, move |conn, store| store.find_by_trigger_key(conn, &key, limit)).await?
    } else {
        let (from, to) = range_or_all(q.from, q.to);
        if from > to {
            return Err(ApiError::BadRequest("'from' must not be after 'to'".to_string()));
        }
        match q.by {
            RangeField::Start => {
                read(&state, move |conn, store| {
                    store.find_by_start_time_range(conn, from, to, limit)
                })
                .await?
            }
            RangeField::End => {
                read(&state, move |conn, store| {
                    store.find_by_end_time_range(conn, from, to, limit)
                })
                .await?
            }
        }
    };

    Ok(Json(json!({ "data": list, "meta": { "total": list.len() } })))
}

#[derive(Debug, Default, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn list_in_flight(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = clamp_limit(q.limit);
    let list = read(&state, move |conn, store| store.find_in_flight(conn, limit)).await?;
    Ok(Json(json!({ "data": list, "meta": { "total": list.len() } })))
}

async fn history_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = Uuid::parse_str(&id)
        .map_err(|e| ApiError::BadRequest(format!("invalid history id '{}': {}", id, e)))?;

    match read(&state, move |conn, store| store.find_by_id(conn, &id)).await? {
        Some(h) => Ok(Json(json!({ "data": h }))),
        None => Err(ApiError::NotFound(format!("no history record with id {}", id))),
    }
}

async fn history_by_fire_instance(
    State(state): State<AppState>,
    Path(fire_instance_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let lookup = fire_instance_id.clone();
    match read(&state, move |conn, store| {
        store.find_by_fire_instance_id(conn, &lookup)
    })
    .await?
    {
        Some(h) => Ok(Json(json!({ "data": h }))),
        None => Err(ApiError::NotFound(format!(
            "no history record for fire instance '{}'",
            fire_instance_id
        ))),
    }
}

/// Deliver a lifecycle event posted by a remote scheduler node.
async fn ingest_event(
    State(state): State<AppState>,
    Json(event): Json<TriggerEvent>,
) -> Result<Json<Value>, ApiError> {
    let dispatcher = Arc::clone(&state.dispatcher);
    let delivery = tokio::task::spawn_blocking(move || dispatcher.deliver(&event)).await?;
    Ok(Json(json!({ "data": delivery })))
}
