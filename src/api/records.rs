/// Record REST API endpoints
///
/// Creation, transition execution, audit queries, and the non-transition
/// mutations (comments, assignment, attachments, field updates). Every
/// mutating endpoint carries the caller's expected record version for the
/// optimistic concurrency check.

use crate::api::{actor_from_headers, error_response};
use crate::record::store::RecordStore;
use crate::record::types::{NewRecord, Record, RevisionFilter, TransitionPayload};
use crate::runtime::engine::TransitionEngine;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, patch, post},
    Router,
};
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Shared state for record endpoints
#[derive(Clone)]
pub struct RecordAppState {
    pub engine: TransitionEngine,
    pub store: RecordStore,
}

/// Request body for executing a transition
#[derive(Debug, Deserialize)]
pub struct ExecuteTransitionRequest {
    pub expected_version: i64,
    #[serde(default)]
    pub payload: TransitionPayload,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub expected_version: i64,
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub expected_version: i64,
    pub assignee: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AttachRequest {
    pub expected_version: i64,
    pub attachment: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFieldsRequest {
    pub expected_version: i64,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    pub older_than_days: i64,
}

/// Create record management routes
pub fn create_record_routes() -> Router<RecordAppState> {
    Router::new()
        .route("/api/records", post(create_record))
        .route("/api/records/{id}", get(get_record))
        .route("/api/records/{id}/transitions", get(available_transitions))
        .route(
            "/api/records/{id}/transitions/{transition_id}",
            post(execute_transition),
        )
        .route("/api/records/{id}/history", get(record_history))
        .route("/api/records/{id}/revisions", get(record_revisions))
        .route("/api/records/{id}/comments", post(add_comment))
        .route("/api/records/{id}/assignee", post(assign))
        .route("/api/records/{id}/attachments", post(attach))
        .route("/api/records/{id}/fields", patch(update_fields))
        .route("/api/revisions/cleanup", post(cleanup_revisions))
}

/// POST /api/records
///
/// Resolves the workflow through the criteria matcher unless the body names
/// one; an ambiguous match comes back 409 with the tied candidates.
async fn create_record(
    State(state): State<RecordAppState>,
    headers: HeaderMap,
    Json(new): Json<NewRecord>,
) -> Result<(StatusCode, Json<Record>), (StatusCode, Json<Value>)> {
    let actor = actor_from_headers(&headers);
    match state.engine.create_record(new, &actor).await {
        Ok(record) => Ok((StatusCode::CREATED, Json(record))),
        Err(e) => Err(error_response(e)),
    }
}

/// GET /api/records/:id
async fn get_record(
    State(state): State<RecordAppState>,
    Path(id): Path<String>,
) -> Result<Json<Record>, (StatusCode, Json<Value>)> {
    match state.store.get_record(&id).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("record not found: {id}") })),
        )),
        Err(e) => Err(error_response(e)),
    }
}

/// POST /api/records/:id/transitions/:transition_id
async fn execute_transition(
    State(state): State<RecordAppState>,
    Path((id, transition_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<ExecuteTransitionRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let actor = actor_from_headers(&headers);
    match state
        .engine
        .execute_transition(
            &id,
            &transition_id,
            &actor,
            request.expected_version,
            request.payload,
        )
        .await
    {
        Ok(outcome) => Ok(Json(json!({
            "record": outcome.record,
            "warnings": outcome.warnings,
        }))),
        Err(e) => Err(error_response(e)),
    }
}

/// GET /api/records/:id/transitions
///
/// The transitions the caller could execute from the current state.
async fn available_transitions(
    State(state): State<RecordAppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let actor = actor_from_headers(&headers);
    match state.engine.available_transitions(&id, &actor).await {
        Ok(transitions) => Ok(Json(json!({ "transitions": transitions }))),
        Err(e) => Err(error_response(e)),
    }
}

/// GET /api/records/:id/history
async fn record_history(
    State(state): State<RecordAppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.store.history(&id).await {
        Ok(history) => Ok(Json(json!({ "history": history }))),
        Err(e) => Err(error_response(e)),
    }
}

/// GET /api/records/:id/revisions
///
/// Paginated audit query, filterable by action type, actor, and date range.
async fn record_revisions(
    State(state): State<RecordAppState>,
    Path(id): Path<String>,
    Query(filter): Query<RevisionFilter>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.store.revisions(&id, &filter).await {
        Ok(revisions) => Ok(Json(json!({ "revisions": revisions }))),
        Err(e) => Err(error_response(e)),
    }
}

/// POST /api/records/:id/comments
async fn add_comment(
    State(state): State<RecordAppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<CommentRequest>,
) -> Result<Json<Record>, (StatusCode, Json<Value>)> {
    let actor = actor_from_headers(&headers);
    match state
        .engine
        .add_comment(&id, request.expected_version, &actor, request.comment)
        .await
    {
        Ok(record) => Ok(Json(record)),
        Err(e) => Err(error_response(e)),
    }
}

/// POST /api/records/:id/assignee
async fn assign(
    State(state): State<RecordAppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<AssignRequest>,
) -> Result<Json<Record>, (StatusCode, Json<Value>)> {
    let actor = actor_from_headers(&headers);
    match state
        .engine
        .assign(&id, request.expected_version, &actor, request.assignee)
        .await
    {
        Ok(record) => Ok(Json(record)),
        Err(e) => Err(error_response(e)),
    }
}

/// POST /api/records/:id/attachments
async fn attach(
    State(state): State<RecordAppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<AttachRequest>,
) -> Result<Json<Record>, (StatusCode, Json<Value>)> {
    let actor = actor_from_headers(&headers);
    match state
        .engine
        .attach(&id, request.expected_version, &actor, request.attachment)
        .await
    {
        Ok(record) => Ok(Json(record)),
        Err(e) => Err(error_response(e)),
    }
}

/// PATCH /api/records/:id/fields
///
/// Generic field update; cannot change the record's state or workflow.
async fn update_fields(
    State(state): State<RecordAppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<UpdateFieldsRequest>,
) -> Result<Json<Record>, (StatusCode, Json<Value>)> {
    let actor = actor_from_headers(&headers);
    match state
        .engine
        .update_fields(&id, request.expected_version, &actor, request.fields)
        .await
    {
        Ok(record) => Ok(Json(record)),
        Err(e) => Err(error_response(e)),
    }
}

/// POST /api/revisions/cleanup
///
/// Retention cleanup is the only delete the revision log accepts, and only
/// for super-admins.
async fn cleanup_revisions(
    State(state): State<RecordAppState>,
    headers: HeaderMap,
    Json(request): Json<CleanupRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let actor = actor_from_headers(&headers);
    if !actor.super_admin {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "revision cleanup requires super-admin" })),
        ));
    }

    let cutoff = chrono::Utc::now() - Duration::days(request.older_than_days);
    match state.store.purge_revisions_before(cutoff).await {
        Ok(purged) => {
            tracing::info!("Revision cleanup purged {} entries by {}", purged, actor.id);
            Ok(Json(json!({ "purged": purged })))
        }
        Err(e) => Err(error_response(e)),
    }
}
