/// Workflow definition REST API endpoints
///
/// CRUD with hot-reload support plus duplication and export/import. Every
/// write re-validates the definition and swaps the registry so in-flight
/// executions are never blocked.

use crate::api::error_response;
use crate::workflow::registry::WorkflowRegistry;
use crate::workflow::storage::WorkflowStorage;
use crate::workflow::types::{RecordType, Workflow};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared state for workflow endpoints
#[derive(Clone)]
pub struct WorkflowAppState {
    pub storage: WorkflowStorage,
    pub registry: Arc<WorkflowRegistry>,
}

/// Request body for workflow creation and update
#[derive(Debug, Deserialize)]
pub struct SaveWorkflowRequest {
    pub workflow: Workflow,
}

#[derive(Debug, Deserialize)]
pub struct DuplicateRequest {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub record_type: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

/// Create workflow management routes
pub fn create_workflow_routes() -> Router<WorkflowAppState> {
    Router::new()
        .route("/api/workflows", post(create_workflow))
        .route("/api/workflows", get(list_workflows))
        .route("/api/workflows/import", post(import_workflow))
        .route("/api/workflows/{id}", get(get_workflow))
        .route("/api/workflows/{id}", put(update_workflow))
        .route("/api/workflows/{id}", delete(soft_delete_workflow))
        .route("/api/workflows/{id}/permanent", delete(purge_workflow))
        .route("/api/workflows/{id}/duplicate", post(duplicate_workflow))
        .route("/api/workflows/{id}/export", get(export_workflow))
}

/// POST /api/workflows
async fn create_workflow(
    State(state): State<WorkflowAppState>,
    Json(request): Json<SaveWorkflowRequest>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let workflow = request.workflow;

    if workflow.id.is_empty() || workflow.name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "workflow id and name are required" })),
        ));
    }

    match state.storage.get_workflow(&workflow.id).await {
        Ok(Some(_)) => {
            return Err((
                StatusCode::CONFLICT,
                Json(json!({ "error": format!("workflow '{}' already exists", workflow.id) })),
            ))
        }
        Ok(None) => {}
        Err(e) => return Err(error_response(e)),
    }

    save_and_reload(&state, &workflow).await?;

    tracing::info!("Created workflow: {} ({})", workflow.id, workflow.name);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": workflow.id, "message": "workflow created" })),
    ))
}

/// GET /api/workflows
async fn list_workflows(
    State(state): State<WorkflowAppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let record_type = match query.record_type.as_deref() {
        Some(raw) => match RecordType::parse(raw) {
            Some(rt) => Some(rt),
            None => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": format!("unknown record type '{raw}'") })),
                ))
            }
        },
        None => None,
    };

    match state
        .storage
        .list_workflows(record_type, query.include_deleted)
        .await
    {
        Ok(workflows) => Ok(Json(json!({ "workflows": workflows }))),
        Err(e) => Err(error_response(e)),
    }
}

/// GET /api/workflows/:id
async fn get_workflow(
    State(state): State<WorkflowAppState>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, (StatusCode, Json<Value>)> {
    match state.storage.get_workflow(&id).await {
        Ok(Some(workflow)) => Ok(Json(workflow)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("workflow not found: {id}") })),
        )),
        Err(e) => Err(error_response(e)),
    }
}

/// PUT /api/workflows/:id
async fn update_workflow(
    State(state): State<WorkflowAppState>,
    Path(id): Path<String>,
    Json(request): Json<SaveWorkflowRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut workflow = request.workflow;
    workflow.id = id.clone();

    match state.storage.get_workflow(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return Err((
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("workflow not found: {id}") })),
            ))
        }
        Err(e) => return Err(error_response(e)),
    }

    save_and_reload(&state, &workflow).await?;

    tracing::info!("Hot-reloaded workflow: {} ({})", workflow.id, workflow.name);
    Ok(Json(json!({ "id": workflow.id, "message": "workflow updated" })))
}

/// DELETE /api/workflows/:id
///
/// Soft delete: excluded from matching and listing, still resolvable for
/// existing records.
async fn soft_delete_workflow(
    State(state): State<WorkflowAppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.storage.soft_delete_workflow(&id).await {
        Ok(_) => {
            if let Err(e) = state.registry.reload_workflow(&id).await {
                return Err(error_response(e));
            }
            tracing::info!("Soft-deleted workflow: {}", id);
            Ok(Json(json!({ "message": "workflow soft-deleted" })))
        }
        Err(e) => Err(error_response(e)),
    }
}

/// DELETE /api/workflows/:id/permanent
///
/// Refused while any record still references the workflow.
async fn purge_workflow(
    State(state): State<WorkflowAppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.storage.purge_workflow(&id).await {
        Ok(()) => {
            state.registry.remove_workflow(&id);
            tracing::info!("Purged workflow: {}", id);
            Ok(Json(json!({ "message": "workflow permanently deleted" })))
        }
        Err(e) => Err(error_response(e)),
    }
}

/// POST /api/workflows/:id/duplicate
async fn duplicate_workflow(
    State(state): State<WorkflowAppState>,
    Path(id): Path<String>,
    Json(request): Json<DuplicateRequest>,
) -> Result<(StatusCode, Json<Workflow>), (StatusCode, Json<Value>)> {
    match state.storage.duplicate_workflow(&id, request.name).await {
        Ok(copy) => {
            if let Err(e) = state.registry.reload_workflow(&copy.id).await {
                return Err(error_response(e));
            }
            tracing::info!("Duplicated workflow {} as {}", id, copy.id);
            Ok((StatusCode::CREATED, Json(copy)))
        }
        Err(e) => Err(error_response(e)),
    }
}

/// GET /api/workflows/:id/export
///
/// The export is the definition itself; importing it elsewhere reissues ids.
async fn export_workflow(
    State(state): State<WorkflowAppState>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, (StatusCode, Json<Value>)> {
    get_workflow(State(state), Path(id)).await
}

/// POST /api/workflows/import
async fn import_workflow(
    State(state): State<WorkflowAppState>,
    Json(workflow): Json<Workflow>,
) -> Result<(StatusCode, Json<Workflow>), (StatusCode, Json<Value>)> {
    match state.storage.import_workflow(workflow).await {
        Ok(imported) => {
            if let Err(e) = state.registry.reload_workflow(&imported.id).await {
                return Err(error_response(e));
            }
            tracing::info!("Imported workflow as {}", imported.id);
            Ok((StatusCode::CREATED, Json(imported)))
        }
        Err(e) => Err(error_response(e)),
    }
}

async fn save_and_reload(
    state: &WorkflowAppState,
    workflow: &Workflow,
) -> Result<(), (StatusCode, Json<Value>)> {
    if let Err(e) = state.storage.save_workflow(workflow).await {
        return Err(error_response(e));
    }
    if let Err(e) = state.registry.reload_workflow(&workflow.id).await {
        return Err(error_response(e));
    }
    Ok(())
}
