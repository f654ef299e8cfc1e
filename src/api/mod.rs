/// HTTP API Layer
///
/// Thin presentation shim over the engine: handlers deserialize input, hand
/// it to the core, and map the error taxonomy to status codes. No wire
/// format is guaranteed here; the core's contracts live below this layer.

use crate::error::EngineError;
use crate::record::types::Actor;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use serde_json::{json, Value};

// Record endpoints (create, transition, audit queries)
pub mod records;

// Workflow definition endpoints (CRUD, duplicate, export/import)
pub mod workflows;

// Re-export router builders
pub use records::create_record_routes;
pub use workflows::create_workflow_routes;

/// Build the acting identity from request headers.
///
/// The core never resolves roles itself; the surrounding application is
/// expected to authenticate the caller and forward identity and roles in
/// `x-actor` / `x-roles` (comma-separated) / `x-super-admin`.
pub fn actor_from_headers(headers: &HeaderMap) -> Actor {
    let id = headers
        .get("x-actor")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    let roles: Vec<String> = headers
        .get("x-roles")
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let super_admin = headers
        .get("x-super-admin")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let mut actor = Actor::new(id, roles);
    actor.super_admin = super_admin;
    actor
}

/// Map an engine error to a status code and structured body.
pub fn error_response(err: EngineError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        EngineError::WorkflowNotFound(_)
        | EngineError::StateNotFound(_)
        | EngineError::TransitionNotFound(_)
        | EngineError::RecordNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InvalidTopology(_)
        | EngineError::TerminalState(_)
        | EngineError::StaleVersion { .. }
        | EngineError::HasDependentRecords { .. }
        | EngineError::AmbiguousWorkflow { .. } => StatusCode::CONFLICT,
        EngineError::Forbidden { .. } => StatusCode::FORBIDDEN,
        EngineError::RequirementsNotMet(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::NoApplicableWorkflow(_) => StatusCode::BAD_REQUEST,
        EngineError::Storage(_) | EngineError::Encoding(_) => {
            tracing::error!("Internal error: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let body = match &err {
        EngineError::RequirementsNotMet(violations) => json!({
            "error": err.to_string(),
            "violations": violations,
        }),
        EngineError::AmbiguousWorkflow { candidates } => json!({
            "error": err.to_string(),
            "candidates": candidates,
        }),
        EngineError::StaleVersion { expected, found, .. } => json!({
            "error": err.to_string(),
            "expected_version": expected,
            "found_version": found,
        }),
        _ => json!({ "error": err.to_string() }),
    };

    (status, Json(body))
}
