//! HTTP request handlers for the REST API.
//!
//! Each handler rejects unparseable input before calling into the orchestrator, so a bad
//! request never has side effects.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::header,
    response::IntoResponse,
    Json,
};

use super::{
    state::ServerState,
    types::{
        ApiError, HelperResponse, LaunchResponse, LogsQuery, MigrateRequest, MigrateResponse,
        StopResponse,
    },
};
use crate::{config::VmConfig, orchestration::VmStatus, ArkvisorError};

//-------------------------------------------------------------------------------------------------
// Functions: Handlers
//-------------------------------------------------------------------------------------------------

/// `POST /vm/create`
pub async fn create_handler(
    State(state): State<ServerState>,
    body: Result<Json<VmConfig>, JsonRejection>,
) -> Result<Json<LaunchResponse>, ApiError> {
    let Json(vm) = body.map_err(json_rejection)?;
    let launched = state.orchestrator().create(vm).await?;

    Ok(Json(LaunchResponse {
        message: "VM creation initiated".to_string(),
        name: launched.name,
        logs_path: launched.logs_path,
        helpers: launched.helpers.iter().map(HelperResponse::from).collect(),
    }))
}

/// `POST /vm/start/{name}`
pub async fn start_handler(
    State(state): State<ServerState>,
    Path(name): Path<String>,
) -> Result<Json<LaunchResponse>, ApiError> {
    let launched = state.orchestrator().start(&name).await?;

    Ok(Json(LaunchResponse {
        message: "VM started".to_string(),
        name: launched.name,
        logs_path: launched.logs_path,
        helpers: launched.helpers.iter().map(HelperResponse::from).collect(),
    }))
}

/// `POST /vm/stop/{name}`
pub async fn stop_handler(
    State(state): State<ServerState>,
    Path(name): Path<String>,
) -> Result<Json<StopResponse>, ApiError> {
    let report = state.orchestrator().stop(&name).await?;

    Ok(Json(StopResponse {
        message: "VM stopped".to_string(),
        name: report.name,
        terminated: report.terminated,
    }))
}

/// `GET /vm/status/{name}`
pub async fn status_handler(
    State(state): State<ServerState>,
    Path(name): Path<String>,
) -> Result<Json<VmStatus>, ApiError> {
    Ok(Json(state.orchestrator().status(&name).await?))
}

/// `POST /vm/migrate/{name}`
pub async fn migrate_handler(
    State(state): State<ServerState>,
    Path(name): Path<String>,
    body: Result<Json<MigrateRequest>, JsonRejection>,
) -> Result<Json<MigrateResponse>, ApiError> {
    let Json(request) = body.map_err(json_rejection)?;
    let launched = state
        .orchestrator()
        .migrate(&name, &request.source_ip)
        .await?;

    Ok(Json(MigrateResponse {
        message: "Migration initiated".to_string(),
        name: launched.name,
        source: request.source_ip,
        status: "migrating".to_string(),
        logs_path: launched.logs_path,
        helpers: launched.helpers.iter().map(HelperResponse::from).collect(),
    }))
}

/// `GET /vm/logs/{name}?component=<c>&tail=<n>`, served as plain text.
pub async fn logs_handler(
    State(state): State<ServerState>,
    Path(name): Path<String>,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query.map_err(|e| ArkvisorError::InvalidRequest(e.body_text()))?;
    let logs = state
        .orchestrator()
        .logs(&name, query.component.as_deref(), query.tail)
        .await?;

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], logs))
}

//-------------------------------------------------------------------------------------------------
// Functions: Helpers
//-------------------------------------------------------------------------------------------------

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError(ArkvisorError::InvalidRequest(rejection.body_text()))
}
