//! Request and response bodies of the REST API.

use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use arkutils::ProcessState;
use serde::{Deserialize, Serialize};

use crate::{orchestration::LaunchedHelper, ArkvisorError, ErrorKind};

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// Request body of `POST /vm/migrate/{name}`.
#[derive(Debug, Deserialize)]
pub struct MigrateRequest {
    /// Address of the host currently running the VM.
    pub source_ip: String,
}

/// Query of `GET /vm/logs/{name}`.
#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    /// Only this component's log.
    pub component: Option<String>,

    /// Only the last lines of each log.
    pub tail: Option<usize>,
}

/// Response body of create and start.
#[derive(Debug, Serialize)]
pub struct LaunchResponse {
    /// What happened.
    pub message: String,

    /// The VM name.
    pub name: String,

    /// The request's log directory.
    pub logs_path: PathBuf,

    /// The helpers launched, in launch order.
    pub helpers: Vec<HelperResponse>,
}

/// A launched helper as reported to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperResponse {
    /// The component name.
    pub component: String,

    /// The spawned pid.
    pub pid: u32,

    /// `spawned`, `ready` or `exited`, as observed when the request returned.
    pub state: String,

    /// The exit code, for a helper that already exited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Response body of migrate.
#[derive(Debug, Serialize)]
pub struct MigrateResponse {
    /// What happened.
    pub message: String,

    /// The VM name.
    pub name: String,

    /// The source host.
    pub source: String,

    /// Always `migrating`; completion is not tracked.
    pub status: String,

    /// The request's log directory.
    pub logs_path: PathBuf,

    /// The helpers launched, in launch order.
    pub helpers: Vec<HelperResponse>,
}

/// Response body of stop.
#[derive(Debug, Serialize)]
pub struct StopResponse {
    /// What happened.
    pub message: String,

    /// The VM name.
    pub name: String,

    /// Processes sent `SIGTERM`.
    pub terminated: Vec<u32>,
}

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// The HTTP status code.
    pub code: u16,

    /// The machine-readable cause.
    pub error_type: ErrorKind,

    /// The error text.
    pub message: String,
}

/// An error rendered as an [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError(pub ArkvisorError);

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

impl ApiError {
    /// The status code the error is served with.
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Trait Implementations
//-------------------------------------------------------------------------------------------------

impl From<&LaunchedHelper> for HelperResponse {
    fn from(helper: &LaunchedHelper) -> Self {
        let (state, exit_code) = match helper.state {
            ProcessState::Spawned => ("spawned", None),
            ProcessState::Ready => ("ready", None),
            ProcessState::Exited { code } => ("exited", code),
        };

        Self {
            component: helper.component.clone(),
            pid: helper.pid,
            state: state.to_string(),
            exit_code,
        }
    }
}

impl From<ArkvisorError> for ApiError {
    fn from(error: ArkvisorError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self.0);
        } else {
            tracing::debug!("request rejected: {}", self.0);
        }

        let body = ErrorResponse {
            code: status.as_u16(),
            error_type: self.0.kind(),
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_response_reports_state() -> anyhow::Result<()> {
        let helper = LaunchedHelper {
            component: "peer".to_string(),
            pid: 42,
            state: ProcessState::Exited { code: Some(3) },
        };
        let response = HelperResponse::from(&helper);
        assert_eq!(response.state, "exited");
        assert_eq!(response.exit_code, Some(3));

        let helper = LaunchedHelper {
            state: ProcessState::Ready,
            ..helper
        };
        let json = serde_json::to_value(HelperResponse::from(&helper))?;
        assert_eq!(
            json,
            serde_json::json!({ "component": "peer", "pid": 42, "state": "ready" })
        );

        Ok(())
    }
}
