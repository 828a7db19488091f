use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::engine::{ConfigurationState, ConfigurationSummary, EngineStatus};
use crate::error::{ConfigurationError, EngineError};
use crate::observability::LogEntry;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub engine: EngineStatus,
}

#[derive(Serialize)]
pub struct ActionResult {
    pub configuration: String,
    pub action: &'static str,
    pub state: ConfigurationState,
}

/// Engine errors mapped to HTTP responses.
pub struct AdminError(EngineError);

impl From<EngineError> for AdminError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::Busy { .. } => StatusCode::CONFLICT,
            EngineError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Configuration(ConfigurationError::Unregistered { .. }) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let mut body = serde_json::json!({ "error": self.0.to_string() });
        if let EngineError::Busy { loading } = &self.0 {
            body["loading"] = serde_json::json!(loading);
        }
        (status, Json(body)).into_response()
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        engine: state.engine.status(),
    })
}

pub async fn get_configurations(
    State(state): State<AdminState>,
) -> Json<Vec<ConfigurationSummary>> {
    Json(state.engine.configurations())
}

pub async fn get_configuration(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<ConfigurationSummary>, StatusCode> {
    state
        .engine
        .configuration(&name)
        .map(|c| Json(c.summary()))
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn get_log(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Json<Vec<LogEntry>> {
    Json(state.engine.log(&name))
}

pub async fn load_configuration(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<ActionResult>, AdminError> {
    let result = state.engine.load(&name).await?;
    Ok(Json(ActionResult {
        configuration: name,
        action: "load",
        state: result,
    }))
}

pub async fn unload_configuration(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<ActionResult>, AdminError> {
    state.engine.unload(&name).await?;
    let result = state.engine.state(&name);
    Ok(Json(ActionResult {
        configuration: name,
        action: "unload",
        state: result,
    }))
}

pub async fn reload_configuration(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<ActionResult>, AdminError> {
    let result = state.engine.reload(&name).await?;
    Ok(Json(ActionResult {
        configuration: name,
        action: "reload",
        state: result,
    }))
}

pub async fn full_reload(
    State(state): State<AdminState>,
) -> Result<Json<EngineStatus>, AdminError> {
    state.engine.full_reload().await?;
    Ok(Json(state.engine.status()))
}
