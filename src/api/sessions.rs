use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::session::Session;
use crate::state::AppState;

/// POST /api/sessions
pub async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, String)> {
    let id = state.create_session().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Session limit ({}) reached", state.config.max_sessions),
        )
    })?;

    tracing::info!("Session {id} created");
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// GET /api/sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Session>, (StatusCode, String)> {
    let handle = state
        .session(&id)
        .ok_or((StatusCode::NOT_FOUND, "Session not found".to_string()))?;
    let session = handle.session.lock().clone();
    Ok(Json(session))
}

/// DELETE /api/sessions/{id}
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.remove_session(&id) {
        tracing::info!("Session {id} ended");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "Session not found".to_string()))
    }
}

/// GET /api/config
pub async fn get_config(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "llm": state.config.llm,
        "pipeline": state.orchestrator.config(),
        "max_sessions": state.config.max_sessions,
    }))
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.sessions.read().len(),
    }))
}
