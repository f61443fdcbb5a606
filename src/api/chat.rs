use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::error::{build_error_message, TurnError};
use crate::llm::prompt::{sanitize_for_prompt, truncate_to_char_boundary};
use crate::models::{TurnRequest, TurnResponse};
use crate::state::AppState;

const MAX_MESSAGE_LEN: usize = 2000;

type ApiError = (StatusCode, Json<serde_json::Value>);

/// POST /api/sessions/{id}/turns
pub async fn post_turn(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, ApiError> {
    // ── Step 1: Validate and sanitize input ───────────────
    let message = sanitize_for_prompt(&truncate_to_char_boundary(
        req.message.trim(),
        MAX_MESSAGE_LEN,
    ));
    let message = message.trim().to_string();
    if message.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Message is required"));
    }

    let handle = state
        .session(&id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Session not found"))?;

    // ── Step 2: Invalidate any earlier turn ───────────────
    let snapshot = handle.session.lock().begin_turn();
    let ticket = snapshot.ticket;
    handle.cancel_in_flight();

    // ── Step 3: Acquire semaphore ─────────────────────────
    let _permit = state
        .turn_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| api_error(StatusCode::SERVICE_UNAVAILABLE, "Turn service at capacity"))?;

    if !handle.session.lock().is_current(&ticket) {
        return Err(turn_error(TurnError::Superseded));
    }

    // ── Step 4: Run the pipeline ──────────────────────────
    let orchestrator = state.orchestrator.clone();
    let mode = req.mode;
    let task = tokio::spawn(async move { orchestrator.run(&snapshot, mode, &message).await });
    handle.track(ticket, task.abort_handle());

    let result = match task.await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(TurnError::Superseded),
        Err(e) => {
            tracing::error!("Turn task for session {id} failed: {e}");
            handle.session.lock().mark_failed(&ticket);
            return Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &build_error_message("Something went wrong."),
            ));
        }
    };

    // ── Step 5: Commit ────────────────────────────────────
    let response = {
        let mut session = handle.session.lock();
        match result.and_then(|response| {
            session.commit(&ticket, mode, &response)?;
            Ok(response)
        }) {
            Ok(response) => response,
            Err(e) => {
                session.mark_failed(&ticket);
                return Err(turn_error(e));
            }
        }
    };

    let locations = response.locations();
    Ok(Json(TurnResponse {
        mode,
        response,
        locations,
    }))
}

fn turn_error(err: TurnError) -> ApiError {
    let status = match err {
        TurnError::Rewrite(_) | TurnError::Retrieval(_) | TurnError::Synthesis(_) => {
            StatusCode::BAD_GATEWAY
        }
        TurnError::Superseded => StatusCode::CONFLICT,
        TurnError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::CONFLICT {
        tracing::info!("Turn dropped: {err}");
    }
    api_error(status, &err.user_message())
}

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(serde_json::json!({ "error": message })))
}
