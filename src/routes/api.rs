use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::console;
use crate::db::{RowPosition, StoredSubmission};
use crate::error::ApiError;
use crate::session::{
    spawn_poller, ConversationEntry, PollOutcome, SessionContext, SessionHandle, SessionState,
    SubmitOutcome, SubmitRequest,
};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub state: SessionState,
    pub conversation: Vec<ConversationEntry>,
    pub retry_after_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    #[serde(flatten)]
    pub outcome: SubmitOutcome,
    #[serde(flatten)]
    pub session: SessionView,
}

#[derive(Debug, Serialize)]
pub struct PollResponse {
    #[serde(flatten)]
    pub outcome: PollOutcome,
    #[serde(flatten)]
    pub session: SessionView,
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub code: String,
    pub pending: Vec<StoredSubmission>,
}

fn view(state: &AppState, id: Uuid, context: &SessionContext) -> SessionView {
    SessionView {
        session_id: id,
        state: context.state(),
        conversation: context.conversation().to_vec(),
        retry_after_secs: state.schedule.retry_after_secs(),
    }
}

async fn session(state: &AppState, id: &Uuid) -> Result<SessionHandle, ApiError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("session {}", id)))
}

pub async fn create_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (id, handle) = state.sessions.create().await;
    let context = handle.lock().await;
    tracing::info!("Started session {}", id);
    (StatusCode::CREATED, Json(view(&state, id, &context)))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let handle = session(&state, &id).await?;
    let context = handle.lock().await;
    Ok(Json(view(&state, id, &context)))
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let handle = session(&state, &id).await?;
    let mut context = handle.lock().await;

    let outcome = context
        .submit(request, &state.pipeline, &state.profile, &state.repo)
        .await;

    if outcome == SubmitOutcome::Waiting {
        let poller = spawn_poller(state.sessions.clone(), id, state.repo.clone(), state.schedule);
        state.sessions.attach_poller(&id, poller).await;
    }

    Ok(Json(SubmitResponse {
        outcome,
        session: view(&state, id, &context),
    }))
}

/// Student-driven poll. Shares the idempotent check the background poller
/// runs, so either may observe the approval first. While the client keeps
/// polling, the background poller stands down.
pub async fn poll(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PollResponse>, ApiError> {
    let handle = state
        .sessions
        .record_client_poll(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("session {}", id)))?;
    let mut context = handle.lock().await;

    let outcome = match context.poll(&state.repo).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!("Poll for session {} failed: {}", id, e);
            if context.state() == SessionState::Waiting {
                PollOutcome::Waiting
            } else {
                PollOutcome::Idle
            }
        }
    };

    Ok(Json(PollResponse {
        outcome,
        session: view(&state, id, &context),
    }))
}

pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(&id).await {
        tracing::info!("Ended session {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("session {}", id)))
    }
}

pub async fn list_pending(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<PendingResponse>, ApiError> {
    let pending = console::list_pending(&state.repo, &query.code).await?;
    Ok(Json(PendingResponse {
        code: query.code,
        pending,
    }))
}

pub async fn approve(
    State(state): State<Arc<AppState>>,
    Path(position): Path<usize>,
) -> Result<Json<serde_json::Value>, ApiError> {
    console::approve(&state.repo, RowPosition(position)).await?;
    Ok(Json(serde_json::json!({ "success": true, "position": position })))
}

pub async fn regenerate(
    State(state): State<Arc<AppState>>,
    Path(position): Path<usize>,
) -> Result<Json<StoredSubmission>, ApiError> {
    let row = console::regenerate(
        &state.repo,
        &state.pipeline,
        &state.profile,
        RowPosition(position),
    )
    .await?;
    Ok(Json(row))
}
