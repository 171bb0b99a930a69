//! Chat session handlers
//!
//! The session lock is never held while an agent is running: the handler
//! reads the income, lets the advisor answer, then records the finished turn.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use buddy_core::{AgentKind, ChatMessage, ChatTurn, LLM_NOT_CONFIGURED_MESSAGE};

use crate::session::SessionView;
use crate::{AppError, AppState, SuccessResponse};

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub income: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct IncomeRequest {
    pub income: f64,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub agent: AgentKind,
    pub reply: String,
    /// True when the reply describes a failure instead of advice
    pub failed: bool,
    pub transcript: Vec<ChatMessage>,
}

fn session_not_found(id: &str) -> AppError {
    AppError::not_found(&format!("Session not found or expired: {}", id))
}

/// POST /api/sessions - Start a chat session, optionally with an income
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();

    let mut view = state.sessions.create().await;
    if let Some(income) = req.income {
        match state.sessions.set_income(&view.session_id, income).await {
            Ok(Some(updated)) => view = updated,
            Ok(None) => return Err(session_not_found(&view.session_id)),
            Err(e) => {
                state.sessions.delete(&view.session_id).await;
                return Err(e.into());
            }
        }
    }

    debug!(session_id = %view.session_id, "Created chat session");
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/sessions/:id
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    state
        .sessions
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| session_not_found(&id))
}

/// DELETE /api/sessions/:id
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    if state.sessions.delete(&id).await {
        debug!(session_id = %id, "Deleted chat session");
        Ok(Json(SuccessResponse { success: true }))
    } else {
        Err(session_not_found(&id))
    }
}

/// PUT /api/sessions/:id/income
pub async fn set_income(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<IncomeRequest>,
) -> Result<Json<SessionView>, AppError> {
    state
        .sessions
        .set_income(&id, req.income)
        .await?
        .map(Json)
        .ok_or_else(|| session_not_found(&id))
}

/// POST /api/sessions/:id/messages - One chat turn
///
/// Store and LLM failures come back as the assistant reply with
/// `failed: true`; the turn is recorded either way.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(buddy_core::Error::EmptyInput("please type a message".into()).into());
    }

    let income = state
        .sessions
        .income(&id)
        .await
        .ok_or_else(|| session_not_found(&id))?;

    let turn = match &state.advisor {
        Some(advisor) => advisor.respond(income, message).await,
        None => {
            warn!(session_id = %id, "Chat message received but no LLM backend is configured");
            ChatTurn {
                agent: AgentKind::for_message(message),
                reply: LLM_NOT_CONFIGURED_MESSAGE.to_string(),
                failed: true,
            }
        }
    };

    // The session may have been deleted or expired while the agent ran
    let view = state
        .sessions
        .record_turn(&id, message, &turn.reply)
        .await
        .ok_or_else(|| session_not_found(&id))?;

    Ok(Json(MessageResponse {
        agent: turn.agent,
        reply: turn.reply,
        failed: turn.failed,
        transcript: view.transcript,
    }))
}
