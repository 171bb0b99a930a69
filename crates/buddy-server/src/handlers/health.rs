//! Health check handler

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use buddy_core::{Completer, ExpenseStore};

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct StoreHealth {
    pub backend: String,
    pub healthy: bool,
}

#[derive(Debug, Serialize)]
pub struct LlmHealth {
    pub configured: bool,
    pub backend: Option<String>,
    pub model: Option<String>,
    pub healthy: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" when every configured collaborator answers, otherwise "degraded"
    pub status: &'static str,
    pub store: StoreHealth,
    pub llm: LlmHealth,
    pub active_sessions: usize,
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store_healthy = state.store.health_check().await;

    let llm = match &state.llm {
        Some(client) => LlmHealth {
            configured: true,
            backend: Some(client.backend_name().to_string()),
            model: Some(client.model().to_string()),
            healthy: client.health_check().await,
        },
        None => LlmHealth {
            configured: false,
            backend: None,
            model: None,
            healthy: false,
        },
    };

    let status = if store_healthy && llm.healthy {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        store: StoreHealth {
            backend: state.store.name().to_string(),
            healthy: store_healthy,
        },
        llm,
        active_sessions: state.sessions.len().await,
    })
}
