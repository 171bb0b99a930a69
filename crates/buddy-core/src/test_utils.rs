//! Test utilities for buddy-core
//!
//! Mock collaborators for development and integration tests:
//! - `MockLlmServer` answers the OpenAI-compatible, Ollama and Gemini endpoints
//! - `MockRestServer` imitates the PostgREST subset the hosted store uses

use axum::{
    extract::{Json, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Bind a router to an ephemeral port and serve it until shutdown
async fn spawn(app: Router) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .unwrap();
    });

    (addr, shutdown_tx)
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

struct LlmState {
    reply: String,
    failures_left: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl LlmState {
    /// Record the prompt, or fail with 503 while failures remain
    fn answer(&self, prompt: String) -> Result<String, StatusCode> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
        self.prompts.lock().unwrap().push(prompt);
        Ok(self.reply.clone())
    }
}

/// Mock LLM server for testing and development
pub struct MockLlmServer {
    addr: SocketAddr,
    state: Arc<LlmState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockLlmServer {
    /// Start a server that always answers with a canned reply
    pub async fn start() -> Self {
        Self::start_with("Mock advice: spend less on coffee.", 0).await
    }

    /// Start a server that answers `failures` requests with 503 before replying
    pub async fn start_with(reply: &str, failures: u32) -> Self {
        let state = Arc::new(LlmState {
            reply: reply.to_string(),
            failures_left: AtomicU32::new(failures),
            prompts: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/models", get(handle_openai_models))
            .route("/v1/chat/completions", post(handle_chat_completions))
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate))
            .route(
                "/v1beta/models/:model",
                get(handle_gemini_model).post(handle_generate_content),
            )
            .with_state(state.clone());

        let (addr, shutdown_tx) = spawn(app).await;

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Prompts received so far (failed attempts excluded)
    pub fn prompts(&self) -> Vec<String> {
        self.state.prompts.lock().unwrap().clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockLlmServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_openai_models() -> Json<Value> {
    Json(json!({ "object": "list", "data": [{ "id": "mock-model", "object": "model" }] }))
}

async fn handle_chat_completions(
    State(state): State<Arc<LlmState>>,
    Json(request): Json<Value>,
) -> Response {
    let prompt = request["messages"]
        .as_array()
        .and_then(|m| m.last())
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_string();

    match state.answer(prompt) {
        Ok(reply) => Json(json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": reply } }]
        }))
        .into_response(),
        Err(status) => status.into_response(),
    }
}

async fn handle_tags() -> Json<Value> {
    Json(json!({ "models": [{ "name": "llama3.2:latest" }] }))
}

async fn handle_generate(State(state): State<Arc<LlmState>>, Json(request): Json<Value>) -> Response {
    let prompt = request["prompt"].as_str().unwrap_or_default().to_string();
    match state.answer(prompt) {
        Ok(reply) => Json(json!({
            "model": request["model"],
            "response": reply,
            "done": true
        }))
        .into_response(),
        Err(status) => status.into_response(),
    }
}

async fn handle_gemini_model(Path(model): Path<String>) -> Json<Value> {
    Json(json!({ "name": format!("models/{}", model) }))
}

async fn handle_generate_content(
    State(state): State<Arc<LlmState>>,
    Path(model): Path<String>,
    Json(request): Json<Value>,
) -> Response {
    if !model.ends_with(":generateContent") {
        return StatusCode::NOT_FOUND.into_response();
    }

    let prompt: String = request["contents"]
        .as_array()
        .into_iter()
        .flatten()
        .flat_map(|c| c["parts"].as_array().cloned().unwrap_or_default())
        .filter_map(|p| p["text"].as_str().map(str::to_string))
        .collect();

    match state.answer(prompt) {
        Ok(reply) => Json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": reply }] },
                "finishReason": "STOP"
            }]
        }))
        .into_response(),
        Err(status) => status.into_response(),
    }
}

// ---------------------------------------------------------------------------
// PostgREST
// ---------------------------------------------------------------------------

struct RestState {
    api_key: String,
    next_id: AtomicI64,
    tables: Mutex<HashMap<String, Vec<Value>>>,
}

/// Mock PostgREST server holding tables in memory
pub struct MockRestServer {
    addr: SocketAddr,
    state: Arc<RestState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockRestServer {
    /// Start a server that accepts only `api_key`
    pub async fn start(api_key: &str) -> Self {
        let state = Arc::new(RestState {
            api_key: api_key.to_string(),
            next_id: AtomicI64::new(1),
            tables: Mutex::new(HashMap::new()),
        });

        let app = Router::new()
            .route(
                "/rest/v1/:table",
                get(handle_select)
                    .post(handle_insert)
                    .delete(handle_delete)
                    .patch(handle_update),
            )
            .with_state(state.clone());

        let (addr, shutdown_tx) = spawn(app).await;

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Current rows of a table
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.state
            .tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockRestServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn authorized(state: &RestState, headers: &HeaderMap) -> bool {
    headers
        .get("apikey")
        .and_then(|v| v.to_str().ok())
        .map(|key| key == state.api_key)
        .unwrap_or(false)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Invalid API key" })),
    )
        .into_response()
}

async fn handle_select(
    State(state): State<Arc<RestState>>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }

    let mut rows = state
        .tables
        .lock()
        .unwrap()
        .get(&table)
        .cloned()
        .unwrap_or_default();
    if let Some(limit) = params.get("limit").and_then(|l| l.parse::<usize>().ok()) {
        rows.truncate(limit);
    }
    Json(Value::Array(rows)).into_response()
}

async fn handle_insert(
    State(state): State<Arc<RestState>>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }

    let incoming = match body {
        Value::Array(rows) => rows,
        row => vec![row],
    };

    // Validate the whole batch first, like a single INSERT statement
    for row in &incoming {
        let named = row["name"].as_str().map(|n| !n.is_empty()).unwrap_or(false);
        let amount_ok = row["amount"].as_f64().map(|a| a >= 0.0).unwrap_or(false);
        if !named || !amount_ok {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "code": "23514", "message": "violates check constraint" })),
            )
                .into_response();
        }
    }

    let mut inserted = Vec::with_capacity(incoming.len());
    let mut tables = state.tables.lock().unwrap();
    let rows = tables.entry(table.clone()).or_default();
    for row in incoming {
        let mut stored = json!({
            "id": state.next_id.fetch_add(1, Ordering::SeqCst),
            "name": row["name"],
            "amount": row["amount"],
        });
        if table == "current_expenses" {
            stored["created_at"] = json!(chrono::Utc::now().to_rfc3339());
        }
        rows.push(stored.clone());
        inserted.push(stored);
    }

    (StatusCode::CREATED, Json(Value::Array(inserted))).into_response()
}

async fn handle_delete(
    State(state): State<Arc<RestState>>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    if params.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "DELETE requires a WHERE clause" })),
        )
            .into_response();
    }

    state.tables.lock().unwrap().remove(&table);
    StatusCode::NO_CONTENT.into_response()
}

async fn handle_update(
    State(state): State<Arc<RestState>>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }

    let id = params
        .get("id")
        .and_then(|f| f.strip_prefix("eq."))
        .and_then(|n| n.parse::<i64>().ok());

    let mut tables = state.tables.lock().unwrap();
    let mut updated = Vec::new();
    if let (Some(id), Some(rows)) = (id, tables.get_mut(&table)) {
        for row in rows.iter_mut().filter(|r| r["id"].as_i64() == Some(id)) {
            row["name"] = body["name"].clone();
            row["amount"] = body["amount"].clone();
            updated.push(row.clone());
        }
    }

    Json(Value::Array(updated)).into_response()
}
