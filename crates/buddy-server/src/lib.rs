//! Budget Buddy Web Server
//!
//! Axum-based REST API for the Budget Buddy finance assistant.
//!
//! Security features:
//! - API key / trusted network authentication (secure by default, use --no-auth for local dev)
//! - Restrictive CORS policy
//! - Sanitized error responses

use std::sync::{Arc, RwLock};

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use buddy_core::{Advisor, Completer, ExpenseStore, LlmClient, PromptLibrary, StoreClient};

mod handlers;
pub mod session;

pub use session::{SessionManager, SessionView};

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// API keys accepted as "Bearer <key>" in the Authorization header
    pub api_keys: Vec<String>,
    /// Trusted networks that bypass authentication (e.g., "192.168.1.0/24", "10.0.0.5")
    pub trusted_networks: Vec<ipnet::IpNet>,
    /// Proxies whose X-Forwarded-For headers are trusted
    pub trusted_proxies: Vec<ipnet::IpNet>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
            trusted_networks: vec![],
            trusted_proxies: vec![],
        }
    }
}

impl ServerConfig {
    /// Read `BUDDY_API_KEYS`, `BUDDY_TRUSTED_NETWORKS`, `BUDDY_TRUSTED_PROXIES`
    /// and `BUDDY_ALLOWED_ORIGINS` (all comma-separated)
    pub fn from_env(require_auth: bool) -> Self {
        let list = |name: &str| -> Vec<String> {
            std::env::var(name)
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default()
        };

        Self {
            require_auth,
            allowed_origins: list("BUDDY_ALLOWED_ORIGINS"),
            api_keys: list("BUDDY_API_KEYS"),
            trusted_networks: parse_trusted_networks(
                &std::env::var("BUDDY_TRUSTED_NETWORKS").unwrap_or_default(),
            ),
            trusted_proxies: parse_trusted_networks(
                &std::env::var("BUDDY_TRUSTED_PROXIES").unwrap_or_default(),
            ),
        }
    }
}

/// Shared application state
pub struct AppState {
    pub store: StoreClient,
    pub llm: Option<LlmClient>,
    /// Chat router; `None` when no LLM backend is configured
    pub advisor: Option<Advisor<StoreClient, LlmClient>>,
    pub config: ServerConfig,
    pub sessions: SessionManager,
}

/// Authentication middleware - trusted networks first, then API keys
///
/// # Security Notes
///
/// **Trusted networks**: Requests from IPs in `trusted_networks` bypass authentication.
/// The client IP is the TCP peer address unless the peer is a configured trusted proxy.
///
/// **API keys**: Compared using constant-time comparison to prevent timing attacks.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    connect_info: Option<axum::extract::ConnectInfo<std::net::SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    if !state.config.trusted_networks.is_empty() {
        let client_ip = get_client_ip(
            &request,
            connect_info.as_ref(),
            &state.config.trusted_proxies,
        );

        tracing::debug!(
            ?client_ip,
            trusted_networks = ?state.config.trusted_networks,
            path = %request.uri().path(),
            "Checking trusted network auth"
        );

        if let Some(ip) = client_ip {
            if is_ip_trusted(&ip, &state.config.trusted_networks) {
                info!(ip = %ip, path = %request.uri().path(), "Authenticated via trusted network");
                return next.run(request).await;
            }
        }
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        info!(user = "api-key", path = %request.uri().path(), "Authenticated via API key");
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Validate an API key against the configured keys in constant time
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    valid_keys.iter().any(|key| {
        let key_bytes = key.as_bytes();
        // Only compare if lengths match (constant-time for same-length keys)
        provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes))
    })
}

/// Extract client IP address, respecting trusted proxies
///
/// X-Forwarded-For is ONLY trusted when the TCP connection comes from a
/// configured trusted proxy; otherwise the peer address is used.
pub(crate) fn get_client_ip(
    request: &Request,
    connect_info: Option<&axum::extract::ConnectInfo<std::net::SocketAddr>>,
    trusted_proxies: &[ipnet::IpNet],
) -> Option<std::net::IpAddr> {
    let peer_ip = connect_info.map(|ci| ci.0.ip())?;

    if trusted_proxies.is_empty() {
        return Some(peer_ip);
    }

    let peer_is_trusted_proxy = trusted_proxies.iter().any(|net| net.contains(&peer_ip));

    if peer_is_trusted_proxy {
        // "client, proxy1, proxy2" - take the original client
        if let Some(client_ip) = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|s| s.trim().parse::<std::net::IpAddr>().ok())
        {
            return Some(client_ip);
        }

        if let Some(client_ip) = request
            .headers()
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<std::net::IpAddr>().ok())
        {
            return Some(client_ip);
        }
    }

    Some(peer_ip)
}

fn is_ip_trusted(ip: &std::net::IpAddr, trusted_networks: &[ipnet::IpNet]) -> bool {
    trusted_networks.iter().any(|network| network.contains(ip))
}

/// Parse a comma-separated list of IP addresses and CIDR networks
///
/// Examples:
/// - "192.168.1.0/24" - entire subnet
/// - "10.0.0.5" - single IP (parsed as /32 for IPv4 or /128 for IPv6)
/// - "192.168.1.0/24,10.0.0.0/8" - multiple networks
pub fn parse_trusted_networks(input: &str) -> Vec<ipnet::IpNet> {
    input
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(net) = s.parse::<ipnet::IpNet>() {
                return Some(net);
            }
            if let Ok(ip) = s.parse::<std::net::IpAddr>() {
                return Some(ipnet::IpNet::from(ip));
            }
            warn!(input = s, "Failed to parse trusted network entry");
            None
        })
        .collect()
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router, taking the LLM backend from the environment
pub fn create_router(store: StoreClient, config: ServerConfig) -> Router {
    let llm = LlmClient::from_env();
    match &llm {
        Some(client) => info!(
            "LLM backend configured: {} at {} (model: {})",
            client.backend_name(),
            client.host(),
            client.model()
        ),
        None => info!("ℹ️  LLM backend not configured (set GEMINI_API_KEY or LLM_BACKEND)"),
    }
    create_router_with_options(store, llm, config, PromptLibrary::new())
}

/// Create the application router with explicit collaborators (for testing)
pub fn create_router_with_options(
    store: StoreClient,
    llm: Option<LlmClient>,
    config: ServerConfig,
    prompts: PromptLibrary,
) -> Router {
    let prompts = Arc::new(RwLock::new(prompts));
    let advisor = llm
        .clone()
        .map(|llm| Advisor::with_prompts(store.clone(), llm, prompts));

    let state = Arc::new(AppState {
        store,
        llm,
        advisor,
        config: config.clone(),
        sessions: SessionManager::new(),
    });

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        // Expenses
        .route(
            "/expenses/recurring",
            get(handlers::list_recurring).put(handlers::replace_recurring),
        )
        .route(
            "/expenses/discretionary",
            get(handlers::list_discretionary).post(handlers::add_discretionary),
        )
        .route(
            "/expenses/discretionary/:id",
            put(handlers::update_discretionary),
        )
        // Chat sessions
        .route("/sessions", post(handlers::create_session))
        .route(
            "/sessions/:id",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/sessions/:id/income", put(handlers::set_income))
        .route("/sessions/:id/messages", post(handlers::send_message))
        // Dashboard
        .route("/sessions/:id/overview", get(handlers::get_overview));

    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    let csp_value = HeaderValue::from_static(
        "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' data:; connect-src 'self'; frame-ancestors 'none'",
    );

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            csp_value,
        ))
}

/// Start the server with default (authenticated) configuration
pub async fn serve(store: StoreClient, host: &str, port: u16) -> anyhow::Result<()> {
    serve_with_config(store, host, port, ServerConfig::default()).await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    store: StoreClient,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    } else if config.api_keys.is_empty() && config.trusted_networks.is_empty() {
        warn!("⚠️  Authentication required but no BUDDY_API_KEYS or BUDDY_TRUSTED_NETWORKS set - every request will be rejected");
    }

    check_store_connection(&store).await;
    check_llm_connection().await;

    let app = create_router(store, config)
        .into_make_service_with_connect_info::<std::net::SocketAddr>();
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn check_store_connection(store: &StoreClient) {
    if store.health_check().await {
        info!("✅ Expense store ready: {}", store.name());
    } else {
        warn!(
            "⚠️  Expense store not responding: {} (requests will fail until it recovers)",
            store.name()
        );
    }
}

/// Check and log LLM backend connection status
async fn check_llm_connection() {
    match LlmClient::from_env() {
        Some(client) => {
            if client.health_check().await {
                info!(
                    "✅ LLM backend connected: {} (model: {})",
                    client.host(),
                    client.model()
                );
            } else {
                warn!(
                    "⚠️  LLM backend configured but not responding: {} (model: {})",
                    client.host(),
                    client.model()
                );
            }
        }
        None => {
            info!("ℹ️  LLM backend not configured (chat replies will explain how to set it up)");
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(err) = &self.internal {
            error!(status = %self.status, error = %err, "Request failed");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl From<buddy_core::Error> for AppError {
    fn from(err: buddy_core::Error) -> Self {
        use buddy_core::Error;

        match err {
            Error::Validation(_) | Error::EmptyInput(_) => Self::bad_request(&err.to_string()),
            Error::NotFound(_) => Self::not_found(&err.to_string()),
            Error::Unavailable { .. } | Error::Unreachable { .. } | Error::Upstream { .. } => {
                Self {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    message: err.to_string(),
                    internal: Some(err.into()),
                }
            }
            err if err.is_collaborator_failure() => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "The expense database is unavailable, please try again".to_string(),
                internal: Some(err.into()),
            },
            err => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                // Return generic message to client
                message: "An internal error occurred".to_string(),
                internal: Some(err.into()),
            },
        }
    }
}
