//! HTTP server: MCP over POST, notifications over SSE, workspace API

use super::events::SubscriptionHub;
use super::state::{SessionRegistry, SESSION_HEADER};
use super::workspace_routes;
use crate::error::{FocalError, Result};
use crate::mcp::{JsonRpcError, JsonRpcResponse, McpServer, SessionState};
use crate::workspace::WorkspaceStore;
use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{
        sse::{Event as SseEvent, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::StreamExt as _;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server address
    pub addr: SocketAddr,
    /// Upper bound for one filesystem call made by a handler
    pub io_timeout: Duration,
    /// Shared secret required as `Authorization: Bearer <token>`
    pub auth_token: Option<String>,
    /// Idle time after which an HTTP MCP session is evicted
    pub session_idle: Duration,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            addr: ([127, 0, 0, 1], 8765).into(),
            io_timeout: Duration::from_millis(5000),
            auth_token: None,
            session_idle: Duration::from_secs(1800),
        }
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub(crate) mcp: Arc<McpServer>,
    pub(crate) store: WorkspaceStore,
    pub(crate) hub: SubscriptionHub,
    pub(crate) sessions: SessionRegistry,
    pub(crate) server_id: String,
    pub(crate) io_timeout: Duration,
    auth_token: Option<Arc<str>>,
}

impl AppState {
    /// `store` should already report its mutations to `hub`
    pub fn new(
        store: WorkspaceStore,
        hub: SubscriptionHub,
        io_timeout: Duration,
        auth_token: Option<String>,
    ) -> Self {
        Self {
            mcp: Arc::new(McpServer::new(store.clone())),
            store,
            hub,
            sessions: SessionRegistry::new(),
            server_id: uuid::Uuid::new_v4().to_string()[..8].to_string(),
            io_timeout,
            auth_token: auth_token.filter(|t| !t.is_empty()).map(Arc::from),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Create new API server
    pub fn new(config: ApiServerConfig, store: WorkspaceStore, hub: SubscriptionHub) -> Self {
        let state = AppState::new(store, hub, config.io_timeout, config.auth_token.clone());
        Self { config, state }
    }

    /// Bind and serve until ctrl-c
    pub async fn serve(self) -> anyhow::Result<()> {
        let router = build_router(self.state.clone());
        let listener = tokio::net::TcpListener::bind(self.config.addr).await?;
        info!(
            "FOCAL server [{}] listening on http://{} (root {})",
            self.state.server_id,
            listener.local_addr()?,
            self.state.store.root().display()
        );
        if self.state.auth_token.is_some() {
            info!("Bearer token required for /mcp and /api routes");
        }

        let pruner = self.state.sessions.spawn_pruner(self.config.session_idle);
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await;
        pruner.abort();
        served?;
        info!("FOCAL server [{}] stopped", self.state.server_id);
        Ok(())
    }
}

/// Build router
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        // MCP transport
        .route("/mcp", post(mcp_post_handler).delete(mcp_delete_handler))
        .route("/mcp/events", get(mcp_events_handler))
        // Editing UI surface
        .merge(workspace_routes::routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .merge(protected)
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Run a blocking workspace call on the blocking pool under `timeout`
pub(crate) async fn run_blocking<T, F>(timeout: Duration, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(FocalError::Other(format!("blocking task failed: {}", join))),
        Err(_) => Err(FocalError::Timeout(format!(
            "workspace call exceeded {}ms",
            timeout.as_millis()
        ))),
    }
}

impl IntoResponse for FocalError {
    fn into_response(self) -> Response {
        let status = match &self {
            FocalError::InvalidPath(_)
            | FocalError::InvalidUri(_)
            | FocalError::InvalidParams(_)
            | FocalError::MethodNotFound(_)
            | FocalError::NotInitialized => StatusCode::BAD_REQUEST,
            FocalError::NotFound(_) => StatusCode::NOT_FOUND,
            FocalError::Conflict(_) => StatusCode::CONFLICT,
            FocalError::Unauthorized => StatusCode::UNAUTHORIZED,
            FocalError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            FocalError::Io(_)
            | FocalError::Config(_)
            | FocalError::Serialization(_)
            | FocalError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            debug!("Request rejected: {}", self);
        }

        (status, Json(json!({ "error": self.client_message() }))).into_response()
    }
}

/// Bearer-token gate; a no-op when no token is configured
async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.auth_token.as_deref() else {
        return next.run(request).await;
    };

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected);

    if authorized {
        next.run(request).await
    } else {
        FocalError::Unauthorized.into_response()
    }
}

/// JSON-RPC over POST
///
/// `initialize` allocates a session returned in `Mcp-Session-Id`. Other
/// requests carry that header; without a known session they run against a
/// fresh uninitialized state and are rejected by the protocol engine.
async fn mcp_post_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            let error = JsonRpcError::parse_error(format!("Invalid JSON: {}", e));
            return Json(JsonRpcResponse::error(None, error)).into_response();
        }
    };

    let request_id = value.get("id").cloned().filter(|id| !id.is_null());
    let is_initialize = value.get("method").and_then(Value::as_str) == Some("initialize");
    let session_id = if is_initialize {
        None
    } else {
        headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let session = match &session_id {
        Some(id) => state.sessions.get(id).await.unwrap_or_default(),
        None => SessionState::default(),
    };

    let mcp = state.mcp.clone();
    let outcome = run_blocking(state.io_timeout, move || {
        let mut session = session;
        let response = mcp.process_value(&mut session, value);
        Ok((session, response))
    })
    .await;

    let (session, response) = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("MCP request failed: {}", e);
            return Json(JsonRpcResponse::error(request_id, JsonRpcError::from(&e))).into_response();
        }
    };

    let mut created = None;
    if is_initialize && session.initialized {
        created = Some(state.sessions.create(session).await);
    } else if let Some(id) = &session_id {
        state.sessions.update(id, session).await;
    }

    let mut http = match response {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    };
    if let Some(id) = created {
        debug!("Allocated MCP session {}", id);
        if let Ok(value) = HeaderValue::from_str(&id) {
            http.headers_mut().insert(SESSION_HEADER, value);
        }
    }
    http
}

/// End an HTTP MCP session
async fn mcp_delete_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(id) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) else {
        return FocalError::InvalidParams(format!("missing {} header", SESSION_HEADER)).into_response();
    };

    if state.sessions.remove(id).await {
        info!("MCP session {} closed", id);
        StatusCode::NO_CONTENT.into_response()
    } else {
        FocalError::NotFound(format!("session {}", id)).into_response()
    }
}

/// SSE stream of list-changed notifications
///
/// Each connection is its own hub channel; it is unsubscribed when the
/// client goes away and the stream is dropped.
async fn mcp_events_handler(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = std::result::Result<SseEvent, Infallible>>> {
    let subscription = state.hub.subscribe();
    debug!("SSE client connected on channel {}", subscription.id());

    let stream = subscription.filter_map(|notification| {
        let data = serde_json::to_string(&notification.to_json_rpc()).ok()?;
        Some(Ok(SseEvent::default().event("message").data(data)))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Health check handler
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    server_id: String,
    subscribers: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        server_id: state.server_id.clone(),
        subscribers: state.hub.subscriber_count(),
    })
}
