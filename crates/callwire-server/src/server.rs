//! HTTP surface: router, `/ws` upgrade, listener lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use callwire_settings::{CallwireSettings, CorsSettings, ServerSettings};
use callwire_store::CallSessionStore;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{AuthError, IdentityResolver, JwtIdentityResolver};
use crate::call_tracker::CallTracker;
use crate::connection::CLOSE_POLICY_VIOLATION;
use crate::docs;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse, Liveness};
use crate::metrics::WS_AUTH_FAILURES_TOTAL;
use crate::registry::ConnectionRegistry;
use crate::relay::Relay;
use crate::session::{run_session, SessionSettings};
use crate::shutdown::ShutdownCoordinator;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub resolver: Arc<dyn IdentityResolver>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub sessions: TaskTracker,
    pub session_settings: SessionSettings,
    pub max_message_size: usize,
    pub metrics_handle: Option<PrometheusHandle>,
    pub start_time: Instant,
}

/// The signaling relay server.
pub struct SignalingServer {
    server: ServerSettings,
    cors: CorsSettings,
    state: AppState,
}

impl SignalingServer {
    pub fn new(
        settings: &CallwireSettings,
        resolver: Arc<dyn IdentityResolver>,
        tracker: CallTracker,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(Duration::from_millis(
            settings.server.send_timeout_ms,
        )));
        let state = AppState {
            relay: Arc::new(Relay::new(registry, tracker)),
            resolver,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            sessions: TaskTracker::new(),
            session_settings: SessionSettings::from_server(&settings.server),
            max_message_size: settings.server.max_message_size,
            metrics_handle,
            start_time: Instant::now(),
        };
        Self {
            server: settings.server.clone(),
            cors: settings.cors.clone(),
            state,
        }
    }

    /// Build with the JWT verifier configured in `settings`.
    ///
    /// `store` is `None` when call tracking is disabled.
    pub fn from_settings(
        settings: &CallwireSettings,
        store: Option<Arc<dyn CallSessionStore>>,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Result<Self, ServerError> {
        let secret = settings
            .auth
            .secret()
            .ok_or_else(|| ServerError::Config("jwt secret is not set".into()))?;
        let resolver = JwtIdentityResolver::new(secret, &settings.auth.jwt_algorithm)?;
        let tracker = store.map_or_else(CallTracker::disabled, CallTracker::new);
        Ok(Self::new(settings, Arc::new(resolver), tracker, metrics_handle))
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/docs/signaling", get(docs_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&self.cors))
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.state.relay.registry()
    }

    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Bind the configured address and serve until shutdown is triggered.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let listener =
            tokio::net::TcpListener::bind((self.server.host.as_str(), self.server.port)).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.state.shutdown.token();

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                warn!(error = %e, "server error");
            }
        });

        info!(%addr, "signaling server listening");
        Ok((addr, handle))
    }

    /// Cancel all sessions and wait up to `timeout` for them to close.
    ///
    /// Returns `true` when every session finished in time.
    pub async fn drain_sessions(&self, timeout: Duration) -> bool {
        self.state.shutdown.shutdown();
        let _ = self.state.sessions.close();
        let open = self.state.sessions.len();
        info!(open, "draining signaling sessions");
        tokio::time::timeout(timeout, self.state.sessions.wait())
            .await
            .is_ok()
    }

    /// Grace period configured for [`Self::drain_sessions`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

fn cors_layer(cors: &CorsSettings) -> CorsLayer {
    if cors.allowed_origins.is_empty() || cors.allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

async fn root_handler() -> Json<Liveness> {
    Json(health::liveness())
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.relay.registry().count(),
        state.relay.tracker().is_enabled(),
    ))
}

async fn docs_handler() -> Json<serde_json::Value> {
    Json(docs::signaling_help())
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct WsParams {
    token: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let ws = ws.max_message_size(state.max_message_size);
    let resolved = match params.token.as_deref() {
        Some(token) => state.resolver.resolve(token),
        None => Err(AuthError::MissingToken),
    };

    match resolved {
        Ok(user_id) => {
            let relay = Arc::clone(&state.relay);
            let settings = state.session_settings;
            let cancel = state.shutdown.child_token();
            let sessions = state.sessions.clone();
            ws.on_upgrade(move |socket| {
                sessions.track_future(run_session(socket, user_id, relay, settings, cancel))
            })
        }
        Err(e) => {
            warn!(reason = e.reason(), error = %e, "rejecting websocket upgrade");
            metrics::counter!(WS_AUTH_FAILURES_TOTAL, "reason" => e.reason()).increment(1);
            ws.on_upgrade(reject_socket)
        }
    }
}

/// Complete the handshake, then close with policy violation.
async fn reject_socket(mut socket: WebSocket) {
    let frame = CloseFrame {
        code: CLOSE_POLICY_VIOLATION,
        reason: "invalid or missing token".into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}
