//! `StockchatServer`: router assembly and listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use stockchat_core::{AuthGateway, PersistenceGateway};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::routes;

/// How long in-flight requests get to finish once shutdown starts.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Conversation and message storage.
    pub gateway: Arc<dyn PersistenceGateway>,
    /// Session tokens.
    pub auth: Arc<dyn AuthGateway>,
    /// User for unauthenticated requests.
    pub default_user_id: i64,
    /// Reject unauthenticated requests.
    pub require_auth: bool,
    /// When the server started.
    pub start_time: Instant,
}

/// The REST server.
pub struct StockchatServer {
    config: ServerConfig,
    state: AppState,
    cancel: CancellationToken,
}

impl StockchatServer {
    /// Create a server over the given gateways.
    pub fn new(
        config: ServerConfig,
        gateway: Arc<dyn PersistenceGateway>,
        auth: Arc<dyn AuthGateway>,
    ) -> Self {
        let state = AppState {
            gateway,
            auth,
            default_user_id: config.default_user_id,
            require_auth: config.require_auth,
            start_time: Instant::now(),
        };
        Self {
            config,
            state,
            cancel: CancellationToken::new(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(health_handler))
            .merge(routes::api_routes())
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Bind and serve until [`Self::shutdown`] is called.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.cancel.clone();

        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "server error");
            }
            info!("server stopped");
        });
        info!(%addr, "listening");
        Ok((addr, handle))
    }

    /// Stop accepting requests and wait up to `timeout` for the task
    /// returned by [`Self::listen`] to drain. Idempotent.
    pub async fn shutdown(&self, handle: JoinHandle<()>, timeout: Duration) {
        self.cancel.cancel();
        info!(timeout_secs = timeout.as_secs(), "draining server");
        if tokio::time::timeout(timeout, handle).await.is_err() {
            warn!("shutdown timed out after {timeout:?}");
        }
    }

    /// Whether [`Self::shutdown`] has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let storage = state
        .gateway
        .list_conversations(state.default_user_id, 1)
        .await
        .map(|_| ())
        .map_err(|e| e.to_string());
    Json(health::health_check(state.start_time, storage))
}
