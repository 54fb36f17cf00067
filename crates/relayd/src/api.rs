use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::rejection::QueryRejection;
use axum::extract::Query;
use axum::extract::State;
use axum::http::header;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::relay::RelayState;
use crate::relay::StateRecord;
use crate::serial::SerialBridge;
use crate::store::StateStore;

/// Body of `GET /` responses
pub const LIVENESS_MESSAGE: &str = "Relay Control Server is running!";

/// Reported by the state endpoints before any command has been accepted
pub const UNKNOWN_STATE: &str = "unknown";

/// Command input from the query string
#[derive(Debug, Deserialize)]
struct CommandInput {
    state: Option<String>,
}

/// Response for the command and state endpoints
#[derive(Debug, Serialize)]
struct StateResponse {
    state: &'static str,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn StateStore>,
    bridge: Option<SerialBridge>,
}

impl AppState {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            bridge: None,
        }
    }

    /// Forward accepted commands to a serial bridge as well
    pub fn with_bridge(mut self, bridge: SerialBridge) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Validate a candidate, persist it and notify the bridge.
    ///
    /// Every command route goes through here so validation lives in one place.
    async fn accept(
        &self,
        candidate: Option<&str>,
        source: &'static str,
    ) -> Result<RelayState, ApiError> {
        let state = RelayState::from_candidate(candidate)?;

        self.store.append(StateRecord::new(state)).await?;
        tracing::info!("{}: Relay state set to \"{}\"", source, state);

        if let Some(bridge) = &self.bridge {
            bridge.send(state);
        }

        Ok(state)
    }
}

/// Handler for GET /
#[tracing::instrument]
async fn liveness() -> &'static str {
    LIVENESS_MESSAGE
}

/// Handler for GET /button?state=on|off, used by polling devices
#[tracing::instrument(skip_all)]
async fn command_from_query(
    State(app): State<AppState>,
    query: Result<Query<CommandInput>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let candidate = match query {
        Ok(Query(input)) => input.state,
        Err(rejection) => {
            tracing::debug!("Unreadable query string: {}", rejection);
            None
        }
    };

    let state = app.accept(candidate.as_deref(), "GET").await?;
    Ok((
        StatusCode::OK,
        Json(StateResponse {
            state: state.as_str(),
        }),
    ))
}

/// Handler for POST /button with a `{"state": "on|off"}` body, used by the web interface
#[tracing::instrument(skip_all)]
async fn command_from_body(
    State(app): State<AppState>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    // Arrays and scalars fail extraction, so only an object can carry a state
    let candidate = match &body {
        Ok(Json(input)) => input.get("state").and_then(Value::as_str),
        Err(rejection) => {
            tracing::debug!("Unreadable command body: {}", rejection);
            None
        }
    };

    let state = app.accept(candidate, "POST").await?;
    Ok((
        StatusCode::CREATED,
        Json(StateResponse {
            state: state.as_str(),
        }),
    ))
}

/// Handler for GET /state and GET /last-state
#[tracing::instrument(skip_all)]
async fn latest_state(State(app): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    tracing::debug!("Handling latest state request");

    let latest = app.store.latest().await?;
    let state = latest.map_or(UNKNOWN_STATE, |record| record.state.as_str());

    Ok((StatusCode::OK, Json(StateResponse { state })))
}

/// Create the API router with all endpoints
///
/// Requests that match no route are served from `static_dir` when given.
pub fn create_router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let mut router = Router::new()
        .route("/", get(liveness))
        .route("/button", get(command_from_query).post(command_from_body))
        .route("/state", get(latest_state))
        .route("/last-state", get(latest_state));

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// This function will bind to the specified address and serve the API endpoints.
/// It will run until the provided shutdown signal is triggered.
///
/// # Arguments
/// * `listen` - The address or hostname to listen on (e.g., "0.0.0.0")
/// * `port` - The port to listen on (e.g., 10000)
/// * `router` - The router returned by [`create_router`]
/// * `shutdown_rx` - A oneshot receiver that will trigger graceful shutdown
pub async fn serve(
    listen: String,
    port: u16,
    router: Router,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind((listen.as_str(), port)).await?;
    tracing::info!("Server is running on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
