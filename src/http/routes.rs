//! HTTP route definitions

use axum::{
    extract::{Extension, Path, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::debug;

use crate::app::AppState;
use crate::game::GameError;
use crate::http::middleware::{require_auth, AuthenticatedPlayer};
use crate::store::MatchResult;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;
use crate::ws::protocol::LobbySummary;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/matches/recent", get(recent_matches_handler))
        .route("/ws", get(ws_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/lobbies", get(lobbies_handler))
        .route("/lobbies/:lobby_name", get(lobby_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_matches: usize,
    active_players: usize,
    connected_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_matches: state.match_registry.active_matches(),
        active_players: state.match_registry.total_players(),
        connected_players: state.lobbies.connected_players(),
    })
}

// ============================================================================
// Lobby endpoints
// ============================================================================

#[derive(Debug, Serialize)]
struct LobbiesResponse {
    lobbies: Vec<LobbySummary>,
}

async fn lobbies_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedPlayer>,
) -> Json<LobbiesResponse> {
    debug!(player_id = %auth.player_id, "Lobby list requested");
    Json(LobbiesResponse {
        lobbies: state.lobbies.lobbies(),
    })
}

async fn lobby_handler(
    State(state): State<AppState>,
    Path(lobby_name): Path<String>,
) -> Result<Json<LobbySummary>, AppError> {
    let handle = state.match_registry.lookup(&lobby_name)?;
    Ok(Json(handle.summary()))
}

#[derive(Debug, Serialize)]
struct RecentMatchesResponse {
    matches: Vec<MatchResult>,
}

async fn recent_matches_handler(State(state): State<AppState>) -> Json<RecentMatchesResponse> {
    Json(RecentMatchesResponse {
        matches: state.recent_results.recent(),
    })
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Game(#[from] GameError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Game(GameError::Configuration(_)) => StatusCode::BAD_REQUEST,
            AppError::Game(GameError::UnknownPlayer(_) | GameError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            AppError::Game(GameError::DuplicateLobby(_)) => StatusCode::CONFLICT,
            AppError::Game(GameError::MatchClosed(_)) => StatusCode::GONE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Game(e) => e.code(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        });

        (self.status(), Json(body)).into_response()
    }
}
