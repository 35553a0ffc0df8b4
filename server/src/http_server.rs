use anyhow::Result;
use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::jwt::{JwtManager, TokenVerifier};
use crate::api::middleware::auth_middleware;
use crate::api::{auth, friends, layouts, leaderboard, levels, personal_records, submissions};
use crate::reorder::ReorderEngine;
use crate::scores::ScoreEngine;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    /// Process-wide connection pool
    pub db: PgPool,
    /// Issues tokens on register/login
    pub jwt_manager: Arc<JwtManager>,
    /// Verifies bearer tokens on protected routes
    pub verifier: Arc<dyn TokenVerifier>,
    pub reorder: ReorderEngine,
    pub scores: ScoreEngine,
}

impl AppState {
    pub fn new(db: PgPool, jwt_secret: &str) -> Self {
        let jwt_manager = Arc::new(JwtManager::new(jwt_secret));
        let scores = ScoreEngine::new(db.clone());

        Self {
            reorder: ReorderEngine::new(db.clone(), scores.clone()),
            scores,
            verifier: jwt_manager.clone(),
            jwt_manager,
            db,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/levels", get(levels::list_levels))
        .route("/api/levels/history", get(levels::list_history))
        .route("/api/levels/:id", get(levels::get_level))
        .route("/api/leaderboard", get(leaderboard::get_leaderboard))
        .route("/api/players/:user_id/stats", get(leaderboard::get_player_stats))
        .route(
            "/api/users/:user_id/personal-records",
            get(personal_records::list_for_user),
        )
        .route("/api/layouts", get(layouts::list_layouts))
        .route("/api/layouts/:id", get(layouts::get_layout));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::get_current_user))
        .route(
            "/api/levels",
            post(levels::insert_level)
                .put(levels::move_level)
                .delete(levels::remove_level),
        )
        .route("/api/submissions", post(submissions::create_submission))
        .route("/api/submissions/mine", get(submissions::list_mine))
        .route("/api/submissions/pending", get(submissions::list_pending))
        .route("/api/submissions/:id", delete(submissions::delete_submission))
        .route("/api/submissions/:id/approve", post(submissions::approve_submission))
        .route("/api/submissions/:id/reject", post(submissions::reject_submission))
        .route(
            "/api/personal-records",
            get(personal_records::list_mine).post(personal_records::create_record),
        )
        .route(
            "/api/personal-records/:id",
            put(personal_records::update_record).delete(personal_records::delete_record),
        )
        .route("/api/friends", get(friends::list_friends))
        .route("/api/friends/:id", delete(friends::remove_friendship))
        .route(
            "/api/friends/requests",
            get(friends::list_requests).post(friends::send_request),
        )
        .route("/api/friends/requests/:id/accept", post(friends::accept_request))
        .route("/api/layouts", post(layouts::create_layout))
        .route(
            "/api/layouts/:id",
            put(layouts::update_layout).delete(layouts::delete_layout),
        )
        .route("/api/layouts/:id/collaborators", post(layouts::add_collaborator))
        .route(
            "/api/layouts/:id/collaborators/:user_id",
            delete(layouts::remove_collaborator),
        )
        .route_layer(middleware::from_fn_with_state(
            state.verifier.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API until `cancellation_token` fires
pub async fn run_http_server(
    addr: &str,
    state: AppState,
    cancellation_token: CancellationToken,
) -> Result<()> {
    let app = build_router(state);

    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancellation_token.cancelled().await;
            info!("HTTP server received shutdown signal");
        })
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))
}

/// Health check handler
async fn health_check() -> &'static str {
    "OK"
}
