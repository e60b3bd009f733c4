//! JSON HTTP API over the coaching services.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::context::AppContext;
use crate::error::CoachingError;

mod handlers;

impl IntoResponse for CoachingError {
    fn into_response(self) -> Response {
        let status = match &self {
            CoachingError::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CoachingError::NotFound(_) => StatusCode::NOT_FOUND,
            CoachingError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoachingError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CoachingError::AlreadyPaired(_) | CoachingError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            CoachingError::Llm(_) => StatusCode::BAD_GATEWAY,
            CoachingError::Database(_) | CoachingError::Serialization(_) => {
                error!(error = %self, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/scenarios", get(handlers::list_scenarios))
        .route("/users/:id/analysis", get(handlers::get_analysis))
        .route(
            "/users/:id/coaching-plan",
            get(handlers::get_coaching_plan).post(handlers::generate_coaching_plan),
        )
        .route("/users/:id/buddies/candidates", get(handlers::buddy_candidates))
        .route("/users/:id/buddy-pair", get(handlers::get_buddy_pair))
        .route("/users/:id/alerts/check", post(handlers::check_alerts))
        .route("/buddy-pairs", post(handlers::create_buddy_pair))
        .route("/buddy-pairs/:id/end", post(handlers::end_buddy_pair))
        .route("/alerts", get(handlers::list_alerts))
        .route("/alerts/:id/acknowledge", post(handlers::acknowledge_alert))
        .route("/alerts/:id/resolve", post(handlers::resolve_alert))
        .route("/simulations", post(handlers::start_simulation))
        .route(
            "/simulations/:id/messages",
            get(handlers::list_messages).post(handlers::send_message),
        )
        .route("/simulations/:id/complete", post(handlers::complete_simulation))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

pub async fn serve(ctx: AppContext, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("coaching API listening on http://{}", addr);
    axum::serve(listener, router(ctx)).await?;
    Ok(())
}
