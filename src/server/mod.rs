pub mod params;
pub mod routes;

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

/// HTTP surface: JSON pricing endpoints, permissive CORS, static files as fallback.
pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();

    Router::new()
        .route("/api/analyze-convergence", post(routes::analyze_convergence))
        .route("/api/calculate-boundary", post(routes::calculate_boundary))
        .route("/api/black-scholes", post(routes::black_scholes))
        .route("/api/binomial", post(routes::binomial_price))
        .route("/api/trinomial", post(routes::trinomial_price))
        .route("/api/counters", get(routes::get_counters))
        .route("/health", get(routes::health))
        .fallback_service(tower_http::services::ServeDir::new(static_dir))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}
