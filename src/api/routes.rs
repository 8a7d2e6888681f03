//! Route Definitions

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        // Profiles and settlement
        .route("/api/profile/:address", get(profile_handler))
        .route("/api/rewards", post(reward_handler))
        .route("/api/leaderboard", get(leaderboard_handler))
        // Badges
        .route("/api/badges/:address", get(badges_handler))
        .route("/api/badges/claim", post(claim_handler))
        // Identity linking
        .route("/api/oauth/:provider/start", get(oauth_start_handler))
        .route("/api/oauth/:provider/callback", get(oauth_callback_handler))
        .with_state(state)
}
