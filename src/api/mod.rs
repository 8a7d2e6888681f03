//! HTTP API
//!
//! JSON endpoints for profiles, reward settlement, the leaderboard, badge
//! claims and OAuth identity linking.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use handlers::AppState;
pub use server::{build_app, init_tracing, ApiServer};
