//! Request Handlers

use super::{errors::ApiError, middleware::RequestId, models::*};
use crate::config::ArcadeConfig;
use crate::errors::ArcadeError;
use crate::games::types::{GameType, RewardRecord};
use crate::games::{RewardSettlement, SettlementReceipt};
use crate::metrics::ArcadeMetrics;
use crate::notify::TracingNotifier;
use crate::oauth::{IdentityLinker, IdentityProvider, OAuthError, Provider, StateStore};
use crate::rewards::{BadgeService, ClaimReceipt, Leaderboard, RoleSync, WebhookRoleSync};
use crate::store::{normalize_address, ProfileStore};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use std::sync::Arc;
use tracing::warn;

const MAX_LEADERBOARD_LIMIT: usize = 100;

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn ProfileStore>,
    pub settlement: RewardSettlement,
    pub badges: BadgeService,
    pub leaderboard: Leaderboard,
    pub linker: IdentityLinker,
    pub metrics: ArcadeMetrics,
    pub metrics_enabled: bool,
    pub version: String,
}

impl AppState {
    /// Wire the services over one profile store. The role-sync webhook is
    /// only used when configured.
    pub fn new(
        config: &ArcadeConfig,
        store: Arc<dyn ProfileStore>,
        states: Arc<dyn StateStore>,
        identity_provider: Arc<dyn IdentityProvider>,
        metrics: ArcadeMetrics,
    ) -> Self {
        let role_sync = config
            .badges
            .role_sync_webhook
            .as_ref()
            .map(|url| Arc::new(WebhookRoleSync::new(url.clone())) as Arc<dyn RoleSync>);

        Self {
            settlement: RewardSettlement::new(
                store.clone(),
                config.settlement.clone(),
                Arc::new(TracingNotifier),
                metrics.clone(),
            ),
            badges: BadgeService::new(store.clone(), config.badges.clone(), role_sync, metrics.clone()),
            leaderboard: Leaderboard::new(store.clone()),
            linker: IdentityLinker::new(
                config.oauth.clone(),
                states,
                identity_provider,
                store.clone(),
                metrics.clone(),
            ),
            store,
            metrics,
            metrics_enabled: config.monitoring.enable_metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
    })
}

/// GET /metrics
pub async fn metrics_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    if !state.metrics_enabled {
        return Err(ApiError::not_found(request_id.0, "Metrics are disabled".to_string()));
    }
    let body = state
        .metrics
        .encode()
        .map_err(|e| ApiError::internal_error(request_id.0, format!("Failed to encode metrics: {}", e)))?;

    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")], body).into_response())
}

/// GET /api/profile/:address
pub async fn profile_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let address = normalize_address(&address).map_err(|e| ApiError::bad_request(request_id.0.clone(), e.to_string()))?;
    let profile = state
        .store
        .get(&address)
        .await
        .map_err(|e| ApiError::from_arcade(request_id.0.clone(), e.into()))?
        .ok_or_else(|| ApiError::not_found(request_id.0.clone(), format!("No profile for {}", address)))?;

    Ok(Json(ProfileResponse { address, profile }))
}

/// POST /api/rewards
pub async fn reward_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RewardRequest>, JsonRejection>,
) -> Result<Json<SettlementReceipt>, ApiError> {
    let body = json_payload(&request_id, payload)?;
    let address = normalize_address(&body.address).map_err(|e| ApiError::bad_request(request_id.0.clone(), e.to_string()))?;
    let record = RewardRecord::new(address, body.game, body.points, body.score);

    state
        .settlement
        .settle(&record)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_arcade(request_id.0, e.into()))
}

/// GET /api/leaderboard?limit={n}&game={game}
pub async fn leaderboard_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    query: Result<Query<LeaderboardQuery>, QueryRejection>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let query = query_params(&request_id, query)?;
    let game = query
        .game
        .as_deref()
        .map(str::parse::<GameType>)
        .transpose()
        .map_err(|e| ApiError::bad_request(request_id.0.clone(), e.to_string()))?;
    let limit = query.limit.clamp(1, MAX_LEADERBOARD_LIMIT);

    let entries = state
        .leaderboard
        .top(limit, game)
        .await
        .map_err(|e| ApiError::from_arcade(request_id.0, e.into()))?;

    Ok(Json(LeaderboardResponse {
        ranked_by: game.map(|g| g.as_str()).unwrap_or("miles").to_string(),
        entries,
    }))
}

/// GET /api/badges/:address
pub async fn badges_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<BadgesResponse>, ApiError> {
    let badges = state
        .badges
        .status(&address)
        .await
        .map_err(|e| ApiError::from_arcade(request_id.0, e))?;

    Ok(Json(BadgesResponse {
        address: address.to_ascii_lowercase(),
        badges,
    }))
}

/// POST /api/badges/claim
pub async fn claim_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ClaimRequest>, JsonRejection>,
) -> Result<Json<ClaimReceipt>, ApiError> {
    let body = json_payload(&request_id, payload)?;
    state
        .badges
        .record_claim(&body.address, &body.badge_id, &body.tx_hash)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_arcade(request_id.0, e))
}

/// GET /api/oauth/:provider/start?address={address}
pub async fn oauth_start_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    query: Result<Query<OAuthStartQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let query = query_params(&request_id, query)?;
    let provider: Provider = provider
        .parse()
        .map_err(|e: OAuthError| ApiError::from_arcade(request_id.0.clone(), e.into()))?;
    let url = state
        .linker
        .begin(provider, &query.address)
        .await
        .map_err(|e| ApiError::from_arcade(request_id.0, e))?;

    Ok(found(&url))
}

/// GET /api/oauth/:provider/callback?code={code}&state={state}
///
/// Always redirects back to the app; failures travel in `?error=`.
pub async fn oauth_callback_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Response {
    let Ok(provider) = provider.parse::<Provider>() else {
        return found(&state.linker.app_redirect(Err("unknown_provider")));
    };
    if let Some(error) = &query.error {
        warn!(request_id = %request_id.0, %provider, error = %error, "provider denied authorization");
        return found(&state.linker.app_redirect(Err("access_denied")));
    }
    let (Some(code), Some(oauth_state)) = (&query.code, &query.state) else {
        return found(&state.linker.app_redirect(Err("missing_code")));
    };

    let target = match state.linker.complete(provider, code, oauth_state).await {
        Ok(_) => state.linker.app_redirect(Ok(provider)),
        Err(err) => {
            warn!(request_id = %request_id.0, %provider, error = %err, "identity link failed");
            state.linker.app_redirect(Err(callback_error_code(&err)))
        }
    };
    found(&target)
}

fn callback_error_code(err: &ArcadeError) -> &'static str {
    match err {
        ArcadeError::OAuth(OAuthError::InvalidState) => "invalid_state",
        ArcadeError::OAuth(OAuthError::Exchange { .. }) => "exchange_failed",
        ArcadeError::OAuth(OAuthError::Profile { .. }) => "profile_failed",
        _ => "link_failed",
    }
}

/// Extractor rejections answer with the same JSON error body as handler failures
fn json_payload<T>(request_id: &RequestId, payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::bad_request(request_id.0.clone(), rejection.body_text()))
}

fn query_params<T>(request_id: &RequestId, query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| ApiError::bad_request(request_id.0.clone(), rejection.body_text()))
}

/// 302 Found; `Redirect::to` answers 303
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}
