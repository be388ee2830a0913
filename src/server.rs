//! HTTP API Server
//!
//! Thin axum routing layer over the gate. All quota, rate-limit and
//! ownership decisions happen in the core services; this module only
//! extracts identities from requests and maps [`GateError`] values onto
//! HTTP statuses with actionable detail.

use anyhow::{Context, Result};
use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::campaigns::CampaignService;
use crate::entitlement::EntitlementManager;
use crate::error::GateError;
use crate::generation::{GenerationRequest, GenerationService};
use crate::identity::{AddrHasher, IdentityKey};

/// Shared state for all request handlers
pub struct AppState {
    /// Gate-then-generate orchestration
    pub generation: Arc<GenerationService>,
    /// Entitlement and usage queries
    pub entitlements: Arc<EntitlementManager>,
    /// Campaign persistence
    pub campaigns: Arc<CampaignService>,
    /// Salted hasher for anonymous client addresses
    pub hasher: AddrHasher,
}

/// Build the API router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/demo", post(demo))
        .route("/api/usage", get(usage))
        .route("/api/generate", post(generate))
        .route("/api/campaigns", post(save_campaign).get(list_campaigns))
        .route(
            "/api/campaigns/{id}",
            get(get_campaign).put(update_campaign).delete(delete_campaign),
        )
        .route("/api/webhooks/purchase", post(purchase_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the API until the process is stopped
pub async fn serve(port: u16, state: Arc<AppState>) -> Result<()> {
    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind API server")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("API server error")?;

    Ok(())
}

/// Gate error plus the response detail the status mapping needs
#[derive(Debug)]
struct ApiError {
    error: GateError,
    upgrades: Vec<Value>,
}

impl ApiError {
    fn plain(error: GateError) -> Self {
        Self {
            error,
            upgrades: Vec::new(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, mut body) = match &self.error {
            GateError::InvalidLicence(reason) => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "invalid_licence", "detail": reason }),
            ),
            GateError::LicenceExpired { expired_at } => (
                StatusCode::FORBIDDEN,
                json!({ "error": "licence_expired", "expired_at": expired_at }),
            ),
            GateError::QuotaExceeded { tier, limit, reset_at } => (
                StatusCode::PAYMENT_REQUIRED,
                json!({
                    "error": "quota_exceeded",
                    "tier": tier,
                    "limit": limit,
                    "reset_at": reset_at,
                }),
            ),
            GateError::SaveLimitExceeded { limit } => (
                StatusCode::PAYMENT_REQUIRED,
                json!({ "error": "save_limit_exceeded", "limit": limit }),
            ),
            GateError::RateLimitExceeded { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "error": "rate_limit_exceeded", "retry_after_secs": retry_after_secs }),
            ),
            GateError::NotFound => (
                StatusCode::NOT_FOUND,
                json!({ "error": "not_found" }),
            ),
            GateError::GenerationFailed(detail) => (
                StatusCode::BAD_GATEWAY,
                json!({ "error": "generation_failed", "detail": detail }),
            ),
            GateError::TransientStorage(detail) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "storage_unavailable", "detail": detail }),
            ),
        };

        if !self.upgrades.is_empty() {
            body["suggested_upgrades"] = Value::Array(self.upgrades);
        }

        (status, Json(body)).into_response()
    }
}

/// Attach upgrade suggestions to quota denials
fn with_upgrades(state: &AppState, error: GateError) -> ApiError {
    let upgrades = match &error {
        GateError::QuotaExceeded { tier, .. } => state
            .entitlements
            .catalog()
            .upgrade_path(tier)
            .iter()
            .map(|t| {
                json!({
                    "tier": t.id,
                    "name": t.name,
                    "price_usd": t.price_usd,
                    "campaign_limit": t.campaign_limit.count(),
                })
            })
            .collect(),
        _ => Vec::new(),
    };
    ApiError { error, upgrades }
}

/// Pull the licence key out of a bearer Authorization header
fn licence_from_headers(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            ApiError::plain(GateError::InvalidLicence(
                "missing bearer licence key".to_string(),
            ))
        })
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn demo(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<GenerationRequest>,
) -> Result<Response, ApiError> {
    let identity = IdentityKey::Anonymous(state.hasher.hash_addr(&addr.ip().to_string()));
    let output = state
        .generation
        .handle(&identity, &request)
        .await
        .map_err(ApiError::plain)?;
    Ok(Json(json!({ "success": true, "result": output.payload })).into_response())
}

async fn usage(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let licence_key = licence_from_headers(&headers)?;
    let summary = state
        .entitlements
        .usage_summary(&licence_key)
        .await
        .map_err(ApiError::plain)?;
    let saved = state
        .campaigns
        .count(&licence_key)
        .await
        .map_err(ApiError::plain)?;
    let remaining_saves = summary.save_limit.map(|l| l.saturating_sub(saved));

    Ok(Json(json!({
        "usage": summary,
        "saved_campaigns": saved,
        "remaining_saves": remaining_saves,
    }))
    .into_response())
}

async fn generate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<GenerationRequest>,
) -> Result<Response, ApiError> {
    let identity = IdentityKey::Licence(licence_from_headers(&headers)?);
    let output = state
        .generation
        .handle(&identity, &request)
        .await
        .map_err(|e| with_upgrades(&state, e))?;

    Ok(Json(json!({
        "success": true,
        "result": output.payload,
        "remaining": output.remaining,
    }))
    .into_response())
}

async fn save_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Response, ApiError> {
    let licence_key = licence_from_headers(&headers)?;
    let id = state
        .campaigns
        .save(&licence_key, payload)
        .await
        .map_err(ApiError::plain)?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))).into_response())
}

/// Pagination query parameters
#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default)]
    page: u32,
    #[serde(default = "default_page_size")]
    page_size: u32,
}

fn default_page_size() -> u32 {
    50
}

async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    let licence_key = licence_from_headers(&headers)?;
    let page = state
        .campaigns
        .list(&licence_key, params.page, params.page_size)
        .await
        .map_err(ApiError::plain)?;
    Ok(Json(page).into_response())
}

async fn get_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let licence_key = licence_from_headers(&headers)?;
    let campaign = state
        .campaigns
        .get(&licence_key, id)
        .await
        .map_err(ApiError::plain)?;
    Ok(Json(campaign).into_response())
}

async fn update_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<Value>,
) -> Result<Response, ApiError> {
    let licence_key = licence_from_headers(&headers)?;
    state
        .campaigns
        .update(&licence_key, id, payload)
        .await
        .map_err(ApiError::plain)?;
    Ok(Json(json!({ "id": id })).into_response())
}

async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let licence_key = licence_from_headers(&headers)?;
    state
        .campaigns
        .delete(&licence_key, id)
        .await
        .map_err(ApiError::plain)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Purchase notification from the payment provider
#[derive(Debug, Deserialize)]
struct PurchaseEvent {
    licence_key: String,
    product_id: String,
}

async fn purchase_webhook(
    State(state): State<Arc<AppState>>,
    Json(event): Json<PurchaseEvent>,
) -> Result<Response, ApiError> {
    let entitlement = state
        .entitlements
        .register(&event.licence_key, &event.product_id)
        .await
        .map_err(ApiError::plain)?;
    Ok(Json(json!({ "tier": entitlement.tier_id })).into_response())
}
