//! # REST API
//!
//! Builds the axum router that exposes the node's read-only HTTP interface
//! over the hosted deployment. All endpoints share application state through
//! axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                 | Description                                  |
//! |--------|----------------------|----------------------------------------------|
//! | GET    | `/health`            | Liveness probe                               |
//! | GET    | `/status`            | Deployment summary                           |
//! | GET    | `/valors/:id`        | Certificate type by id                       |
//! | GET    | `/tokens/:id`        | Issued certificate by token id               |
//! | GET    | `/holders/:address`  | Certificates, shares and redeemable assets   |
//! | GET    | `/events?since=N`    | Committed events after sequence `N`          |
//!
//! The served view is the snapshot committed when `serve` started. sled
//! holds an exclusive lock on the data directory, so no CLI command can
//! commit while the server runs; restart it to pick up new transactions.

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use valocracy_contracts::asset::FungibleAsset;
use valocracy_contracts::{Deployment, EventRecord};
use valocracy_protocol::config::MAX_EVENTS_PER_QUERY;
use valocracy_protocol::identity::Address;
use valocracy_protocol::storage::ValocracyDB;

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The deployment loaded at startup. Never updated while serving.
    pub deployment: Arc<Deployment>,
    /// Database holding the committed event journal.
    pub db: Arc<ValocracyDB>,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/valors/:id", get(valor_handler))
        .route("/tokens/:id", get(token_handler))
        .route("/holders/:address", get(holder_handler))
        .route("/events", get(events_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub owner: Address,
    pub registry: Address,
    pub asset: Address,
    /// Treasury currently credited on issuance.
    pub treasury: Option<Address>,
    pub total_assets: u64,
    pub total_shares: u64,
    pub certificates_outstanding: u64,
    pub next_token_id: u64,
    /// Sequence of the last committed event.
    pub sequence: u64,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValorResponse {
    pub id: u64,
    pub rarity: u64,
    pub metadata: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token_id: u64,
    pub owner: Address,
    pub valor_id: u64,
    pub token_uri: String,
}

/// Response payload for `GET /holders/:address`, against the bound treasury.
#[derive(Debug, Serialize, Deserialize)]
pub struct HolderResponse {
    pub address: Address,
    pub certificates: Vec<u64>,
    pub shares: u64,
    /// Asset value of the shares at the current rate, rounded down.
    pub redeemable_assets: u64,
    /// Pooled asset units held directly.
    pub asset_balance: u64,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: u64,
    pub limit: Option<usize>,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorResponse { error: message })).into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: deployment summary. Treasury totals refer to the treasury
/// bound to the registry (zero if none is bound).
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.api_requests_total.inc();
    let deployment = &state.deployment;
    let registry = deployment.valocracy();
    let treasury = deployment.bound_treasury();

    let (total_assets, total_shares) = treasury
        .and_then(|t| deployment.treasury(t).ok())
        .map(|t| (t.total_assets(deployment.asset()), t.total_shares()))
        .unwrap_or((0, 0));

    Json(StatusResponse {
        version: state.version.clone(),
        owner: registry.owner(),
        registry: registry.address(),
        asset: deployment.asset().address(),
        treasury,
        total_assets,
        total_shares,
        certificates_outstanding: registry.total_supply(),
        next_token_id: registry.next_token_id(),
        sequence: deployment.sequence(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /valors/:id`: a certificate type, or 404.
async fn valor_handler(Path(id): Path<u64>, State(state): State<AppState>) -> Response {
    state.metrics.api_requests_total.inc();
    let deployment = &state.deployment;
    match deployment.valocracy().valor(id) {
        Some(valor) => Json(ValorResponse {
            id,
            rarity: valor.rarity,
            metadata: valor.metadata.clone(),
        })
        .into_response(),
        None => error(StatusCode::NOT_FOUND, format!("valor {} not found", id)),
    }
}

/// `GET /tokens/:id`: an issued certificate, or 404 (never issued or burned).
async fn token_handler(Path(id): Path<u64>, State(state): State<AppState>) -> Response {
    state.metrics.api_requests_total.inc();
    let deployment = &state.deployment;
    let registry = deployment.valocracy();
    match registry.certificate(id) {
        Some(certificate) => Json(TokenResponse {
            token_id: id,
            owner: certificate.owner,
            valor_id: certificate.valor_id,
            token_uri: registry.token_uri(id).unwrap_or_default().to_string(),
        })
        .into_response(),
        None => error(StatusCode::NOT_FOUND, format!("token {} not found", id)),
    }
}

/// `GET /holders/:address`: everything an address holds. Unknown addresses
/// get a zeroed response; malformed ones a 400.
async fn holder_handler(Path(address): Path<String>, State(state): State<AppState>) -> Response {
    state.metrics.api_requests_total.inc();
    let address = match Address::parse(&address) {
        Ok(a) => a,
        Err(e) => return error(StatusCode::BAD_REQUEST, format!("invalid address: {}", e)),
    };

    let deployment = &state.deployment;
    let (shares, redeemable_assets) = deployment
        .bound_treasury()
        .and_then(|t| deployment.treasury(t).ok())
        .map(|t| (t.shares_of(address), t.assets_of(address, deployment.asset())))
        .unwrap_or((0, 0));

    Json(HolderResponse {
        address,
        certificates: deployment.valocracy().tokens_of(address),
        shares,
        redeemable_assets,
        asset_balance: deployment.asset().balance_of(address),
    })
    .into_response()
}

/// `GET /events?since=N&limit=M`: committed events, oldest first.
async fn events_handler(
    Query(query): Query<EventsQuery>,
    State(state): State<AppState>,
) -> Response {
    state.metrics.api_requests_total.inc();
    let limit = query
        .limit
        .unwrap_or(MAX_EVENTS_PER_QUERY)
        .min(MAX_EVENTS_PER_QUERY);

    match state.db.events_since::<EventRecord>(query.since, limit) {
        Ok(events) => Json(events).into_response(),
        Err(e) => error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("database error: {}", e),
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
