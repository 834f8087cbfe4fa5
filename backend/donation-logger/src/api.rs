//! Axum REST API used by the browser form.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::errors::{LoggerError, Result};
use crate::model::{DonationForm, PendingDonation};
use crate::store;
use crate::submission::{SessionContext, SubmitReceipt, Submitter};
use crate::sync::SyncReport;

#[derive(Clone)]
pub struct ApiState {
    pub submitter: Arc<Submitter>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/session",
            post(sign_in).get(get_session).delete(sign_out),
        )
        .route("/session/team", put(select_team))
        .route("/udi/range", get(udi_range))
        .route("/donations", post(submit_donation))
        .route("/donations/pending", get(pending_donations))
        .route("/sync", post(sync_now))
        .route("/connectivity", put(set_connectivity).get(get_connectivity))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SignInRequest {
    pub credential: String,
    #[serde(default)]
    pub team: Option<u8>,
}

#[derive(Deserialize)]
pub struct TeamRequest {
    pub team: u8,
}

#[derive(Deserialize, Serialize)]
pub struct ConnectivityBody {
    pub online: bool,
}

#[derive(Serialize)]
pub struct RangeResponse {
    pub policy: &'static str,
    pub team: Option<u8>,
    pub min: u32,
    pub max: u32,
}

#[derive(Serialize)]
pub struct PendingResponse {
    pub count: usize,
    pub donations: Vec<PendingDonation>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for LoggerError {
    fn into_response(self) -> Response {
        let status = match &self {
            LoggerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LoggerError::NotAuthenticated(_) => StatusCode::UNAUTHORIZED,
            LoggerError::Network(_) | LoggerError::Remote(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {self}");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<JsonRejection> for LoggerError {
    fn from(rejection: JsonRejection) -> Self {
        LoggerError::Validation(rejection.body_text())
    }
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /session`
pub async fn sign_in(
    State(state): State<Arc<ApiState>>,
    payload: std::result::Result<Json<SignInRequest>, JsonRejection>,
) -> Result<Json<SessionContext>> {
    let Json(req) = payload?;
    let session = state.submitter.sign_in(&req.credential, req.team).await?;
    Ok(Json(session))
}

/// `GET /session`
pub async fn get_session(State(state): State<Arc<ApiState>>) -> Result<Json<SessionContext>> {
    state
        .submitter
        .session()
        .await
        .map(Json)
        .ok_or_else(|| LoggerError::NotAuthenticated("Please sign in first.".to_string()))
}

/// `PUT /session/team`
pub async fn select_team(
    State(state): State<Arc<ApiState>>,
    payload: std::result::Result<Json<TeamRequest>, JsonRejection>,
) -> Result<Json<SessionContext>> {
    let Json(req) = payload?;
    Ok(Json(state.submitter.select_team(req.team).await?))
}

/// `DELETE /session`
pub async fn sign_out(State(state): State<Arc<ApiState>>) -> StatusCode {
    state.submitter.sign_out().await;
    StatusCode::NO_CONTENT
}

/// `GET /udi/range`
///
/// The sequence window to show as the digits placeholder.
pub async fn udi_range(State(state): State<Arc<ApiState>>) -> Result<Json<RangeResponse>> {
    let range = state.submitter.allowed_range().await?;
    let team = state.submitter.session().await.and_then(|s| s.team);
    Ok(Json(RangeResponse {
        policy: state.submitter.policy().name(),
        team,
        min: range.min,
        max: range.max,
    }))
}

/// `POST /donations`
///
/// Responds `201` once the donation is queued, whether or not it reached
/// the ledger yet.
pub async fn submit_donation(
    State(state): State<Arc<ApiState>>,
    payload: std::result::Result<Json<DonationForm>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitReceipt>)> {
    let Json(form) = payload?;
    let receipt = state.submitter.submit(&form).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// `GET /donations/pending`
pub async fn pending_donations(State(state): State<Arc<ApiState>>) -> Result<Json<PendingResponse>> {
    let donations = store::list_all(state.submitter.engine().pool()).await?;
    Ok(Json(PendingResponse {
        count: donations.len(),
        donations,
    }))
}

/// `POST /sync`
pub async fn sync_now(State(state): State<Arc<ApiState>>) -> Json<SyncReport> {
    Json(state.submitter.engine().sync_pass().await)
}

/// `GET /connectivity`
pub async fn get_connectivity(State(state): State<Arc<ApiState>>) -> Json<ConnectivityBody> {
    Json(ConnectivityBody {
        online: state.submitter.engine().connectivity().is_online(),
    })
}

/// `PUT /connectivity`
///
/// The UI forwards the browser's online/offline events here.
pub async fn set_connectivity(
    State(state): State<Arc<ApiState>>,
    payload: std::result::Result<Json<ConnectivityBody>, JsonRejection>,
) -> Result<Json<ConnectivityBody>> {
    let Json(body) = payload?;
    let connectivity = state.submitter.engine().connectivity();
    if connectivity.set_online(body.online) {
        info!("Connectivity reported: {}", if body.online { "online" } else { "offline" });
    }
    Ok(Json(ConnectivityBody {
        online: connectivity.is_online(),
    }))
}
