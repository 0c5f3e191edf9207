//! HTTP endpoint handlers

use crate::api::types::*;
use crate::db::sqlite::{PriceHistoryRecord, TrackerConfig, TrackerConfigUpdate};
use crate::error::AppError;
use crate::notifier::NotificationTarget;
use crate::state::AppState;
use crate::tracker::{StartOutcome, StartRequest, StatusSnapshot};
use axum::{
    extract::{rejection::JsonRejection, Json, Query, State as AxumState},
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{error, info, warn};

type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), (StatusCode, Json<ApiResponse<Empty>>)>;

fn error_response(err: AppError) -> (StatusCode, Json<ApiResponse<Empty>>) {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        error!("Request failed: {}", err);
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(ApiResponse::error(&err.to_string())))
}

fn bad_json(rejection: JsonRejection) -> (StatusCode, Json<ApiResponse<Empty>>) {
    warn!("Rejected request body: {}", rejection.body_text());
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::error(&rejection.body_text())),
    )
}

// ============================================================================
// Health Check
// ============================================================================

/// Health check endpoint - GET /health or GET /
pub async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::<Empty>::success_with_message("Price tracker is running"))
}

// ============================================================================
// Tracking Control
// ============================================================================

/// Start tracking - POST /api/start_tracking
pub async fn start_tracking(
    AxumState(state): AxumState<Arc<AppState>>,
    payload: Result<Json<StartTrackingRequest>, JsonRejection>,
) -> ApiResult<StatusSnapshot> {
    let Json(payload) = payload.map_err(bad_json)?;

    let request = StartRequest {
        url: payload.url,
        threshold_price: payload.threshold_price,
        notification: NotificationTarget::new(
            payload.notification_token,
            payload.notification_chat_id,
        ),
    };

    let outcome = state.tracker.start(request).map_err(error_response)?;
    let message = match outcome {
        StartOutcome::Spawn(_) => "Price tracking started",
        StartOutcome::Replaced => "Tracking target updated",
    };

    Ok((
        StatusCode::OK,
        Json(ApiResponse::success_with_data(state.tracker.status()).with_message(message)),
    ))
}

/// Stop tracking - GET|POST /api/stop_tracking
pub async fn stop_tracking(AxumState(state): AxumState<Arc<AppState>>) -> impl IntoResponse {
    let message = if state.tracker.stop() {
        "Price tracking stopped"
    } else {
        "Price tracking was not running"
    };
    Json(ApiResponse::<Empty>::success_with_message(message))
}

/// Tracking status - GET /api/status
pub async fn get_status(AxumState(state): AxumState<Arc<AppState>>) -> Json<StatusSnapshot> {
    Json(state.tracker.status())
}

// ============================================================================
// History
// ============================================================================

/// Recent observations, newest first - GET /api/price_history
pub async fn get_price_history(
    AxumState(state): AxumState<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<PriceHistoryRecord>>, (StatusCode, Json<ApiResponse<Empty>>)> {
    let limit = query.effective_limit();
    let records = match query.url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => state.history.query_for_url(url, limit),
        None => state.history.query(limit),
    }
    .map_err(error_response)?;

    Ok(Json(records))
}

// ============================================================================
// Settings
// ============================================================================

/// Current tracker settings - GET /api/settings
pub async fn get_settings(AxumState(state): AxumState<Arc<AppState>>) -> ApiResult<TrackerConfig> {
    let config = state.sqlite.get_tracker_config().map_err(error_response)?;
    Ok((StatusCode::OK, Json(ApiResponse::success_with_data(config))))
}

/// Update tracker settings - POST /api/settings
pub async fn update_settings(
    AxumState(state): AxumState<Arc<AppState>>,
    payload: Result<Json<TrackerConfigUpdate>, JsonRejection>,
) -> ApiResult<TrackerConfig> {
    let Json(update) = payload.map_err(bad_json)?;
    let config = state.update_tracker_config(&update).map_err(error_response)?;
    info!("Tracker settings saved: {:?}", config);

    Ok((
        StatusCode::OK,
        Json(
            ApiResponse::success_with_data(config)
                .with_message("Settings saved; they apply from the next start"),
        ),
    ))
}
