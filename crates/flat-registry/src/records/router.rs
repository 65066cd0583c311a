use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{FlatId, FlatStatus, HouseId, NewFlat, NewHouse, UserRole};
use super::moderation::{ModerationError, RequestContext};
use super::service::{FlatService, HouseService, RecordServiceError};

/// Header carrying the caller's role until a token layer sits in front.
pub const ROLE_HEADER: &str = "x-user-role";

#[derive(Clone)]
pub struct RecordsState {
    pub flats: FlatService,
    pub houses: HouseService,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FlatUpdateRequest {
    pub flat_id: FlatId,
    pub status: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SubscribeRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
struct DataResponse<T> {
    data: T,
}

/// Router builder exposing house and flat endpoints.
pub fn records_router(state: RecordsState) -> Router {
    Router::new()
        .route("/api/v1/house/create", post(create_house_handler))
        .route("/api/v1/house/:house_id", get(house_flats_handler))
        .route("/api/v1/house/:house_id/subscribe", post(subscribe_handler))
        .route("/api/v1/flat/create", post(create_flat_handler))
        .route("/api/v1/flat/update", post(update_flat_handler))
        .with_state(state)
}

pub(crate) async fn create_house_handler(
    State(state): State<RecordsState>,
    headers: HeaderMap,
    Json(house): Json<NewHouse>,
) -> Response {
    if let Err(response) = require_moderator(&headers) {
        return response;
    }

    match state.houses.create(house).await {
        Ok(house) => (StatusCode::CREATED, Json(DataResponse { data: house })).into_response(),
        Err(err) => error_response(&err),
    }
}

pub(crate) async fn house_flats_handler(
    State(state): State<RecordsState>,
    Path(house_id): Path<u64>,
    headers: HeaderMap,
) -> Response {
    let viewer = match viewer_role(&headers) {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };

    match state.houses.flats(HouseId(house_id), viewer).await {
        Ok(flats) => (StatusCode::OK, Json(DataResponse { data: flats })).into_response(),
        Err(err) => error_response(&err),
    }
}

pub(crate) async fn subscribe_handler(
    State(state): State<RecordsState>,
    Path(house_id): Path<u64>,
    Json(request): Json<SubscribeRequest>,
) -> Response {
    let house_id = HouseId(house_id);
    match state.houses.subscribe(house_id, &request.email).await {
        Ok(email) => {
            let payload = json!({ "data": { "house_id": house_id, "email": email } });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(&err),
    }
}

pub(crate) async fn create_flat_handler(
    State(state): State<RecordsState>,
    Json(flat): Json<NewFlat>,
) -> Response {
    match state.flats.create(flat).await {
        Ok(flat) => (StatusCode::CREATED, Json(DataResponse { data: flat })).into_response(),
        Err(err) => error_response(&err),
    }
}

pub(crate) async fn update_flat_handler(
    State(state): State<RecordsState>,
    headers: HeaderMap,
    Json(request): Json<FlatUpdateRequest>,
) -> Response {
    if let Err(response) = require_moderator(&headers) {
        return response;
    }

    let status = match FlatStatus::parse(&request.status) {
        Ok(status) => status,
        Err(err) => return error_response(&RecordServiceError::Validation(err)),
    };

    let ctx = RequestContext::with_timeout(state.request_timeout);
    // A dropped connection drops this future; the guard turns that into a
    // cancellation the moderation task can observe.
    let _cancel_on_drop = ctx.cancel_on_drop();

    match state.flats.transition(&ctx, request.flat_id, status).await {
        Ok(flat) => (StatusCode::OK, Json(DataResponse { data: flat })).into_response(),
        Err(err) => error_response(&err),
    }
}

fn viewer_role(headers: &HeaderMap) -> Result<UserRole, Response> {
    let Some(raw) = headers.get(ROLE_HEADER) else {
        return Ok(UserRole::default());
    };

    raw.to_str()
        .ok()
        .and_then(|value| UserRole::parse(value).ok())
        .ok_or_else(|| {
            let payload = json!({ "error": "invalid user role" });
            (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
        })
}

fn require_moderator(headers: &HeaderMap) -> Result<(), Response> {
    match viewer_role(headers)? {
        UserRole::Moderator => Ok(()),
        UserRole::Client => {
            let payload = json!({ "error": "moderator role required" });
            Err((StatusCode::FORBIDDEN, Json(payload)).into_response())
        }
    }
}

fn status_for(err: &RecordServiceError) -> StatusCode {
    match err {
        RecordServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        RecordServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        RecordServiceError::AlreadyExists(_) => StatusCode::CONFLICT,
        RecordServiceError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        RecordServiceError::Moderation(moderation) => match moderation {
            ModerationError::NotFound(_) => StatusCode::NOT_FOUND,
            ModerationError::AlreadyModerating(_) => StatusCode::CONFLICT,
            ModerationError::Validation(_) => StatusCode::BAD_REQUEST,
            ModerationError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            ModerationError::Cancelled { .. } => StatusCode::REQUEST_TIMEOUT,
            ModerationError::LockLost { .. }
            | ModerationError::CompensationFailure { .. }
            | ModerationError::Aborted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

fn error_response(err: &RecordServiceError) -> Response {
    let status = status_for(err);
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        "internal server error".to_string()
    } else {
        err.to_string()
    };
    (status, Json(json!({ "error": message }))).into_response()
}
