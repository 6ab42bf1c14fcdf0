//! HTTP boundary.
//!
//! Thin glue over the session manager: request validation, base64 payload
//! handling, status mapping, and bearer-token checks for admin routes. All
//! attendance semantics live in [`crate::session`]; handlers hop onto
//! blocking threads before touching it.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::NaiveDate;
use muster_core::VerificationResult;
use muster_store::{AttendanceKind, AttendanceRecord, DateRange, NewUser, UserRecord};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use crate::session::{SessionError, SessionManager};

/// Image uploads are the only large payloads; cap bodies well above any
/// plausible phone capture.
const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub admin_token: Option<String>,
}

/// Build the API router.
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/register-face", post(register_face))
        .route("/api/verify-face", post(verify_face))
        .route("/api/mark-attendance", post(mark_attendance))
        .route("/api/attendance-history", get(attendance_history))
        .route("/admin/users", post(enroll_user))
        .route("/admin/users/{identifier}", delete(remove_user))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .with_state(state)
}

// --- error mapping ---

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NoReference(_) => Self {
                status: StatusCode::NOT_FOUND,
                message: "No reference image found for this user".to_string(),
            },
            SessionError::UserNotFound(_) => Self {
                status: StatusCode::NOT_FOUND,
                message: "User not found".to_string(),
            },
            SessionError::AlreadyExists(identifier) => Self {
                status: StatusCode::CONFLICT,
                message: format!("Identifier already registered: {identifier}"),
            },
            // External-dependency failures: log with context, surface a
            // generic message.
            other => {
                tracing::error!(error = %other, "session operation failed");
                Self::internal("Operation failed")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "message": self.message }));
        (self.status, body).into_response()
    }
}

// --- wire types (field names are the stable contract) ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterFaceRequest {
    identifier: String,
    image_base64: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterFaceResponse {
    image_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyFaceRequest {
    identifier: String,
    image_base64: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkAttendanceRequest {
    identifier: String,
    #[serde(rename = "type")]
    kind: AttendanceKind,
    #[serde(default)]
    confidence: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkAttendanceResponse {
    record_id: String,
    date: NaiveDate,
    time: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    identifier: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

#[derive(Serialize)]
struct HistoryResponse {
    records: Vec<AttendanceRecord>,
    count: usize,
}

#[derive(Serialize)]
struct StatusMessage {
    message: String,
}

// --- handlers ---

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "message": "muster attendance backend is running",
    }))
}

async fn register_face(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterFaceRequest>,
) -> Result<Json<RegisterFaceResponse>, ApiError> {
    let identifier = valid_identifier(&req.identifier)?;
    let bytes = decode_image_payload(&req.image_base64)?;

    let sessions = state.sessions.clone();
    let registered = run_blocking(move || sessions.register_reference(&identifier, &bytes)).await?;
    Ok(Json(RegisterFaceResponse {
        image_url: registered.image_url,
    }))
}

async fn verify_face(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyFaceRequest>,
) -> Result<Json<VerificationResult>, ApiError> {
    let identifier = valid_identifier(&req.identifier)?;
    let bytes = decode_image_payload(&req.image_base64)?;

    let sessions = state.sessions.clone();
    let result = run_blocking(move || sessions.verify_and_score(&identifier, &bytes)).await?;
    Ok(Json(result))
}

async fn mark_attendance(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MarkAttendanceRequest>,
) -> Result<Json<MarkAttendanceResponse>, ApiError> {
    let identifier = valid_identifier(&req.identifier)?;

    let sessions = state.sessions.clone();
    let marked =
        run_blocking(move || sessions.mark_attendance(&identifier, req.kind, req.confidence))
            .await?;
    Ok(Json(MarkAttendanceResponse {
        record_id: marked.record_id,
        date: marked.date,
        time: marked.time.format("%H:%M:%S").to_string(),
    }))
}

async fn attendance_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let identifier = valid_identifier(&query.identifier)?;
    let range = DateRange {
        start: query.start_date,
        end: query.end_date,
    };

    let sessions = state.sessions.clone();
    let history = run_blocking(move || sessions.history(&identifier, range)).await?;
    Ok(Json(HistoryResponse {
        records: history.records,
        count: history.count,
    }))
}

async fn enroll_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(user): Json<NewUser>,
) -> Result<(StatusCode, Json<UserRecord>), ApiError> {
    require_admin(&state, &headers)?;
    valid_identifier(&user.identifier)?;

    let sessions = state.sessions.clone();
    let record = run_blocking(move || sessions.enroll_user(user)).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn remove_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(identifier): Path<String>,
) -> Result<Json<StatusMessage>, ApiError> {
    require_admin(&state, &headers)?;
    let identifier = valid_identifier(&identifier)?;

    let sessions = state.sessions.clone();
    run_blocking(move || sessions.remove_user(&identifier)).await?;
    Ok(Json(StatusMessage {
        message: "User deleted successfully".to_string(),
    }))
}

// --- helpers ---

async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SessionError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "blocking task failed");
            ApiError::internal("Operation failed")
        })?
        .map_err(ApiError::from)
}

/// Identifiers become object-store keys; restrict to the character set the
/// key scheme is safe for.
fn valid_identifier(identifier: &str) -> Result<String, ApiError> {
    if identifier.is_empty() {
        return Err(ApiError::bad_request("Missing required field: identifier"));
    }
    if !identifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ApiError::bad_request(
            "Identifier may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(identifier.to_string())
}

/// Decode a base64 image payload, tolerating a `data:...;base64,` prefix.
fn decode_image_payload(payload: &str) -> Result<Vec<u8>, ApiError> {
    let raw = match payload.split_once(',') {
        Some((_, rest)) => rest,
        None => payload,
    };
    if raw.is_empty() {
        return Err(ApiError::bad_request("Missing required field: imageBase64"));
    }
    BASE64
        .decode(raw)
        .map_err(|_| ApiError::bad_request("Invalid base64 image payload"))
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(ApiError::unauthorized("Admin token not configured"));
    };
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if provided == Some(expected) {
        Ok(())
    } else {
        Err(ApiError::unauthorized("Invalid bearer token"))
    }
}
