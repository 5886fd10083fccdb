use std::path::{Component, Path as FsPath, PathBuf};

use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::post;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::attendance::{self, AttendanceStatus};
use crate::board::{BoardSnapshot, FetchOutcome};
use crate::error::AppError;
use crate::kats_api::dto::KidAttendanceResponse;
use crate::models::*;
use crate::services::AttendanceLookup;
use crate::state::AppState;

#[derive(Deserialize)]
struct SignInRequest {
    #[serde(default)]
    token: String,
    #[serde(default)]
    uuid: String,
}

#[derive(Deserialize)]
struct CanonicalQuery {
    #[serde(default)]
    label: Option<String>,
}

#[derive(Serialize)]
struct CanonicalResponse {
    label: String,
    code: String,
}

#[derive(Deserialize)]
struct ReconcileRequest {
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde(default)]
    record: Option<KidAttendanceResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MostRecentView {
    #[serde(rename = "type")]
    kind: attendance::AttendanceType,
    at: String,
    display_time: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReconcileResponse {
    record: Option<AttendanceDay>,
    most_recent: Option<MostRecentView>,
    status: Option<AttendanceStatus>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitAttendanceRequest {
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde(default)]
    photo_path: Option<String>,
    #[serde(flatten)]
    form: AttendanceForm,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/session", post(sign_in).delete(sign_out))
        .route("/attendance/types/canonical", get(canonical_type))
        .route("/attendance/reconcile", post(reconcile))
        .route("/routes", get(list_routes))
        .route("/routes/current", get(current_route))
        .route("/profile", get(profile))
        .route("/kids/{kid}/attendance", post(submit_attendance))
        .route("/kids/{kid}/attendance/{date}", get(kid_attendance))
        .route("/board", get(board))
        .route("/password/forgot", post(forgot_password))
        .route("/password/reset", post(reset_password))
        .route("/password/confirm", post(confirm_password))
        .with_state(state)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> Result<StatusCode, AppError> {
    state.session.sign_in(&req.token, &req.uuid).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn sign_out(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.session.sign_out().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn canonical_type(Query(params): Query<CanonicalQuery>) -> Json<CanonicalResponse> {
    let label = params.label.unwrap_or_default();
    let code = attendance::canonicalize(&label);
    Json(CanonicalResponse { label, code })
}

async fn reconcile(Json(req): Json<ReconcileRequest>) -> Json<ReconcileResponse> {
    let date = req.date.unwrap_or_else(today);
    let day = AttendanceDay::from(req.record.unwrap_or_default());

    let most_recent = attendance::most_recent_event(&day).map(|event| MostRecentView {
        kind: event.kind,
        at: event.at.to_rfc3339(),
        display_time: event.display_time(),
    });
    let status = attendance::derive_status(&day, date);
    let record = if day.is_empty() { None } else { Some(day) };

    Json(ReconcileResponse {
        record,
        most_recent,
        status,
    })
}

async fn list_routes(State(state): State<AppState>) -> Result<Json<Vec<RouteSummary>>, AppError> {
    let routes = state.routes().routes().await?;
    Ok(Json(routes))
}

async fn current_route(State(state): State<AppState>) -> Result<Json<RouteDetails>, AppError> {
    let details = state.routes().route_details().await?;
    Ok(Json(details))
}

async fn profile(State(state): State<AppState>) -> Result<Json<CaretakerProfile>, AppError> {
    let profile = state.routes().profile().await?;
    Ok(Json(profile))
}

async fn kid_attendance(
    State(state): State<AppState>,
    Path((kid, date)): Path<(String, NaiveDate)>,
) -> Result<Json<BoardSnapshot>, AppError> {
    let ticket = state.board.lock().await.select(&kid, date);

    let outcome = match state.attendance().lookup(&kid, date).await {
        Ok(AttendanceLookup { record: Some(day), .. }) => FetchOutcome::Found(day),
        Ok(_) => FetchOutcome::NoData,
        Err(e) => {
            state.board.lock().await.complete(&ticket, FetchOutcome::Failed);
            return Err(e);
        }
    };

    let mut board = state.board.lock().await;
    if !board.complete(&ticket, outcome) {
        debug!("attendance for {} on {} arrived after a newer selection", kid, date);
    }
    Ok(Json(board.snapshot().as_ref().clone()))
}

/// Resolves `photoPath` against the configured upload directory. Only plain
/// relative paths are accepted, and the resolved file must stay inside the
/// directory after symlinks are followed.
async fn resolve_photo_path(dir: Option<&FsPath>, requested: &str) -> Result<PathBuf, AppError> {
    let dir = dir.ok_or_else(|| AppError::BadRequest("Photo uploads are not enabled".to_string()))?;

    let relative = FsPath::new(requested);
    if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
        warn!("rejected photo path {}", requested);
        return Err(AppError::BadRequest(
            "photoPath must be a relative path inside the upload directory".to_string(),
        ));
    }

    let root = tokio::fs::canonicalize(dir).await?;
    let resolved = tokio::fs::canonicalize(root.join(relative))
        .await
        .map_err(|_| AppError::BadRequest(format!("Photo not found: {}", requested)))?;
    if !resolved.starts_with(&root) {
        warn!("photo path {} escapes the upload directory", requested);
        return Err(AppError::BadRequest(
            "photoPath must be a relative path inside the upload directory".to_string(),
        ));
    }
    Ok(resolved)
}

async fn load_photo(path: &FsPath) -> Result<Photo, AppError> {
    let bytes = tokio::fs::read(path).await?;
    let content_type = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("heic") => "image/heic",
        _ => "image/jpeg",
    };

    let mut photo = Photo::jpeg(bytes);
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        photo.file_name = name.to_string();
    }
    photo.content_type = content_type.to_string();
    Ok(photo)
}

async fn submit_attendance(
    State(state): State<AppState>,
    Path(kid): Path<String>,
    Json(req): Json<SubmitAttendanceRequest>,
) -> Result<(StatusCode, Json<AttendanceLookup>), AppError> {
    let mut form = req.form;
    if let Some(requested) = req.photo_path.as_deref().filter(|p| !p.is_empty()) {
        let path = resolve_photo_path(state.photo_dir.as_deref(), requested).await?;
        form.photo = Some(load_photo(&path).await?);
    }

    let date = req.date.unwrap_or_else(today);
    let ticket = state.board.lock().await.select(&kid, date);

    let lookup = match state.attendance().submit(&kid, form, date).await {
        Ok(lookup) => lookup,
        Err(e) => {
            state.board.lock().await.complete(&ticket, FetchOutcome::Failed);
            return Err(e);
        }
    };

    let outcome = match &lookup.record {
        Some(day) => FetchOutcome::Found(day.clone()),
        None => FetchOutcome::NoData,
    };
    if !state.board.lock().await.complete(&ticket, outcome) {
        debug!("submission for {} on {} finished after a newer selection", kid, date);
    }
    Ok((StatusCode::CREATED, Json(lookup)))
}

async fn board(State(state): State<AppState>) -> Json<BoardSnapshot> {
    let snapshot = state.board.lock().await.snapshot();
    Json(snapshot.as_ref().clone())
}

async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let message = state.accounts().request_password_link(&req).await?;
    Ok(Json(MessageResponse { message }))
}

async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.accounts().reset_password(&req).await?;
    Ok(Json(MessageResponse {
        message: "Password reset successfully. Please login with your new password.".to_string(),
    }))
}

async fn confirm_password(
    State(state): State<AppState>,
    Json(req): Json<ConfirmPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.accounts().confirm_password(&req).await?;
    Ok(Json(MessageResponse {
        message: "Password set successfully. Please login with your new password.".to_string(),
    }))
}
