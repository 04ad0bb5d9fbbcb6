use crate::core::analysis::analyze_upload;
use crate::core::recommender::Preferences;
use crate::core::uploads::{StagedUpload, stage_form};
use crate::orchestrator::cron::sweep;
use crate::server::error::{ApiError, ApiResult};
use crate::server::types::{
    AnalyzeAndRecommendResponse, AnalyzeResponse, AppState, CleanupResponse, HealthResponse,
    RecommendRequest, RecommendResponse, SUCCESS, UploadResponse,
};
use crate::utils::get_env::split_list;
use axum::Json;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use chrono::Utc;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

// server status handler
pub async fn server_status_handler() -> Json<Value> {
    Json(json!({
        "status": "running",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let landmark_ok = state.detector.health().await;
    Json(HealthResponse {
        status: if landmark_ok { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        landmark_service: if landmark_ok { "ok" } else { "unavailable" }.to_string(),
        recommender_configured: state.recommender.is_configured(),
    })
}

// validates and stages the image, then discards it; the UI uses this to
// check a file before asking for an analysis
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let form = stage_form(&mut multipart, &state.upload_limits()).await?;
    let info = form.upload.info.clone();
    discard(form.upload).await;

    info!(
        "upload {} accepted: {} bytes, {}x{}",
        info.file_id, info.size_bytes, info.width, info.height
    );
    Ok(Json(UploadResponse {
        status: SUCCESS.to_string(),
        message: format!("{} is a valid image", info.filename),
        file: info,
    }))
}

pub async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let form = stage_form(&mut multipart, &state.upload_limits()).await?;
    let analysis = analyze_upload(state.detector.as_ref(), &form.upload).await;
    discard(form.upload).await;

    Ok(Json(AnalyzeResponse {
        status: SUCCESS.to_string(),
        analysis: analysis?,
    }))
}

pub async fn recommend_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RecommendRequest>, JsonRejection>,
) -> ApiResult<Json<RecommendResponse>> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    if !request.analysis.face_detected {
        return Err(ApiError::bad_request(
            "analysis does not contain a detected face",
        ));
    }

    let recommendations = state
        .recommender
        .recommend(&request.analysis, &request.preferences)
        .await?;

    Ok(Json(RecommendResponse {
        status: SUCCESS.to_string(),
        recommendations,
    }))
}

pub async fn analyze_and_recommend_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<AnalyzeAndRecommendResponse>> {
    if !state.recommender.is_configured() {
        return Err(ApiError::Unavailable(
            "recommendation service is not configured".to_string(),
        ));
    }

    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let form = stage_form(&mut multipart, &state.upload_limits()).await?;
    let preferences = preferences_from_fields(&form.fields);
    let analysis = analyze_upload(state.detector.as_ref(), &form.upload).await;
    // the image is not needed past this point
    discard(form.upload).await;
    let analysis = analysis?;

    let recommendations = state
        .recommender
        .recommend(&analysis, &preferences)
        .await?;

    Ok(Json(AnalyzeAndRecommendResponse {
        status: SUCCESS.to_string(),
        analysis,
        recommendations,
    }))
}

// same age threshold as the background sweeper, so files of requests still
// in flight are never touched
pub async fn cleanup_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<CleanupResponse>> {
    let report = sweep(&state.config.upload_dir, state.config.max_file_age)
        .await
        .map_err(|e| ApiError::internal(format!("cleanup failed: {}", e)))?;
    info!(
        "manual cleanup: scanned {}, removed {}, failed {}",
        report.scanned, report.removed, report.failed
    );

    Ok(Json(CleanupResponse {
        status: SUCCESS.to_string(),
        report,
    }))
}

async fn discard(upload: StagedUpload) {
    let path = upload.path().display().to_string();
    if let Err(e) = upload.remove().await {
        // the sweeper retries once the file ages out
        warn!("failed to remove staged upload {}: {}", path, e);
    }
}

fn preferences_from_fields(fields: &HashMap<String, String>) -> Preferences {
    let non_empty = |key: &str| {
        fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(String::from)
    };

    Preferences {
        occasion: non_empty("occasion"),
        style: non_empty("style"),
        concerns: fields
            .get("concerns")
            .map(|v| split_list(v))
            .unwrap_or_default(),
    }
}
