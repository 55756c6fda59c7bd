//! Resume downloads gated by short-lived signed tokens.

use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use folio_core::token::Payload;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analytics::RESUME_DOWNLOADS_KEY;
use crate::error::ApiError;
use crate::AppState;

pub const DOWNLOAD_SUBJECT: &str = "resume_download";

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub token: Option<String>,
}

pub async fn issue_token(State(state): State<AppState>) -> Result<Json<TokenResponse>, ApiError> {
    let mut payload = Payload::new();
    payload.insert("sub".into(), Value::String(DOWNLOAD_SUBJECT.into()));
    let ttl = state.config.token_ttl_secs;
    let token = state.signer.issue(payload, ttl)?;
    Ok(Json(TokenResponse { token, expires_in: ttl }))
}

pub async fn download(
    State(state): State<AppState>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, ApiError> {
    let token = params
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing download token".into()))?;
    let payload = state.signer.verify(&token).map_err(|err| {
        tracing::info!(error = %err, "rejected resume download token");
        ApiError::from(err)
    })?;
    if payload.get("sub").and_then(Value::as_str) != Some(DOWNLOAD_SUBJECT) {
        return Err(ApiError::Forbidden("token does not grant a resume download".into()));
    }

    let path = &state.config.resume_path;
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "resume file unavailable");
            return Err(ApiError::NotFound("resume is not available".into()));
        }
    };
    let downloads = state.kv.incr_by(RESUME_DOWNLOADS_KEY, 1).await;
    tracing::info!(downloads, "resume downloaded");

    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("resume.pdf");
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    let mut resp = (StatusCode::OK, bytes).into_response();
    let h = resp.headers_mut();
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    h.insert(header::CONTENT_DISPOSITION, disposition);
    h.insert(header::CACHE_CONTROL, HeaderValue::from_static("private, no-store"));
    h.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    Ok(resp)
}
