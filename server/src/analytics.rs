//! Page views, likes, chat usage and resume downloads, stored in the key-value collaborator.
//!
//! Visitors are identified by a salted hash of their address, never the address itself.

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};

use crate::error::ApiError;
use crate::kv::CounterStore;
use crate::{client_key, AppState};

pub const RESUME_DOWNLOADS_KEY: &str = "downloads:resume";
const DEFAULT_RANGE_DAYS: i64 = 7;
const MAX_RANGE_DAYS: i64 = 90;

#[derive(Debug, Deserialize)]
pub struct ViewRequest {
    pub slug: String,
}

#[derive(Debug, Deserialize)]
pub struct ViewParams {
    #[serde(default)]
    pub slug: String,
}

/// `like` sets the state explicitly; without it the current state is flipped.
#[derive(Debug, Deserialize)]
pub struct LikeRequest {
    pub slug: String,
    #[serde(default)]
    pub like: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    pub range: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ViewResponse {
    pub slug: String,
    pub views: i64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub slug: String,
    pub views: i64,
    pub likes: i64,
    pub liked: bool,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub slug: String,
    pub likes: i64,
    pub liked: bool,
}

#[derive(Debug, Serialize)]
pub struct ResumeStats {
    pub downloads: i64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct ChatUsage {
    pub sessions_daily: Vec<DailyCount>,
    pub tokens_daily: Vec<DailyCount>,
    pub total_sessions: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub range_days: i64,
    pub resume_downloads: i64,
    pub chat: ChatUsage,
}

fn views_key(slug: &str) -> String { format!("views:{slug}") }
fn likes_key(slug: &str) -> String { format!("likes:{slug}") }

/// `YYYY-MM-DD`, the suffix of every per-day counter.
pub fn day_stamp(day: Date) -> String {
    day.format(format_description!("[year]-[month]-[day]")).unwrap_or_default()
}

pub fn chat_sessions_key(day: Date) -> String { format!("analytics:chat:sessions:{}", day_stamp(day)) }
pub fn chat_tokens_key(day: Date) -> String { format!("analytics:chat:tokens:{}", day_stamp(day)) }

fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

pub async fn record_chat_session(kv: &dyn CounterStore) {
    kv.incr_by(&chat_sessions_key(today()), 1).await;
}

pub async fn record_chat_tokens(kv: &dyn CounterStore, tokens: usize) {
    if tokens == 0 { return; }
    let n = i64::try_from(tokens).unwrap_or(i64::MAX);
    let total = kv.incr_by(&chat_tokens_key(today()), n).await;
    tracing::debug!(tokens, total, "chat tokens recorded");
}

pub fn visitor_id(ip: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

fn check_slug(slug: &str) -> Result<(), ApiError> {
    let valid = !slug.is_empty()
        && slug.len() <= 128
        && slug.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/'));
    if valid { Ok(()) } else { Err(ApiError::BadRequest("invalid slug".into())) }
}

/// `"7d"`, `"30"` → days; anything else falls back to a week. At most 90 days.
fn parse_range(range: Option<&str>) -> i64 {
    range
        .map(|r| r.trim().trim_end_matches('d'))
        .and_then(|r| r.parse::<i64>().ok())
        .filter(|d| *d > 0)
        .unwrap_or(DEFAULT_RANGE_DAYS)
        .min(MAX_RANGE_DAYS)
}

fn visitor(state: &AppState, peer: SocketAddr, headers: &HeaderMap) -> String {
    visitor_id(&client_key(peer, headers, state.config.trust_proxy), &state.config.ip_salt)
}

pub async fn record_view(
    State(state): State<AppState>,
    body: Result<Json<ViewRequest>, JsonRejection>,
) -> Result<Json<ViewResponse>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    check_slug(&req.slug)?;
    let views = state.kv.incr_by(&views_key(&req.slug), 1).await;
    tracing::debug!(slug = %req.slug, views, "page view");
    Ok(Json(ViewResponse { slug: req.slug, views }))
}

pub async fn views(State(state): State<AppState>, Query(params): Query<ViewParams>) -> Result<Json<ViewResponse>, ApiError> {
    check_slug(&params.slug)?;
    let views = state.kv.get_int(&views_key(&params.slug)).await;
    Ok(Json(ViewResponse { slug: params.slug, views }))
}

pub async fn stats(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Result<Json<StatsResponse>, ApiError> {
    check_slug(&slug)?;
    let visitor = visitor(&state, peer, &headers);
    let views = state.kv.get_int(&views_key(&slug)).await;
    let likes = state.kv.set_card(&likes_key(&slug)).await;
    let liked = state.kv.set_contains(&likes_key(&slug), &visitor).await;
    Ok(Json(StatsResponse { slug, views, likes, liked }))
}

pub async fn toggle_like(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<LikeRequest>, JsonRejection>,
) -> Result<Json<LikeResponse>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    check_slug(&req.slug)?;
    let visitor = visitor(&state, peer, &headers);
    let key = likes_key(&req.slug);
    let like = match req.like {
        Some(like) => like,
        None => !state.kv.set_contains(&key, &visitor).await,
    };
    if like {
        state.kv.set_add(&key, &visitor).await;
    } else {
        state.kv.set_remove(&key, &visitor).await;
    }
    let likes = state.kv.set_card(&key).await;
    let liked = state.kv.set_contains(&key, &visitor).await;
    Ok(Json(LikeResponse { slug: req.slug, likes, liked }))
}

pub async fn resume_stats(State(state): State<AppState>) -> Json<ResumeStats> {
    Json(ResumeStats { downloads: state.kv.get_int(RESUME_DOWNLOADS_KEY).await })
}

/// Chat sessions and tokens per day for the last `range` days, newest first.
pub async fn summary(State(state): State<AppState>, Query(params): Query<SummaryParams>) -> Json<SummaryResponse> {
    let days = parse_range(params.range.as_deref());
    let chat = chat_usage(state.kv.as_ref(), today(), days).await;
    let resume_downloads = state.kv.get_int(RESUME_DOWNLOADS_KEY).await;
    Json(SummaryResponse { range_days: days, resume_downloads, chat })
}

async fn chat_usage(kv: &dyn CounterStore, end: Date, days: i64) -> ChatUsage {
    let mut usage = ChatUsage { sessions_daily: Vec::new(), tokens_daily: Vec::new(), total_sessions: 0, total_tokens: 0 };
    for offset in 0..days {
        let Some(day) = end.checked_sub(Duration::days(offset)) else { break };
        let sessions = kv.get_int(&chat_sessions_key(day)).await;
        let tokens = kv.get_int(&chat_tokens_key(day)).await;
        usage.total_sessions += sessions;
        usage.total_tokens += tokens;
        usage.sessions_daily.push(DailyCount { date: day_stamp(day), count: sessions });
        usage.tokens_daily.push(DailyCount { date: day_stamp(day), count: tokens });
    }
    usage
}
