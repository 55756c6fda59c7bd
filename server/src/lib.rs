use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use folio_core::{Document, IndexPaths, SearchHit, SearchOptions, Searcher, TokenSigner};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod analytics;
pub mod chat;
pub mod config;
pub mod error;
pub mod kv;
pub mod rate_limit;
pub mod resume;

pub use config::ServerConfig;
use error::ApiError;
use kv::{CounterStore, RestKv};
use rate_limit::RateLimiter;

const DEFAULT_K: usize = 5;
const MAX_K: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub searcher: Arc<Searcher>,
    pub signer: Arc<TokenSigner>,
    pub kv: Arc<dyn CounterStore>,
    pub limiter: Arc<RateLimiter>,
    pub http: reqwest::Client,
}

impl AppState {
    /// Load the index and wire every collaborator from `config`. A missing or
    /// broken index leaves the server up with empty search results.
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        let searcher = Searcher::load(&IndexPaths::new(&config.index));
        let status = searcher.status();
        tracing::info!(documents = status.documents, model_loaded = status.model_loaded, "index loaded");
        let signer = TokenSigner::new(config.token_secret.as_deref());
        if !signer.is_configured() {
            tracing::warn!("RESUME_TOKEN_SECRET not set, resume downloads disabled");
        }
        let kv = RestKv::new(config.kv_url.clone(), config.kv_token.clone());
        let limiter = RateLimiter::new(config.chat_rate_limit, Duration::from_secs(config.chat_rate_window_secs));
        let http = reqwest::Client::builder().connect_timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            config: Arc::new(config),
            searcher: Arc::new(searcher),
            signer: Arc::new(signer),
            kv: Arc::new(kv),
            limiter: Arc::new(limiter),
            http,
        })
    }

    pub fn with_searcher(mut self, searcher: Searcher) -> Self {
        self.searcher = Arc::new(searcher);
        self
    }

    pub fn with_kv(mut self, kv: Arc<dyn CounterStore>) -> Self {
        self.kv = kv;
        self
    }
}

pub fn build_app(config: ServerConfig) -> Result<Router> {
    Ok(router(AppState::from_config(config)?))
}

pub fn router(state: AppState) -> Router {
    // CORS_ALLOW_ORIGIN is comma-separated; any origin when unset or unparsable
    let origins: Vec<_> = state
        .config
        .cors_allow_origin
        .as_deref()
        .unwrap_or("")
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    let cors = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/search", get(search_handler))
        .route("/projects", get(projects_handler))
        .route("/projects/:slug", get(project_handler))
        .route("/projects/:slug/related", get(related_handler))
        .route("/api/ai/chat", post(chat::chat_handler))
        .route("/api/analytics/view", post(analytics::record_view))
        .route("/api/analytics/views", get(analytics::views))
        .route("/api/analytics/like", post(analytics::toggle_like))
        .route("/api/analytics/resume", get(analytics::resume_stats))
        .route("/api/analytics/summary", get(analytics::summary))
        .route("/api/analytics/:slug", get(analytics::stats))
        .route("/api/resume/token", post(resume::issue_token))
        .route("/api/resume/download", get(resume::download))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Key identifying a caller for rate limiting and likes: the socket peer, or the
/// forwarded client address when the server runs behind a trusted proxy.
pub fn client_key(peer: SocketAddr, headers: &HeaderMap, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(ip) = forwarded_ip(headers) {
            return ip;
        }
    }
    peer.ip().to_string()
}

/// First `x-forwarded-for` entry, then `x-real-ip`.
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    header("x-forwarded-for").or_else(|| header("x-real-ip"))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub documents: usize,
    pub model_loaded: bool,
    pub chat_configured: bool,
    pub kv_configured: bool,
    pub tokens_configured: bool,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let index = state.searcher.status();
    Json(HealthResponse {
        status: if index.model_loaded { "ok" } else { "degraded" },
        documents: index.documents,
        model_loaded: index.model_loaded,
        chat_configured: state.config.chat_configured(),
        kv_configured: state.kv.is_configured(),
        tokens_configured: state.signer.is_configured(),
    })
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    /// Restrict to documents carrying this tag or technology
    pub tag: Option<String>,
}
fn default_k() -> usize { DEFAULT_K }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let opts = SearchOptions {
        labels: params.tag.into_iter().filter(|t| !t.is_empty()).collect(),
        ..SearchOptions::top(params.k.clamp(1, MAX_K))
    };
    let results = state.searcher.search_with(&params.q, &opts);
    let elapsed = start.elapsed();
    tracing::debug!(query = %params.q, hits = results.len(), "search");
    Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits: results.len(), results })
}

/// Public view of a document, without the indexed text.
#[derive(Serialize)]
pub struct ProjectSummary {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub tech: Vec<String>,
    pub url: Option<String>,
}

impl From<&Document> for ProjectSummary {
    fn from(d: &Document) -> Self {
        Self {
            slug: d.slug.clone(),
            title: d.title.clone(),
            description: d.description.clone(),
            tags: d.tags.clone(),
            tech: d.tech.clone(),
            url: d.url.clone(),
        }
    }
}

pub async fn projects_handler(State(state): State<AppState>) -> Json<Vec<ProjectSummary>> {
    Json(state.searcher.documents().iter().map(ProjectSummary::from).collect())
}

pub async fn project_handler(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Json<Document>, ApiError> {
    state
        .searcher
        .get(&slug)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no project named {slug}")))
}

#[derive(Deserialize)]
pub struct RelatedParams {
    #[serde(default = "default_k")]
    pub k: usize,
}

pub async fn related_handler(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(params): Query<RelatedParams>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    if state.searcher.get(&slug).is_none() {
        return Err(ApiError::NotFound(format!("no project named {slug}")));
    }
    Ok(Json(state.searcher.related(&slug, params.k.clamp(1, MAX_K))))
}
