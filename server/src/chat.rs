//! `POST /api/ai/chat`: proxy to an OpenAI-compatible chat completion API.
//!
//! The request `mode` picks the system prompt; in `projects` mode the last user
//! message is run against the retrieval index and the hits are appended as context.
//! Streaming requests pass the upstream server-sent events through untouched.
//! Without an API key, or when the upstream call fails, a canned answer built
//! from the retrieved projects is returned in the same event format.
//! Every accepted chat counts as a session; completion deltas are counted as tokens.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use folio_core::prompt::augment_with_hits;
use folio_core::SearchHit;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::analytics::{record_chat_session, record_chat_tokens};
use crate::error::ApiError;
use crate::kv::CounterStore;
use crate::{client_key, AppState};

const MAX_MESSAGES: usize = 20;
const MAX_CONTENT_CHARS: usize = 2000;
const MAX_TOP_K: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// What the visitor is asking about. Only `Projects` consults the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    General,
    Projects,
    Resume,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_top_k", alias = "topk")]
    pub top_k: usize,
    #[serde(default = "default_stream")]
    pub stream: bool,
}
fn default_top_k() -> usize { 4 }
fn default_stream() -> bool { true }

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub sources: Vec<String>,
    pub fallback: bool,
}

impl ChatRequest {
    fn validate(&self) -> Result<&ChatMessage, ApiError> {
        if self.messages.is_empty() || self.messages.len() > MAX_MESSAGES {
            return Err(ApiError::BadRequest(format!("messages must contain 1 to {MAX_MESSAGES} entries")));
        }
        for m in &self.messages {
            let len = m.content.chars().count();
            if len == 0 || len > MAX_CONTENT_CHARS {
                return Err(ApiError::BadRequest(format!("message content must be 1 to {MAX_CONTENT_CHARS} characters")));
            }
        }
        if self.top_k == 0 || self.top_k > MAX_TOP_K {
            return Err(ApiError::BadRequest(format!("top_k must be between 1 and {MAX_TOP_K}")));
        }
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .ok_or_else(|| ApiError::BadRequest("no user message found".into()))
    }
}

pub fn base_prompt(owner: &str) -> String {
    format!(
        "You are the AI assistant on {owner}'s portfolio website. You're friendly, professional, and concise.\n\n\
Guidelines:\n\
- Be helpful and conversational, but keep responses focused and not too long\n\
- When discussing projects, cite specific details if provided in context\n\
- Avoid harmful, sensitive, or inappropriate content\n\
- If you don't know something specific about {owner}'s work, say so honestly"
    )
}

/// System prompt for `mode`. `hits` are only used in projects mode.
pub fn system_prompt(mode: Mode, owner: &str, hits: &[SearchHit]) -> String {
    let base = base_prompt(owner);
    match mode {
        Mode::General => base,
        Mode::Projects => augment_with_hits(&base, owner, hits),
        Mode::Resume => format!(
            "{base}\n\nThe user is asking about {owner}'s resume and experience. Focus on technical skills, \
work experience, and career highlights. Be professional but personable."
        ),
    }
}

pub async fn chat_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let client = client_key(peer, &headers, state.config.trust_proxy);
    if !state.limiter.check(&client) {
        tracing::info!(%client, "chat rate limit exceeded");
        return Err(ApiError::TooManyRequests("Rate limit exceeded. Please try again later.".into()));
    }
    let Json(req) = body.map_err(|e| ApiError::BadRequest(format!("invalid request format: {}", e.body_text())))?;
    let last_user = req.validate()?;

    let hits = match req.mode {
        Mode::Projects => state.searcher.search(&last_user.content, req.top_k),
        _ => Vec::new(),
    };
    let sources: Vec<String> = hits.iter().map(|h| h.document.slug.clone()).collect();
    let system = system_prompt(req.mode, &state.config.owner_name, &hits);
    tracing::info!(
        query = %truncate(&last_user.content, 50),
        mode = ?req.mode,
        results = hits.len(),
        stream = req.stream,
        "chat request"
    );
    record_chat_session(state.kv.as_ref()).await;

    let upstream = match start_completion(&state, &system, &req.messages).await {
        Ok(resp) => Some(resp),
        Err(err) => {
            tracing::warn!(error = %err, "chat completion unavailable, using fallback");
            None
        }
    };

    match (upstream, req.stream) {
        (Some(resp), true) => Ok(sse_response(counted_stream(resp, state.kv.clone()))),
        (Some(resp), false) => match collect_completion(resp).await {
            Ok((text, tokens)) => {
                record_chat_tokens(state.kv.as_ref(), tokens).await;
                Ok(Json(ChatResponse { response: text, sources, fallback: false }).into_response())
            }
            Err(err) => {
                tracing::warn!(error = %err, "chat completion stream failed, using fallback");
                Ok(Json(ChatResponse { response: fallback_answer(&hits), sources, fallback: true }).into_response())
            }
        },
        (None, true) => Ok(sse_response(Body::from(fallback_events(&fallback_answer(&hits))))),
        (None, false) => Ok(Json(ChatResponse { response: fallback_answer(&hits), sources, fallback: true }).into_response()),
    }
}

async fn start_completion(state: &AppState, system: &str, messages: &[ChatMessage]) -> anyhow::Result<reqwest::Response> {
    let key = state
        .config
        .openai_api_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| anyhow::anyhow!("chat API key not configured"))?;
    let mut all = Vec::with_capacity(messages.len() + 1);
    all.push(json!({ "role": "system", "content": system }));
    all.extend(messages.iter().map(|m| json!(m)));
    let body = json!({
        "model": state.config.openai_model,
        "messages": all,
        "stream": true,
        "temperature": 0.7,
        "max_tokens": 1000,
    });
    let url = format!("{}/chat/completions", state.config.openai_base_url.trim_end_matches('/'));
    let resp = state.http.post(url).bearer_auth(key).json(&body).send().await?;
    if !resp.status().is_success() {
        anyhow::bail!("chat API error: {}", resp.status());
    }
    Ok(resp)
}

async fn collect_completion(mut resp: reqwest::Response) -> anyhow::Result<(String, usize)> {
    let mut acc = SseAccumulator::default();
    while let Some(chunk) = resp.chunk().await? {
        acc.push(&chunk);
    }
    let tokens = acc.deltas();
    Ok((acc.finish(), tokens))
}

/// Forward the upstream bytes unchanged, recording the delta count once the stream ends.
fn counted_stream(resp: reqwest::Response, kv: Arc<dyn CounterStore>) -> Body {
    let upstream = Box::pin(resp.bytes_stream());
    let stream = futures_util::stream::unfold(Some((upstream, SseAccumulator::default(), kv)), |st| async move {
        let (mut upstream, mut acc, kv) = st?;
        match upstream.next().await {
            Some(Ok(chunk)) => {
                acc.push(&chunk);
                Some((Ok(chunk), Some((upstream, acc, kv))))
            }
            Some(Err(err)) => {
                tracing::warn!(error = %err, "chat completion stream interrupted");
                record_chat_tokens(kv.as_ref(), acc.deltas()).await;
                Some((Err(err), None))
            }
            None => {
                record_chat_tokens(kv.as_ref(), acc.deltas()).await;
                None
            }
        }
    });
    Body::from_stream(stream)
}

fn sse_response(body: Body) -> Response {
    let mut resp = (StatusCode::OK, body).into_response();
    let h = resp.headers_mut();
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    h.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    h.insert("x-accel-buffering", HeaderValue::from_static("no"));
    resp
}

/// Collects `choices[0].delta.content` from `data:` lines of an SSE byte stream.
/// Lines may be split across chunks.
#[derive(Default)]
pub struct SseAccumulator {
    pending: Vec<u8>,
    text: String,
    deltas: usize,
    done: bool,
}

impl SseAccumulator {
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.line(&String::from_utf8_lossy(&line));
        }
    }

    /// Content deltas seen so far, counted as completion tokens.
    pub fn deltas(&self) -> usize { self.deltas }

    pub fn finish(mut self) -> String {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.line(&String::from_utf8_lossy(&rest));
        }
        self.text
    }

    fn line(&mut self, line: &str) {
        if self.done { return; }
        let Some(data) = line.trim().strip_prefix("data:") else { return };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            return;
        }
        // malformed events are skipped
        if let Ok(v) = serde_json::from_str::<Value>(data) {
            if let Some(s) = v["choices"][0]["delta"]["content"].as_str().filter(|s| !s.is_empty()) {
                self.text.push_str(s);
                self.deltas += 1;
            }
        }
    }
}

/// Canned answer used when the completion API is unavailable.
pub fn fallback_answer(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "I'm here to help you learn about this portfolio. Ask me about the projects, \
technical skills, work experience, or anything else you'd like to know!"
            .to_string();
    }
    let mut out = String::from("Here's what I found in the portfolio:\n\n");
    for hit in hits {
        out.push_str(&format!("{}: {}\n\n", hit.document.title, hit.snippet));
    }
    out.push_str("Would you like to know more about any of these projects?");
    out
}

/// Renders `text` as OpenAI-style delta events, three words per event.
pub fn fallback_events(text: &str) -> String {
    let words: Vec<&str> = text.split(' ').collect();
    let mut out = String::new();
    for chunk in words.chunks(3) {
        let event = json!({ "choices": [{ "delta": { "content": format!("{} ", chunk.join(" ")) } }] });
        out.push_str(&format!("data: {event}\n\n"));
    }
    out.push_str("data: [DONE]\n\n");
    out
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_handles_split_lines() {
        let mut acc = SseAccumulator::default();
        acc.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choi");
        acc.push(b"ces\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n: keep-alive\ndata: not json\n");
        acc.push(b"data: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"!\"}}]}\n");
        assert_eq!(acc.deltas(), 2);
        assert_eq!(acc.finish(), "Hello");
    }

    #[test]
    fn fallback_events_round_trip_through_accumulator() {
        let text = "one two three four five";
        let mut acc = SseAccumulator::default();
        acc.push(fallback_events(text).as_bytes());
        assert_eq!(acc.finish().trim_end(), text);
    }

    #[test]
    fn validation_rules() {
        let msg = |role, content: &str| ChatMessage { role, content: content.into() };
        let req = |messages, top_k| ChatRequest { messages, mode: Mode::General, top_k, stream: true };
        let ok = req(vec![msg(Role::User, "hi"), msg(Role::Assistant, "hello")], 4);
        assert_eq!(ok.validate().unwrap().content, "hi");

        assert!(req(vec![msg(Role::Assistant, "hello")], 4).validate().is_err());
        assert!(req(vec![], 4).validate().is_err());
        assert!(req(vec![msg(Role::User, &"x".repeat(2001))], 4).validate().is_err());
        assert!(req(vec![msg(Role::User, "hi")], 11).validate().is_err());
    }

    #[test]
    fn request_defaults() {
        let req: ChatRequest = serde_json::from_str(r#"{"messages":[{"role":"user","content":"hi"}]}"#).unwrap();
        assert_eq!(req.mode, Mode::General);
        assert_eq!(req.top_k, 4);
        assert!(req.stream);

        let req: ChatRequest =
            serde_json::from_str(r#"{"messages":[],"mode":"projects","topk":2,"stream":false}"#).unwrap();
        assert_eq!(req.mode, Mode::Projects);
        assert_eq!(req.top_k, 2);
        assert!(serde_json::from_str::<ChatRequest>(r#"{"messages":[],"mode":"poetry"}"#).is_err());
    }

    #[test]
    fn prompts_per_mode() {
        let general = system_prompt(Mode::General, "Ada", &[]);
        assert!(general.starts_with("You are the AI assistant on Ada's portfolio website."));
        assert_eq!(system_prompt(Mode::Projects, "Ada", &[]), general);

        let resume = system_prompt(Mode::Resume, "Ada", &[]);
        assert!(resume.starts_with(&general));
        assert!(resume.ends_with("Be professional but personable."));
        assert!(!resume.contains("### Project Context"));
    }
}
