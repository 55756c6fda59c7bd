#![allow(dead_code)]

use axum::body::Body;
use axum::extract::connect_info::{ConnectInfo, MockConnectInfo};
use axum::http::{Request, StatusCode};
use axum::Router;
use folio_core::build::build_index;
use folio_core::persist::save_index;
use folio_core::{IndexPaths, SourceDocument, VectorizerConfig};
use http_body_util::BodyExt;
use hyper::body::Bytes;
use server::kv::MemoryKv;
use server::{router, AppState, ServerConfig};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

pub fn sample_docs() -> Vec<SourceDocument> {
    vec![
        SourceDocument {
            slug: "booker".into(),
            title: "Booker".into(),
            description: "AI booking platform for salons".into(),
            body: "Schedules appointments with an OpenAI assistant and sends reminders.".into(),
            tags: vec!["ai".into()],
            tech: vec!["Next.js".into(), "OpenAI".into()],
            ..Default::default()
        },
        SourceDocument {
            slug: "ledger".into(),
            title: "Ledger".into(),
            description: "Personal finance dashboard".into(),
            body: "Tracks expenses and budgets in PostgreSQL with monthly charts.".into(),
            tags: vec!["finance".into()],
            tech: vec!["PostgreSQL".into()],
            ..Default::default()
        },
        SourceDocument {
            slug: "concierge".into(),
            title: "Concierge".into(),
            description: "Hotel booking chatbot".into(),
            body: "A chatbot that answers guests and handles room booking requests.".into(),
            tags: vec!["ai".into()],
            tech: vec!["Python".into()],
            ..Default::default()
        },
    ]
}

pub fn write_index(dir: &Path) {
    let built = build_index(sample_docs(), VectorizerConfig::default());
    save_index(&IndexPaths::new(dir), &built).unwrap();
}

/// Router over a freshly built index with an in-memory key-value store.
/// Requests without their own peer address appear to come from 127.0.0.1.
pub fn app_with(dir: &Path, tweak: impl FnOnce(&mut ServerConfig)) -> Router {
    app_with_kv(dir, Arc::new(MemoryKv::default()), tweak)
}

pub fn app_with_kv(dir: &Path, kv: Arc<MemoryKv>, tweak: impl FnOnce(&mut ServerConfig)) -> Router {
    write_index(dir);
    let mut config = ServerConfig { index: dir.to_string_lossy().to_string(), ..ServerConfig::default() };
    tweak(&mut config);
    let state = AppState::from_config(config).unwrap().with_kv(kv);
    router(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))))
}

pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Bytes) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Bytes) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

/// POST `body` as JSON from the socket peer `ip`.
pub fn post_json(uri: &str, ip: &str, body: serde_json::Value) -> Request<Body> {
    let mut req = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    req.extensions_mut().insert(ConnectInfo(peer(ip)));
    req
}

/// Like [`post_json`], with an `x-forwarded-for` header naming another client.
pub fn post_json_forwarded(uri: &str, ip: &str, forwarded_for: &str, body: serde_json::Value) -> Request<Body> {
    let mut req = post_json(uri, ip, body);
    req.headers_mut().insert("x-forwarded-for", forwarded_for.parse().unwrap());
    req
}

pub fn get_from(uri: &str, ip: &str) -> Request<Body> {
    let mut req = Request::get(uri).body(Body::empty()).unwrap();
    req.extensions_mut().insert(ConnectInfo(peer(ip)));
    req
}

fn peer(ip: &str) -> SocketAddr {
    SocketAddr::new(ip.parse().unwrap(), 40000)
}

pub fn json(body: &Bytes) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}
