mod common;

use axum::http::StatusCode;
use common::{app_with, get, json};
use tempfile::tempdir;

#[tokio::test]
async fn search_returns_ranked_results() {
    let dir = tempdir().unwrap();
    let app = app_with(dir.path(), |_| {});

    let (status, body) = get(&app, "/search?q=booking&k=2").await;
    assert_eq!(status, StatusCode::OK);
    let v = json(&body);
    let arr = v["results"].as_array().unwrap();
    assert_eq!(arr.len(), 2);
    let slugs: Vec<&str> = arr.iter().map(|h| h["slug"].as_str().unwrap()).collect();
    assert!(slugs.contains(&"booker") && slugs.contains(&"concierge"));
    let s0 = arr[0]["similarity_score"].as_f64().unwrap();
    let s1 = arr[1]["similarity_score"].as_f64().unwrap();
    assert!(s0 >= s1 && s1 > 0.0);
    assert!(arr[0]["snippet"].is_string());
}

#[tokio::test]
async fn search_only_returns_matching_documents() {
    let dir = tempdir().unwrap();
    let app = app_with(dir.path(), |_| {});

    let (_, body) = get(&app, "/search?q=expenses%20budgets").await;
    let v = json(&body);
    let arr = v["results"].as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["slug"], "ledger");
    assert_eq!(v["total_hits"], 1);
}

#[tokio::test]
async fn empty_query_and_tag_filter() {
    let dir = tempdir().unwrap();
    let app = app_with(dir.path(), |_| {});

    let (status, body) = get(&app, "/search?q=").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json(&body)["results"].as_array().unwrap().is_empty());

    let (_, body) = get(&app, "/search?q=booking&tag=Next.js").await;
    let v = json(&body);
    let arr = v["results"].as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["slug"], "booker");
}

#[tokio::test]
async fn projects_listing_and_lookup() {
    let dir = tempdir().unwrap();
    let app = app_with(dir.path(), |_| {});

    let (status, body) = get(&app, "/projects").await;
    assert_eq!(status, StatusCode::OK);
    let v = json(&body);
    let slugs: Vec<&str> = v.as_array().unwrap().iter().map(|p| p["slug"].as_str().unwrap()).collect();
    assert_eq!(slugs, ["booker", "ledger", "concierge"]);
    assert!(v[0].get("combined_text").is_none());

    let (status, body) = get(&app, "/projects/ledger").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["title"], "Ledger");

    let (status, body) = get(&app, "/projects/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json(&body)["error"].is_string());
}

#[tokio::test]
async fn related_excludes_the_project_itself() {
    let dir = tempdir().unwrap();
    let app = app_with(dir.path(), |_| {});

    let (status, body) = get(&app, "/projects/booker/related?k=5").await;
    assert_eq!(status, StatusCode::OK);
    let v = json(&body);
    let slugs: Vec<&str> = v.as_array().unwrap().iter().map(|h| h["slug"].as_str().unwrap()).collect();
    assert_eq!(slugs, ["concierge"]);

    let (status, _) = get(&app, "/projects/missing/related").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_collaborators() {
    let dir = tempdir().unwrap();
    let app = app_with(dir.path(), |c| c.token_secret = Some("k1".into()));

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let v = json(&body);
    assert_eq!(v["status"], "ok");
    assert_eq!(v["documents"], 3);
    assert_eq!(v["model_loaded"], true);
    assert_eq!(v["chat_configured"], false);
    assert_eq!(v["tokens_configured"], true);
}

#[tokio::test]
async fn missing_index_degrades_to_empty_results() {
    let dir = tempdir().unwrap();
    let config = server::ServerConfig {
        index: dir.path().join("nowhere").to_string_lossy().to_string(),
        ..Default::default()
    };
    let app = server::build_app(config).unwrap();

    let (_, body) = get(&app, "/health").await;
    let v = json(&body);
    assert_eq!(v["status"], "degraded");
    assert_eq!(v["documents"], 0);

    let (status, body) = get(&app, "/search?q=booking").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json(&body)["results"].as_array().unwrap().is_empty());
}
