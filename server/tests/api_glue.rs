mod common;

use axum::http::StatusCode;
use common::{app_with, app_with_kv, get, get_from, json, post_json, post_json_forwarded, send};
use serde_json::json as j;
use server::analytics::chat_sessions_key;
use server::kv::{CounterStore, MemoryKv};
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn views_and_likes_are_counted_per_visitor() {
    let dir = tempdir().unwrap();
    let app = app_with(dir.path(), |_| {});

    for _ in 0..2 {
        let (status, _) = send(&app, post_json("/api/analytics/view", "1.1.1.1", j!({"slug": "booker"}))).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (_, body) = send(&app, post_json("/api/analytics/like", "1.1.1.1", j!({"slug": "booker", "like": true}))).await;
    let v = json(&body);
    assert_eq!(v["likes"], 1);
    assert_eq!(v["liked"], true);
    // liking twice does not double count
    send(&app, post_json("/api/analytics/like", "1.1.1.1", j!({"slug": "booker", "like": true}))).await;
    send(&app, post_json("/api/analytics/like", "2.2.2.2", j!({"slug": "booker"}))).await;

    let (status, body) = get(&app, "/api/analytics/booker").await;
    assert_eq!(status, StatusCode::OK);
    let v = json(&body);
    assert_eq!(v["views"], 2);
    assert_eq!(v["likes"], 2);
    assert_eq!(v["liked"], false);

    let (_, body) = send(&app, get_from("/api/analytics/booker", "2.2.2.2")).await;
    assert_eq!(json(&body)["liked"], true);

    let (_, body) = send(&app, post_json("/api/analytics/like", "1.1.1.1", j!({"slug": "booker", "like": false}))).await;
    let v = json(&body);
    assert_eq!(v["likes"], 1);
    assert_eq!(v["liked"], false);

    let (status, body) = get(&app, "/api/analytics/views?slug=booker").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body), j!({"slug": "booker", "views": 2}));
}

#[tokio::test]
async fn like_without_flag_toggles() {
    let dir = tempdir().unwrap();
    let app = app_with(dir.path(), |_| {});
    let like = || post_json("/api/analytics/like", "1.1.1.1", j!({"slug": "ledger"}));

    let (_, body) = send(&app, like()).await;
    assert_eq!(json(&body), j!({"slug": "ledger", "likes": 1, "liked": true}));
    let (_, body) = send(&app, like()).await;
    assert_eq!(json(&body), j!({"slug": "ledger", "likes": 0, "liked": false}));
    let (_, body) = send(&app, like()).await;
    assert_eq!(json(&body)["liked"], true);
}

#[tokio::test]
async fn forwarded_header_only_counts_behind_trusted_proxy() {
    let dir = tempdir().unwrap();
    let direct = app_with(dir.path(), |_| {});
    for fake in ["9.9.9.1", "9.9.9.2", "9.9.9.3"] {
        let req = post_json_forwarded("/api/analytics/like", "1.1.1.1", fake, j!({"slug": "booker", "like": true}));
        send(&direct, req).await;
    }
    let (_, body) = get(&direct, "/api/analytics/booker").await;
    assert_eq!(json(&body)["likes"], 1);

    let proxied_dir = tempdir().unwrap();
    let proxied = app_with(proxied_dir.path(), |c| c.trust_proxy = true);
    for client in ["9.9.9.1", "9.9.9.2"] {
        let req = post_json_forwarded("/api/analytics/like", "10.0.0.1", client, j!({"slug": "booker", "like": true}));
        send(&proxied, req).await;
    }
    let (_, body) = get(&proxied, "/api/analytics/booker").await;
    assert_eq!(json(&body)["likes"], 2);
}

#[tokio::test]
async fn analytics_rejects_bad_input() {
    let dir = tempdir().unwrap();
    let app = app_with(dir.path(), |_| {});

    let (status, _) = send(&app, post_json("/api/analytics/view", "1.1.1.1", j!({"slug": "has space"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, post_json("/api/analytics/view", "1.1.1.1", j!({"nope": 1}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get(&app, "/api/analytics/views").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_without_key_streams_fallback() {
    let dir = tempdir().unwrap();
    let app = app_with(dir.path(), |_| {});

    let req = post_json(
        "/api/ai/chat",
        "3.3.3.3",
        j!({"messages": [{"role": "user", "content": "Tell me about booking"}], "mode": "projects"}),
    );
    let resp = tower::ServiceExt::oneshot(app.clone(), req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "text/event-stream");
    let body = http_body_util::BodyExt::collect(resp.into_body()).await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.starts_with("data: "));
    assert!(text.contains("Booker"));
    assert!(text.trim_end().ends_with("data: [DONE]"));
}

#[tokio::test]
async fn chat_without_key_returns_json_fallback() {
    let dir = tempdir().unwrap();
    let app = app_with(dir.path(), |_| {});

    let req = post_json(
        "/api/ai/chat",
        "4.4.4.4",
        j!({"messages": [{"role": "user", "content": "expenses"}], "mode": "projects", "stream": false, "top_k": 3}),
    );
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    let v = json(&body);
    assert_eq!(v["fallback"], true);
    assert_eq!(v["sources"], j!(["ledger"]));
    assert!(v["response"].as_str().unwrap().contains("Ledger"));
}

#[tokio::test]
async fn only_projects_mode_consults_the_index() {
    let dir = tempdir().unwrap();
    let app = app_with(dir.path(), |_| {});

    for mode in [None, Some("general"), Some("resume")] {
        let mut body = j!({"messages": [{"role": "user", "content": "expenses"}], "stream": false});
        if let Some(mode) = mode {
            body["mode"] = j!(mode);
        }
        let (status, resp) = send(&app, post_json("/api/ai/chat", "4.4.4.5", body)).await;
        assert_eq!(status, StatusCode::OK);
        let v = json(&resp);
        assert_eq!(v["sources"], j!([]), "mode {mode:?}");
        assert!(!v["response"].as_str().unwrap().contains("Ledger"));
    }
}

#[tokio::test]
async fn chat_validates_requests() {
    let dir = tempdir().unwrap();
    let app = app_with(dir.path(), |_| {});

    let cases = [
        j!({"messages": []}),
        j!({"messages": [{"role": "robot", "content": "hi"}]}),
        j!({"messages": [{"role": "user", "content": ""}]}),
        j!({"messages": [{"role": "user", "content": "hi"}], "top_k": 0}),
        j!({"messages": [{"role": "user", "content": "hi"}], "mode": "poetry"}),
        j!({"messages": [{"role": "assistant", "content": "hi"}]}),
        j!({"text": "hi"}),
    ];
    for body in cases {
        let (status, resp) = send(&app, post_json("/api/ai/chat", "5.5.5.5", body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(json(&resp)["error"].is_string());
    }
}

#[tokio::test]
async fn chat_is_rate_limited_per_client() {
    let dir = tempdir().unwrap();
    let app = app_with(dir.path(), |c| c.chat_rate_limit = 2);
    let body = j!({"messages": [{"role": "user", "content": "hi"}], "stream": false});

    for _ in 0..2 {
        let (status, _) = send(&app, post_json("/api/ai/chat", "6.6.6.6", body.clone())).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = send(&app, post_json("/api/ai/chat", "6.6.6.6", body.clone())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let (status, _) = send(&app, post_json("/api/ai/chat", "7.7.7.7", body)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_reset_the_window() {
    let dir = tempdir().unwrap();
    let app = app_with(dir.path(), |c| c.chat_rate_limit = 2);
    let body = j!({"messages": [{"role": "user", "content": "hi"}], "stream": false});

    for (i, fake) in ["6.6.6.1", "6.6.6.2", "6.6.6.3", "6.6.6.4"].into_iter().enumerate() {
        let (status, _) = send(&app, post_json_forwarded("/api/ai/chat", "8.8.8.8", fake, body.clone())).await;
        let expected = if i < 2 { StatusCode::OK } else { StatusCode::TOO_MANY_REQUESTS };
        assert_eq!(status, expected, "request {i} as {fake}");
    }
}

#[tokio::test]
async fn trusted_proxy_limits_each_forwarded_client() {
    let dir = tempdir().unwrap();
    let app = app_with(dir.path(), |c| {
        c.chat_rate_limit = 1;
        c.trust_proxy = true;
    });
    let body = j!({"messages": [{"role": "user", "content": "hi"}], "stream": false});

    let (status, _) = send(&app, post_json_forwarded("/api/ai/chat", "10.0.0.1", "6.6.6.1", body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, post_json_forwarded("/api/ai/chat", "10.0.0.1", "6.6.6.1", body.clone())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let (status, _) = send(&app, post_json_forwarded("/api/ai/chat", "10.0.0.1", "6.6.6.2", body)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn chat_sessions_show_up_in_the_summary() {
    let dir = tempdir().unwrap();
    let kv = Arc::new(MemoryKv::default());
    let app = app_with_kv(dir.path(), kv.clone(), |_| {});
    let body = j!({"messages": [{"role": "user", "content": "hi"}], "stream": false});

    for _ in 0..2 {
        let (status, _) = send(&app, post_json("/api/ai/chat", "1.1.1.1", body.clone())).await;
        assert_eq!(status, StatusCode::OK);
    }
    // rejected requests are not sessions
    send(&app, post_json("/api/ai/chat", "1.1.1.1", j!({"messages": []}))).await;
    let today = time::OffsetDateTime::now_utc().date();
    assert_eq!(kv.get_int(&chat_sessions_key(today)).await, 2);

    let (status, resp) = get(&app, "/api/analytics/summary?range=3d").await;
    assert_eq!(status, StatusCode::OK);
    let v = json(&resp);
    assert_eq!(v["range_days"], 3);
    assert_eq!(v["resume_downloads"], 0);
    assert_eq!(v["chat"]["total_sessions"], 2);
    assert_eq!(v["chat"]["total_tokens"], 0);
    let daily = v["chat"]["sessions_daily"].as_array().unwrap();
    assert_eq!(daily.len(), 3);
    assert_eq!(daily[0]["count"], 2);
    assert_eq!(v["chat"]["tokens_daily"].as_array().unwrap().len(), 3);

    let (_, resp) = get(&app, "/api/analytics/summary").await;
    assert_eq!(json(&resp)["range_days"], 7);
}
