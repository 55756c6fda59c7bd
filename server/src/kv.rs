//! Counter and set storage for page analytics.
//!
//! Analytics are best effort: every operation fails soft. `incr_by` returns the
//! attempted delta, reads return zero or `false`, and errors are only logged.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn incr_by(&self, key: &str, n: i64) -> i64;
    async fn get_int(&self, key: &str) -> i64;
    /// Returns `true` when the member was newly added.
    async fn set_add(&self, key: &str, member: &str) -> bool;
    /// Returns `true` when the member was present and removed.
    async fn set_remove(&self, key: &str, member: &str) -> bool;
    async fn set_card(&self, key: &str) -> i64;
    async fn set_contains(&self, key: &str, member: &str) -> bool;
    fn is_configured(&self) -> bool;
}

/// Client for a Redis-over-HTTP store (Upstash / Vercel KV REST protocol):
/// each command is a JSON array POSTed to the base URL, the reply is `{"result": ...}`.
pub struct RestKv {
    client: reqwest::Client,
    url: Option<String>,
    token: Option<String>,
}

impl RestKv {
    pub fn new(url: Option<String>, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        let url = url.filter(|u| !u.is_empty());
        let token = token.filter(|t| !t.is_empty());
        if url.is_none() || token.is_none() {
            tracing::warn!("key-value store not configured, analytics will read as zero");
        }
        Self { client, url, token }
    }

    async fn command(&self, args: Value) -> Result<Value> {
        let (url, token) = match (&self.url, &self.token) {
            (Some(u), Some(t)) => (u, t),
            _ => return Err(anyhow!("key-value store not configured")),
        };
        let resp = self.client.post(url).bearer_auth(token).json(&args).send().await?;
        let status = resp.status();
        let body: Value = resp.json().await?;
        if !status.is_success() {
            return Err(anyhow!("kv returned {status}: {}", body["error"]));
        }
        if let Some(err) = body.get("error").and_then(Value::as_str) {
            return Err(anyhow!("kv error: {err}"));
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn int_command(&self, op: &str, args: Value) -> Option<i64> {
        match self.command(args).await {
            Ok(v) => Some(as_int(&v)),
            Err(err) => {
                tracing::warn!(op, error = %err, "kv command failed");
                None
            }
        }
    }
}

/// Redis replies carry integers either as numbers or as strings; null is zero.
fn as_int(v: &Value) -> i64 {
    match v {
        Value::Number(n) => n.as_i64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[async_trait]
impl CounterStore for RestKv {
    async fn incr_by(&self, key: &str, n: i64) -> i64 {
        self.int_command("incrby", json!(["INCRBY", key, n])).await.unwrap_or(n)
    }

    async fn get_int(&self, key: &str) -> i64 {
        self.int_command("get", json!(["GET", key])).await.unwrap_or(0)
    }

    async fn set_add(&self, key: &str, member: &str) -> bool {
        self.int_command("sadd", json!(["SADD", key, member])).await.unwrap_or(0) > 0
    }

    async fn set_remove(&self, key: &str, member: &str) -> bool {
        self.int_command("srem", json!(["SREM", key, member])).await.unwrap_or(0) > 0
    }

    async fn set_card(&self, key: &str) -> i64 {
        self.int_command("scard", json!(["SCARD", key])).await.unwrap_or(0)
    }

    async fn set_contains(&self, key: &str, member: &str) -> bool {
        self.int_command("sismember", json!(["SISMEMBER", key, member])).await.unwrap_or(0) > 0
    }

    fn is_configured(&self) -> bool {
        self.url.is_some() && self.token.is_some()
    }
}

/// In-process store, used in tests and for local runs without a remote store.
#[derive(Default)]
pub struct MemoryKv {
    counters: Mutex<HashMap<String, i64>>,
    sets: Mutex<HashMap<String, HashSet<String>>>,
}

#[async_trait]
impl CounterStore for MemoryKv {
    async fn incr_by(&self, key: &str, n: i64) -> i64 {
        let mut counters = self.counters.lock();
        let v = counters.entry(key.to_string()).or_insert(0);
        *v += n;
        *v
    }

    async fn get_int(&self, key: &str) -> i64 {
        self.counters.lock().get(key).copied().unwrap_or(0)
    }

    async fn set_add(&self, key: &str, member: &str) -> bool {
        self.sets.lock().entry(key.to_string()).or_default().insert(member.to_string())
    }

    async fn set_remove(&self, key: &str, member: &str) -> bool {
        self.sets.lock().get_mut(key).is_some_and(|s| s.remove(member))
    }

    async fn set_card(&self, key: &str) -> i64 {
        self.sets.lock().get(key).map_or(0, |s| s.len() as i64)
    }

    async fn set_contains(&self, key: &str, member: &str) -> bool {
        self.sets.lock().get(key).is_some_and(|s| s.contains(member))
    }

    fn is_configured(&self) -> bool { true }
}
