//! Runner metadata from the runner HTTP API (`GET {base}/runner/{id}`).
//!
//! Best-effort: any failure is logged and reported as `None`. Nothing is
//! cached on failure, so the next lookup tries again.

use crate::store::RunStore;

use alloy::primitives::U256;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Runner record as served by the API. Only `image` is relied on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runner {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone)]
pub struct RunnerClient {
    base_url: String,
    http: Client,
}

impl RunnerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    pub fn runner_url(&self, token_id: U256) -> String {
        format!("{}/runner/{}", self.base_url, token_id)
    }

    /// Cache-first runner lookup.
    pub async fn fetch_runner(&self, store: &RunStore, token_id: U256) -> Option<Runner> {
        if let Some(runner) = store.cached_runner(token_id) {
            return Some(runner);
        }

        let url = self.runner_url(token_id);
        let resp = match self.http.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(token_id = %token_id, error = %e, "runner API request error");
                return None;
            }
        };

        if !resp.status().is_success() {
            debug!(token_id = %token_id, status = %resp.status(), "runner API lookup failed");
            return None;
        }

        match resp.json::<Runner>().await {
            Ok(runner) => {
                store.store_runner(token_id, runner.clone());
                debug!(token_id = %token_id, "runner resolved");
                Some(runner)
            }
            Err(e) => {
                warn!(token_id = %token_id, error = %e, "runner API returned invalid JSON");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Json};
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Local runner API. Token 404 answers with a 404, everything else with
    /// a record. Returns the base URL and the request counter.
    pub(crate) async fn spawn_runner_api() -> (String, Arc<AtomicUsize>) {
        async fn runner(
            State(hits): State<Arc<AtomicUsize>>,
            Path(id): Path<String>,
        ) -> impl IntoResponse {
            hits.fetch_add(1, Ordering::SeqCst);
            if id == "404" {
                return StatusCode::NOT_FOUND.into_response();
            }
            Json(serde_json::json!({
                "image": format!("https://img.example/{id}.png"),
                "name": format!("Runner #{id}"),
                "faction": "Hacker",
            }))
            .into_response()
        }

        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/runner/:id", get(runner))
            .with_state(hits.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), hits)
    }

    #[test]
    fn test_runner_url() {
        let client = RunnerClient::new("https://2112-api.sirsean.workers.dev/");
        assert_eq!(
            client.runner_url(U256::from(2112u64)),
            "https://2112-api.sirsean.workers.dev/runner/2112"
        );
    }

    #[test]
    fn test_runner_keeps_unknown_fields() {
        let runner: Runner =
            serde_json::from_str(r#"{"image":"https://img/1.png","faction":"Hacker"}"#).unwrap();
        assert_eq!(runner.image.as_deref(), Some("https://img/1.png"));
        assert!(runner.name.is_none());
        assert_eq!(runner.extra["faction"], "Hacker");
    }

    #[tokio::test]
    async fn test_network_error_yields_none() {
        let store = RunStore::new();
        let client = RunnerClient::new("http://127.0.0.1:1");
        assert!(client.fetch_runner(&store, U256::from(5u64)).await.is_none());
        assert!(store.cached_runner(U256::from(5u64)).is_none());
    }

    #[tokio::test]
    async fn test_second_lookup_is_served_from_cache() {
        let (base_url, hits) = spawn_runner_api().await;
        let store = RunStore::new();
        let client = RunnerClient::new(base_url);

        let first = client.fetch_runner(&store, U256::from(7u64)).await.unwrap();
        assert_eq!(first.name.as_deref(), Some("Runner #7"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let second = client.fetch_runner(&store, U256::from(7u64)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_is_retried() {
        let (base_url, hits) = spawn_runner_api().await;
        let store = RunStore::new();
        let client = RunnerClient::new(base_url);

        assert!(client.fetch_runner(&store, U256::from(404u64)).await.is_none());
        assert!(client.fetch_runner(&store, U256::from(404u64)).await.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
