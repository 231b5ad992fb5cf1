//! Axum JSON API over the run store.
//!
//! Provides:
//!   GET  /api/status               → connection, account, last update, prompt
//!   GET  /api/runs                 → sorted runs with data, runner and links
//!   POST /api/wallet/connect       → request account authorization
//!   POST /api/wallet/switch-network → ask the wallet to switch to Polygon
//!   POST /api/wallet/install       → install URL, re-detect the wallet

use crate::session::WalletCommand;
use crate::store::{AugmentedRun, RunStore};
use crate::wallet::Prompt;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Shared state for the dashboard routes.
#[derive(Clone)]
pub struct DashboardState {
    pub store: RunStore,
    pub commands: mpsc::UnboundedSender<WalletCommand>,
    /// Base for runner and run links
    pub links_base_url: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub connected: bool,
    pub address: Option<String>,
    pub last_update: Option<String>,
    pub runs: usize,
    pub prompt: Option<Prompt>,
    pub cached_run_data: usize,
    pub cached_runners: usize,
}

/// One row of the run table. Big integers are rendered as decimal strings.
#[derive(Debug, Serialize)]
pub struct RunEntry {
    pub run_id: String,
    pub token_id: String,
    pub owner: String,
    pub block_number: u64,
    pub notoriety_points: Option<u64>,
    pub data: Option<u64>,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    /// End time as RFC 3339
    pub ended_at: Option<String>,
    pub runner_image: Option<String>,
    pub runner_name: Option<String>,
    pub runner_url: String,
    pub run_url: String,
}

impl RunEntry {
    fn from_run(run: &AugmentedRun, links_base_url: &str) -> Self {
        let base = links_base_url.trim_end_matches('/');
        let data = run.run_data;
        Self {
            run_id: run.run.run_id.to_string(),
            token_id: run.run.token_id.to_string(),
            owner: run.run.owner.to_string(),
            block_number: run.run.block_number,
            notoriety_points: data.map(|d| d.notoriety_points),
            data: data.map(|d| d.data),
            start_time: data.map(|d| d.start_time),
            end_time: data.map(|d| d.end_time),
            ended_at: data
                .and_then(|d| i64::try_from(d.end_time).ok())
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                .map(|t| t.to_rfc3339()),
            runner_image: run.runner.as_ref().and_then(|r| r.image.clone()),
            runner_name: run.runner.as_ref().and_then(|r| r.name.clone()),
            runner_url: format!("{}/{}", base, run.run.token_id),
            run_url: format!("{}/run/{}", base, run.run.run_id),
        }
    }
}

/// Build the Axum router.
pub fn build_router(state: DashboardState) -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/runs", get(api_runs))
        .route("/api/wallet/connect", post(api_wallet_connect))
        .route("/api/wallet/switch-network", post(api_wallet_switch_network))
        .route("/api/wallet/install", post(api_wallet_install))
        .with_state(state)
}

/// Start the dashboard server.
pub async fn serve(state: DashboardState, bind_addr: &str) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = bind_addr, "dashboard listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// --- API Handlers ---

async fn api_status(State(state): State<DashboardState>) -> impl IntoResponse {
    let snapshot = state.store.snapshot();
    let (cached_run_data, cached_runners) = state.store.cache_sizes();
    Json(StatusResponse {
        connected: snapshot.connected,
        address: snapshot.account.map(|a| a.to_string()),
        last_update: snapshot.last_refresh.map(|t| t.to_rfc3339()),
        runs: snapshot.runs.len(),
        prompt: snapshot.prompt,
        cached_run_data,
        cached_runners,
    })
}

async fn api_runs(State(state): State<DashboardState>) -> impl IntoResponse {
    let runs: Vec<RunEntry> = state
        .store
        .runs()
        .iter()
        .map(|run| RunEntry::from_run(run, &state.links_base_url))
        .collect();
    Json(runs)
}

async fn api_wallet_connect(State(state): State<DashboardState>) -> impl IntoResponse {
    dispatch(&state, WalletCommand::Connect)
}

async fn api_wallet_switch_network(State(state): State<DashboardState>) -> impl IntoResponse {
    dispatch(&state, WalletCommand::SwitchNetwork)
}

async fn api_wallet_install(State(state): State<DashboardState>) -> impl IntoResponse {
    let install_url = match state.store.prompt() {
        Some(Prompt::Install { install_url, .. }) => Some(install_url),
        _ => None,
    };
    match state.commands.send(WalletCommand::Install) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "command": "install", "install_url": install_url })),
        )
            .into_response(),
        Err(_) => session_gone(WalletCommand::Install),
    }
}

fn dispatch(state: &DashboardState, command: WalletCommand) -> axum::response::Response {
    match state.commands.send(command) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "command": command })),
        )
            .into_response(),
        Err(_) => session_gone(command),
    }
}

fn session_gone(command: WalletCommand) -> axum::response::Response {
    warn!(?command, "wallet command dropped, session not running");
    StatusCode::SERVICE_UNAVAILABLE.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Runner;
    use crate::onchain::{Run, RunData};
    use alloy::primitives::{address, U256};

    fn state() -> (DashboardState, mpsc::UnboundedReceiver<WalletCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            DashboardState {
                store: RunStore::new(),
                commands: tx,
                links_base_url: "https://runner-hunter.sirsean.workers.dev".to_string(),
            },
            rx,
        )
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status_reports_prompt() {
        let (state, _rx) = state();
        state.store.set_prompt(Some(Prompt::Connect {
            message: "Connect your wallet to continue.".to_string(),
        }));

        let resp = api_status(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["connected"], false);
        assert_eq!(json["runs"], 0);
        assert!(json["last_update"].is_null());
        assert_eq!(json["prompt"]["kind"], "connect");
    }

    #[tokio::test]
    async fn test_runs_render_links_and_time() {
        let (state, _rx) = state();
        state.store.runs_refreshed(
            vec![AugmentedRun {
                run: Run {
                    run_id: U256::from(77u64),
                    token_id: U256::from(2112u64),
                    owner: address!("bb015bb4009b6a48bfb9363d9c9b1d54e9ab02e5"),
                    block_number: 30_000_000,
                    log_index: 4,
                },
                run_data: Some(RunData {
                    notoriety_points: 9,
                    data: 120,
                    start_time: 1_650_000_000,
                    end_time: 1_650_003_600,
                }),
                runner: Some(Runner {
                    image: Some("https://img.example/2112.png".to_string()),
                    name: None,
                    extra: serde_json::Map::new(),
                }),
            }],
            Utc::now(),
        );

        let json = body_json(api_runs(State(state)).await.into_response()).await;
        let row = &json[0];
        assert_eq!(row["run_id"], "77");
        assert_eq!(row["token_id"], "2112");
        assert_eq!(row["data"], 120);
        assert_eq!(row["ended_at"], "2022-04-15T06:20:00+00:00");
        assert_eq!(row["runner_image"], "https://img.example/2112.png");
        assert_eq!(
            row["runner_url"],
            "https://runner-hunter.sirsean.workers.dev/2112"
        );
        assert_eq!(
            row["run_url"],
            "https://runner-hunter.sirsean.workers.dev/run/77"
        );
    }

    #[tokio::test]
    async fn test_wallet_actions_are_forwarded() {
        let (state, mut rx) = state();

        let resp = api_wallet_connect(State(state.clone())).await.into_response();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let resp = api_wallet_switch_network(State(state.clone()))
            .await
            .into_response();
        assert_eq!(body_json(resp).await["command"], "switch_network");

        state.store.set_prompt(Some(Prompt::Install {
            message: "install".to_string(),
            install_url: "https://frame.sh".to_string(),
        }));
        let json = body_json(api_wallet_install(State(state)).await.into_response()).await;
        assert_eq!(json["install_url"], "https://frame.sh");

        assert_eq!(rx.recv().await, Some(WalletCommand::Connect));
        assert_eq!(rx.recv().await, Some(WalletCommand::SwitchNetwork));
        assert_eq!(rx.recv().await, Some(WalletCommand::Install));
    }

    #[tokio::test]
    async fn test_command_without_session() {
        let (state, rx) = state();
        drop(rx);
        let resp = api_wallet_connect(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
