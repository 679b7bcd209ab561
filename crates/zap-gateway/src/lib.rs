//! Operator-facing HTTP surface: OAuth onboarding and the per-account
//! status report. Carries no deletion logic.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;
use zap_registry::AccountRegistry;
use zap_runtime::{AccountPresence, ListenerSupervisor};
use zap_slack::SlackOauthClient;

const LANDING_ENDPOINT: &str = "/";
const AUTH_CALLBACK_ENDPOINT: &str = "/auth";
const PING_ENDPOINT: &str = "/ping";
const STATUS_ENDPOINT: &str = "/status";

const PENDING_SYMBOL: &str = ":white_circle:";
const STARTING_SYMBOL: &str = ":large_orange_circle:";
const ONLINE_SYMBOL: &str = ":large_green_circle:";

pub struct GatewayState {
    pub registry: Arc<AccountRegistry>,
    pub supervisor: ListenerSupervisor,
    pub oauth: SlackOauthClient,
}

/// Binds and serves the gateway until ctrl-c.
pub async fn run_gateway_server(bind: &str, state: Arc<GatewayState>) -> Result<()> {
    let bind_addr = bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid gateway bind address '{bind}'"))?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind gateway on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound gateway address")?;
    tracing::info!(%local_addr, "gateway listening");

    axum::serve(listener, build_gateway_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("gateway server exited unexpectedly")
}

pub fn build_gateway_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route(LANDING_ENDPOINT, get(handle_landing))
        .route(AUTH_CALLBACK_ENDPOINT, get(handle_auth_callback))
        .route(PING_ENDPOINT, get(handle_ping))
        .route(STATUS_ENDPOINT, get(handle_status))
        .with_state(state)
}

async fn handle_landing(State(state): State<Arc<GatewayState>>) -> Redirect {
    Redirect::temporary(&state.oauth.authorize_url())
}

async fn handle_ping() -> &'static str {
    "Online"
}

async fn handle_status(State(state): State<Arc<GatewayState>>) -> String {
    render_status_report(&state.supervisor.presence_snapshot())
}

fn render_status_report(presences: &BTreeMap<String, AccountPresence>) -> String {
    let mut report = String::from(
        ":zap: Zap status (one account goes online each minute due to Slack rate limits):\n\n",
    );
    for (account_id, presence) in presences {
        let symbol = match presence {
            AccountPresence::Pending => PENDING_SYMBOL,
            AccountPresence::Starting => STARTING_SYMBOL,
            AccountPresence::Online => ONLINE_SYMBOL,
        };
        report.push_str(&format!(
            "{symbol} <@{account_id}> ({})\n",
            presence.as_str()
        ));
    }
    report
}

#[derive(Debug, Deserialize)]
struct AuthCallbackQuery {
    #[serde(default)]
    code: Option<String>,
}

/// OAuth callback: exchange the code, persist the account, admit its
/// listener immediately. Exchange or persistence failure redirects the
/// caller back to the landing page and mutates no account state.
async fn handle_auth_callback(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<AuthCallbackQuery>,
) -> Response {
    let Some(code) = query
        .code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
    else {
        return Redirect::temporary(LANDING_ENDPOINT).into_response();
    };

    match authorize_account(&state, code).await {
        Ok(account_id) => {
            tracing::info!(%account_id, "live authorization complete");
            "Authed successfully".into_response()
        }
        Err(error) => {
            tracing::warn!("authorization failed: {error:#}");
            Redirect::temporary(LANDING_ENDPOINT).into_response()
        }
    }
}

async fn authorize_account(state: &GatewayState, code: &str) -> Result<String> {
    let authorized = state.oauth.exchange_code(code).await?;
    let record = state
        .registry
        .upsert_account(&authorized.account_id, &authorized.access_token)
        .context("failed to persist authorized account")?;
    state.supervisor.admit_live(record);
    Ok(authorized.account_id)
}
