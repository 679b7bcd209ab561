//! Zap entrypoint: configuration, registry load, staggered listener
//! bring-up, and the operator gateway.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use zap_gateway::{run_gateway_server, GatewayState};
use zap_registry::AccountRegistry;
use zap_runtime::{ListenerSupervisor, RtmListenerLauncher};
use zap_slack::{SlackOauthClient, SlackOauthConfig, DEFAULT_SLACK_API_BASE};

#[derive(Debug, Parser)]
#[command(
    name = "zap-bot",
    about = "Slack bot that retroactively deletes a user's recent messages"
)]
struct Cli {
    /// Address the HTTP gateway binds to.
    #[arg(long, env = "ZAP_BIND", default_value = "0.0.0.0:3000")]
    bind: String,
    /// Slack OAuth client id.
    #[arg(long, env = "ZAP_SLACK_CLIENT_ID")]
    slack_client_id: String,
    /// Slack OAuth client secret.
    #[arg(long, env = "ZAP_SLACK_CLIENT_SECRET")]
    slack_client_secret: String,
    /// Slack Web API base URL.
    #[arg(long, env = "ZAP_SLACK_API_BASE", default_value = DEFAULT_SLACK_API_BASE)]
    slack_api_base: String,
    /// Path of the SQLite account registry.
    #[arg(long, env = "ZAP_REGISTRY_PATH", default_value = "zap-accounts.sqlite")]
    registry_path: PathBuf,
    /// Seconds between startup listener admissions. Slack rate-limits
    /// real-time connection establishment per app, so the cohort is
    /// staggered rather than connected in a burst.
    #[arg(long, env = "ZAP_ADMISSION_DELAY_SECONDS", default_value_t = 60)]
    admission_delay_seconds: u64,
    /// Seconds before a dropped listener session reconnects.
    #[arg(long, env = "ZAP_RECONNECT_DELAY_SECONDS", default_value_t = 5)]
    reconnect_delay_seconds: u64,
    /// Slack API request timeout in milliseconds.
    #[arg(long, env = "ZAP_REQUEST_TIMEOUT_MS", default_value_t = 10_000)]
    request_timeout_ms: u64,
    /// Attempt cap for retryable Slack API failures.
    #[arg(long, env = "ZAP_RETRY_MAX_ATTEMPTS", default_value_t = 3)]
    retry_max_attempts: usize,
    /// Base delay for Slack API retry backoff in milliseconds.
    #[arg(long, env = "ZAP_RETRY_BASE_DELAY_MS", default_value_t = 500)]
    retry_base_delay_ms: u64,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let registry = Arc::new(
        AccountRegistry::open(&cli.registry_path).context("failed to open account registry")?,
    );
    let accounts = registry
        .load_accounts()
        .context("failed to load account registry")?;
    tracing::info!(count = accounts.len(), "loaded account registry");

    let launcher = Arc::new(RtmListenerLauncher {
        api_base: cli.slack_api_base.clone(),
        request_timeout_ms: cli.request_timeout_ms,
        retry_max_attempts: cli.retry_max_attempts,
        retry_base_delay_ms: cli.retry_base_delay_ms,
        reconnect_delay: Duration::from_secs(cli.reconnect_delay_seconds),
    });
    let supervisor = ListenerSupervisor::new(
        launcher,
        Duration::from_secs(cli.admission_delay_seconds),
    );

    let cohort = supervisor.clone();
    tokio::spawn(async move {
        cohort.admit_startup_cohort(accounts).await;
    });

    let oauth = SlackOauthClient::new(
        SlackOauthConfig {
            api_base: cli.slack_api_base,
            client_id: cli.slack_client_id,
            client_secret: cli.slack_client_secret,
        },
        cli.request_timeout_ms,
    )?;
    let state = Arc::new(GatewayState {
        registry,
        supervisor,
        oauth,
    });
    run_gateway_server(&cli.bind, state).await
}
