//! Authorization-code exchange for live account onboarding.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

const AUTHORIZE_URL: &str = "https://slack.com/oauth/authorize";

/// Scope granting the user-token permissions the deletion engine needs.
const AUTHORIZE_SCOPE: &str = "client";

#[derive(Debug, Clone)]
pub struct SlackOauthConfig {
    pub api_base: String,
    pub client_id: String,
    pub client_secret: String,
}

/// An account that completed the OAuth exchange: its Slack identity and
/// the user token the listener will act with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedAccount {
    pub account_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OauthAccessResponse {
    ok: bool,
    access_token: Option<String>,
    user_id: Option<String>,
    error: Option<String>,
}

/// App-credentialed client for `oauth.access`. Unlike [`crate::SlackApiClient`]
/// this is not bound to any account token.
#[derive(Clone)]
pub struct SlackOauthClient {
    http: reqwest::Client,
    config: SlackOauthConfig,
}

impl SlackOauthClient {
    pub fn new(config: SlackOauthConfig, request_timeout_ms: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create slack oauth client")?;
        Ok(Self {
            http,
            config: SlackOauthConfig {
                api_base: config.api_base.trim_end_matches('/').to_string(),
                ..config
            },
        })
    }

    /// Where the landing page sends operators to authorize the app.
    pub fn authorize_url(&self) -> String {
        format!(
            "{AUTHORIZE_URL}?client_id={}&scope={AUTHORIZE_SCOPE}",
            self.config.client_id
        )
    }

    /// Exchanges a callback `code` for the authorizing user's identity
    /// and token. No retry: a stale or replayed code is not transient.
    pub async fn exchange_code(&self, code: &str) -> Result<AuthorizedAccount> {
        let response = self
            .http
            .post(format!("{}/oauth.access", self.config.api_base))
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
            ])
            .send()
            .await
            .context("slack oauth.access request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("slack oauth.access failed with status {}", status.as_u16());
        }
        let parsed: OauthAccessResponse = response
            .json()
            .await
            .context("failed to decode slack oauth.access")?;
        if !parsed.ok {
            bail!(
                "slack oauth.access failed: {}",
                parsed.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }

        let account_id = parsed
            .user_id
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("slack oauth.access did not return user_id"))?;
        let access_token = parsed
            .access_token
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("slack oauth.access did not return access_token"))?;
        Ok(AuthorizedAccount {
            account_id,
            access_token,
        })
    }
}
