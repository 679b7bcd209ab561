//! Token-scoped Slack Web API client used by the per-account listeners.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::retry::{
    is_retryable_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};

/// Production Slack Web API base. Tests point this at a local mock.
pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";

/// One message as returned by history and reply retrieval. `ts` is the
/// platform's sortable message identifier; `user` and `text` are absent
/// on system and attachment-only messages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SlackMessage {
    pub ts: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

/// One page of thread replies plus the cursor for the next page, if any.
#[derive(Debug, Clone)]
pub struct RepliesPage {
    pub messages: Vec<SlackMessage>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RtmConnectResponse {
    ok: bool,
    url: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct HistoryResponse {
    ok: bool,
    #[serde(default)]
    messages: Option<Vec<SlackMessage>>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RepliesResponse {
    ok: bool,
    #[serde(default)]
    messages: Option<Vec<SlackMessage>>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    response_metadata: Option<RepliesMetadata>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RepliesMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct DeleteResponse {
    ok: bool,
    error: Option<String>,
}

/// Slack Web API client bound to one account's user token.
///
/// Cloning is cheap (the underlying HTTP client is shared), which is
/// what lets marker-cleanup deletes run on detached tasks.
#[derive(Clone)]
pub struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl SlackApiClient {
    pub fn new(
        api_base: &str,
        token: &str,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("zap-bot"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create slack api client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    /// Negotiates a fresh RTM websocket URL for this account.
    pub async fn rtm_connect(&self) -> Result<String> {
        let response: RtmConnectResponse = self
            .request_json("rtm.connect", || {
                self.http
                    .post(format!("{}/rtm.connect", self.api_base))
                    .bearer_auth(&self.token)
            })
            .await?;
        if !response.ok {
            bail!(
                "slack rtm.connect failed: {}",
                response.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
        response
            .url
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("slack rtm.connect did not return url"))
    }

    /// Fetches the channel's most recent history page, newest first.
    pub async fn fetch_history(&self, channel: &str) -> Result<Vec<SlackMessage>> {
        let response: HistoryResponse = self
            .request_json("conversations.history", || {
                self.http
                    .get(format!("{}/conversations.history", self.api_base))
                    .bearer_auth(&self.token)
                    .query(&[("channel", channel)])
            })
            .await?;
        if !response.ok {
            bail!(
                "slack conversations.history failed: {}",
                response.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
        Ok(response.messages.unwrap_or_default())
    }

    /// Fetches one page of a thread's replies, chronological. Slack
    /// signals continuation with `has_more` plus a cursor; an empty
    /// cursor string means the thread is exhausted.
    pub async fn fetch_replies_page(
        &self,
        channel: &str,
        thread_ts: &str,
        cursor: Option<&str>,
    ) -> Result<RepliesPage> {
        let response: RepliesResponse = self
            .request_json("conversations.replies", || {
                let mut query = vec![("channel", channel), ("ts", thread_ts)];
                if let Some(cursor) = cursor {
                    query.push(("cursor", cursor));
                }
                self.http
                    .get(format!("{}/conversations.replies", self.api_base))
                    .bearer_auth(&self.token)
                    .query(&query)
            })
            .await?;
        if !response.ok {
            bail!(
                "slack conversations.replies failed: {}",
                response.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }

        let next_cursor = if response.has_more {
            response
                .response_metadata
                .and_then(|metadata| metadata.next_cursor)
                .filter(|cursor| !cursor.is_empty())
        } else {
            None
        };
        Ok(RepliesPage {
            messages: response.messages.unwrap_or_default(),
            next_cursor,
        })
    }

    /// Deletes one message as the token's user. Deleting a message that
    /// is already gone reports `ok: false` and surfaces here as an
    /// error; callers decide whether that is tolerable.
    pub async fn delete_message(&self, channel: &str, ts: &str) -> Result<()> {
        let payload = json!({
            "channel": channel,
            "ts": ts,
            "as_user": true,
        });
        let response: DeleteResponse = self
            .request_json("chat.delete", || {
                self.http
                    .post(format!("{}/chat.delete", self.api_base))
                    .bearer_auth(&self.token)
                    .json(&payload)
            })
            .await?;
        if !response.ok {
            bail!(
                "slack chat.delete failed: {}",
                response.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
        Ok(())
    }

    async fn request_json<T, F>(&self, operation: &str, mut builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let request = builder().header(
                "x-zap-retry-attempt",
                attempt.saturating_sub(1).to_string(),
            );
            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode slack {operation}"));
                    }

                    let retry_after = parse_retry_after(response.headers());
                    if attempt < self.retry_max_attempts && is_retryable_status(status.as_u16()) {
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    bail!(
                        "slack api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 400)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("slack api {operation} request failed"));
                }
            }
        }
    }
}
