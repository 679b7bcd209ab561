//! Per-account RTM listener: websocket session loop and trigger dispatch.

use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use zap_slack::SlackApiClient;

use crate::{deletion, history, trigger};

pub type RtmStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, Clone)]
pub struct AccountListenerConfig {
    pub account_id: String,
    pub reconnect_delay: Duration,
}

/// One inbound marker message recognized as a deletion trigger. The
/// trigger text's length is the deletion budget; the optional thread
/// root switches candidate retrieval into thread mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    pub thread_ts: Option<String>,
}

impl TriggerEvent {
    pub fn budget(&self) -> usize {
        trigger::marker_count(&self.text).unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
struct RtmEvent {
    #[serde(rename = "type")]
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
}

/// Recognizes a deletion trigger in one raw RTM frame: a `message`
/// event authored by the listener's own account whose text is entirely
/// marker characters. Anything else (other event types, other authors,
/// subtyped events without an author, non-marker text) is ignored.
pub(crate) fn parse_trigger_event(raw: &str, account_id: &str) -> Option<TriggerEvent> {
    let event: RtmEvent = serde_json::from_str(raw).ok()?;
    if event.kind.as_deref() != Some("message") {
        return None;
    }
    let user = event.user?;
    if user != account_id {
        return None;
    }
    let channel = event.channel?;
    let text = event.text?;
    trigger::marker_count(&text)?;
    Some(TriggerEvent {
        channel_id: channel,
        user_id: user,
        text,
        thread_ts: event.thread_ts,
    })
}

/// Opens the websocket for a negotiated RTM URL.
pub async fn connect_rtm(socket_url: &str) -> Result<RtmStream> {
    let (stream, _response) = connect_async(socket_url)
        .await
        .context("failed to connect rtm websocket")?;
    Ok(stream)
}

/// Drives an already-established session to its end, then keeps the
/// account listening through the reconnect loop. Used by the launcher,
/// which needs the connection established before it reports success.
pub async fn run_established_session(
    client: SlackApiClient,
    config: AccountListenerConfig,
    stream: RtmStream,
) {
    if let Err(error) = drive_session(&client, &config, stream).await {
        tracing::warn!(
            account_id = %config.account_id,
            "rtm session ended with error: {error:#}"
        );
    }
    tokio::time::sleep(config.reconnect_delay).await;
    run_account_listener(client, config).await;
}

/// Connect-and-listen loop for one account. Each session end or failed
/// connect logs and retries after the reconnect delay, indefinitely;
/// an account is only ever removed by process shutdown.
pub async fn run_account_listener(client: SlackApiClient, config: AccountListenerConfig) {
    loop {
        match client.rtm_connect().await {
            Ok(socket_url) => match connect_rtm(&socket_url).await {
                Ok(stream) => {
                    if let Err(error) = drive_session(&client, &config, stream).await {
                        tracing::warn!(
                            account_id = %config.account_id,
                            "rtm session ended with error: {error:#}"
                        );
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        account_id = %config.account_id,
                        "rtm websocket connect failed: {error:#}"
                    );
                }
            },
            Err(error) => {
                tracing::warn!(
                    account_id = %config.account_id,
                    "rtm connect failed: {error:#}"
                );
            }
        }
        tokio::time::sleep(config.reconnect_delay).await;
    }
}

async fn drive_session(
    client: &SlackApiClient,
    config: &AccountListenerConfig,
    mut stream: RtmStream,
) -> Result<()> {
    while let Some(message) = stream.next().await {
        let message = message.context("failed reading rtm websocket frame")?;
        let WsMessage::Text(raw) = message else {
            continue;
        };
        let Some(event) = parse_trigger_event(&raw, &config.account_id) else {
            continue;
        };
        tracing::info!(
            account_id = %config.account_id,
            channel = %event.channel_id,
            budget = event.budget(),
            threaded = event.thread_ts.is_some(),
            "deletion trigger received"
        );
        tokio::spawn(handle_trigger(client.clone(), event));
    }
    Ok(())
}

/// Executes one trigger run on its own task: candidate retrieval, then
/// the budgeted scan. A retrieval failure aborts the run before any
/// deletion is attempted; it never disturbs the session that spawned
/// the run.
pub(crate) async fn handle_trigger(client: SlackApiClient, event: TriggerEvent) {
    let candidates = match history::collect_candidates(&client, &event).await {
        Ok(candidates) => candidates,
        Err(error) => {
            tracing::warn!(
                channel = %event.channel_id,
                "candidate retrieval failed, run aborted: {error:#}"
            );
            return;
        }
    };
    let removed = deletion::delete_up_to(
        &client,
        event.budget(),
        &event.channel_id,
        &event.user_id,
        candidates,
    )
    .await;
    tracing::info!(
        channel = %event.channel_id,
        user = %event.user_id,
        removed,
        "trigger run complete"
    );
}

#[cfg(test)]
mod tests {
    use super::parse_trigger_event;

    #[test]
    fn unit_parse_trigger_event_accepts_own_marker_messages() {
        let raw = r#"{"type":"message","channel":"C1","user":"U1","text":"ddD","ts":"5.0"}"#;
        let event = parse_trigger_event(raw, "U1").expect("trigger");
        assert_eq!(event.channel_id, "C1");
        assert_eq!(event.user_id, "U1");
        assert_eq!(event.budget(), 3);
        assert_eq!(event.thread_ts, None);
    }

    #[test]
    fn unit_parse_trigger_event_keeps_thread_root_for_reply_triggers() {
        let raw = r#"{"type":"message","channel":"C1","user":"U1","text":"dd","ts":"5.0","thread_ts":"1.0"}"#;
        let event = parse_trigger_event(raw, "U1").expect("trigger");
        assert_eq!(event.thread_ts.as_deref(), Some("1.0"));
        assert_eq!(event.budget(), 2);
    }

    #[test]
    fn unit_parse_trigger_event_ignores_foreign_and_non_marker_events() {
        let other_author =
            r#"{"type":"message","channel":"C1","user":"U2","text":"ddd","ts":"5.0"}"#;
        assert_eq!(parse_trigger_event(other_author, "U1"), None);

        let non_marker = r#"{"type":"message","channel":"C1","user":"U1","text":"done","ts":"5.0"}"#;
        assert_eq!(parse_trigger_event(non_marker, "U1"), None);

        let non_message = r#"{"type":"hello"}"#;
        assert_eq!(parse_trigger_event(non_message, "U1"), None);

        let no_author = r#"{"type":"message","subtype":"message_deleted","channel":"C1","ts":"5.0"}"#;
        assert_eq!(parse_trigger_event(no_author, "U1"), None);

        assert_eq!(parse_trigger_event("not json", "U1"), None);
    }
}
