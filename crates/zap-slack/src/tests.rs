//! Tests for Slack Web API request/response handling.

use httpmock::prelude::*;
use serde_json::json;

use super::{SlackApiClient, SlackOauthClient, SlackOauthConfig};

fn test_client(base_url: &str) -> SlackApiClient {
    SlackApiClient::new(base_url, "xoxp-test", 2_000, 3, 1).expect("client")
}

fn test_oauth_client(base_url: &str) -> SlackOauthClient {
    SlackOauthClient::new(
        SlackOauthConfig {
            api_base: base_url.to_string(),
            client_id: "1234.5678".to_string(),
            client_secret: "shhh".to_string(),
        },
        2_000,
    )
    .expect("oauth client")
}

#[tokio::test]
async fn functional_rtm_connect_returns_socket_url() {
    let server = MockServer::start();
    let connect = server.mock(|when, then| {
        when.method(POST).path("/rtm.connect");
        then.status(200).json_body(json!({
            "ok": true,
            "url": "wss://rtm.example/socket"
        }));
    });

    let url = test_client(&server.base_url())
        .rtm_connect()
        .await
        .expect("rtm connect");
    assert_eq!(url, "wss://rtm.example/socket");
    connect.assert_calls(1);
}

#[tokio::test]
async fn functional_rtm_connect_surfaces_application_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/rtm.connect");
        then.status(200)
            .json_body(json!({ "ok": false, "error": "invalid_auth" }));
    });

    let error = test_client(&server.base_url())
        .rtm_connect()
        .await
        .expect_err("invalid_auth must fail");
    assert!(error.to_string().contains("invalid_auth"));
}

#[tokio::test]
async fn functional_fetch_history_parses_messages_in_wire_order() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/conversations.history")
            .query_param("channel", "C1");
        then.status(200).json_body(json!({
            "ok": true,
            "messages": [
                { "ts": "3.0", "user": "U1", "text": "newest" },
                { "ts": "2.0", "user": "U2", "text": "middle" },
                { "ts": "1.0", "text": "system notice" }
            ]
        }));
    });

    let messages = test_client(&server.base_url())
        .fetch_history("C1")
        .await
        .expect("history");
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].ts, "3.0");
    assert_eq!(messages[0].user.as_deref(), Some("U1"));
    assert_eq!(messages[2].user, None);
}

#[tokio::test]
async fn functional_fetch_replies_page_exposes_continuation_cursor() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/conversations.replies")
            .query_param("channel", "C1")
            .query_param("ts", "1.0");
        then.status(200).json_body(json!({
            "ok": true,
            "messages": [ { "ts": "1.0", "user": "U1", "text": "root" } ],
            "has_more": true,
            "response_metadata": { "next_cursor": "cur2" }
        }));
    });

    let page = test_client(&server.base_url())
        .fetch_replies_page("C1", "1.0", None)
        .await
        .expect("replies page");
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.next_cursor.as_deref(), Some("cur2"));
}

#[tokio::test]
async fn regression_fetch_replies_page_normalizes_empty_cursor_to_exhausted() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/conversations.replies");
        then.status(200).json_body(json!({
            "ok": true,
            "messages": [ { "ts": "2.0", "user": "U1", "text": "reply" } ],
            "has_more": false,
            "response_metadata": { "next_cursor": "" }
        }));
    });

    let page = test_client(&server.base_url())
        .fetch_replies_page("C1", "1.0", Some("cur2"))
        .await
        .expect("replies page");
    assert_eq!(page.next_cursor, None);
}

#[tokio::test]
async fn functional_delete_message_treats_ok_false_as_error() {
    let server = MockServer::start();
    let delete = server.mock(|when, then| {
        when.method(POST).path("/chat.delete");
        then.status(200)
            .json_body(json!({ "ok": false, "error": "message_not_found" }));
    });

    let error = test_client(&server.base_url())
        .delete_message("C1", "9.0")
        .await
        .expect_err("missing message must surface as error");
    assert!(error.to_string().contains("message_not_found"));
    // an application-level failure is never retried
    delete.assert_calls(1);
}

#[tokio::test]
async fn integration_request_retries_rate_limited_responses() {
    let server = MockServer::start();
    let first = server.mock(|when, then| {
        when.method(POST)
            .path("/chat.delete")
            .header("x-zap-retry-attempt", "0");
        then.status(429).header("retry-after", "0").body("rate limit");
    });
    let second = server.mock(|when, then| {
        when.method(POST)
            .path("/chat.delete")
            .header("x-zap-retry-attempt", "1");
        then.status(200).json_body(json!({ "ok": true }));
    });

    test_client(&server.base_url())
        .delete_message("C1", "5.0")
        .await
        .expect("delete succeeds after backoff");
    first.assert_calls(1);
    second.assert_calls(1);
}

#[tokio::test]
async fn integration_request_gives_up_after_attempt_cap() {
    let server = MockServer::start();
    let delete = server.mock(|when, then| {
        when.method(POST).path("/chat.delete");
        then.status(503).body("unavailable");
    });

    let error = test_client(&server.base_url())
        .delete_message("C1", "5.0")
        .await
        .expect_err("persistent 503 must fail");
    assert!(error.to_string().contains("503"));
    delete.assert_calls(3);
}

#[tokio::test]
async fn functional_oauth_exchange_returns_identity_and_token() {
    let server = MockServer::start();
    let access = server.mock(|when, then| {
        when.method(POST)
            .path("/oauth.access")
            .body_includes("code=abc123")
            .body_includes("client_id=1234.5678");
        then.status(200).json_body(json!({
            "ok": true,
            "access_token": "xoxp-new",
            "user_id": "U42"
        }));
    });

    let authorized = test_oauth_client(&server.base_url())
        .exchange_code("abc123")
        .await
        .expect("exchange");
    assert_eq!(authorized.account_id, "U42");
    assert_eq!(authorized.access_token, "xoxp-new");
    access.assert_calls(1);
}

#[tokio::test]
async fn functional_oauth_exchange_surfaces_rejected_code() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/oauth.access");
        then.status(200)
            .json_body(json!({ "ok": false, "error": "invalid_code" }));
    });

    let error = test_oauth_client(&server.base_url())
        .exchange_code("stale")
        .await
        .expect_err("invalid code must fail");
    assert!(error.to_string().contains("invalid_code"));
}

#[test]
fn unit_authorize_url_carries_client_id_and_scope() {
    let client = test_oauth_client("https://slack.example/api");
    assert_eq!(
        client.authorize_url(),
        "https://slack.com/oauth/authorize?client_id=1234.5678&scope=client"
    );
}
