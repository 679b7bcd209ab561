//! Slack Web API client for the Zap deletion bot.
//!
//! Covers the endpoints the bot consumes: `rtm.connect` for per-account
//! real-time subscriptions, `conversations.history` / `conversations.replies`
//! for candidate retrieval, `chat.delete` for removal, and `oauth.access`
//! for live authorization. No deletion policy lives here.

mod api_client;
mod oauth;
mod retry;

pub use api_client::{RepliesPage, SlackApiClient, SlackMessage, DEFAULT_SLACK_API_BASE};
pub use oauth::{AuthorizedAccount, SlackOauthClient, SlackOauthConfig};

#[cfg(test)]
mod tests;
