//! Candidate retrieval for a trigger run.

use anyhow::{Context, Result};
use zap_slack::SlackApiClient;

use crate::deletion::NewestFirst;
use crate::listener::TriggerEvent;

/// Collects the candidate messages for `event`, newest first.
///
/// A trigger posted in the channel proper scans the platform's single
/// most-recent history page, which already arrives newest-first. A
/// trigger posted as a thread reply scans the entire thread: replies
/// are paginated chronologically, so the pages are accumulated with an
/// explicit cursor loop and the result is reversed to match channel
/// mode's processing order.
///
/// Any page failure fails the whole collection; the caller gets no
/// partial candidate set to act on.
pub async fn collect_candidates(
    client: &SlackApiClient,
    event: &TriggerEvent,
) -> Result<NewestFirst> {
    match event.thread_ts.as_deref() {
        None => {
            let messages = client
                .fetch_history(&event.channel_id)
                .await
                .context("failed to fetch channel history")?;
            Ok(NewestFirst::from_newest_first(messages))
        }
        Some(thread_ts) => {
            let mut replies = Vec::new();
            let mut cursor: Option<String> = None;
            loop {
                let page = client
                    .fetch_replies_page(&event.channel_id, thread_ts, cursor.as_deref())
                    .await
                    .context("failed to fetch thread replies")?;
                replies.extend(page.messages);
                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
            Ok(NewestFirst::from_oldest_first(replies))
        }
    }
}
