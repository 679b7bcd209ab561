//! The budgeted deletion engine.

use zap_slack::{SlackApiClient, SlackMessage};

use crate::trigger::is_marker_text;

/// Candidate sequence whose processing order is most-recent first.
///
/// Construction requires naming the order of the input, so if the
/// platform ever changes its native history order the mistake surfaces
/// at the call site instead of silently inverting the scan.
#[derive(Debug, Clone)]
pub struct NewestFirst(Vec<SlackMessage>);

impl NewestFirst {
    /// Wraps a sequence that is already newest-first (channel history).
    pub fn from_newest_first(messages: Vec<SlackMessage>) -> Self {
        Self(messages)
    }

    /// Reverses a chronological sequence (thread replies) into
    /// processing order.
    pub fn from_oldest_first(mut messages: Vec<SlackMessage>) -> Self {
        messages.reverse();
        Self(messages)
    }

    pub fn messages(&self) -> &[SlackMessage] {
        &self.0
    }
}

/// Scans `candidates` and deletes messages authored by `author_id`
/// until `budget` counted deletions have succeeded, then stops.
///
/// Marker messages (including the trigger itself when it shows up in
/// channel history) are clutter: they are deleted on a detached task
/// whose outcome is deliberately discarded, and never counted. A
/// counted delete that fails is swallowed without incrementing the
/// tally; the usual cause is a message the user already removed
/// through the native client, which the platform reports as an error
/// on an outcome we wanted anyway. Failed deletions are not retried
/// within a run.
///
/// Returns the counted tally, which is informational only and never
/// exceeds `budget`.
pub async fn delete_up_to(
    client: &SlackApiClient,
    budget: usize,
    channel: &str,
    author_id: &str,
    candidates: NewestFirst,
) -> usize {
    let mut counted = 0_usize;
    for message in candidates.0 {
        if message.user.as_deref() != Some(author_id) {
            continue;
        }

        if message.text.as_deref().is_some_and(is_marker_text) {
            let client = client.clone();
            let channel = channel.to_string();
            let ts = message.ts;
            tokio::spawn(async move {
                if let Err(error) = client.delete_message(&channel, &ts).await {
                    tracing::debug!(%channel, %ts, "marker cleanup delete failed: {error:#}");
                }
            });
            continue;
        }

        // also the budget = 0 path: the scan keeps reclaiming markers
        // but stops at the first deletion it would have to count
        if counted >= budget {
            break;
        }
        match client.delete_message(channel, &message.ts).await {
            Ok(()) => {
                counted += 1;
                if counted >= budget {
                    break;
                }
            }
            Err(error) => {
                tracing::debug!(
                    %channel,
                    ts = %message.ts,
                    "counted delete failed, continuing: {error:#}"
                );
            }
        }
    }
    counted
}
