//! Listener supervision: staggered bring-up of the startup cohort and
//! immediate admission of live authorizations.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use zap_registry::AccountRecord;
use zap_slack::SlackApiClient;

use crate::listener::{self, AccountListenerConfig};

/// Listener bring-up state for one account. Variant order is lifecycle
/// order; transitions are monotonic for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccountPresence {
    Pending,
    Starting,
    Online,
}

impl AccountPresence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Online => "online",
        }
    }
}

/// Establishes one account's real-time subscription, returning once it
/// is live; the session itself keeps running on a detached task. A
/// seam rather than a concrete call so admission sequencing can be
/// exercised without a live websocket.
#[async_trait]
pub trait ListenerLauncher: Send + Sync {
    async fn launch(&self, account: &AccountRecord) -> Result<()>;
}

/// Production launcher: negotiates `rtm.connect`, opens the websocket,
/// then detaches the session drive and reconnect loop.
pub struct RtmListenerLauncher {
    pub api_base: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub reconnect_delay: Duration,
}

#[async_trait]
impl ListenerLauncher for RtmListenerLauncher {
    async fn launch(&self, account: &AccountRecord) -> Result<()> {
        let client = SlackApiClient::new(
            &self.api_base,
            &account.access_token,
            self.request_timeout_ms,
            self.retry_max_attempts,
            self.retry_base_delay_ms,
        )?;
        let config = AccountListenerConfig {
            account_id: account.account_id.clone(),
            reconnect_delay: self.reconnect_delay,
        };
        let socket_url = client.rtm_connect().await?;
        let stream = listener::connect_rtm(&socket_url).await?;
        tokio::spawn(listener::run_established_session(client, config, stream));
        Ok(())
    }
}

/// Owns the per-account presence map and the admission throttle.
///
/// The platform rate-limits real-time connection establishment per
/// app, not per account, so the startup cohort is admitted one account
/// at a time with a fixed delay between admissions. Live
/// authorizations deliberately skip that discipline.
#[derive(Clone)]
pub struct ListenerSupervisor {
    launcher: Arc<dyn ListenerLauncher>,
    admission_delay: Duration,
    presence: Arc<Mutex<BTreeMap<String, AccountPresence>>>,
}

impl ListenerSupervisor {
    pub fn new(launcher: Arc<dyn ListenerLauncher>, admission_delay: Duration) -> Self {
        Self {
            launcher,
            admission_delay,
            presence: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Admits the startup cohort in queue order: every account is first
    /// visible as `Pending`, then one account at a time goes
    /// `Starting`, launches, goes `Online`, and the fixed admission
    /// delay elapses before the next account starts. A launch failure
    /// leaves that account `Starting` and the cohort moves on.
    pub async fn admit_startup_cohort(&self, accounts: Vec<AccountRecord>) {
        for account in &accounts {
            self.advance_presence(&account.account_id, AccountPresence::Pending);
        }
        let total = accounts.len();
        for (index, account) in accounts.into_iter().enumerate() {
            self.admit(&account).await;
            if index + 1 < total {
                tokio::time::sleep(self.admission_delay).await;
            }
        }
        tracing::info!(total, "startup cohort admission complete");
    }

    /// Admits one live-authorized account on its own task, bypassing
    /// the startup queue and its delay entirely.
    pub fn admit_live(&self, account: AccountRecord) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            supervisor.admit(&account).await;
        });
    }

    async fn admit(&self, account: &AccountRecord) {
        self.advance_presence(&account.account_id, AccountPresence::Starting);
        match self.launcher.launch(account).await {
            Ok(()) => {
                self.advance_presence(&account.account_id, AccountPresence::Online);
                tracing::info!(account_id = %account.account_id, "account listener online");
            }
            Err(error) => {
                // fatal to this account's admission only
                tracing::warn!(
                    account_id = %account.account_id,
                    "listener launch failed: {error:#}"
                );
            }
        }
    }

    /// Presence never moves backwards: a re-authorizing account that is
    /// already online stays online while its replacement listener comes
    /// up.
    fn advance_presence(&self, account_id: &str, value: AccountPresence) {
        if let Ok(mut presence) = self.presence.lock() {
            let entry = presence.entry(account_id.to_string()).or_insert(value);
            if value > *entry {
                *entry = value;
            }
        }
    }

    /// Point-in-time copy of the presence map for the operator report.
    /// Reads are not transactional with admission; observing either
    /// side of an in-flight transition is fine.
    pub fn presence_snapshot(&self) -> BTreeMap<String, AccountPresence> {
        self.presence
            .lock()
            .map(|presence| presence.clone())
            .unwrap_or_default()
    }
}
