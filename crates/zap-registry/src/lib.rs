//! Durable account registry: Slack identities, user tokens, and the
//! startup admission order.
//!
//! Backed by SQLite. Connections are opened per operation so the
//! registry handle stays `Send + Sync` without pooling machinery.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use thiserror::Error;

/// Errors surfaced by the account registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("registry database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// One authorized account: identity, user token, admission slot.
///
/// `queue_position` fixes the order the startup cohort is brought
/// online in; it survives token rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub account_id: String,
    pub access_token: String,
    pub queue_position: i64,
}

/// SQLite-backed registry of authorized accounts.
#[derive(Debug)]
pub struct AccountRegistry {
    db_path: PathBuf,
}

impl AccountRegistry {
    /// Opens the registry at `path`, creating the database and schema
    /// when missing.
    pub fn open(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let registry = Self { db_path };
        let connection = registry.open_connection()?;
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                account_id TEXT PRIMARY KEY,
                access_token TEXT NOT NULL,
                queue_position INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(registry)
    }

    fn open_connection(&self) -> RegistryResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;
        Ok(connection)
    }

    /// Loads every account in admission order. A row with a blank id or
    /// token is skipped with a warning; it fails that account only,
    /// never the load.
    pub fn load_accounts(&self) -> RegistryResult<Vec<AccountRecord>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(
            "SELECT account_id, access_token, queue_position
             FROM accounts ORDER BY queue_position ASC",
        )?;
        let rows = statement.query_map([], |row| {
            Ok(AccountRecord {
                account_id: row.get(0)?,
                access_token: row.get(1)?,
                queue_position: row.get(2)?,
            })
        })?;

        let mut accounts = Vec::new();
        for row in rows {
            let record = row?;
            if record.account_id.trim().is_empty() || record.access_token.trim().is_empty() {
                tracing::warn!(
                    queue_position = record.queue_position,
                    "skipping malformed registry row"
                );
                continue;
            }
            accounts.push(record);
        }
        Ok(accounts)
    }

    /// Persists a live authorization: a new account joins the tail of
    /// the admission queue; a re-authorizing account keeps its slot and
    /// gets its token rotated in place.
    pub fn upsert_account(
        &self,
        account_id: &str,
        access_token: &str,
    ) -> RegistryResult<AccountRecord> {
        let mut connection = self.open_connection()?;
        let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT queue_position FROM accounts WHERE account_id = ?1",
                params![account_id],
                |row| row.get(0),
            )
            .optional()?;
        let queue_position = match existing {
            Some(position) => {
                tx.execute(
                    "UPDATE accounts SET access_token = ?2 WHERE account_id = ?1",
                    params![account_id, access_token],
                )?;
                position
            }
            None => {
                let next: i64 = tx.query_row(
                    "SELECT COALESCE(MAX(queue_position), -1) + 1 FROM accounts",
                    [],
                    |row| row.get(0),
                )?;
                tx.execute(
                    "INSERT INTO accounts (account_id, access_token, queue_position)
                     VALUES (?1, ?2, ?3)",
                    params![account_id, access_token, next],
                )?;
                next
            }
        };
        tx.commit()?;

        Ok(AccountRecord {
            account_id: account_id.to_string(),
            access_token: access_token.to_string(),
            queue_position,
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::AccountRegistry;

    #[test]
    fn functional_upsert_appends_new_accounts_in_queue_order() {
        let dir = tempdir().expect("tempdir");
        let registry = AccountRegistry::open(dir.path().join("accounts.sqlite")).expect("open");

        registry.upsert_account("U1", "xoxp-1").expect("insert U1");
        registry.upsert_account("U2", "xoxp-2").expect("insert U2");
        registry.upsert_account("U3", "xoxp-3").expect("insert U3");

        let accounts = registry.load_accounts().expect("load");
        let ids: Vec<&str> = accounts
            .iter()
            .map(|record| record.account_id.as_str())
            .collect();
        assert_eq!(ids, vec!["U1", "U2", "U3"]);
        assert_eq!(accounts[0].queue_position, 0);
        assert_eq!(accounts[2].queue_position, 2);
    }

    #[test]
    fn functional_reauthorization_rotates_token_and_keeps_slot() {
        let dir = tempdir().expect("tempdir");
        let registry = AccountRegistry::open(dir.path().join("accounts.sqlite")).expect("open");

        registry.upsert_account("U1", "xoxp-old").expect("insert U1");
        registry.upsert_account("U2", "xoxp-2").expect("insert U2");
        let rotated = registry.upsert_account("U1", "xoxp-new").expect("rotate U1");
        assert_eq!(rotated.queue_position, 0);

        let accounts = registry.load_accounts().expect("load");
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].account_id, "U1");
        assert_eq!(accounts[0].access_token, "xoxp-new");
        assert_eq!(accounts[0].queue_position, 0);
    }

    #[test]
    fn regression_malformed_rows_fail_only_their_own_account() {
        let dir = tempdir().expect("tempdir");
        let db_path = dir.path().join("accounts.sqlite");
        let registry = AccountRegistry::open(&db_path).expect("open");
        registry.upsert_account("U1", "xoxp-1").expect("insert U1");

        // a blank token can only come from a hand-edited database; the
        // load must still serve the healthy rows around it
        let connection = rusqlite::Connection::open(&db_path).expect("raw connection");
        connection
            .execute(
                "INSERT INTO accounts (account_id, access_token, queue_position)
                 VALUES ('U2', '   ', 1)",
                [],
            )
            .expect("insert malformed row");
        registry.upsert_account("U3", "xoxp-3").expect("insert U3");

        let accounts = registry.load_accounts().expect("load");
        let ids: Vec<&str> = accounts
            .iter()
            .map(|record| record.account_id.as_str())
            .collect();
        assert_eq!(ids, vec!["U1", "U3"]);
    }

    #[test]
    fn regression_reopen_preserves_persisted_accounts() {
        let dir = tempdir().expect("tempdir");
        let db_path = dir.path().join("accounts.sqlite");
        {
            let registry = AccountRegistry::open(&db_path).expect("open");
            registry.upsert_account("U1", "xoxp-1").expect("insert U1");
        }

        let reopened = AccountRegistry::open(&db_path).expect("reopen");
        let accounts = reopened.load_accounts().expect("load");
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].account_id, "U1");
    }
}
