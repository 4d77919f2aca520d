//! # Replicated ACL state
//!
//! `AclState` is the materialized view of the replicated log: policies,
//! tokens, one-time tokens and the bootstrap marker. `StateStore` publishes
//! it as immutable snapshots.
//!
//! Only the write pipeline applies entries. It builds the next state from a
//! clone of the current one and swaps it in once the whole entry applied, so
//! a rejected entry leaves no trace and readers never see a half-applied
//! batch. Readers grab an `Arc` of the current snapshot and read without
//! holding any lock.

mod apply;
pub mod entry;

pub use entry::{Applied, LogEntry, TokenWrite};

use crate::error::Result;
use crate::types::{OneTimeToken, Policy, Token};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Records that the bootstrap token has been created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapMarker {
    /// Index the bootstrap entry applied at
    pub index: u64,
    /// Accessor of the bootstrap token
    pub accessor_id: String,
}

/// Tables tracked with their own last-modified index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Policies,
    Tokens,
    OneTimeTokens,
}

#[derive(Debug, Clone, Default)]
struct TableIndexes {
    policies: u64,
    tokens: u64,
    one_time_tokens: u64,
}

/// Materialized ACL state at a given index
#[derive(Debug, Clone, Default)]
pub struct AclState {
    policies: BTreeMap<String, Policy>,
    tokens: BTreeMap<String, Token>,
    /// secret ID -> accessor ID
    secrets: HashMap<String, String>,
    /// one-time secret ID -> one-time token
    one_time_tokens: BTreeMap<String, OneTimeToken>,
    bootstrap: Option<BootstrapMarker>,
    index: u64,
    tables: TableIndexes,
}

impl AclState {
    /// Index of the last entry that changed this state
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn table_index(&self, table: Table) -> u64 {
        match table {
            Table::Policies => self.tables.policies,
            Table::Tokens => self.tables.tokens,
            Table::OneTimeTokens => self.tables.one_time_tokens,
        }
    }

    pub fn policy(&self, name: &str) -> Option<&Policy> {
        self.policies.get(name)
    }

    /// Policies ordered by name
    pub fn policies(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values()
    }

    pub fn token(&self, accessor_id: &str) -> Option<&Token> {
        self.tokens.get(accessor_id)
    }

    /// Exact-match lookup of the token owning `secret_id`
    pub fn token_by_secret(&self, secret_id: &str) -> Option<&Token> {
        self.secrets
            .get(secret_id)
            .and_then(|accessor_id| self.tokens.get(accessor_id))
    }

    /// Tokens ordered by accessor ID
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    pub fn one_time_token(&self, one_time_secret_id: &str) -> Option<&OneTimeToken> {
        self.one_time_tokens.get(one_time_secret_id)
    }

    pub fn one_time_tokens(&self) -> impl Iterator<Item = &OneTimeToken> {
        self.one_time_tokens.values()
    }

    pub fn has_expired_one_time_tokens(&self, now: DateTime<Utc>) -> bool {
        self.one_time_tokens.values().any(|ott| ott.is_expired(now))
    }

    pub fn bootstrap_marker(&self) -> Option<&BootstrapMarker> {
        self.bootstrap.as_ref()
    }
}

/// Holder of the current `AclState` snapshot
pub struct StateStore {
    current: RwLock<Arc<AclState>>,
    /// Highest log index passed to `apply`, successful or not
    applied_index: watch::Sender<u64>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        let (applied_index, _) = watch::channel(0);
        Self {
            current: RwLock::new(Arc::new(AclState::default())),
            applied_index,
        }
    }

    /// The latest published state
    pub fn snapshot(&self) -> Arc<AclState> {
        self.current.read().clone()
    }

    /// Highest log index this replica has processed
    pub fn applied_index(&self) -> u64 {
        *self.applied_index.borrow()
    }

    /// Apply a committed entry. Must only be called by the single writer, in
    /// log order.
    pub(crate) fn apply(&self, index: u64, entry: LogEntry) -> Result<Applied> {
        let mut next = AclState::clone(&self.snapshot());
        let result = next.apply(index, entry);

        if let Ok(applied) = &result {
            if *applied != Applied::Collided {
                *self.current.write() = Arc::new(next);
            }
        }
        self.applied_index.send_replace(index);

        result
    }

    /// Wait until the replica has applied an index above `min_index`, or
    /// until `max_wait` elapses, then return the latest snapshot.
    pub async fn wait_for_index(&self, min_index: u64, max_wait: Duration) -> Arc<AclState> {
        if min_index == 0 {
            return self.snapshot();
        }

        let mut rx = self.applied_index.subscribe();
        let wait = async {
            loop {
                if *rx.borrow_and_update() > min_index {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        };

        if tokio::time::timeout(max_wait, wait).await.is_err() {
            debug!("Blocking query for index {} timed out", min_index);
        }
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{generate_id, Token};

    fn client_write(name: &str) -> TokenWrite {
        let mut token = Token::client(name, vec!["readonly".to_string()]);
        token.accessor_id = generate_id();
        token.secret_id = generate_id();
        TokenWrite {
            token,
            minted_accessor: true,
            minted_secret: true,
        }
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let store = StateStore::new();
        let before = store.snapshot();

        store
            .apply(
                1,
                LogEntry::UpsertPolicies {
                    policies: vec![Policy::new("readonly", "")],
                },
            )
            .unwrap();

        assert!(before.policy("readonly").is_none());
        assert!(store.snapshot().policy("readonly").is_some());
        assert_eq!(store.snapshot().index(), 1);
    }

    #[test]
    fn test_rejected_entry_publishes_nothing() {
        let store = StateStore::new();
        store
            .apply(
                1,
                LogEntry::UpsertPolicies {
                    policies: vec![Policy::new("readonly", "")],
                },
            )
            .unwrap();

        let err = store
            .apply(
                2,
                LogEntry::DeletePolicies {
                    names: vec!["readonly".to_string(), "missing".to_string()],
                },
            )
            .unwrap_err();
        assert!(matches!(err, crate::AclError::NotFound { .. }));

        let snap = store.snapshot();
        assert!(snap.policy("readonly").is_some());
        assert_eq!(snap.index(), 1);
        assert_eq!(store.applied_index(), 2);
    }

    #[test]
    fn test_secret_index_follows_tokens() {
        let store = StateStore::new();
        let write = client_write("web");
        let accessor = write.token.accessor_id.clone();
        let secret = write.token.secret_id.clone();

        store
            .apply(1, LogEntry::UpsertTokens { tokens: vec![write] })
            .unwrap();
        assert_eq!(
            store.snapshot().token_by_secret(&secret).map(|t| t.accessor_id.clone()),
            Some(accessor.clone())
        );
        assert!(store.snapshot().token_by_secret(&accessor).is_none());

        store
            .apply(
                2,
                LogEntry::DeleteTokens {
                    accessor_ids: vec![accessor],
                },
            )
            .unwrap();
        assert!(store.snapshot().token_by_secret(&secret).is_none());
    }

    #[tokio::test]
    async fn test_wait_for_index_returns_after_apply() {
        let store = Arc::new(StateStore::new());

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait_for_index(1, Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store
            .apply(
                1,
                LogEntry::UpsertPolicies {
                    policies: vec![Policy::new("a", "")],
                },
            )
            .unwrap();
        store
            .apply(
                2,
                LogEntry::UpsertPolicies {
                    policies: vec![Policy::new("b", "")],
                },
            )
            .unwrap();

        let snap = waiter.await.unwrap();
        assert!(snap.index() >= 2);
    }

    #[tokio::test]
    async fn test_wait_for_index_times_out() {
        let store = StateStore::new();
        let snap = store.wait_for_index(10, Duration::from_millis(20)).await;
        assert_eq!(snap.index(), 0);
    }
}
