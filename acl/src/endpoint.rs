//! # ACL endpoint
//!
//! `Acl` is the surface the transport layer calls into. Reads are served
//! from the local snapshot and annotated with `QueryMeta`; writes are turned
//! into log entries, proposed through the write pipeline, and answered with
//! the index they committed at.
//!
//! Callers arrive already authenticated: the transport resolves the presented
//! secret with [`Acl::authenticate`] and passes the resulting [`Identity`]
//! back in. The only privilege checks made here are structural ones (writes
//! and token listings need a management token, a client may see its own
//! token and the policies attached to it).

use crate::config::AclConfig;
use crate::consensus::Consensus;
use crate::error::{AclError, Result};
use crate::pipeline::{Commit, WritePipeline};
use crate::state::{AclState, Applied, LogEntry, StateStore, Table, TokenWrite};
use crate::types::{
    generate_id, OneTimeToken, Policy, PolicyStub, QueryMeta, QueryOptions, QueryResponse, Token,
    TokenStub, WriteResponse, BOOTSTRAP_TOKEN_NAME,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Attempts at minting identifiers that do not collide at apply time
const MAX_MINT_ATTEMPTS: usize = 8;

/// The resolved caller of an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// No secret was presented
    Anonymous,
    Token(Token),
}

impl Identity {
    pub fn is_management(&self) -> bool {
        matches!(self, Identity::Token(token) if token.is_management())
    }

    pub fn accessor_id(&self) -> Option<&str> {
        match self {
            Identity::Token(token) => Some(&token.accessor_id),
            Identity::Anonymous => None,
        }
    }

    fn can_read_policy(&self, name: &str) -> bool {
        match self {
            Identity::Token(token) => {
                token.is_management() || token.policies.iter().any(|p| p == name)
            }
            Identity::Anonymous => false,
        }
    }
}

/// ACL policy, token, bootstrap and one-time token operations
pub struct Acl {
    config: AclConfig,
    state: Arc<StateStore>,
    consensus: Arc<dyn Consensus>,
    pipeline: WritePipeline,
}

impl Acl {
    /// Create the endpoint and spawn its write pipeline.
    ///
    /// The returned handle completes once the `Acl` (and every clone of its
    /// pipeline) has been dropped.
    pub fn new(config: AclConfig, consensus: Arc<dyn Consensus>) -> (Self, JoinHandle<()>) {
        let state = Arc::new(StateStore::new());
        let (pipeline, handle) =
            WritePipeline::spawn(consensus.clone(), state.clone(), config.pipeline_capacity);

        let acl = Self {
            config,
            state,
            consensus,
            pipeline,
        };
        (acl, handle)
    }

    pub fn config(&self) -> &AclConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    /// Resolve a presented secret. An empty secret is the anonymous caller;
    /// an unknown one is refused.
    pub fn authenticate(&self, secret_id: &str) -> Result<Identity> {
        self.ensure_enabled()?;
        if secret_id.is_empty() {
            return Ok(Identity::Anonymous);
        }
        self.state
            .snapshot()
            .token_by_secret(secret_id)
            .cloned()
            .map(Identity::Token)
            .ok_or(AclError::PermissionDenied)
    }

    // Policies

    pub async fn list_policies(
        &self,
        identity: &Identity,
        options: &QueryOptions,
    ) -> Result<QueryResponse<Vec<PolicyStub>>> {
        self.ensure_enabled()?;
        let snap = self.read_snapshot(options).await;

        let value = snap
            .policies()
            .filter(|policy| identity.can_read_policy(&policy.name))
            .map(Policy::stub)
            .collect();
        Ok(self.query(value, snap.table_index(Table::Policies)))
    }

    pub async fn get_policy(
        &self,
        identity: &Identity,
        name: &str,
        options: &QueryOptions,
    ) -> Result<QueryResponse<Policy>> {
        self.ensure_enabled()?;
        if !identity.can_read_policy(name) {
            return Err(AclError::PermissionDenied);
        }
        let snap = self.read_snapshot(options).await;

        let policy = snap
            .policy(name)
            .cloned()
            .ok_or_else(|| AclError::policy_not_found(name))?;
        Ok(self.query(policy, snap.table_index(Table::Policies)))
    }

    /// Create or replace policies as one batch
    pub async fn upsert_policies(
        &self,
        identity: &Identity,
        policies: Vec<Policy>,
    ) -> Result<WriteResponse<()>> {
        self.ensure_enabled()?;
        self.require_management(identity)?;
        if policies.is_empty() {
            return Err(AclError::InvalidRequest("must specify at least one policy".to_string()));
        }
        for policy in &policies {
            policy.validate()?;
        }

        let count = policies.len();
        let commit = self.pipeline.propose(LogEntry::UpsertPolicies { policies }).await?;
        expect(&commit, |applied| matches!(applied, Applied::PoliciesUpserted))?;

        info!("Upserted {} ACL policies at index {}", count, commit.index);
        Ok(WriteResponse {
            value: (),
            index: commit.index,
        })
    }

    pub async fn delete_policy(
        &self,
        identity: &Identity,
        name: &str,
    ) -> Result<WriteResponse<()>> {
        self.delete_policies(identity, vec![name.to_string()]).await
    }

    /// Delete policies as one batch; any unknown name fails the whole batch
    pub async fn delete_policies(
        &self,
        identity: &Identity,
        names: Vec<String>,
    ) -> Result<WriteResponse<()>> {
        self.ensure_enabled()?;
        self.require_management(identity)?;
        if names.is_empty() {
            return Err(AclError::InvalidRequest("must specify at least one policy".to_string()));
        }

        let commit = self.pipeline.propose(LogEntry::DeletePolicies { names }).await?;
        expect(&commit, |applied| matches!(applied, Applied::PoliciesDeleted))?;

        info!("Deleted ACL policies at index {}", commit.index);
        Ok(WriteResponse {
            value: (),
            index: commit.index,
        })
    }

    // Tokens

    pub async fn list_tokens(
        &self,
        identity: &Identity,
        options: &QueryOptions,
    ) -> Result<QueryResponse<Vec<TokenStub>>> {
        self.ensure_enabled()?;
        self.require_management(identity)?;
        let snap = self.read_snapshot(options).await;

        let value = snap.tokens().map(Token::stub).collect();
        Ok(self.query(value, snap.table_index(Table::Tokens)))
    }

    /// Fetch a token by accessor. Clients may only fetch their own.
    pub async fn get_token(
        &self,
        identity: &Identity,
        accessor_id: &str,
        options: &QueryOptions,
    ) -> Result<QueryResponse<Token>> {
        self.ensure_enabled()?;
        if !identity.is_management() && identity.accessor_id() != Some(accessor_id) {
            return Err(AclError::PermissionDenied);
        }
        let snap = self.read_snapshot(options).await;

        let token = snap
            .token(accessor_id)
            .cloned()
            .ok_or_else(|| AclError::token_not_found(accessor_id))?;
        Ok(self.query(token, snap.table_index(Table::Tokens)))
    }

    /// Resolve the token owning `secret_id`
    pub async fn get_token_self(
        &self,
        secret_id: &str,
        options: &QueryOptions,
    ) -> Result<QueryResponse<Token>> {
        self.ensure_enabled()?;
        let snap = self.read_snapshot(options).await;

        let token = snap
            .token_by_secret(secret_id)
            .cloned()
            .ok_or_else(|| AclError::token_not_found("self"))?;
        Ok(self.query(token, snap.table_index(Table::Tokens)))
    }

    /// Create or update tokens as one batch.
    ///
    /// Empty accessor and secret IDs are minted here. Tokens with a known
    /// accessor are updated in place and keep their secret.
    pub async fn upsert_tokens(
        &self,
        identity: &Identity,
        tokens: Vec<Token>,
    ) -> Result<WriteResponse<Vec<Token>>> {
        self.ensure_enabled()?;
        self.require_management(identity)?;
        if tokens.is_empty() {
            return Err(AclError::InvalidRequest("must specify at least one token".to_string()));
        }
        for token in &tokens {
            token.validate()?;
        }

        let now = Utc::now();
        for attempt in 1..=MAX_MINT_ATTEMPTS {
            let snap = self.state.snapshot();
            let writes = tokens
                .iter()
                .cloned()
                .map(|token| prepare_token_write(&snap, token, now))
                .collect();

            let commit = self.pipeline.propose(LogEntry::UpsertTokens { tokens: writes }).await?;
            match commit.applied {
                Applied::TokensUpserted(tokens) => {
                    for token in &tokens {
                        info!(
                            "Upserted ACL token {} ({}) at index {}",
                            token.accessor_id, token.token_type, commit.index
                        );
                    }
                    return Ok(WriteResponse {
                        value: tokens,
                        index: commit.index,
                    });
                }
                Applied::Collided => warn!("Minted token ID collided (attempt {})", attempt),
                other => return Err(unexpected(&other)),
            }
        }

        Err(AclError::Replication("could not mint unique token identifiers".to_string()))
    }

    pub async fn delete_token(
        &self,
        identity: &Identity,
        accessor_id: &str,
    ) -> Result<WriteResponse<()>> {
        self.delete_tokens(identity, vec![accessor_id.to_string()]).await
    }

    /// Delete tokens as one batch, along with any one-time tokens they issued
    pub async fn delete_tokens(
        &self,
        identity: &Identity,
        accessor_ids: Vec<String>,
    ) -> Result<WriteResponse<()>> {
        self.ensure_enabled()?;
        self.require_management(identity)?;
        if accessor_ids.is_empty() {
            return Err(AclError::InvalidRequest("must specify at least one token".to_string()));
        }

        let commit = self
            .pipeline
            .propose(LogEntry::DeleteTokens {
                accessor_ids: accessor_ids.clone(),
            })
            .await?;
        expect(&commit, |applied| matches!(applied, Applied::TokensDeleted))?;

        info!("Deleted ACL tokens {:?} at index {}", accessor_ids, commit.index);
        Ok(WriteResponse {
            value: (),
            index: commit.index,
        })
    }

    // Bootstrap

    /// Create the initial management token. Succeeds at most once for the
    /// lifetime of the replicated state.
    pub async fn bootstrap(&self) -> Result<WriteResponse<Token>> {
        self.ensure_enabled()?;

        for attempt in 1..=MAX_MINT_ATTEMPTS {
            if let Some(marker) = self.state.snapshot().bootstrap_marker() {
                return Err(AclError::AlreadyBootstrapped {
                    index: marker.index,
                });
            }

            let mut token = Token::management(BOOTSTRAP_TOKEN_NAME);
            token.accessor_id = generate_id();
            token.secret_id = generate_id();
            token.global = true;
            token.create_time = Utc::now();

            let commit = self.pipeline.propose(LogEntry::Bootstrap { token }).await?;
            match commit.applied {
                Applied::Bootstrapped(token) => {
                    info!(
                        "ACL bootstrap completed at index {}, accessor {}",
                        commit.index, token.accessor_id
                    );
                    return Ok(WriteResponse {
                        value: token,
                        index: commit.index,
                    });
                }
                Applied::Collided => {
                    warn!("Minted bootstrap token ID collided (attempt {})", attempt)
                }
                other => return Err(unexpected(&other)),
            }
        }

        Err(AclError::Replication("could not mint unique token identifiers".to_string()))
    }

    // One-time tokens

    /// Issue a one-time token bound to the token owning `secret_id`
    pub async fn issue_one_time_token(
        &self,
        secret_id: &str,
    ) -> Result<WriteResponse<OneTimeToken>> {
        self.ensure_enabled()?;
        let ttl = chrono::Duration::from_std(self.config.one_time_token_ttl)
            .map_err(|_| AclError::InvalidRequest("one-time token TTL out of range".to_string()))?;

        for attempt in 1..=MAX_MINT_ATTEMPTS {
            let snap = self.state.snapshot();
            let caller = match self.authenticate(secret_id)? {
                Identity::Token(token) => token,
                Identity::Anonymous => return Err(AclError::PermissionDenied),
            };

            let expires_at = Utc::now().checked_add_signed(ttl).ok_or_else(|| {
                AclError::InvalidRequest("one-time token TTL out of range".to_string())
            })?;
            let token = OneTimeToken {
                one_time_secret_id: mint(|id| snap.one_time_token(id).is_some()),
                accessor_id: caller.accessor_id,
                expires_at,
                create_index: 0,
                modify_index: 0,
            };

            let commit = self.pipeline.propose(LogEntry::UpsertOneTimeToken { token }).await?;
            match commit.applied {
                Applied::OneTimeTokenIssued(token) => {
                    info!(
                        "Issued one-time token for accessor {} at index {}",
                        token.accessor_id, commit.index
                    );
                    return Ok(WriteResponse {
                        value: token,
                        index: commit.index,
                    });
                }
                Applied::Collided => warn!("Minted one-time secret collided (attempt {})", attempt),
                other => return Err(unexpected(&other)),
            }
        }

        Err(AclError::Replication("could not mint a unique one-time secret".to_string()))
    }

    /// Trade a one-time secret for the token it is bound to, consuming it.
    ///
    /// Unknown, expired and already used secrets all fail the same way.
    pub async fn exchange_one_time_token(
        &self,
        one_time_secret_id: &str,
    ) -> Result<WriteResponse<Token>> {
        self.ensure_enabled()?;
        if one_time_secret_id.is_empty() {
            return Err(AclError::PermissionDenied);
        }
        // One-time tokens never come back once gone, so a miss here is final.
        if self.state.snapshot().one_time_token(one_time_secret_id).is_none() {
            return Err(AclError::PermissionDenied);
        }

        let commit = self
            .pipeline
            .propose(LogEntry::ExchangeOneTimeToken {
                one_time_secret_id: one_time_secret_id.to_string(),
                now: Utc::now(),
            })
            .await?;
        match commit.applied {
            Applied::Exchanged(token) => {
                info!(
                    "Exchanged one-time token for accessor {} at index {}",
                    token.accessor_id, commit.index
                );
                Ok(WriteResponse {
                    value: token,
                    index: commit.index,
                })
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Remove one-time tokens that expired at or before `now`, returning how
    /// many were removed. Nothing is proposed when none have expired; the
    /// index is then that of the current snapshot.
    pub async fn expire_one_time_tokens(
        &self,
        now: DateTime<Utc>,
    ) -> Result<WriteResponse<usize>> {
        self.ensure_enabled()?;
        let snap = self.state.snapshot();
        if !snap.has_expired_one_time_tokens(now) {
            return Ok(WriteResponse {
                value: 0,
                index: snap.index(),
            });
        }

        let commit = self.pipeline.propose(LogEntry::ExpireOneTimeTokens { now }).await?;
        match commit.applied {
            Applied::OneTimeTokensExpired(removed) => {
                debug!("Expired {} one-time tokens at index {}", removed, commit.index);
                Ok(WriteResponse {
                    value: removed,
                    index: commit.index,
                })
            }
            other => Err(unexpected(&other)),
        }
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.config.enabled {
            Ok(())
        } else {
            Err(AclError::Disabled)
        }
    }

    fn require_management(&self, identity: &Identity) -> Result<()> {
        if identity.is_management() {
            Ok(())
        } else {
            Err(AclError::PermissionDenied)
        }
    }

    async fn read_snapshot(&self, options: &QueryOptions) -> Arc<AclState> {
        let max_wait = options
            .max_query_time
            .map_or(self.config.max_query_wait, |wait| wait.min(self.config.max_query_wait));
        self.state
            .wait_for_index(options.min_query_index, max_wait)
            .await
    }

    fn query<T>(&self, value: T, index: u64) -> QueryResponse<T> {
        let leadership = self.consensus.leadership();
        QueryResponse {
            value,
            meta: QueryMeta {
                // Clients treat zero as "no index"; an empty table still reports 1.
                index: index.max(1),
                known_leader: leadership.known_leader,
                last_contact: leadership.last_contact,
                fresh: leadership.known_leader && leadership.last_contact <= self.config.max_stale,
            },
        }
    }
}

/// Fill in the identifiers a token write needs before it is proposed
fn prepare_token_write(snap: &AclState, mut token: Token, now: DateTime<Utc>) -> TokenWrite {
    let minted_accessor = token.accessor_id.is_empty();
    if minted_accessor {
        token.accessor_id = mint(|id| snap.token(id).is_some());
    }
    let minted_secret = token.secret_id.is_empty();
    if minted_secret {
        token.secret_id = mint(|id| snap.token_by_secret(id).is_some());
    }
    if snap.token(&token.accessor_id).is_none() {
        token.create_time = now;
    }

    TokenWrite {
        token,
        minted_accessor,
        minted_secret,
    }
}

/// Generate an identifier not already taken in the snapshot
fn mint(taken: impl Fn(&str) -> bool) -> String {
    loop {
        let id = generate_id();
        if !taken(&id) {
            return id;
        }
    }
}

fn expect(commit: &Commit, ok: impl Fn(&Applied) -> bool) -> Result<()> {
    if ok(&commit.applied) {
        Ok(())
    } else {
        Err(unexpected(&commit.applied))
    }
}

fn unexpected(applied: &Applied) -> AclError {
    AclError::Replication(format!("unexpected apply outcome: {:?}", applied))
}
