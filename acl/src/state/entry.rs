// Log entries proposed through the write pipeline
//
// Entries carry every value that apply needs, including server-generated
// identifiers and timestamps, so applying the same entry on any replica
// produces the same state.

use crate::types::{OneTimeToken, Policy, Token};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A token write together with which of its identifiers were minted by this
/// server rather than supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenWrite {
    pub token: Token,
    pub minted_accessor: bool,
    pub minted_secret: bool,
}

/// A single mutation of the ACL state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntry {
    UpsertPolicies {
        policies: Vec<Policy>,
    },
    DeletePolicies {
        names: Vec<String>,
    },
    UpsertTokens {
        tokens: Vec<TokenWrite>,
    },
    DeleteTokens {
        accessor_ids: Vec<String>,
    },
    /// Compare-and-set against the bootstrap marker
    Bootstrap {
        token: Token,
    },
    UpsertOneTimeToken {
        token: OneTimeToken,
    },
    /// Resolve the bound token and remove the one-time token in one step
    ExchangeOneTimeToken {
        one_time_secret_id: String,
        now: DateTime<Utc>,
    },
    ExpireOneTimeTokens {
        now: DateTime<Utc>,
    },
}

impl LogEntry {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            LogEntry::UpsertPolicies { .. } => "upsert_policies",
            LogEntry::DeletePolicies { .. } => "delete_policies",
            LogEntry::UpsertTokens { .. } => "upsert_tokens",
            LogEntry::DeleteTokens { .. } => "delete_tokens",
            LogEntry::Bootstrap { .. } => "bootstrap",
            LogEntry::UpsertOneTimeToken { .. } => "upsert_one_time_token",
            LogEntry::ExchangeOneTimeToken { .. } => "exchange_one_time_token",
            LogEntry::ExpireOneTimeTokens { .. } => "expire_one_time_tokens",
        }
    }
}

/// What applying an entry produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    PoliciesUpserted,
    PoliciesDeleted,
    TokensUpserted(Vec<Token>),
    TokensDeleted,
    Bootstrapped(Token),
    OneTimeTokenIssued(OneTimeToken),
    Exchanged(Token),
    OneTimeTokensExpired(usize),
    /// A server-minted identifier was already taken. Nothing was applied and
    /// the proposer is expected to mint new identifiers and propose again.
    Collided,
}
