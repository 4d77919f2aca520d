// ACL Library
//
// Access control for the cluster coordinator: policies, tokens, the one-shot
// bootstrap of the first management token, and one-time tokens that can be
// exchanged once for the token that issued them.
//
// All mutations are serialized through a single write pipeline on top of the
// replicated log, so every committed change gets its own strictly increasing
// index. Reads are served from immutable snapshots of the applied state.

/// Runtime settings for the ACL subsystem.
pub mod config;

/// Interface to the replicated log, plus a local single-node implementation.
pub mod consensus;

/// The logical ACL operations exposed to the transport layer.
///
/// Writes return the index they committed at; reads carry the index of the
/// snapshot they were served from together with leadership metadata.
pub mod endpoint;

/// Error taxonomy shared by every operation.
pub mod error;

/// Single-writer commit-then-apply path for log entries.
pub mod pipeline;

/// Tagged request/response enums for the transport boundary.
pub mod rpc;

/// Materialized replicated state and the entries that change it.
pub mod state;

/// Policies, tokens, one-time tokens and response metadata.
pub mod types;

pub use config::AclConfig;
pub use consensus::{Consensus, Leadership, LocalConsensus};
pub use endpoint::{Acl, Identity};
pub use error::{AclError, Result};
pub use rpc::{AclRequest, AclResponse};
