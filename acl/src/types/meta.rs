// Consistency metadata attached to every ACL response

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options a reader can attach to a query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Block until the local replica has applied at least this index
    #[serde(default)]
    pub min_query_index: u64,
    /// Upper bound on the blocking wait; the node default applies when unset
    #[serde(default)]
    pub max_query_time: Option<Duration>,
}

impl QueryOptions {
    pub fn min_index(index: u64) -> Self {
        Self {
            min_query_index: index,
            max_query_time: None,
        }
    }
}

/// Where a read was served from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryMeta {
    /// Write index of the state the read was served from
    pub index: u64,
    /// Whether this node knows of a current leader
    pub known_leader: bool,
    /// Time since the last contact with the leader; zero on the leader itself
    pub last_contact: Duration,
    /// Whether `last_contact` is within the configured staleness bound
    pub fresh: bool,
}

/// Result of a read operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse<T> {
    pub value: T,
    pub meta: QueryMeta,
}

/// Result of a mutating operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResponse<T> {
    pub value: T,
    /// Index the mutation committed at
    pub index: u64,
}
