//! # Consensus seam
//!
//! The replicated log itself lives outside this crate. `Consensus` is the
//! interface the write pipeline needs from it: commit an entry and learn the
//! index it was assigned, and report what this node knows about leadership.
//!
//! `LocalConsensus` is a single-node log kept in memory. It is what a
//! standalone node runs with and what the tests use. Only a bounded tail of
//! recent entries is retained; the applied state is the source of truth.

use crate::error::{AclError, Result};
use crate::state::LogEntry;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::trace;

/// Encoded entries `LocalConsensus` keeps unless told otherwise
pub const DEFAULT_LOG_TAIL: usize = 256;

/// What this node currently knows about cluster leadership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leadership {
    /// Whether this node is, or is in contact with, a leader
    pub known_leader: bool,
    /// Time since the last contact with the leader
    pub last_contact: Duration,
}

impl Leadership {
    /// Status reported by the leader itself
    pub fn leader() -> Self {
        Self {
            known_leader: true,
            last_contact: Duration::ZERO,
        }
    }
}

/// Replicated log interface used by the write pipeline
#[async_trait]
pub trait Consensus: Send + Sync {
    /// Replicate `entry` and return the index it committed at.
    ///
    /// Indexes returned by successive calls must be strictly increasing.
    async fn commit(&self, entry: &LogEntry) -> Result<u64>;

    /// Current leadership as seen from this node
    fn leadership(&self) -> Leadership;
}

struct LocalLog {
    /// (index, encoded entry), oldest first
    tail: VecDeque<(u64, Vec<u8>)>,
    tail_capacity: usize,
    last_index: u64,
}

/// Single-node, in-memory log
pub struct LocalConsensus {
    log: Mutex<LocalLog>,
    leadership: Mutex<Leadership>,
}

impl Default for LocalConsensus {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalConsensus {
    pub fn new() -> Self {
        Self::with_tail_capacity(DEFAULT_LOG_TAIL)
    }

    /// Keep at most `tail_capacity` recent entries; zero keeps none
    pub fn with_tail_capacity(tail_capacity: usize) -> Self {
        Self {
            log: Mutex::new(LocalLog {
                tail: VecDeque::with_capacity(tail_capacity),
                tail_capacity,
                last_index: 0,
            }),
            leadership: Mutex::new(Leadership::leader()),
        }
    }

    /// Override the reported leadership, e.g. to simulate a partitioned follower
    pub fn set_leadership(&self, leadership: Leadership) {
        *self.leadership.lock() = leadership;
    }

    pub fn last_index(&self) -> u64 {
        self.log.lock().last_index
    }

    /// Decode the retained tail of the log, in index order
    pub fn entries(&self) -> Result<Vec<(u64, LogEntry)>> {
        let log = self.log.lock();
        log.tail
            .iter()
            .map(|(index, bytes)| Ok((*index, bincode::deserialize(bytes)?)))
            .collect()
    }
}

#[async_trait]
impl Consensus for LocalConsensus {
    async fn commit(&self, entry: &LogEntry) -> Result<u64> {
        if !self.leadership.lock().known_leader {
            return Err(AclError::Replication("no cluster leader".to_string()));
        }

        let bytes = bincode::serialize(entry)?;
        let mut log = self.log.lock();
        log.last_index += 1;
        let index = log.last_index;
        if log.tail_capacity > 0 {
            if log.tail.len() == log.tail_capacity {
                log.tail.pop_front();
            }
            log.tail.push_back((index, bytes));
        }

        trace!("Committed {} at index {}", entry.kind(), index);
        Ok(index)
    }

    fn leadership(&self) -> Leadership {
        *self.leadership.lock()
    }
}
