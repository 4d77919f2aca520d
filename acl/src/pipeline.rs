// Write pipeline
//
// Every mutation goes through one writer task: commit through the consensus
// log, then apply to the state store, then reply. The next proposal is not
// taken until the previous one has been applied, so apply order is commit
// order and each commit sees the effects of all earlier ones.

use crate::consensus::Consensus;
use crate::error::{AclError, Result};
use crate::state::{Applied, LogEntry, StateStore};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of a committed and applied proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub index: u64,
    pub applied: Applied,
}

struct Proposal {
    entry: LogEntry,
    reply: oneshot::Sender<Result<Commit>>,
}

/// Handle for proposing entries to the single writer
#[derive(Clone)]
pub struct WritePipeline {
    tx: mpsc::Sender<Proposal>,
}

impl WritePipeline {
    /// Spawn the writer task. It runs until every handle has been dropped.
    pub fn spawn(
        consensus: Arc<dyn Consensus>,
        state: Arc<StateStore>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_writer(rx, consensus, state));
        (Self { tx }, handle)
    }

    /// Propose an entry and wait for it to be committed and applied.
    ///
    /// An entry rejected at apply time still consumed its log index; the
    /// rejection is returned here.
    pub async fn propose(&self, entry: LogEntry) -> Result<Commit> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Proposal { entry, reply })
            .await
            .map_err(|_| AclError::Replication("write pipeline is shut down".to_string()))?;

        rx.await
            .map_err(|_| AclError::Replication("write pipeline dropped the proposal".to_string()))?
    }
}

async fn run_writer(
    mut rx: mpsc::Receiver<Proposal>,
    consensus: Arc<dyn Consensus>,
    state: Arc<StateStore>,
) {
    info!("ACL write pipeline started");

    while let Some(Proposal { entry, reply }) = rx.recv().await {
        let kind = entry.kind();
        let result = match consensus.commit(&entry).await {
            Ok(index) => state
                .apply(index, entry)
                .map(|applied| Commit { index, applied }),
            Err(e) => Err(e),
        };

        match &result {
            Ok(commit) => debug!("Applied {} at index {}", kind, commit.index),
            Err(e) => debug!("Rejected {}: {}", kind, e),
        }

        if reply.send(result).is_err() {
            warn!("Proposer of {} went away before the reply", kind);
        }
    }

    info!("ACL write pipeline stopped");
}
