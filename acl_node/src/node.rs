// Node runtime
//
// Owns the ACL endpoint and its background work for the lifetime of the
// process. The write pipeline exits on its own once the last handle to the
// endpoint is dropped; the reaper is stopped explicitly on shutdown.

use crate::config::Config;
use crate::error::Result;
use acl::types::Token;
use acl::{Acl, AclError, LocalConsensus};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// How long shutdown waits for the write pipeline to drain
const PIPELINE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Node {
    acl: Arc<Acl>,
    consensus: Arc<LocalConsensus>,
    root_token: Option<Token>,
    shutdown_tx: watch::Sender<bool>,
    reaper: Option<JoinHandle<()>>,
    pipeline: JoinHandle<()>,
}

impl Node {
    /// Build the ACL subsystem and start its background work.
    ///
    /// When the configuration asks for it the node bootstraps right away and
    /// keeps the resulting management token as its root token.
    pub async fn start(config: Config) -> Result<Self> {
        config.validate()?;

        let consensus = Arc::new(LocalConsensus::new());
        let (acl, pipeline) = Acl::new(config.to_acl_config(), consensus.clone());
        let acl = Arc::new(acl);

        let root_token = if config.auto_bootstrap() {
            match acl.bootstrap().await {
                Ok(response) => {
                    info!(
                        "Bootstrapped root token {} at index {}",
                        response.value.accessor_id, response.index
                    );
                    Some(response.value)
                }
                Err(AclError::AlreadyBootstrapped { index }) => {
                    info!("ACL already bootstrapped at index {}", index);
                    None
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            debug!("Skipping ACL bootstrap on startup");
            None
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reaper = if config.acl.enabled {
            let every = config.one_time_token_gc_interval();
            info!("Reaping expired one-time tokens every {:?}", every);
            Some(tokio::spawn(run_reaper(acl.clone(), every, shutdown_rx)))
        } else {
            info!("ACL support disabled");
            None
        };

        Ok(Self {
            acl,
            consensus,
            root_token,
            shutdown_tx,
            reaper,
            pipeline,
        })
    }

    pub fn acl(&self) -> &Arc<Acl> {
        &self.acl
    }

    pub fn consensus(&self) -> &Arc<LocalConsensus> {
        &self.consensus
    }

    /// The management token created on startup, if the node bootstrapped
    pub fn root_token(&self) -> Option<&Token> {
        self.root_token.as_ref()
    }

    /// Stop background work and wait for in-flight writes to finish
    pub async fn shutdown(self) {
        info!("Shutting down ACL node");
        let _ = self.shutdown_tx.send(true);

        if let Some(reaper) = self.reaper {
            if let Err(e) = reaper.await {
                warn!("One-time token reaper ended abnormally: {}", e);
            }
        }

        drop(self.acl);
        match tokio::time::timeout(PIPELINE_DRAIN_TIMEOUT, self.pipeline).await {
            Ok(Ok(())) => debug!("Write pipeline stopped"),
            Ok(Err(e)) => warn!("Write pipeline ended abnormally: {}", e),
            Err(_) => warn!("Write pipeline still held elsewhere; not waiting for it"),
        }
    }

    /// Run until interrupted, then shut down
    pub async fn run_until_ctrl_c(self) -> Result<()> {
        tokio::signal::ctrl_c().await?;
        self.shutdown().await;
        Ok(())
    }
}

async fn run_reaper(acl: Arc<Acl>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match acl.expire_one_time_tokens(Utc::now()).await {
                    Ok(response) if response.value == 0 => {}
                    Ok(response) => info!(
                        "Reaped {} expired one-time tokens at index {}",
                        response.value, response.index
                    ),
                    Err(e) => warn!("Failed to reap expired one-time tokens: {}", e),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    debug!("One-time token reaper stopped");
}
