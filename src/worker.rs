//! Background consolidation worker
//!
//! A single task owns consolidation scheduling. It runs a pass every
//! `interval` (when one is configured) and on demand when a request arrives
//! over its channel. Requests carry a oneshot reply so the caller receives
//! the pass's report or error. Passes never overlap because the task handles
//! one message at a time.

use crate::error::{Error, Result};
use crate::memory::consolidation::ConsolidationReport;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};

/// Something that can run one consolidation pass.
#[async_trait]
pub trait Consolidate: Send + Sync + 'static {
    async fn consolidate(&self) -> Result<ConsolidationReport>;
}

enum Request {
    Run(oneshot::Sender<Result<ConsolidationReport>>),
    Shutdown,
}

/// Handle to the background consolidation task.
pub struct ConsolidationWorker {
    tx: mpsc::Sender<Request>,
    handle: JoinHandle<()>,
}

impl ConsolidationWorker {
    /// Spawn the worker. `interval` of `None` disables periodic runs.
    pub fn spawn(target: Arc<dyn Consolidate>, interval: Option<Duration>) -> Self {
        let (tx, rx) = mpsc::channel(16);
        let ticker = interval
            .filter(|period| !period.is_zero())
            .map(|period| tokio::time::interval_at(Instant::now() + period, period));

        let handle = tokio::spawn(run(target, rx, ticker));
        tracing::debug!(interval = ?interval, "Consolidation worker started");
        Self { tx, handle }
    }

    /// Request a pass now and wait for its report.
    pub async fn run_now(&self) -> Result<ConsolidationReport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Request::Run(reply_tx))
            .await
            .map_err(|_| Error::Worker("consolidation worker has stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| Error::Worker("consolidation worker dropped the request".to_string()))?
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// A pass already in progress completes first.
    pub async fn shutdown(self) -> Result<()> {
        // A closed channel means the task already exited; the join below reports how.
        let _ = self.tx.send(Request::Shutdown).await;
        self.handle
            .await
            .map_err(|e| Error::Worker(format!("consolidation worker failed: {e}")))?;
        tracing::debug!("Consolidation worker stopped");
        Ok(())
    }
}

async fn run(
    target: Arc<dyn Consolidate>,
    mut rx: mpsc::Receiver<Request>,
    mut ticker: Option<Interval>,
) {
    loop {
        tokio::select! {
            request = rx.recv() => match request {
                Some(Request::Run(reply)) => {
                    let result = target.consolidate().await;
                    // The requester may have given up waiting.
                    let _ = reply.send(result);
                }
                Some(Request::Shutdown) | None => break,
            },
            _ = tick(&mut ticker) => {
                match target.consolidate().await {
                    Ok(report) => tracing::info!(
                        scanned = report.scanned,
                        folded = report.folded,
                        facts = report.facts_written,
                        "Scheduled consolidation finished"
                    ),
                    Err(e) => tracing::warn!("Scheduled consolidation failed: {}", e),
                }
            }
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
