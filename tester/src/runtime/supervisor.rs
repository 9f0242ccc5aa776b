//! Background Task Supervisor
//!
//! Runs cancellable workers that repeat a unit of work on a fixed cadence
//! (continuous log injection, mainly). Failures of individual iterations are
//! reported over a channel instead of stopping the worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Owning side of a single-shot stop broadcast.
#[derive(Debug)]
pub struct CancelSignal {
    tx: watch::Sender<bool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken { rx: self.tx.subscribe() }
    }

    /// Broadcast stop. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        self.tx.send_if_modified(|cancelled| !std::mem::replace(cancelled, true));
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Observing side of a [`CancelSignal`].
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal fires, or once the signal itself is dropped.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// One repeatable unit of background work.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkUnit: Send + Sync {
    /// Perform iteration number `iteration` (starting at 1).
    async fn run_once(&self, iteration: u64) -> Result<(), String>;
}

/// A failed iteration of a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub worker: String,
    pub iteration: u64,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Spawns and coordinates background workers sharing one cancel signal.
pub struct Supervisor {
    signal: CancelSignal,
    workers: JoinSet<()>,
    report_tx: mpsc::UnboundedSender<WorkerReport>,
    report_rx: mpsc::UnboundedReceiver<WorkerReport>,
    successes: Arc<AtomicU64>,
}

impl Supervisor {
    pub fn new() -> Self {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        Self {
            signal: CancelSignal::new(),
            workers: JoinSet::new(),
            report_tx,
            report_rx,
            successes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run `work` repeatedly, pausing `interval` between iterations, until cancelled.
    pub fn spawn<W>(&mut self, name: impl Into<String>, interval: Duration, work: W)
    where
        W: WorkUnit + 'static,
    {
        let name = name.into();
        let token = self.signal.token();
        let reports = self.report_tx.clone();
        let successes = Arc::clone(&self.successes);

        debug!("🚀 Starting worker '{}' every {:?}", name, interval);
        self.workers.spawn(async move {
            let mut iteration = 0u64;
            loop {
                if token.is_cancelled() {
                    break;
                }
                iteration += 1;

                // An iteration in flight runs to completion; cancellation is seen at the next boundary.
                match work.run_once(iteration).await {
                    Ok(()) => {
                        successes.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(error) => {
                        warn!("⚠️ Worker '{}' iteration {} failed: {}", name, iteration, error);
                        let _ = reports.send(WorkerReport {
                            worker: name.clone(),
                            iteration,
                            error,
                            at: Utc::now(),
                        });
                    }
                }

                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            debug!("🛑 Worker '{}' stopped after {} iterations", name, iteration);
        });
    }

    /// Stop every worker. No iteration begins after this returns.
    pub fn cancel(&self) {
        self.signal.cancel();
    }

    pub fn token(&self) -> CancelToken {
        self.signal.token()
    }

    /// Successful iterations across all workers so far.
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    /// Failure reports received so far, without waiting for workers.
    pub fn failures(&mut self) -> Vec<WorkerReport> {
        let mut reports = Vec::new();
        while let Ok(report) = self.report_rx.try_recv() {
            reports.push(report);
        }
        reports
    }

    /// Await every worker and return the reports not yet drained.
    ///
    /// Workers only finish once cancelled, so call [`cancel`](Self::cancel) first.
    pub async fn join(&mut self) -> Vec<WorkerReport> {
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                warn!("⚠️ Worker task ended abnormally: {}", e);
            }
        }
        let reports = self.failures();
        info!(
            "🏁 Workers joined: {} successful iterations, {} failures",
            self.successes(),
            reports.len()
        );
        reports
    }

    /// [`cancel`](Self::cancel) followed by [`join`](Self::join).
    pub async fn shutdown(&mut self) -> Vec<WorkerReport> {
        self.cancel();
        self.join().await
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
