//! Periodic removal of index records whose file is gone.

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{index::MetadataIndex, storage::ObjectStore, IndexError};

/// Counters for one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Records read from the index.
    pub scanned: usize,
    /// Orphan records deleted.
    pub removed: u64,
    /// Record reads, existence checks or deletes that failed.
    pub failures: usize,
}

/// Background task keeping the index in line with the object store.
///
/// Only index records are ever deleted; files are never touched.
#[derive(Debug, Clone)]
pub struct Reconciler {
    index: Option<Arc<dyn MetadataIndex>>,
    store: Arc<dyn ObjectStore>,
    interval: Duration,
    timeout: Duration,
}

impl Reconciler {
    /// Creates a reconciler. With no index every pass is a no-op.
    pub fn new(
        index: Option<Arc<dyn MetadataIndex>>,
        store: Arc<dyn ObjectStore>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            index,
            store,
            interval,
            timeout,
        }
    }

    /// Pause between passes.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs one pass. Individual failures are logged and counted.
    pub async fn tick(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let Some(index) = self.index.as_deref() else {
            return report;
        };

        let mut records = match self.bounded("all", index.all()).await {
            Ok(records) => records,
            Err(err) => {
                error!(error = %err, "failed to read index for reconciliation");
                report.failures += 1;
                return report;
            }
        };

        while let Some(record) = records.next().await {
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable index record");
                    report.failures += 1;
                    continue;
                }
            };
            report.scanned += 1;

            match self.store.exists(&record.name).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => {
                    warn!(file = %record.name, error = %err, "failed to check file");
                    report.failures += 1;
                    continue;
                }
            }

            match self
                .bounded("delete_by_name", index.delete_by_name(&record.name))
                .await
            {
                Ok(count) => {
                    info!(file = %record.name, "removed orphan record");
                    report.removed += count;
                }
                Err(err) => {
                    error!(file = %record.name, error = %err, "failed to remove orphan record");
                    report.failures += 1;
                }
            }
        }

        debug!(
            scanned = report.scanned,
            removed = report.removed,
            failures = report.failures,
            "reconciliation pass finished"
        );
        report
    }

    /// Runs passes every `interval` until `token` is cancelled.
    ///
    /// The first pass runs immediately. A pass in progress finishes before
    /// cancellation is observed.
    pub async fn run(self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        debug!("reconciler stopped");
    }

    /// Spawns [`Reconciler::run`] on the current runtime.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl std::future::Future<Output = Result<T, IndexError>>,
    ) -> Result<T, IndexError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| IndexError::Timeout { operation })?
    }
}
