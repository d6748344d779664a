use std::sync::{Arc, Mutex};

use async_channel::Receiver;
use tracing::{error, info, trace};

use crate::types::{MigrationSummary, TransferOutcome, TransferResult};

/// Sole consumer of the result channel. Logs every outcome and folds it into the summary.
pub struct Reporter {
    receiver: Receiver<TransferResult>,
    summary: Arc<Mutex<MigrationSummary>>,
}

impl Reporter {
    pub fn new(receiver: Receiver<TransferResult>, summary: Arc<Mutex<MigrationSummary>>) -> Self {
        Self { receiver, summary }
    }

    /// Runs until every sender of the result channel is gone.
    pub async fn report(self) {
        trace!("reporter has started.");

        while let Ok(result) = self.receiver.recv().await {
            self.record(result);
        }

        trace!("reporter has been completed.");
    }

    fn record(&self, result: TransferResult) {
        let mut summary = self
            .summary
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match result.outcome {
            TransferOutcome::Success { size, elapsed } => {
                info!(
                    owner = result.owner,
                    container = result.container,
                    key = result.key,
                    size = size,
                    elapsed_sec = elapsed.as_secs_f64(),
                    "transfer completed."
                );
                summary.objects_succeeded += 1;
                summary.bytes_transferred += size;
            }
            TransferOutcome::Failure { error } => {
                error!(
                    owner = result.owner,
                    container = result.container,
                    key = result.key,
                    error = error,
                    "transfer FAILED."
                );
                summary.objects_failed += 1;
            }
            TransferOutcome::DryRun => {
                info!(
                    owner = result.owner,
                    container = result.container,
                    key = result.key,
                    "[dry-run] transfer skipped."
                );
                summary.objects_dry_run += 1;
            }
        }
    }
}
