use tokio::task::JoinHandle;
use tokio::{select, signal};
use tracing::{debug, error, warn};

use rgw_migrate::types::token::PipelineCancellationToken;

/// Cancels the run on SIGINT. The walker stops emitting and workers stop taking jobs.
pub fn spawn_ctrl_c_handler(cancellation_token: PipelineCancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        select! {
            _ = cancellation_token.cancelled() => {
                debug!("migration finished before any interrupt.");
            }
            result = signal::ctrl_c() => match result {
                Ok(()) => {
                    warn!("interrupted, no further objects will be migrated.");
                    cancellation_token.cancel();
                }
                Err(e) => {
                    error!(error = e.to_string(), "ctrl-c handler could not be installed.");
                }
            }
        }
    })
}
