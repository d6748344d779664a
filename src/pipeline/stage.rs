use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use async_channel::Sender;

use crate::Config;
use crate::storage::{AdminClient, ClusterPair, Connector};
use crate::types::MigrationSummary;
use crate::types::token::PipelineCancellationToken;

/// State shared by every task of one run.
pub struct Stage {
    pub config: Config,
    pub source_admin: AdminClient,
    pub target_admin: AdminClient,
    pub connector: Connector,
    pub cancellation_token: PipelineCancellationToken,
    pub has_warning: Arc<AtomicBool>,
    pub summary: Arc<Mutex<MigrationSummary>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    Success,
    Closed,
    Cancelled,
}

impl Stage {
    pub fn new(
        config: Config,
        clusters: ClusterPair,
        cancellation_token: PipelineCancellationToken,
        has_warning: Arc<AtomicBool>,
        summary: Arc<Mutex<MigrationSummary>>,
    ) -> Self {
        Self {
            config,
            source_admin: clusters.source_admin,
            target_admin: clusters.target_admin,
            connector: clusters.connector,
            cancellation_token,
            has_warning,
            summary,
        }
    }

    /// Blocks while the channel is full, unless the run is cancelled first.
    pub async fn send<T: Send + Sync + 'static>(&self, sender: &Sender<T>, value: T) -> Result<SendResult> {
        tokio::select! {
            result = sender.send(value) => {
                if let Err(e) = result.context("async_channel::Sender::send() failed.") {
                    return if !sender.is_closed() {
                        Err(anyhow!(e))
                    } else {
                        Ok(SendResult::Closed)
                    };
                }
                Ok(SendResult::Success)
            },
            _ = self.cancellation_token.cancelled() => {
                Ok(SendResult::Cancelled)
            },
        }
    }

    pub fn set_warning(&self) {
        self.has_warning.store(true, Ordering::SeqCst);
    }

    pub fn summary(&self) -> MutexGuard<'_, MigrationSummary> {
        self.summary
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use crate::pipeline::tests_support::{build_config, cluster_pair, source_cluster, target_cluster};
    use crate::types::token::create_pipeline_cancellation_token;

    use super::*;

    fn stage() -> Stage {
        Stage::new(
            build_config(&[]),
            cluster_pair(&source_cluster(), &target_cluster()),
            create_pipeline_cancellation_token(),
            Arc::new(AtomicBool::new(false)),
            Arc::new(Mutex::new(MigrationSummary::default())),
        )
    }

    #[tokio::test]
    async fn send_success() {
        init_dummy_tracing_subscriber();

        let stage = stage();
        let (sender, receiver) = async_channel::bounded::<u32>(1);

        assert_eq!(stage.send(&sender, 1).await.unwrap(), SendResult::Success);
        assert_eq!(receiver.recv().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn send_to_closed_channel() {
        init_dummy_tracing_subscriber();

        let stage = stage();
        let (sender, receiver) = async_channel::bounded::<u32>(1);
        receiver.close();

        assert_eq!(stage.send(&sender, 1).await.unwrap(), SendResult::Closed);
    }

    #[tokio::test]
    async fn send_to_full_channel_is_cancelled() {
        init_dummy_tracing_subscriber();

        let stage = stage();
        let (sender, _receiver) = async_channel::bounded::<u32>(1);
        assert_eq!(stage.send(&sender, 1).await.unwrap(), SendResult::Success);

        stage.cancellation_token.cancel();
        assert_eq!(stage.send(&sender, 2).await.unwrap(), SendResult::Cancelled);
    }

    #[test]
    fn set_warning() {
        init_dummy_tracing_subscriber();

        let stage = stage();
        assert!(!stage.has_warning.load(Ordering::SeqCst));
        stage.set_warning();
        assert!(stage.has_warning.load(Ordering::SeqCst));

        stage.summary().objects_checked += 1;
        assert_eq!(stage.summary().objects_checked, 1);
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
