use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Error, Result, anyhow};
use tracing::{debug, error};

use crate::Config;
use crate::pipeline::reporter::Reporter;
use crate::pipeline::stage::Stage;
use crate::pipeline::transferrer::Transferrer;
use crate::pipeline::walker::Walker;
use crate::storage::ClusterPair;
use crate::types::MigrationSummary;
use crate::types::error::MigrateError;
use crate::types::token::PipelineCancellationToken;

mod container_provisioner;
mod diff_detector;
mod identity_provisioner;
mod reporter;
mod stage;
mod storage_factory;
mod transferrer;
mod walker;

#[cfg(test)]
mod tests_support;

/// One migration run: a single walker feeding J transfer workers, and a reporter.
pub struct Pipeline {
    config: Config,
    clusters: ClusterPair,
    cancellation_token: PipelineCancellationToken,
    has_error: Arc<AtomicBool>,
    has_warning: Arc<AtomicBool>,
    errors: Arc<Mutex<VecDeque<Error>>>,
    summary: Arc<Mutex<MigrationSummary>>,
    ready: bool,
}

impl Pipeline {
    /// Connects to both clusters through their RGW admin API and swift endpoints.
    pub fn new(config: Config, cancellation_token: PipelineCancellationToken) -> Result<Self> {
        let clusters = storage_factory::create_cluster_pair(&config)?;
        Ok(Self::with_clusters(config, cancellation_token, clusters))
    }

    /// Runs against caller-supplied cluster handles, e.g. the in-memory clusters.
    pub fn with_clusters(
        config: Config,
        cancellation_token: PipelineCancellationToken,
        clusters: ClusterPair,
    ) -> Self {
        Self {
            config,
            clusters,
            cancellation_token,
            has_error: Arc::new(AtomicBool::new(false)),
            has_warning: Arc::new(AtomicBool::new(false)),
            errors: Arc::new(Mutex::new(VecDeque::<Error>::new())),
            summary: Arc::new(Mutex::new(MigrationSummary::default())),
            ready: true,
        }
    }

    pub async fn run(&mut self) {
        if !self.ready {
            panic!("it can be executed only once.")
        }
        self.ready = false;

        if !self.check_prerequisites().await {
            return;
        }

        self.migrate().await;
    }

    async fn check_prerequisites(&self) -> bool {
        let admins = [
            ("source", &self.clusters.source_admin),
            ("target", &self.clusters.target_admin),
        ];

        for (side, admin) in admins {
            if let Err(e) = admin.check_connection().await {
                let e = e.context(MigrateError::FatalSetup(side.to_string()));
                log_error(
                    self.has_error.clone(),
                    self.errors.clone(),
                    e,
                    "admin API is not reachable.",
                );
                return false;
            }
        }

        true
    }

    async fn migrate(&self) {
        let capacity = self.config.job_queue_capacity();
        let (job_sender, job_receiver) = async_channel::bounded(capacity);
        let (result_sender, result_receiver) = async_channel::bounded(capacity);

        let reporter = tokio::spawn(Reporter::new(result_receiver, self.summary.clone()).report());

        let mut workers = vec![];
        for worker_index in 0..self.config.worker_size {
            let transferrer = Transferrer::new(
                self.create_stage(),
                worker_index,
                job_receiver.clone(),
                result_sender.clone(),
            );
            let has_error = self.has_error.clone();
            let error_list = self.errors.clone();

            workers.push(tokio::spawn(async move {
                if let Err(e) = transferrer.transfer().await {
                    log_error(has_error, error_list, e, "transfer worker failed.");
                }
            }));
        }
        drop(job_receiver);
        debug!(worker_size = self.config.worker_size, "transfer workers have been started.");

        let walker = Walker::new(self.create_stage(), job_sender, result_sender);
        match tokio::spawn(walker.walk()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.store_error(e, "walker failed."),
            Err(e) => self.store_error(anyhow!(e), "walker aborted."),
        }

        for worker in workers {
            if let Err(e) = worker.await {
                self.store_error(anyhow!(e), "transfer worker aborted.");
            }
        }

        if let Err(e) = reporter.await {
            self.store_error(anyhow!(e), "reporter aborted.");
        }
    }

    fn create_stage(&self) -> Stage {
        Stage::new(
            self.config.clone(),
            self.clusters.clone(),
            self.cancellation_token.clone(),
            self.has_warning.clone(),
            self.summary.clone(),
        )
    }

    fn store_error(&self, e: Error, message: &str) {
        log_error(self.has_error.clone(), self.errors.clone(), e, message);
    }

    pub fn has_error(&self) -> bool {
        self.has_error.load(Ordering::SeqCst)
    }

    pub fn has_warning(&self) -> bool {
        self.has_warning.load(Ordering::SeqCst)
    }

    pub fn get_errors_and_consume(&self) -> Option<Vec<Error>> {
        if !self.has_error() {
            return None;
        }

        let mut error_list = self
            .errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        Some(error_list.drain(..).collect())
    }

    pub fn get_summary(&self) -> MigrationSummary {
        self.summary
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

fn log_error(
    has_error: Arc<AtomicBool>,
    errors: Arc<Mutex<VecDeque<Error>>>,
    e: Error,
    message: &str,
) {
    has_error.store(true, Ordering::SeqCst);

    let error = format!("{e:#}");
    let source = e.source();

    error!(error = error, source = source, message);

    let mut error_list = errors
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    error_list.push_back(e);
}
