use std::collections::HashMap;
use std::time::Instant;

use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use tracing::{debug, error, info, trace};

use crate::pipeline::stage::Stage;
use crate::storage::header_filter::filter_object_headers;
use crate::storage::{DataClient, ObjectBody};
use crate::types::error::MigrateError;
use crate::types::{DataEndpoint, TransferJob, TransferOutcome, TransferResult};

type ClientKey = (String, u16, String);

/// One of the J transfer workers. Copies a single object per job and reports exactly one
/// [`TransferResult`] for it, whatever happens inside the copy.
pub struct Transferrer {
    worker_index: u16,
    stage: Stage,
    receiver: Receiver<TransferJob>,
    result_sender: Sender<TransferResult>,
    clients: HashMap<ClientKey, DataClient>,
}

impl Transferrer {
    pub fn new(
        stage: Stage,
        worker_index: u16,
        receiver: Receiver<TransferJob>,
        result_sender: Sender<TransferResult>,
    ) -> Self {
        Self {
            worker_index,
            stage,
            receiver,
            result_sender,
            clients: HashMap::new(),
        }
    }

    pub async fn transfer(mut self) -> Result<()> {
        trace!(worker_index = self.worker_index, "transfer worker has started.");

        loop {
            if self.stage.cancellation_token.is_cancelled() {
                info!(worker_index = self.worker_index, "transfer worker has been cancelled.");
                return Ok(());
            }

            tokio::select! {
                recv_result = self.receiver.recv() => {
                    match recv_result {
                        Ok(job) => {
                            let result = self.transfer_job(job).await;
                            // a finished job is always reported, even after cancellation
                            if self.result_sender.send(result).await.is_err() {
                                debug!(worker_index = self.worker_index, "result channel is no longer available.");
                                return Ok(());
                            }
                        },
                        Err(_) => {
                            // normal shutdown
                            trace!(worker_index = self.worker_index, "transfer worker has been completed.");
                            break;
                        }
                    }
                },
                _ = self.stage.cancellation_token.cancelled() => {
                    info!(worker_index = self.worker_index, "transfer worker has been cancelled.");
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    async fn transfer_job(&mut self, job: TransferJob) -> TransferResult {
        let started = Instant::now();

        let outcome = match self.copy_isolated(&job).await {
            Ok(size) => TransferOutcome::Success {
                size,
                elapsed: started.elapsed(),
            },
            Err(e) => {
                let error = format!("{e:#}");
                error!(
                    worker_index = self.worker_index,
                    owner = job.owner.as_str(),
                    container = job.container.as_str(),
                    key = job.key.as_str(),
                    error = error,
                    "object transfer failed."
                );

                // the cached sessions may be the cause, e.g. an expired token
                self.clients.remove(&client_key(&job.source));
                self.clients.remove(&client_key(&job.target));

                TransferOutcome::Failure { error }
            }
        };

        TransferResult {
            owner: job.owner,
            container: job.container,
            key: job.key,
            outcome,
        }
    }

    /// Runs the copy on its own task so that a panic inside it becomes a failed result.
    async fn copy_isolated(&mut self, job: &TransferJob) -> Result<u64> {
        let source = self
            .client(&job.source)
            .await
            .context("source data connection failed.")?;
        let target = self
            .client(&job.target)
            .await
            .context("target data connection failed.")?;

        let container = job.container.clone();
        let key = job.key.clone();
        let handle = tokio::spawn(async move { copy_object(source, target, &container, &key).await });

        match handle.await {
            Ok(result) => result,
            Err(join_error) => Err(MigrateError::Transfer(format!(
                "transfer task aborted: {join_error}"
            ))
            .into()),
        }
    }

    async fn client(&mut self, endpoint: &DataEndpoint) -> Result<DataClient> {
        let key = client_key(endpoint);
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }

        let client = self.stage.connector.connect(endpoint).await?;
        self.clients.insert(key, client.clone());

        Ok(client)
    }
}

fn client_key(endpoint: &DataEndpoint) -> ClientKey {
    (
        endpoint.account.host.to_ascii_lowercase(),
        endpoint.account.port,
        endpoint.credential.user.clone(),
    )
}

/// Returns the number of body bytes written to the target.
///
/// Manifest objects and empty objects are written as a zero-length body with their headers,
/// the manifest header included, so the target resolves the same segments.
async fn copy_object(source: DataClient, target: DataClient, container: &str, key: &str) -> Result<u64> {
    let object = source
        .head_object(container, key)
        .await
        .with_context(|| format!("source HEAD of {container}/{key} failed."))?
        .ok_or(MigrateError::NotFound)
        .with_context(|| format!("{container}/{key} vanished from the source."))?;

    let headers = filter_object_headers(&object.headers);

    if object.size == 0 || object.is_segmented() {
        target
            .put_object(container, key, ObjectBody::empty(), &headers)
            .await
            .with_context(|| format!("target PUT of {container}/{key} failed."))?;

        return Ok(0);
    }

    let body = source
        .get_object_stream(container, key)
        .await
        .with_context(|| format!("source GET of {container}/{key} failed."))?;

    target
        .put_object(container, key, body, &headers)
        .await
        .with_context(|| format!("target PUT of {container}/{key} failed."))?;

    Ok(object.size)
}
