use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Error, Result};
use async_channel::Sender;
use tracing::{debug, info, trace, warn};

use crate::config::Traversal;
use crate::pipeline::container_provisioner::ensure_container;
use crate::pipeline::diff_detector::always_different_diff_detector::AlwaysDifferentDiffDetector;
use crate::pipeline::diff_detector::manifest_aware_diff_detector::ManifestAwareDiffDetector;
use crate::pipeline::diff_detector::{DiffDetector, Divergence};
use crate::pipeline::identity_provisioner::{ensure_identity, ensure_transfer_credential};
use crate::pipeline::stage::{SendResult, Stage};
use crate::storage::DataClient;
use crate::types::error::MigrateError;
use crate::types::{
    ClusterAccount, Credential, CredentialKind, DataEndpoint, ObjectRecord, TransferJob,
    TransferOutcome, TransferResult,
};

/// Everything the walker needs to move one identity's data, resolved once per run.
struct IdentityContext {
    owner: String,
    source_endpoint: Arc<DataEndpoint>,
    source_client: DataClient,
    /// `None` only in dry-run mode, when the target identity or its credential does not exist yet
    target_endpoint: Option<Arc<DataEndpoint>>,
    target_client: Option<DataClient>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// The single producer of a run. Enumerates the source, provisions the target and emits one
/// [`TransferJob`] per divergent object.
pub struct Walker {
    stage: Stage,
    job_sender: Sender<TransferJob>,
    result_sender: Sender<TransferResult>,
    diff_detector: DiffDetector,
    identities: HashMap<String, Option<Arc<IdentityContext>>>,
}

impl Walker {
    pub fn new(
        stage: Stage,
        job_sender: Sender<TransferJob>,
        result_sender: Sender<TransferResult>,
    ) -> Self {
        let diff_detector = if stage.config.force_transfer {
            AlwaysDifferentDiffDetector::boxed_new()
        } else {
            ManifestAwareDiffDetector::boxed_new()
        };

        Self {
            stage,
            job_sender,
            result_sender,
            diff_detector,
            identities: HashMap::new(),
        }
    }

    pub async fn walk(mut self) -> Result<()> {
        debug!(traversal = ?self.stage.config.traversal, "walker has started.");

        match self.stage.config.traversal {
            Traversal::OwnerFirst => self.walk_owner_first().await?,
            Traversal::BucketFirst => self.walk_bucket_first().await?,
        }

        debug!("walker has been completed.");

        Ok(())
    }

    async fn walk_owner_first(&mut self) -> Result<()> {
        let max_keys = self.stage.config.max_keys;
        let mut marker: Option<String> = None;

        loop {
            if self.stage.cancellation_token.is_cancelled() {
                trace!("identity listing cancelled.");
                return Ok(());
            }

            let page = match self
                .stage
                .source_admin
                .list_identities(marker.as_deref(), max_keys)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    self.listing_failed(None, None, e, "identity listing failed.");
                    return Ok(());
                }
            };

            for owner in page.items {
                if !self.is_recognized(&owner) {
                    continue;
                }
                let Some(context) = self.identity_context(&owner).await else {
                    continue;
                };
                if self.walk_owner_containers(&context).await? == Flow::Stop {
                    return Ok(());
                }
            }

            match page.next_marker {
                Some(next_marker) => marker = Some(next_marker),
                None => return Ok(()),
            }
        }
    }

    async fn walk_owner_containers(&mut self, context: &IdentityContext) -> Result<Flow> {
        let max_keys = self.stage.config.max_keys;
        let mut marker: Option<String> = None;

        loop {
            if self.stage.cancellation_token.is_cancelled() {
                return Ok(Flow::Stop);
            }

            let page = match self
                .stage
                .source_admin
                .list_containers_for_owner(&context.owner, marker.as_deref(), max_keys)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    self.listing_failed(
                        Some(&context.owner),
                        None,
                        e,
                        "container listing failed, remaining containers of the owner are skipped.",
                    );
                    return Ok(Flow::Continue);
                }
            };

            for container in page.items {
                if self.migrate_container(context, &container).await? == Flow::Stop {
                    return Ok(Flow::Stop);
                }
            }

            match page.next_marker {
                Some(next_marker) => marker = Some(next_marker),
                None => return Ok(Flow::Continue),
            }
        }
    }

    async fn walk_bucket_first(&mut self) -> Result<()> {
        let max_keys = self.stage.config.max_keys;
        let mut marker: Option<String> = None;

        loop {
            if self.stage.cancellation_token.is_cancelled() {
                trace!("container listing cancelled.");
                return Ok(());
            }

            let page = match self
                .stage
                .source_admin
                .list_containers(marker.as_deref(), max_keys)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    self.listing_failed(None, None, e, "container listing failed.");
                    return Ok(());
                }
            };

            for container in page.items {
                let owner = match self.stage.source_admin.get_container_owner(&container).await {
                    Ok(Some(owner)) => owner,
                    Ok(None) => {
                        debug!(container = container, "container vanished from the source.");
                        continue;
                    }
                    Err(e) => {
                        self.listing_failed(None, Some(&container), e, "container owner lookup failed.");
                        continue;
                    }
                };

                if !self.is_recognized(&owner) {
                    continue;
                }
                let Some(context) = self.identity_context(&owner).await else {
                    continue;
                };
                if self.migrate_container(&context, &container).await? == Flow::Stop {
                    return Ok(());
                }
            }

            match page.next_marker {
                Some(next_marker) => marker = Some(next_marker),
                None => return Ok(()),
            }
        }
    }

    fn is_recognized(&self, owner: &str) -> bool {
        if self.stage.config.is_recognized_owner(owner) {
            return true;
        }

        warn!(owner = owner, "unrecognized owner is skipped.");
        self.stage.set_warning();
        self.stage.summary().unrecognized_owners += 1;

        false
    }

    /// Provisioning outcomes, failures included, are cached for the rest of the run.
    async fn identity_context(&mut self, owner: &str) -> Option<Arc<IdentityContext>> {
        if let Some(cached) = self.identities.get(owner) {
            return cached.clone();
        }

        let context = match self.provision_identity(owner).await {
            Ok(context) => {
                self.stage.summary().identities_touched += 1;
                Some(Arc::new(context))
            }
            Err(e) => {
                warn!(
                    owner = owner,
                    error = e.to_string(),
                    source = e.source(),
                    "identity provisioning failed, all containers of the owner are skipped."
                );
                self.stage.set_warning();
                self.stage.summary().provisioning_failures += 1;
                None
            }
        };

        self.identities.insert(owner.to_string(), context.clone());
        context
    }

    async fn provision_identity(&self, owner: &str) -> Result<IdentityContext> {
        let source_admin = &*self.stage.source_admin;
        let target_admin = &*self.stage.target_admin;

        let source_identity = source_admin
            .get_identity(owner)
            .await?
            .ok_or_else(|| MigrateError::Provisioning(format!("{owner} is not on the source.")))?;

        if self.stage.config.dry_run {
            let source_credential = source_identity
                .credential(CredentialKind::Swift)
                .cloned()
                .ok_or_else(|| {
                    MigrateError::Provisioning(format!(
                        "{owner} has no swift credential on the source and dry-run creates none."
                    ))
                })?;
            let source_endpoint = self.endpoint(&self.stage.config.source, source_credential);
            let source_client = self.stage.connector.connect(&source_endpoint).await?;

            let target_credential = match target_admin.get_identity(owner).await? {
                Some(identity) => identity.credential(CredentialKind::Swift).cloned(),
                None => {
                    info!(owner = owner, "[dry-run] identity would be created.");
                    None
                }
            };
            let (target_endpoint, target_client) = match target_credential {
                Some(credential) => {
                    let endpoint = self.endpoint(&self.stage.config.target, credential);
                    let client = self.stage.connector.connect(&endpoint).await?;
                    (Some(Arc::new(endpoint)), Some(client))
                }
                None => (None, None),
            };

            return Ok(IdentityContext {
                owner: owner.to_string(),
                source_endpoint: Arc::new(source_endpoint),
                source_client,
                target_endpoint,
                target_client,
            });
        }

        let source_credential = ensure_transfer_credential(source_admin, &source_identity)
            .await
            .context("source credential provisioning failed.")?;

        let (target_identity, created) =
            ensure_identity(source_admin, target_admin, &source_identity).await?;
        if created {
            self.stage.summary().identities_created += 1;
        }

        let target_credential = ensure_transfer_credential(target_admin, &target_identity)
            .await
            .context("target credential provisioning failed.")?;

        let source_endpoint = self.endpoint(&self.stage.config.source, source_credential);
        let target_endpoint = self.endpoint(&self.stage.config.target, target_credential);
        let source_client = self
            .stage
            .connector
            .connect(&source_endpoint)
            .await
            .context("source data connection failed.")?;
        let target_client = self
            .stage
            .connector
            .connect(&target_endpoint)
            .await
            .context("target data connection failed.")?;

        Ok(IdentityContext {
            owner: owner.to_string(),
            source_endpoint: Arc::new(source_endpoint),
            source_client,
            target_endpoint: Some(Arc::new(target_endpoint)),
            target_client: Some(target_client),
        })
    }

    fn endpoint(&self, account: &ClusterAccount, credential: Credential) -> DataEndpoint {
        DataEndpoint {
            account: account.clone(),
            credential,
        }
    }

    async fn migrate_container(&mut self, context: &IdentityContext, container: &str) -> Result<Flow> {
        if self.stage.cancellation_token.is_cancelled() {
            return Ok(Flow::Stop);
        }

        let owner = context.owner.as_str();
        let source_headers = match context.source_client.head_container(container).await {
            Ok(Some(headers)) => headers,
            Ok(None) => {
                debug!(owner = owner, container = container, "container vanished from the source.");
                return Ok(Flow::Continue);
            }
            Err(e) => {
                self.listing_failed(Some(owner), Some(container), e, "source container HEAD failed.");
                return Ok(Flow::Continue);
            }
        };

        self.stage.summary().containers_touched += 1;

        let target_client = match (&context.target_client, self.stage.config.dry_run) {
            (Some(target_client), false) => {
                match ensure_container(
                    &**target_client,
                    &*self.stage.target_admin,
                    &source_headers,
                    container,
                    owner,
                )
                .await
                {
                    Ok(provisioning) => {
                        if provisioning.created {
                            self.stage.summary().containers_created += 1;
                        }
                        if !provisioning.owner_confirmed {
                            self.stage.set_warning();
                        }
                        Some(target_client)
                    }
                    Err(e) => {
                        warn!(
                            owner = owner,
                            container = container,
                            error = e.to_string(),
                            source = e.source(),
                            "container provisioning failed, the container is skipped."
                        );
                        self.stage.set_warning();
                        self.stage.summary().provisioning_failures += 1;
                        return Ok(Flow::Continue);
                    }
                }
            }
            (Some(target_client), true) => match target_client.head_container(container).await {
                Ok(Some(_)) => Some(target_client),
                _ => {
                    info!(owner = owner, container = container, "[dry-run] container would be created.");
                    None
                }
            },
            (None, _) => None,
        };

        let max_keys = self.stage.config.max_keys;
        let mut marker: Option<String> = None;
        loop {
            if self.stage.cancellation_token.is_cancelled() {
                return Ok(Flow::Stop);
            }

            let page = match context
                .source_client
                .list_objects(container, marker.as_deref(), max_keys)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    self.listing_failed(
                        Some(owner),
                        Some(container),
                        e,
                        "object listing failed, remaining objects of the container are skipped.",
                    );
                    return Ok(Flow::Continue);
                }
            };

            for object in page.items {
                if self.migrate_object(context, target_client, object).await? == Flow::Stop {
                    return Ok(Flow::Stop);
                }
            }

            match page.next_marker {
                Some(next_marker) => marker = Some(next_marker),
                None => break,
            }
        }

        debug!(owner = owner, container = container, "container has been walked.");

        Ok(Flow::Continue)
    }

    async fn migrate_object(
        &self,
        context: &IdentityContext,
        target_client: Option<&DataClient>,
        object: ObjectRecord,
    ) -> Result<Flow> {
        if self.stage.cancellation_token.is_cancelled() {
            return Ok(Flow::Stop);
        }

        self.stage.summary().objects_checked += 1;

        let divergence = self.classify(context, target_client, &object).await;
        if !divergence.needs_transfer() {
            self.stage.summary().objects_up_to_date += 1;
            return Ok(Flow::Continue);
        }

        let target_endpoint = match (&context.target_endpoint, self.stage.config.dry_run) {
            (Some(target_endpoint), false) => target_endpoint.clone(),
            _ => {
                info!(
                    owner = context.owner.as_str(),
                    container = object.container.as_str(),
                    key = object.key.as_str(),
                    size = object.size,
                    divergence = ?divergence,
                    "[dry-run] object would be transferred."
                );
                let result = TransferResult {
                    owner: context.owner.clone(),
                    container: object.container,
                    key: object.key,
                    outcome: TransferOutcome::DryRun,
                };
                return self.emit(&self.result_sender, result).await;
            }
        };

        if divergence.requires_delete() {
            if let Some(target_client) = target_client {
                match target_client.delete_object(&object.container, &object.key).await {
                    Ok(()) => {
                        debug!(
                            owner = context.owner.as_str(),
                            container = object.container.as_str(),
                            key = object.key.as_str(),
                            "stale object deleted."
                        );
                        self.stage.summary().stale_objects_deleted += 1;
                    }
                    Err(e) => {
                        warn!(
                            owner = context.owner.as_str(),
                            container = object.container.as_str(),
                            key = object.key.as_str(),
                            error = e.to_string(),
                            "stale object delete failed, it is overwritten."
                        );
                        self.stage.set_warning();
                    }
                }
            }
        }

        let job = TransferJob {
            source: context.source_endpoint.clone(),
            target: target_endpoint,
            owner: context.owner.clone(),
            container: object.container,
            key: object.key,
        };
        let flow = self.emit(&self.job_sender, job).await?;
        if flow == Flow::Continue {
            self.stage.summary().objects_attempted += 1;
        }

        Ok(flow)
    }

    async fn classify(
        &self,
        context: &IdentityContext,
        target_client: Option<&DataClient>,
        object: &ObjectRecord,
    ) -> Divergence {
        let target_object = match target_client {
            Some(target_client) => match target_client.head_object(&object.container, &object.key).await {
                Ok(target_object) => target_object,
                Err(e) => {
                    warn!(
                        owner = context.owner.as_str(),
                        container = object.container.as_str(),
                        key = object.key.as_str(),
                        error = e.to_string(),
                        "target HEAD failed, object is transferred."
                    );
                    return Divergence::Unknown;
                }
            },
            None => None,
        };

        match self
            .diff_detector
            .classify(&*context.source_client, object, target_object.as_ref())
            .await
        {
            Ok(divergence) => divergence,
            Err(e) => {
                warn!(
                    owner = context.owner.as_str(),
                    container = object.container.as_str(),
                    key = object.key.as_str(),
                    error = e.to_string(),
                    "comparison failed, object is transferred."
                );
                Divergence::Unknown
            }
        }
    }

    async fn emit<T: Send + Sync + 'static>(&self, sender: &Sender<T>, value: T) -> Result<Flow> {
        match self.stage.send(sender, value).await? {
            SendResult::Success => Ok(Flow::Continue),
            SendResult::Closed => {
                debug!("downstream channel closed, walker stops.");
                Ok(Flow::Stop)
            }
            SendResult::Cancelled => {
                trace!("walker cancelled while emitting.");
                Ok(Flow::Stop)
            }
        }
    }

    fn listing_failed(&self, owner: Option<&str>, container: Option<&str>, e: Error, message: &str) {
        let error = e.to_string();
        let source = e.source();

        warn!(
            owner = owner,
            container = container,
            error = error,
            source = source,
            message
        );

        self.stage.set_warning();
        self.stage.summary().listing_failures += 1;
    }
}
