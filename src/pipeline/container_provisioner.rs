use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::storage::header_filter::filter_container_headers;
use crate::storage::{ObjectData, StorageAdmin};
use crate::types::Headers;
use crate::types::error::MigrateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerProvisioning {
    pub created: bool,
    /// false when the target owner could not be verified or corrected
    pub owner_confirmed: bool,
}

/// Makes sure `name` exists on the target and is owned by `owner`.
///
/// Only a failure to create the container is an error. Ownership is corrected on a best
/// effort basis, including for containers left behind by an earlier interrupted run.
pub async fn ensure_container(
    target_data: &(dyn ObjectData + Send + Sync),
    target_admin: &(dyn StorageAdmin + Send + Sync),
    source_headers: &Headers,
    name: &str,
    owner: &str,
) -> Result<ContainerProvisioning> {
    let mut provisioning = ContainerProvisioning::default();

    let exists = target_data
        .head_container(name)
        .await
        .with_context(|| format!("HEAD container {name} on the target failed."))?
        .is_some();

    if !exists {
        target_data
            .put_container(name, &filter_container_headers(source_headers))
            .await
            .with_context(|| format!("container creation of {name} failed."))?;

        target_data
            .head_container(name)
            .await?
            .ok_or_else(|| MigrateError::Provisioning(format!("{name} is missing after creation.")))?;

        info!(owner = owner, container = name, "container created on the target.");
        provisioning.created = true;
    }

    provisioning.owner_confirmed = ensure_owner(target_admin, name, owner).await;

    Ok(provisioning)
}

async fn ensure_owner(
    target_admin: &(dyn StorageAdmin + Send + Sync),
    name: &str,
    owner: &str,
) -> bool {
    let current_owner = match target_admin.get_container_owner(name).await {
        Ok(current_owner) => current_owner,
        Err(e) => {
            warn!(
                owner = owner,
                container = name,
                error = e.to_string(),
                "container owner lookup failed."
            );
            return false;
        }
    };

    if current_owner.as_deref() == Some(owner) {
        return true;
    }

    debug!(
        owner = owner,
        container = name,
        current_owner = current_owner.as_deref().unwrap_or_default(),
        "container is linked to another owner."
    );

    if let Err(e) = target_admin.unlink_container_owner(name).await {
        warn!(
            owner = owner,
            container = name,
            error = e.to_string(),
            "container unlink failed."
        );
        return false;
    }

    if let Err(e) = target_admin.link_container_owner(name, owner).await {
        warn!(
            owner = owner,
            container = name,
            error = e.to_string(),
            "container link failed."
        );
        return false;
    }

    info!(owner = owner, container = name, "container owner corrected.");

    true
}

#[cfg(test)]
mod tests {
    use crate::pipeline::tests_support::{OWNER, data_client, target_cluster};

    use super::*;

    fn source_headers() -> Headers {
        [
            ("x-storage-policy", "gold"),
            ("x-container-read", ".r:*"),
            ("x-container-meta-color", "blue"),
            ("x-container-object-count", "3"),
            ("x-trans-id", "tx1"),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
    }

    #[tokio::test]
    async fn create_container_with_filtered_headers() {
        init_dummy_tracing_subscriber();

        let target = target_cluster();
        let client = data_client(&target).await;

        let provisioning = ensure_container(&*client, &target, &source_headers(), "photos", OWNER)
            .await
            .unwrap();

        assert!(provisioning.created);
        assert!(provisioning.owner_confirmed);
        assert_eq!(target.container_owner("photos").as_deref(), Some(OWNER));

        let headers = target.container_headers("photos").unwrap();
        assert_eq!(headers.get("x-storage-policy").unwrap(), "gold");
        assert_eq!(headers.get("x-container-read").unwrap(), ".r:*");
        assert_eq!(headers.get("x-container-meta-color").unwrap(), "blue");
        assert!(!headers.contains_key("x-container-object-count"));
        assert!(!headers.contains_key("x-trans-id"));
    }

    #[tokio::test]
    async fn existing_container_is_not_recreated() {
        init_dummy_tracing_subscriber();

        let target = target_cluster();
        let client = data_client(&target).await;

        ensure_container(&*client, &target, &source_headers(), "photos", OWNER)
            .await
            .unwrap();
        let provisioning = ensure_container(&*client, &target, &source_headers(), "photos", OWNER)
            .await
            .unwrap();

        assert!(!provisioning.created);
        assert!(provisioning.owner_confirmed);
        assert_eq!(target.counters().containers_created, 1);
        assert_eq!(target.counters().owner_relinks, 0);
    }

    #[tokio::test]
    async fn owner_is_relinked() {
        init_dummy_tracing_subscriber();

        let target = target_cluster();
        let client = data_client(&target).await;
        target.create_containers_under("admin");

        let provisioning = ensure_container(&*client, &target, &Headers::new(), "photos", OWNER)
            .await
            .unwrap();

        assert!(provisioning.created);
        assert!(provisioning.owner_confirmed);
        assert_eq!(target.container_owner("photos").as_deref(), Some(OWNER));
        assert_eq!(target.counters().owner_relinks, 1);
    }

    #[tokio::test]
    async fn existing_container_with_wrong_owner_is_relinked() {
        init_dummy_tracing_subscriber();

        let target = target_cluster();
        let client = data_client(&target).await;
        target.seed_container("photos", "admin", Headers::new());

        let provisioning = ensure_container(&*client, &target, &Headers::new(), "photos", OWNER)
            .await
            .unwrap();

        assert!(!provisioning.created);
        assert!(provisioning.owner_confirmed);
        assert_eq!(target.container_owner("photos").as_deref(), Some(OWNER));
    }

    #[tokio::test]
    async fn unsupported_relink_is_not_fatal() {
        init_dummy_tracing_subscriber();

        let target = target_cluster();
        let client = data_client(&target).await;
        target.create_containers_under("admin");
        target.disable_owner_relink();

        let provisioning = ensure_container(&*client, &target, &Headers::new(), "photos", OWNER)
            .await
            .unwrap();

        assert!(provisioning.created);
        assert!(!provisioning.owner_confirmed);
        assert_eq!(target.container_owner("photos").as_deref(), Some("admin"));
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
