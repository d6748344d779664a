use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use crate::storage::StorageAdmin;
use crate::types::error::MigrateError;
use crate::types::{AccessLevel, Credential, CredentialKind, Identity, QuotaClass};

/// Returns the target identity, creating it from `source_identity` when absent.
///
/// Both quota classes are reconciled with the source on every call, also for an existing identity.
/// The returned flag is true when the identity was created by this call.
pub async fn ensure_identity(
    source_admin: &(dyn StorageAdmin + Send + Sync),
    target_admin: &(dyn StorageAdmin + Send + Sync),
    source_identity: &Identity,
) -> Result<(Identity, bool)> {
    let id = source_identity.id.as_str();

    let existing = target_admin
        .get_identity(id)
        .await
        .with_context(|| format!("identity lookup of {id} on the target failed."))?;
    let created = existing.is_none();

    if created {
        target_admin
            .create_identity(id, &source_identity.display_name)
            .await
            .with_context(|| format!("identity creation of {id} failed."))?;
    } else {
        debug!(owner = id, "identity already exists on the target.");
    }

    mirror_quotas(source_admin, target_admin, id).await?;

    let identity = match existing {
        Some(identity) => identity,
        None => target_admin.get_identity(id).await?.ok_or_else(|| {
            MigrateError::Provisioning(format!("{id} is missing after creation."))
        })?,
    };

    if created {
        info!(
            owner = id,
            display_name = identity.display_name.as_str(),
            "identity created on the target."
        );
    }

    Ok((identity, created))
}

async fn mirror_quotas(
    source_admin: &(dyn StorageAdmin + Send + Sync),
    target_admin: &(dyn StorageAdmin + Send + Sync),
    id: &str,
) -> Result<()> {
    for class in QuotaClass::ALL {
        let quota = source_admin
            .get_quota(id, class)
            .await
            .with_context(|| format!("{} quota lookup of {id} failed.", class.as_str()))?;
        let current = target_admin
            .get_quota(id, class)
            .await
            .with_context(|| format!("{} quota lookup of {id} on the target failed.", class.as_str()))?;
        if current == quota {
            continue;
        }

        target_admin
            .set_quota(id, class, &quota)
            .await
            .with_context(|| format!("{} quota mirroring of {id} failed.", class.as_str()))?;

        debug!(owner = id, class = class.as_str(), "quota mirrored.");
    }

    Ok(())
}

/// Returns the first swift credential of `identity`, creating one with full access if it has none.
pub async fn ensure_transfer_credential(
    admin: &(dyn StorageAdmin + Send + Sync),
    identity: &Identity,
) -> Result<Credential> {
    if let Some(credential) = identity.credential(CredentialKind::Swift) {
        return Ok(credential.clone());
    }

    admin
        .create_credential(&identity.id, CredentialKind::Swift, AccessLevel::Full)
        .await
        .with_context(|| format!("credential creation for {} failed.", identity.id))?;

    let refreshed = admin
        .get_identity(&identity.id)
        .await?
        .ok_or_else(|| anyhow!("{} vanished while creating its credential.", identity.id))?;

    debug!(owner = identity.id.as_str(), "transfer credential created.");

    refreshed
        .credential(CredentialKind::Swift)
        .cloned()
        .ok_or_else(|| {
            anyhow::Error::from(MigrateError::Provisioning(format!(
                "{} has no swift credential after creation.",
                identity.id
            )))
        })
}
