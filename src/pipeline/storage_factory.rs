use anyhow::{Context, Result};

use crate::Config;
use crate::storage::ClusterPair;
use crate::storage::rgw::RgwAdminClient;
use crate::storage::swift::SwiftConnector;

/// Builds the admin handles of both clusters and the shared swift connector.
pub fn create_cluster_pair(config: &Config) -> Result<ClusterPair> {
    let source_admin = RgwAdminClient::new(
        &config.source,
        &config.client_config,
        &config.migration_subuser_suffix,
    )
    .context("source admin client creation failed.")?;

    let target_admin = RgwAdminClient::new(
        &config.target,
        &config.client_config,
        &config.migration_subuser_suffix,
    )
    .context("target admin client creation failed.")?;

    let connector =
        SwiftConnector::new(&config.client_config).context("swift connector creation failed.")?;

    Ok(ClusterPair {
        source_admin: Box::new(source_admin),
        target_admin: Box::new(target_admin),
        connector: Box::new(connector),
    })
}
