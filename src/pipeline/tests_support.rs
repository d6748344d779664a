use crate::Config;
use crate::config::args::build_config_from_args;
use crate::storage::memory::{InMemoryCluster, InMemoryConnector};
use crate::storage::{ClusterPair, DataClient, ObjectDataConnector};
use crate::types::{AccessKeys, ClusterAccount, Credential, CredentialKind, DataEndpoint};

pub const OWNER: &str = "0123456789abcdef0123456789abcdef";
pub const SOURCE_ACCOUNT: &str = "src.local:7480:admin:secret";
pub const TARGET_ACCOUNT: &str = "dst.local:7480:admin:secret";

pub fn source_cluster() -> InMemoryCluster {
    InMemoryCluster::new("src.local", 7480)
}

pub fn target_cluster() -> InMemoryCluster {
    InMemoryCluster::new("dst.local", 7480)
}

pub fn build_config(options: &[&str]) -> Config {
    let mut args = vec!["rgw-migrate"];
    args.extend_from_slice(options);
    args.push(SOURCE_ACCOUNT);
    args.push(TARGET_ACCOUNT);

    build_config_from_args(args).unwrap()
}

pub fn cluster_pair(source: &InMemoryCluster, target: &InMemoryCluster) -> ClusterPair {
    ClusterPair {
        source_admin: Box::new(source.clone()),
        target_admin: Box::new(target.clone()),
        connector: Box::new(InMemoryConnector::new(vec![source.clone(), target.clone()])),
    }
}

pub fn endpoint(cluster: &InMemoryCluster, credential: Credential) -> DataEndpoint {
    DataEndpoint {
        account: ClusterAccount {
            host: cluster.host().to_string(),
            port: cluster.port(),
            admin_keys: AccessKeys {
                access_key: "admin".to_string(),
                secret_key: "secret".to_string(),
            },
        },
        credential,
    }
}

/// A data client authenticated as [`OWNER`], seeding the identity when needed.
pub async fn data_client(cluster: &InMemoryCluster) -> DataClient {
    if cluster.identity(OWNER).is_none() {
        cluster.seed_identity(OWNER, "Owner");
    }
    let credential = cluster.seed_credential(OWNER, CredentialKind::Swift).unwrap();

    InMemoryConnector::new(vec![cluster.clone()])
        .connect(&endpoint(cluster, credential))
        .await
        .unwrap()
}
