#![allow(dead_code)]

use uuid::Uuid;

use rgw_migrate::Config;
use rgw_migrate::config::args::build_config_from_args;
use rgw_migrate::pipeline::Pipeline;
use rgw_migrate::storage::ClusterPair;
use rgw_migrate::storage::memory::{InMemoryCluster, InMemoryConnector};
use rgw_migrate::types::Headers;
use rgw_migrate::types::token::{PipelineCancellationToken, create_pipeline_cancellation_token};

pub const SOURCE_HOST: &str = "rgw-src.local";
pub const TARGET_HOST: &str = "rgw-dst.local";
pub const PORT: u16 = 7480;

pub const X_JPG_SIZE: usize = 1024;
pub const BIG_BIN_SIZE: u64 = 50_000_000;
pub const BIG_BIN_MANIFEST: &str = "photos/big.bin/seg";

pub struct TestHelper {
    pub source: InMemoryCluster,
    pub target: InMemoryCluster,
}

impl TestHelper {
    pub fn new() -> Self {
        Self {
            source: InMemoryCluster::new(SOURCE_HOST, PORT),
            target: InMemoryCluster::new(TARGET_HOST, PORT),
        }
    }

    /// A fresh 32-hex owner id.
    pub fn generate_owner_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    pub fn config(options: &[&str]) -> Config {
        let source = format!("{SOURCE_HOST}:{PORT}:admin:source-secret");
        let target = format!("{TARGET_HOST}:{PORT}:admin:target-secret");

        let mut args = vec!["rgw-migrate"];
        args.extend_from_slice(options);
        args.push(&source);
        args.push(&target);

        build_config_from_args(args).unwrap()
    }

    pub fn cluster_pair(&self) -> ClusterPair {
        ClusterPair {
            source_admin: Box::new(self.source.clone()),
            target_admin: Box::new(self.target.clone()),
            connector: Box::new(InMemoryConnector::new(vec![
                self.source.clone(),
                self.target.clone(),
            ])),
        }
    }

    pub fn pipeline(&self, options: &[&str]) -> Pipeline {
        self.pipeline_with_token(options, create_pipeline_cancellation_token())
    }

    pub fn pipeline_with_token(
        &self,
        options: &[&str],
        cancellation_token: PipelineCancellationToken,
    ) -> Pipeline {
        Pipeline::with_clusters(Self::config(options), cancellation_token, self.cluster_pair())
    }

    pub async fn run(&self, options: &[&str]) -> Pipeline {
        let mut pipeline = self.pipeline(options);
        pipeline.run().await;
        pipeline
    }

    /// `owner` with container `photos` holding `x.jpg` (1 KiB) and the manifest object `big.bin`.
    pub fn seed_photos(&self, owner: &str) {
        self.source.seed_identity(owner, "Photographer");
        self.source.seed_container("photos", owner, Self::headers(&[("x-storage-policy", "gold")]));
        self.source.seed_object(
            "photos",
            "x.jpg",
            vec![0xabu8; X_JPG_SIZE],
            Self::headers(&[("content-type", "image/jpeg")]),
        );
        self.source.seed_manifest_object(
            "photos",
            "big.bin",
            BIG_BIN_MANIFEST,
            Some(BIG_BIN_SIZE),
            Self::headers(&[("content-type", "application/octet-stream")]),
        );
    }

    pub fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    pub fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
