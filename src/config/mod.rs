use std::time::Duration;

use clap::ValueEnum;
use regex::Regex;

use crate::types::ClusterAccount;

pub mod args;

#[derive(Debug, Clone)]
pub struct Config {
    pub source: ClusterAccount,
    pub target: ClusterAccount,
    pub client_config: ClientConfig,
    pub tracing_config: Option<TracingConfig>,
    pub worker_size: u16,
    pub traversal: Traversal,
    pub owner_id_regex: Regex,
    pub dry_run: bool,
    pub force_transfer: bool,
    pub max_keys: i32,
    pub migration_subuser_suffix: String,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

impl Config {
    /// Owners whose id does not match are left alone for the whole run.
    pub fn is_recognized_owner(&self, owner: &str) -> bool {
        self.owner_id_regex.is_match(owner)
    }

    pub fn job_queue_capacity(&self) -> usize {
        job_queue_capacity(self.worker_size)
    }
}

fn job_queue_capacity(worker_size: u16) -> usize {
    (worker_size as usize) * 2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Traversal {
    /// identities, then their containers, then objects
    OwnerFirst,
    /// every container of the cluster, then its owner
    BucketFirst,
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub https: bool,
    pub connect_timeout_milliseconds: Option<u64>,
    pub operation_timeout_milliseconds: Option<u64>,
}

impl ClientConfig {
    pub fn build_http_client(&self) -> anyhow::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.connect_timeout_milliseconds {
            builder = builder.connect_timeout(Duration::from_millis(timeout));
        }
        if let Some(timeout) = self.operation_timeout_milliseconds {
            builder = builder.timeout(Duration::from_millis(timeout));
        }

        Ok(builder.build()?)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}
