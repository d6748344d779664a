use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use zeroize_derive::{Zeroize, ZeroizeOnDrop};

pub mod error;
pub mod token;

pub const MIGRATION_SUMMARY_NAME: &str = "MIGRATION_SUMMARY";

pub const MANIFEST_HEADER: &str = "x-object-manifest";
pub const CONTENT_LENGTH_HEADER: &str = "content-length";
pub const ETAG_HEADER: &str = "etag";

/// Lower-cased header name to value.
pub type Headers = BTreeMap<String, String>;

/// One page of a paginated listing. `next_marker` is `None` on the terminal page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_marker: Option<String>,
}

impl<T> Page<T> {
    pub fn terminal(items: Vec<T>) -> Self {
        Self {
            items,
            next_marker: None,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AccessKeys {
    pub access_key: String,
    pub secret_key: String,
}

impl Debug for AccessKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys = f.debug_struct("AccessKeys");
        keys.field("access_key", &self.access_key)
            .field("secret_key", &"** redacted **");
        keys.finish()
    }
}

/// One cluster endpoint and the admin credential used against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAccount {
    pub host: String,
    pub port: u16,
    pub admin_keys: AccessKeys,
}

impl ClusterAccount {
    pub fn base_url(&self, https: bool) -> String {
        let scheme = if https { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    pub fn is_same_endpoint(&self, other: &ClusterAccount) -> bool {
        self.host.eq_ignore_ascii_case(&other.host) && self.port == other.port
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    Swift,
    S3,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::Swift => "swift",
            CredentialKind::S3 => "s3",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    Full,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Full => "full",
        }
    }
}

/// A data-plane credential. For swift keys `user` is the subuser (`uid:name`).
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    #[zeroize(skip)]
    pub kind: CredentialKind,
    pub user: String,
    pub secret_key: String,
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut credential = f.debug_struct("Credential");
        credential
            .field("kind", &self.kind)
            .field("user", &self.user)
            .field("secret_key", &"** redacted **");
        credential.finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    pub credentials: Vec<Credential>,
}

impl Identity {
    pub fn credential(&self, kind: CredentialKind) -> Option<&Credential> {
        self.credentials
            .iter()
            .find(|credential| credential.kind == kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QuotaClass {
    /// identity-level quota
    User,
    /// per-container quota applied to every container of the identity
    Bucket,
}

impl QuotaClass {
    pub const ALL: [QuotaClass; 2] = [QuotaClass::User, QuotaClass::Bucket];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaClass::User => "user",
            QuotaClass::Bucket => "bucket",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuotaSettings {
    pub enabled: bool,
    pub check_on_raw: bool,
    pub max_size: i64,
    pub max_size_kb: i64,
    pub max_objects: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    pub owner: String,
    pub headers: Headers,
}

/// One stored object as seen by a listing or a HEAD.
///
/// A listing never reveals the manifest, so `manifest` is only populated from a HEAD.
/// For a manifest object the listing size is 0 while a HEAD reports the resolved size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    pub container: String,
    pub key: String,
    pub size: u64,
    pub fingerprint: String,
    pub manifest: Option<String>,
    pub headers: Headers,
}

impl ObjectRecord {
    pub fn is_segmented(&self) -> bool {
        self.manifest.is_some()
    }
}

/// Data-plane access for one identity on one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEndpoint {
    pub account: ClusterAccount,
    pub credential: Credential,
}

#[derive(Debug)]
pub struct TransferJob {
    pub source: Arc<DataEndpoint>,
    pub target: Arc<DataEndpoint>,
    pub owner: String,
    pub container: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Success { size: u64, elapsed: Duration },
    Failure { error: String },
    DryRun,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferResult {
    pub owner: String,
    pub container: String,
    pub key: String,
    pub outcome: TransferOutcome,
}

impl TransferResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TransferOutcome::Success { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MigrationSummary {
    pub identities_touched: u64,
    pub identities_created: u64,
    pub containers_touched: u64,
    pub containers_created: u64,
    pub objects_checked: u64,
    pub objects_up_to_date: u64,
    pub stale_objects_deleted: u64,
    pub objects_attempted: u64,
    pub objects_succeeded: u64,
    pub objects_failed: u64,
    pub objects_dry_run: u64,
    pub bytes_transferred: u64,
    pub unrecognized_owners: u64,
    pub provisioning_failures: u64,
    pub listing_failures: u64,
}

impl MigrationSummary {
    pub fn is_rerun_recommended(&self) -> bool {
        self.objects_failed != 0 || self.provisioning_failures != 0 || self.listing_failures != 0
    }
}
