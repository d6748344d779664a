//! Ceph RADOS Gateway admin-ops API client.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::config::ClientConfig;
use crate::storage::StorageAdmin;
use crate::types::error::{MigrateError, is_not_found_error};
use crate::types::{
    AccessKeys, AccessLevel, ClusterAccount, Credential, CredentialKind, Identity, Page,
    QuotaClass, QuotaSettings,
};

pub mod signer;

const USER_PATH: &str = "/admin/user";
const BUCKET_PATH: &str = "/admin/bucket";
const USER_METADATA_PATH: &str = "/admin/metadata/user";
const BUCKET_METADATA_PATH: &str = "/admin/metadata/bucket";

type Query<'a> = Vec<(&'a str, Option<String>)>;

#[derive(Clone)]
pub struct RgwAdminClient {
    http: reqwest::Client,
    base_url: String,
    admin_keys: AccessKeys,
    subuser_suffix: String,
}

#[derive(Deserialize)]
struct MetadataListing {
    #[serde(default)]
    keys: Vec<String>,
    #[serde(default)]
    truncated: bool,
    marker: Option<String>,
}

#[derive(Deserialize)]
struct UserInfo {
    user_id: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    keys: Vec<S3Key>,
    #[serde(default)]
    swift_keys: Vec<SwiftKey>,
}

#[derive(Deserialize)]
struct S3Key {
    access_key: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct SwiftKey {
    user: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct QuotaInfo {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    check_on_raw: bool,
    #[serde(default = "unlimited")]
    max_size: i64,
    #[serde(default)]
    max_size_kb: i64,
    #[serde(default = "unlimited")]
    max_objects: i64,
}

fn unlimited() -> i64 {
    -1
}

#[derive(Deserialize)]
struct BucketInfo {
    id: String,
    #[serde(default)]
    owner: String,
}

impl From<UserInfo> for Identity {
    fn from(user: UserInfo) -> Self {
        let swift = user.swift_keys.into_iter().map(|key| Credential {
            kind: CredentialKind::Swift,
            user: key.user,
            secret_key: key.secret_key,
        });
        let s3 = user.keys.into_iter().map(|key| Credential {
            kind: CredentialKind::S3,
            user: key.access_key,
            secret_key: key.secret_key,
        });

        Identity {
            id: user.user_id,
            display_name: user.display_name,
            credentials: swift.chain(s3).collect(),
        }
    }
}

impl From<QuotaInfo> for QuotaSettings {
    fn from(quota: QuotaInfo) -> Self {
        QuotaSettings {
            enabled: quota.enabled,
            check_on_raw: quota.check_on_raw,
            max_size: quota.max_size,
            max_size_kb: quota.max_size_kb,
            max_objects: quota.max_objects,
        }
    }
}

impl RgwAdminClient {
    pub fn new(
        account: &ClusterAccount,
        client_config: &ClientConfig,
        subuser_suffix: &str,
    ) -> Result<Self> {
        Ok(Self {
            http: client_config.build_http_client()?,
            base_url: account.base_url(client_config.https),
            admin_keys: account.admin_keys.clone(),
            subuser_suffix: subuser_suffix.to_string(),
        })
    }

    fn build_url(&self, path: &str, query: &Query<'_>) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("format", "json");
            for (name, value) in query {
                match value {
                    Some(value) => pairs.append_pair(name, value),
                    None => pairs.append_key_only(name),
                };
            }
        }

        Ok(url)
    }

    async fn send(&self, method: Method, path: &str, query: Query<'_>) -> Result<Response> {
        let url = self.build_url(path, &query)?;
        let (date, authorization) = signer::sign_v2(&self.admin_keys, &method, path, Utc::now())?;

        trace!(method = method.as_str(), url = url.as_str(), "admin request.");

        let response = self
            .http
            .request(method.clone(), url)
            .header("Date", date)
            .header("Authorization", authorization)
            .send()
            .await
            .with_context(|| format!("{method} {path} failed."))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(anyhow::Error::from(MigrateError::NotFound))
                .with_context(|| format!("{method} {path} returned 404."));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("{method} {path} failed: {status} {body}"));
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: Query<'_>,
    ) -> Result<T> {
        let response = self.send(method.clone(), path, query).await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("{method} {path}: malformed response."))
    }

    async fn list_metadata(
        &self,
        path: &str,
        marker: Option<&str>,
        max_entries: i32,
    ) -> Result<Page<String>> {
        let mut query: Query<'_> = vec![("max-entries", Some(max_entries.to_string()))];
        if let Some(marker) = marker {
            query.push(("marker", Some(marker.to_string())));
        }

        let listing: MetadataListing = self
            .send_json(Method::GET, path, query)
            .await
            .with_context(|| MigrateError::Listing(path.to_string()))?;
        let next_marker = if listing.truncated {
            listing.marker.or_else(|| listing.keys.last().cloned())
        } else {
            None
        };

        Ok(Page {
            items: listing.keys,
            next_marker,
        })
    }

    async fn bucket_info(&self, name: &str) -> Result<Option<BucketInfo>> {
        let result = self
            .send_json::<BucketInfo>(
                Method::GET,
                BUCKET_PATH,
                vec![("bucket", Some(name.to_string()))],
            )
            .await;

        match result {
            Ok(info) => Ok(Some(info)),
            Err(e) if is_not_found_error(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl StorageAdmin for RgwAdminClient {
    async fn check_connection(&self) -> Result<()> {
        self.list_metadata(USER_METADATA_PATH, None, 1)
            .await
            .with_context(|| format!("admin API of {} is not reachable.", self.base_url))?;

        Ok(())
    }

    async fn list_identities(&self, marker: Option<&str>, max_entries: i32) -> Result<Page<String>> {
        self.list_metadata(USER_METADATA_PATH, marker, max_entries)
            .await
    }

    async fn get_identity(&self, id: &str) -> Result<Option<Identity>> {
        let result = self
            .send_json::<UserInfo>(Method::GET, USER_PATH, vec![("uid", Some(id.to_string()))])
            .await;

        match result {
            Ok(user) => Ok(Some(user.into())),
            Err(e) if is_not_found_error(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_identity(&self, id: &str, display_name: &str) -> Result<Identity> {
        let user: UserInfo = self
            .send_json(
                Method::PUT,
                USER_PATH,
                vec![
                    ("uid", Some(id.to_string())),
                    ("display-name", Some(display_name.to_string())),
                    ("generate-key", Some("False".to_string())),
                ],
            )
            .await?;

        debug!(owner = id, "identity created.");

        Ok(user.into())
    }

    async fn get_quota(&self, id: &str, class: QuotaClass) -> Result<QuotaSettings> {
        let quota: QuotaInfo = self
            .send_json(
                Method::GET,
                USER_PATH,
                vec![
                    ("quota", None),
                    ("uid", Some(id.to_string())),
                    ("quota-type", Some(class.as_str().to_string())),
                ],
            )
            .await?;

        Ok(quota.into())
    }

    async fn set_quota(&self, id: &str, class: QuotaClass, settings: &QuotaSettings) -> Result<()> {
        self.send(
            Method::PUT,
            USER_PATH,
            vec![
                ("quota", None),
                ("uid", Some(id.to_string())),
                ("quota-type", Some(class.as_str().to_string())),
                ("enabled", Some(settings.enabled.to_string())),
                ("check-on-raw", Some(settings.check_on_raw.to_string())),
                ("max-size", Some(settings.max_size.to_string())),
                ("max-size-kb", Some(settings.max_size_kb.to_string())),
                ("max-objects", Some(settings.max_objects.to_string())),
            ],
        )
        .await?;

        Ok(())
    }

    async fn create_credential(&self, id: &str, kind: CredentialKind, access: AccessLevel) -> Result<()> {
        let query = match kind {
            CredentialKind::Swift => vec![
                ("subuser", None),
                ("uid", Some(id.to_string())),
                ("subuser", Some(format!("{id}:{}", self.subuser_suffix))),
                ("key-type", Some(kind.as_str().to_string())),
                ("generate-secret", Some("True".to_string())),
                ("access", Some(access.as_str().to_string())),
            ],
            CredentialKind::S3 => vec![
                ("key", None),
                ("uid", Some(id.to_string())),
                ("key-type", Some(kind.as_str().to_string())),
                ("generate-key", Some("True".to_string())),
            ],
        };
        self.send(Method::PUT, USER_PATH, query).await?;

        debug!(owner = id, kind = kind.as_str(), "credential created.");

        Ok(())
    }

    async fn list_containers(&self, marker: Option<&str>, max_entries: i32) -> Result<Page<String>> {
        self.list_metadata(BUCKET_METADATA_PATH, marker, max_entries)
            .await
    }

    async fn list_containers_for_owner(
        &self,
        owner: &str,
        marker: Option<&str>,
        max_entries: i32,
    ) -> Result<Page<String>> {
        let mut names: Vec<String> = self
            .send_json(Method::GET, BUCKET_PATH, vec![("uid", Some(owner.to_string()))])
            .await?;
        names.sort();

        Ok(page_after_marker(names, marker, max_entries))
    }

    async fn get_container_owner(&self, name: &str) -> Result<Option<String>> {
        Ok(self.bucket_info(name).await?.map(|info| info.owner))
    }

    async fn link_container_owner(&self, name: &str, owner: &str) -> Result<()> {
        let info = self
            .bucket_info(name)
            .await?
            .ok_or(MigrateError::NotFound)
            .with_context(|| format!("bucket {name} not found."))?;

        self.send(
            Method::PUT,
            BUCKET_PATH,
            vec![
                ("bucket", Some(name.to_string())),
                ("bucket-id", Some(info.id)),
                ("uid", Some(owner.to_string())),
            ],
        )
        .await?;

        Ok(())
    }

    async fn unlink_container_owner(&self, name: &str) -> Result<()> {
        let Some(info) = self.bucket_info(name).await? else {
            return Ok(());
        };
        if info.owner.is_empty() {
            return Ok(());
        }

        self.send(
            Method::POST,
            BUCKET_PATH,
            vec![
                ("bucket", Some(name.to_string())),
                ("uid", Some(info.owner)),
            ],
        )
        .await?;

        Ok(())
    }
}

/// The per-owner bucket listing is not paginated by the gateway.
fn page_after_marker(names: Vec<String>, marker: Option<&str>, max_entries: i32) -> Page<String> {
    let max_entries = max_entries.max(1) as usize;
    let mut remaining: Vec<String> = names
        .into_iter()
        .filter(|name| marker.is_none_or(|marker| name.as_str() > marker))
        .collect();

    if remaining.len() <= max_entries {
        return Page::terminal(remaining);
    }

    remaining.truncate(max_entries);
    let next_marker = remaining.last().cloned();
    Page {
        items: remaining,
        next_marker,
    }
}
