//! A complete in-process cluster implementing both the admin and the data-plane
//! interfaces, with hooks to inject the failures a real cluster produces.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;

use crate::storage::{
    DataClient, ObjectBody, ObjectData, ObjectDataConnector, StorageAdmin,
};
use crate::types::error::MigrateError;
use crate::types::{
    AccessLevel, CONTENT_LENGTH_HEADER, Credential, CredentialKind, DataEndpoint, ETAG_HEADER,
    Headers, Identity, MANIFEST_HEADER, ObjectRecord, Page, QuotaClass, QuotaSettings,
};

const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";
const DEFAULT_SUBUSER_SUFFIX: &str = "migration";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationCounters {
    pub identities_created: u64,
    pub credentials_created: u64,
    pub quotas_set: u64,
    pub containers_created: u64,
    pub owner_relinks: u64,
    pub objects_put: u64,
    pub objects_read: u64,
    pub objects_deleted: u64,
}

#[derive(Default)]
struct Faults {
    reject_admin: bool,
    fail_identity_creation: HashSet<String>,
    fail_quota_update: HashSet<String>,
    fail_get: HashSet<(String, String)>,
    panic_on_get: HashSet<(String, String)>,
    fail_object_listing: HashSet<String>,
    fail_container_listing_for_owner: HashSet<String>,
    default_container_owner: Option<String>,
    disable_owner_relink: bool,
}

struct StoredIdentity {
    display_name: String,
    credentials: Vec<Credential>,
    quotas: HashMap<QuotaClass, QuotaSettings>,
}

struct StoredContainer {
    owner: String,
    headers: Headers,
    objects: BTreeMap<String, StoredObject>,
}

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    fingerprint: String,
    manifest: Option<String>,
    resolved_size: Option<u64>,
    headers: Headers,
}

#[derive(Default)]
struct ClusterState {
    identities: BTreeMap<String, StoredIdentity>,
    containers: BTreeMap<String, StoredContainer>,
    faults: Faults,
    counters: OperationCounters,
    operation_log: Vec<String>,
    secret_sequence: u64,
}

#[derive(Clone)]
pub struct InMemoryCluster {
    host: String,
    port: u16,
    state: Arc<Mutex<ClusterState>>,
}

impl InMemoryCluster {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            state: Arc::new(Mutex::new(ClusterState::default())),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn seed_identity(&self, id: &str, display_name: &str) {
        self.lock().identities.insert(
            id.to_string(),
            StoredIdentity {
                display_name: display_name.to_string(),
                credentials: vec![],
                quotas: HashMap::new(),
            },
        );
    }

    pub fn seed_credential(&self, id: &str, kind: CredentialKind) -> Result<Credential> {
        let mut state = self.lock();
        add_credential(&mut state, id, kind)
    }

    pub fn seed_quota(&self, id: &str, class: QuotaClass, settings: QuotaSettings) {
        if let Some(identity) = self.lock().identities.get_mut(id) {
            identity.quotas.insert(class, settings);
        }
    }

    pub fn seed_container(&self, name: &str, owner: &str, headers: Headers) {
        self.lock().containers.insert(
            name.to_string(),
            StoredContainer {
                owner: owner.to_string(),
                headers,
                objects: BTreeMap::new(),
            },
        );
    }

    pub fn seed_object(&self, container: &str, key: &str, data: impl Into<Bytes>, headers: Headers) {
        let data = data.into();
        let object = StoredObject {
            fingerprint: fingerprint(&data),
            data,
            manifest: None,
            resolved_size: None,
            headers,
        };
        self.insert_object(container, key, object);
    }

    /// Seeds a manifest object. `resolved_size` overrides the size computed from segments.
    pub fn seed_manifest_object(
        &self,
        container: &str,
        key: &str,
        manifest: &str,
        resolved_size: Option<u64>,
        mut headers: Headers,
    ) {
        headers.insert(MANIFEST_HEADER.to_string(), manifest.to_string());
        let object = StoredObject {
            data: Bytes::new(),
            fingerprint: EMPTY_MD5.to_string(),
            manifest: Some(manifest.to_string()),
            resolved_size,
            headers,
        };
        self.insert_object(container, key, object);
    }

    fn insert_object(&self, container: &str, key: &str, object: StoredObject) {
        if let Some(container) = self.lock().containers.get_mut(container) {
            container.objects.insert(key.to_string(), object);
        }
    }

    pub fn identity(&self, id: &str) -> Option<Identity> {
        let state = self.lock();
        state
            .identities
            .get(id)
            .map(|identity| to_identity(id, identity))
    }

    pub fn quota(&self, id: &str, class: QuotaClass) -> Option<QuotaSettings> {
        let state = self.lock();
        state
            .identities
            .get(id)
            .and_then(|identity| identity.quotas.get(&class).cloned())
    }

    pub fn container_owner(&self, name: &str) -> Option<String> {
        let state = self.lock();
        state
            .containers
            .get(name)
            .map(|container| container.owner.clone())
    }

    pub fn container_headers(&self, name: &str) -> Option<Headers> {
        let state = self.lock();
        state
            .containers
            .get(name)
            .map(|container| container.headers.clone())
    }

    pub fn object_data(&self, container: &str, key: &str) -> Option<Bytes> {
        self.stored_object(container, key).map(|object| object.data)
    }

    pub fn object_headers(&self, container: &str, key: &str) -> Option<Headers> {
        self.stored_object(container, key)
            .map(|object| object.headers)
    }

    pub fn object_keys(&self, container: &str) -> Vec<String> {
        let state = self.lock();
        state
            .containers
            .get(container)
            .map(|container| container.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn stored_object(&self, container: &str, key: &str) -> Option<StoredObject> {
        let state = self.lock();
        state
            .containers
            .get(container)
            .and_then(|container| container.objects.get(key).cloned())
    }

    pub fn counters(&self) -> OperationCounters {
        self.lock().counters.clone()
    }

    pub fn reset_counters(&self) {
        let mut state = self.lock();
        state.counters = OperationCounters::default();
        state.operation_log.clear();
    }

    /// Mutating data-plane operations in the order they were applied.
    pub fn operation_log(&self) -> Vec<String> {
        self.lock().operation_log.clone()
    }

    pub fn reject_admin_connection(&self) {
        self.lock().faults.reject_admin = true;
    }

    pub fn fail_identity_creation(&self, id: &str) {
        self.lock()
            .faults
            .fail_identity_creation
            .insert(id.to_string());
    }

    pub fn fail_quota_update(&self, id: &str) {
        self.lock().faults.fail_quota_update.insert(id.to_string());
    }

    pub fn fail_get(&self, container: &str, key: &str) {
        self.lock()
            .faults
            .fail_get
            .insert((container.to_string(), key.to_string()));
    }

    pub fn panic_on_get(&self, container: &str, key: &str) {
        self.lock()
            .faults
            .panic_on_get
            .insert((container.to_string(), key.to_string()));
    }

    /// Every object listing page after the first one fails for `container`.
    pub fn fail_object_listing_after_first_page(&self, container: &str) {
        self.lock()
            .faults
            .fail_object_listing
            .insert(container.to_string());
    }

    pub fn fail_container_listing_for_owner(&self, owner: &str) {
        self.lock()
            .faults
            .fail_container_listing_for_owner
            .insert(owner.to_string());
    }

    /// Containers created through the data plane end up owned by `owner`.
    pub fn create_containers_under(&self, owner: &str) {
        self.lock().faults.default_container_owner = Some(owner.to_string());
    }

    pub fn clear_faults(&self) {
        self.lock().faults = Faults::default();
    }

    pub fn disable_owner_relink(&self) {
        self.lock().faults.disable_owner_relink = true;
    }

    fn authenticate(&self, credential: &Credential) -> Option<String> {
        let state = self.lock();
        state
            .identities
            .iter()
            .find(|(_, identity)| identity.credentials.iter().any(|c| c == credential))
            .map(|(id, _)| id.clone())
    }
}

#[async_trait]
impl StorageAdmin for InMemoryCluster {
    async fn check_connection(&self) -> Result<()> {
        if self.lock().faults.reject_admin {
            return Err(anyhow!("admin request rejected by {}:{}.", self.host, self.port));
        }

        Ok(())
    }

    async fn list_identities(&self, marker: Option<&str>, max_entries: i32) -> Result<Page<String>> {
        let state = self.lock();
        Ok(paginate(
            state.identities.keys().map(|id| (id.clone(), id.clone())),
            marker,
            max_entries,
        ))
    }

    async fn get_identity(&self, id: &str) -> Result<Option<Identity>> {
        Ok(self.identity(id))
    }

    async fn create_identity(&self, id: &str, display_name: &str) -> Result<Identity> {
        let mut state = self.lock();
        if state.faults.fail_identity_creation.contains(id) {
            return Err(anyhow!("identity creation rejected: {id}"));
        }
        if state.identities.contains_key(id) {
            return Err(anyhow!("identity already exists: {id}"));
        }

        let identity = StoredIdentity {
            display_name: display_name.to_string(),
            credentials: vec![],
            quotas: HashMap::new(),
        };
        let created = to_identity(id, &identity);
        state.identities.insert(id.to_string(), identity);
        state.counters.identities_created += 1;

        Ok(created)
    }

    async fn get_quota(&self, id: &str, class: QuotaClass) -> Result<QuotaSettings> {
        let state = self.lock();
        let identity = state.identities.get(id).ok_or(MigrateError::NotFound)?;
        Ok(identity.quotas.get(&class).cloned().unwrap_or_default())
    }

    async fn set_quota(&self, id: &str, class: QuotaClass, settings: &QuotaSettings) -> Result<()> {
        let mut state = self.lock();
        if state.faults.fail_quota_update.contains(id) {
            return Err(anyhow!("quota update rejected: {id}"));
        }
        let identity = state.identities.get_mut(id).ok_or(MigrateError::NotFound)?;
        identity.quotas.insert(class, settings.clone());
        state.counters.quotas_set += 1;

        Ok(())
    }

    async fn create_credential(&self, id: &str, kind: CredentialKind, _access: AccessLevel) -> Result<()> {
        let mut state = self.lock();
        add_credential(&mut state, id, kind)?;
        state.counters.credentials_created += 1;

        Ok(())
    }

    async fn list_containers(&self, marker: Option<&str>, max_entries: i32) -> Result<Page<String>> {
        let state = self.lock();
        Ok(paginate(
            state.containers.keys().map(|name| (name.clone(), name.clone())),
            marker,
            max_entries,
        ))
    }

    async fn list_containers_for_owner(
        &self,
        owner: &str,
        marker: Option<&str>,
        max_entries: i32,
    ) -> Result<Page<String>> {
        let state = self.lock();
        if state.faults.fail_container_listing_for_owner.contains(owner) {
            return Err(anyhow!("container listing failed for {owner}"));
        }

        Ok(paginate(
            state
                .containers
                .iter()
                .filter(|(_, container)| container.owner == owner)
                .map(|(name, _)| (name.clone(), name.clone())),
            marker,
            max_entries,
        ))
    }

    async fn get_container_owner(&self, name: &str) -> Result<Option<String>> {
        Ok(self.container_owner(name))
    }

    async fn link_container_owner(&self, name: &str, owner: &str) -> Result<()> {
        let mut state = self.lock();
        if state.faults.disable_owner_relink {
            return Err(anyhow!("bucket link is not supported"));
        }
        let container = state.containers.get_mut(name).ok_or(MigrateError::NotFound)?;
        container.owner = owner.to_string();
        state.counters.owner_relinks += 1;

        Ok(())
    }

    async fn unlink_container_owner(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        if state.faults.disable_owner_relink {
            return Err(anyhow!("bucket unlink is not supported"));
        }
        let container = state.containers.get_mut(name).ok_or(MigrateError::NotFound)?;
        container.owner = String::new();

        Ok(())
    }
}

/// Routes data-plane connections to in-memory clusters by host and port.
#[derive(Clone)]
pub struct InMemoryConnector {
    clusters: Vec<InMemoryCluster>,
}

impl InMemoryConnector {
    pub fn new(clusters: Vec<InMemoryCluster>) -> Self {
        Self { clusters }
    }
}

#[async_trait]
impl ObjectDataConnector for InMemoryConnector {
    async fn connect(&self, endpoint: &DataEndpoint) -> Result<DataClient> {
        let cluster = self
            .clusters
            .iter()
            .find(|cluster| {
                cluster.host.eq_ignore_ascii_case(&endpoint.account.host)
                    && cluster.port == endpoint.account.port
            })
            .ok_or_else(|| {
                anyhow!(
                    "no route to {}:{}",
                    endpoint.account.host,
                    endpoint.account.port
                )
            })?;

        let owner = cluster
            .authenticate(&endpoint.credential)
            .ok_or_else(|| anyhow!("authentication failed for {}.", endpoint.credential.user))?;

        Ok(Box::new(InMemoryDataClient {
            cluster: cluster.clone(),
            owner,
        }))
    }
}

#[derive(Clone)]
pub struct InMemoryDataClient {
    cluster: InMemoryCluster,
    owner: String,
}

#[async_trait]
impl ObjectData for InMemoryDataClient {
    async fn head_container(&self, name: &str) -> Result<Option<Headers>> {
        let state = self.cluster.lock();
        Ok(state.containers.get(name).map(|container| {
            let mut headers = container.headers.clone();
            headers.insert(
                "x-container-object-count".to_string(),
                container.objects.len().to_string(),
            );
            headers
        }))
    }

    async fn put_container(&self, name: &str, headers: &Headers) -> Result<()> {
        let mut state = self.cluster.lock();
        let owner = state
            .faults
            .default_container_owner
            .clone()
            .unwrap_or_else(|| self.owner.clone());

        if let Some(container) = state.containers.get_mut(name) {
            container.headers.extend(headers.clone());
        } else {
            state.containers.insert(
                name.to_string(),
                StoredContainer {
                    owner,
                    headers: headers.clone(),
                    objects: BTreeMap::new(),
                },
            );
            state.counters.containers_created += 1;
        }
        state.operation_log.push(format!("put_container {name}"));

        Ok(())
    }

    async fn list_objects(
        &self,
        container: &str,
        marker: Option<&str>,
        limit: i32,
    ) -> Result<Page<ObjectRecord>> {
        let state = self.cluster.lock();
        if marker.is_some() && state.faults.fail_object_listing.contains(container) {
            return Err(anyhow!("object listing page failed for {container}"));
        }

        let stored = state
            .containers
            .get(container)
            .ok_or(MigrateError::NotFound)?;

        Ok(paginate(
            stored.objects.iter().map(|(key, object)| {
                let record = if object.manifest.is_some() {
                    ObjectRecord {
                        container: container.to_string(),
                        key: key.clone(),
                        size: 0,
                        fingerprint: EMPTY_MD5.to_string(),
                        manifest: None,
                        headers: Headers::new(),
                    }
                } else {
                    ObjectRecord {
                        container: container.to_string(),
                        key: key.clone(),
                        size: object.data.len() as u64,
                        fingerprint: object.fingerprint.clone(),
                        manifest: None,
                        headers: Headers::new(),
                    }
                };
                (key.clone(), record)
            }),
            marker,
            limit,
        ))
    }

    async fn head_object(&self, container: &str, key: &str) -> Result<Option<ObjectRecord>> {
        let state = self.cluster.lock();
        let Some(object) = state
            .containers
            .get(container)
            .and_then(|stored| stored.objects.get(key))
        else {
            return Ok(None);
        };

        let (size, fingerprint) = match &object.manifest {
            Some(manifest) => {
                let segments = resolve_segments(&state, manifest);
                let size = object
                    .resolved_size
                    .unwrap_or_else(|| segments.iter().map(|s| s.data.len() as u64).sum());
                let etags: String = segments.iter().map(|s| s.fingerprint.as_str()).collect();
                (size, format!("\"{}\"", fingerprint(etags.as_bytes())))
            }
            None => (object.data.len() as u64, object.fingerprint.clone()),
        };

        let mut headers = object.headers.clone();
        headers.insert(CONTENT_LENGTH_HEADER.to_string(), size.to_string());
        headers.insert(ETAG_HEADER.to_string(), fingerprint.clone());

        Ok(Some(ObjectRecord {
            container: container.to_string(),
            key: key.to_string(),
            size,
            fingerprint,
            manifest: object.manifest.clone(),
            headers,
        }))
    }

    async fn get_object_stream(&self, container: &str, key: &str) -> Result<ObjectBody> {
        let should_panic = {
            let state = self.cluster.lock();
            state
                .faults
                .panic_on_get
                .contains(&(container.to_string(), key.to_string()))
        };
        if should_panic {
            panic!("injected panic while reading {container}/{key}");
        }

        let mut state = self.cluster.lock();
        if state
            .faults
            .fail_get
            .contains(&(container.to_string(), key.to_string()))
        {
            return Err(anyhow!("injected GET failure for {container}/{key}"));
        }

        let object = state
            .containers
            .get(container)
            .and_then(|stored| stored.objects.get(key))
            .cloned()
            .ok_or(MigrateError::NotFound)?;

        let data = match &object.manifest {
            Some(manifest) => resolve_segments(&state, manifest)
                .iter()
                .flat_map(|segment| segment.data.iter().copied())
                .collect::<Vec<u8>>()
                .into(),
            None => object.data,
        };
        state.counters.objects_read += 1;

        Ok(ObjectBody::from_bytes(data))
    }

    async fn put_object(
        &self,
        container: &str,
        key: &str,
        body: ObjectBody,
        headers: &Headers,
    ) -> Result<()> {
        {
            let state = self.cluster.lock();
            let stored = state
                .containers
                .get(container)
                .ok_or(MigrateError::NotFound)?;
            if stored.owner != self.owner {
                return Err(anyhow!("access denied to {container} for {}", self.owner));
            }
        }

        let data = body.collect().await?;

        let mut headers = headers.clone();
        headers.remove(CONTENT_LENGTH_HEADER);
        headers.remove(ETAG_HEADER);
        let manifest = headers.get(MANIFEST_HEADER).cloned();

        let mut state = self.cluster.lock();
        let stored = state
            .containers
            .get_mut(container)
            .ok_or(MigrateError::NotFound)?;
        stored.objects.insert(
            key.to_string(),
            StoredObject {
                fingerprint: fingerprint(&data),
                data,
                manifest,
                resolved_size: None,
                headers,
            },
        );
        state.counters.objects_put += 1;
        state.operation_log.push(format!("put_object {container}/{key}"));

        Ok(())
    }

    async fn delete_object(&self, container: &str, key: &str) -> Result<()> {
        let mut state = self.cluster.lock();
        let removed = state
            .containers
            .get_mut(container)
            .and_then(|stored| stored.objects.remove(key));
        if removed.is_some() {
            state.counters.objects_deleted += 1;
            state
                .operation_log
                .push(format!("delete_object {container}/{key}"));
        }

        Ok(())
    }
}

fn add_credential(state: &mut ClusterState, id: &str, kind: CredentialKind) -> Result<Credential> {
    state.secret_sequence += 1;
    let secret_key = format!("{id}-{}-secret-{}", kind.as_str(), state.secret_sequence);
    let identity = state.identities.get_mut(id).ok_or(MigrateError::NotFound)?;

    let user = match kind {
        CredentialKind::Swift => format!("{id}:{DEFAULT_SUBUSER_SUFFIX}"),
        CredentialKind::S3 => id.to_string(),
    };
    let credential = Credential {
        kind,
        user,
        secret_key,
    };
    identity.credentials.push(credential.clone());

    Ok(credential)
}

fn to_identity(id: &str, identity: &StoredIdentity) -> Identity {
    Identity {
        id: id.to_string(),
        display_name: identity.display_name.clone(),
        credentials: identity.credentials.clone(),
    }
}

fn resolve_segments(state: &ClusterState, manifest: &str) -> Vec<StoredObject> {
    let (container, prefix) = manifest.split_once('/').unwrap_or((manifest, ""));
    state
        .containers
        .get(container)
        .map(|stored| {
            stored
                .objects
                .iter()
                .filter(|(key, object)| key.starts_with(prefix) && object.manifest.is_none())
                .map(|(_, object)| object.clone())
                .collect()
        })
        .unwrap_or_default()
}

fn fingerprint(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

fn paginate<T>(
    items: impl Iterator<Item = (String, T)>,
    marker: Option<&str>,
    max_entries: i32,
) -> Page<T> {
    let max_entries = max_entries.max(1) as usize;
    let mut selected: Vec<(String, T)> = items
        .filter(|(name, _)| marker.is_none_or(|marker| name.as_str() > marker))
        .take(max_entries + 1)
        .collect();

    let next_marker = if selected.len() > max_entries {
        selected.truncate(max_entries);
        selected.last().map(|(name, _)| name.clone())
    } else {
        None
    };

    Page {
        items: selected.into_iter().map(|(_, item)| item).collect(),
        next_marker,
    }
}
