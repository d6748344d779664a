use std::fmt;
use std::fmt::{Debug, Formatter};

use anyhow::Result;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dyn_clone::DynClone;
use futures::stream::{self, BoxStream};
use futures_util::stream::{StreamExt, TryStreamExt};

use crate::types::{
    AccessLevel, CredentialKind, DataEndpoint, Headers, Identity, ObjectRecord, Page,
    QuotaClass, QuotaSettings,
};

pub mod header_filter;
pub mod memory;
pub mod rgw;
pub mod swift;

pub type AdminClient = Box<dyn StorageAdmin + Send + Sync>;
pub type DataClient = Box<dyn ObjectData + Send + Sync>;
pub type Connector = Box<dyn ObjectDataConnector + Send + Sync>;

/// Admin handles for both clusters plus the data-plane connector.
#[derive(Clone)]
pub struct ClusterPair {
    pub source_admin: AdminClient,
    pub target_admin: AdminClient,
    pub connector: Connector,
}

/// Identity, quota and container-ownership administration of one cluster.
#[async_trait]
pub trait StorageAdmin: DynClone {
    async fn check_connection(&self) -> Result<()>;
    async fn list_identities(&self, marker: Option<&str>, max_entries: i32) -> Result<Page<String>>;
    async fn get_identity(&self, id: &str) -> Result<Option<Identity>>;
    async fn create_identity(&self, id: &str, display_name: &str) -> Result<Identity>;
    async fn get_quota(&self, id: &str, class: QuotaClass) -> Result<QuotaSettings>;
    async fn set_quota(&self, id: &str, class: QuotaClass, settings: &QuotaSettings) -> Result<()>;
    async fn create_credential(&self, id: &str, kind: CredentialKind, access: AccessLevel) -> Result<()>;
    async fn list_containers(&self, marker: Option<&str>, max_entries: i32) -> Result<Page<String>>;
    async fn list_containers_for_owner(
        &self,
        owner: &str,
        marker: Option<&str>,
        max_entries: i32,
    ) -> Result<Page<String>>;
    async fn get_container_owner(&self, name: &str) -> Result<Option<String>>;
    async fn link_container_owner(&self, name: &str, owner: &str) -> Result<()>;
    async fn unlink_container_owner(&self, name: &str) -> Result<()>;
}

/// Object data plane of one cluster, authenticated as one identity.
#[async_trait]
pub trait ObjectData: DynClone {
    async fn head_container(&self, name: &str) -> Result<Option<Headers>>;
    async fn put_container(&self, name: &str, headers: &Headers) -> Result<()>;
    async fn list_objects(
        &self,
        container: &str,
        marker: Option<&str>,
        limit: i32,
    ) -> Result<Page<ObjectRecord>>;
    async fn head_object(&self, container: &str, key: &str) -> Result<Option<ObjectRecord>>;
    async fn get_object_stream(&self, container: &str, key: &str) -> Result<ObjectBody>;
    async fn put_object(
        &self,
        container: &str,
        key: &str,
        body: ObjectBody,
        headers: &Headers,
    ) -> Result<()>;
    async fn delete_object(&self, container: &str, key: &str) -> Result<()>;
}

#[async_trait]
pub trait ObjectDataConnector: DynClone {
    async fn connect(&self, endpoint: &DataEndpoint) -> Result<DataClient>;
}

dyn_clone::clone_trait_object!(StorageAdmin);
dyn_clone::clone_trait_object!(ObjectData);
dyn_clone::clone_trait_object!(ObjectDataConnector);

/// An object body in flight. Never buffered as a whole unless a consumer collects it.
pub struct ObjectBody {
    stream: BoxStream<'static, Result<Bytes>>,
    content_length: Option<u64>,
}

impl ObjectBody {
    pub fn empty() -> Self {
        Self {
            stream: stream::empty().boxed(),
            content_length: Some(0),
        }
    }

    pub fn from_bytes(bytes: Bytes) -> Self {
        let content_length = Some(bytes.len() as u64);
        Self {
            stream: stream::once(async move { Ok(bytes) }).boxed(),
            content_length,
        }
    }

    pub fn from_stream(stream: BoxStream<'static, Result<Bytes>>, content_length: Option<u64>) -> Self {
        Self {
            stream,
            content_length,
        }
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn into_stream(self) -> BoxStream<'static, Result<Bytes>> {
        self.stream
    }

    pub async fn collect(self) -> Result<Bytes> {
        let buffer = self
            .stream
            .try_fold(BytesMut::new(), |mut buffer, chunk| async move {
                buffer.extend_from_slice(&chunk);
                Ok(buffer)
            })
            .await?;

        Ok(buffer.freeze())
    }
}

impl Debug for ObjectBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBody")
            .field("content_length", &self.content_length)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[tokio::test]
    async fn collect_empty_body() {
        let body = ObjectBody::empty();
        assert_eq!(body.content_length(), Some(0));
        assert!(body.collect().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn collect_chunked_body() {
        let chunks = vec![
            Ok(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"def")),
        ];
        let body = ObjectBody::from_stream(stream::iter(chunks).boxed(), None);
        assert_eq!(body.content_length(), None);
        assert_eq!(body.collect().await.unwrap(), Bytes::from_static(b"abcdef"));
    }

    #[tokio::test]
    async fn collect_body_with_error() {
        let chunks = vec![Ok(Bytes::from_static(b"abc")), Err(anyhow!("broken"))];
        let body = ObjectBody::from_stream(stream::iter(chunks).boxed(), Some(6));
        assert!(body.collect().await.is_err());
    }

    #[tokio::test]
    async fn from_bytes_sets_length() {
        let body = ObjectBody::from_bytes(Bytes::from_static(b"12345"));
        assert_eq!(body.content_length(), Some(5));
        assert_eq!(format!("{body:?}"), "ObjectBody { content_length: Some(5) }");
    }
}
