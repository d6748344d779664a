//! OpenStack Swift v1 data-plane client.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures_util::stream::{StreamExt, TryStreamExt};
use reqwest::header::{CONTENT_LENGTH, HeaderMap};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::storage::{DataClient, ObjectBody, ObjectData, ObjectDataConnector};
use crate::types::error::MigrateError;
use crate::types::{
    CONTENT_LENGTH_HEADER, DataEndpoint, ETAG_HEADER, Headers, MANIFEST_HEADER, ObjectRecord, Page,
};

const AUTH_PATH: &str = "/auth";
const AUTH_USER_HEADER: &str = "X-Auth-User";
const AUTH_KEY_HEADER: &str = "X-Auth-Key";
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
const STORAGE_URL_HEADER: &str = "X-Storage-Url";

/// Opens one authenticated [`SwiftClient`] per endpoint.
#[derive(Clone)]
pub struct SwiftConnector {
    http: reqwest::Client,
    https: bool,
}

impl SwiftConnector {
    pub fn new(client_config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            http: client_config.build_http_client()?,
            https: client_config.https,
        })
    }
}

#[async_trait]
impl ObjectDataConnector for SwiftConnector {
    async fn connect(&self, endpoint: &DataEndpoint) -> Result<DataClient> {
        let auth_url = format!("{}{}", endpoint.account.base_url(self.https), AUTH_PATH);
        let response = self
            .http
            .get(&auth_url)
            .header(AUTH_USER_HEADER, &endpoint.credential.user)
            .header(AUTH_KEY_HEADER, &endpoint.credential.secret_key)
            .send()
            .await
            .with_context(|| format!("authentication request to {auth_url} failed."))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!(
                "authentication of {} failed: {status}",
                endpoint.credential.user
            ));
        }

        let storage_url = header_value(response.headers(), STORAGE_URL_HEADER)
            .ok_or_else(|| anyhow!("authentication response carries no storage url."))?;
        let token = header_value(response.headers(), AUTH_TOKEN_HEADER)
            .ok_or_else(|| anyhow!("authentication response carries no token."))?;

        trace!(
            user = endpoint.credential.user.as_str(),
            storage_url = storage_url.as_str(),
            "authenticated."
        );

        Ok(Box::new(SwiftClient {
            http: self.http.clone(),
            storage_url: storage_url.trim_end_matches('/').to_string(),
            token,
        }))
    }
}

#[derive(Clone)]
pub struct SwiftClient {
    http: reqwest::Client,
    storage_url: String,
    token: String,
}

#[derive(Deserialize)]
struct ListedObject {
    name: String,
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    hash: String,
}

impl SwiftClient {
    fn container_url(&self, container: &str) -> String {
        format!("{}/{}", self.storage_url, urlencoding::encode(container))
    }

    fn object_url(&self, container: &str, key: &str) -> String {
        format!("{}/{}", self.container_url(container), encode_key(key))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(AUTH_TOKEN_HEADER, &self.token)
    }

    async fn send(&self, builder: RequestBuilder, description: &str) -> Result<Response> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("{description} failed."))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(anyhow::Error::from(MigrateError::NotFound))
                .with_context(|| format!("{description} returned 404."));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("{description} failed: {status} {body}"));
        }

        Ok(response)
    }
}

#[async_trait]
impl ObjectData for SwiftClient {
    async fn head_container(&self, name: &str) -> Result<Option<Headers>> {
        let response = self
            .request(Method::HEAD, &self.container_url(name))
            .send()
            .await
            .with_context(|| format!("HEAD container {name} failed."))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(to_headers(response.headers()))),
            status => Err(anyhow!("HEAD container {name} failed: {status}")),
        }
    }

    async fn put_container(&self, name: &str, headers: &Headers) -> Result<()> {
        let builder = with_headers(self.request(Method::PUT, &self.container_url(name)), headers);
        self.send(builder, &format!("PUT container {name}")).await?;

        Ok(())
    }

    async fn list_objects(
        &self,
        container: &str,
        marker: Option<&str>,
        limit: i32,
    ) -> Result<Page<ObjectRecord>> {
        let mut query = vec![
            ("format", "json".to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(marker) = marker {
            query.push(("marker", marker.to_string()));
        }

        let builder = self
            .request(Method::GET, &self.container_url(container))
            .query(&query);
        let listed: Vec<ListedObject> = self
            .send(builder, &format!("GET container {container}"))
            .await?
            .json()
            .await
            .with_context(|| MigrateError::Listing(format!("malformed listing of {container}.")))?;

        let next_marker = if listed.len() >= limit.max(1) as usize {
            listed.last().map(|object| object.name.clone())
        } else {
            None
        };

        Ok(Page {
            items: listed
                .into_iter()
                .map(|object| ObjectRecord {
                    container: container.to_string(),
                    key: object.name,
                    size: object.bytes,
                    fingerprint: object.hash,
                    manifest: None,
                    headers: Headers::new(),
                })
                .collect(),
            next_marker,
        })
    }

    async fn head_object(&self, container: &str, key: &str) -> Result<Option<ObjectRecord>> {
        let response = self
            .request(Method::HEAD, &self.object_url(container, key))
            .send()
            .await
            .with_context(|| format!("HEAD object {container}/{key} failed."))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(anyhow!("HEAD object {container}/{key} failed: {status}"));
        }

        let headers = to_headers(response.headers());
        let size = headers
            .get(CONTENT_LENGTH_HEADER)
            .and_then(|length| length.parse::<u64>().ok())
            .unwrap_or_default();

        Ok(Some(ObjectRecord {
            container: container.to_string(),
            key: key.to_string(),
            size,
            fingerprint: headers.get(ETAG_HEADER).cloned().unwrap_or_default(),
            manifest: headers.get(MANIFEST_HEADER).cloned(),
            headers,
        }))
    }

    async fn get_object_stream(&self, container: &str, key: &str) -> Result<ObjectBody> {
        let builder = self.request(Method::GET, &self.object_url(container, key));
        let response = self
            .send(builder, &format!("GET object {container}/{key}"))
            .await?;

        let content_length = response.content_length();
        let stream = response
            .bytes_stream()
            .map_err(anyhow::Error::from)
            .boxed();

        Ok(ObjectBody::from_stream(stream, content_length))
    }

    async fn put_object(
        &self,
        container: &str,
        key: &str,
        body: ObjectBody,
        headers: &Headers,
    ) -> Result<()> {
        let content_length = body.content_length();
        let mut builder = with_headers(
            self.request(Method::PUT, &self.object_url(container, key)),
            headers,
        );
        if let Some(content_length) = content_length {
            builder = builder.header(CONTENT_LENGTH, content_length);
        }

        let stream = body
            .into_stream()
            .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { e.into() });
        builder = builder.body(reqwest::Body::wrap_stream(stream));

        self.send(builder, &format!("PUT object {container}/{key}"))
            .await?;

        Ok(())
    }

    async fn delete_object(&self, container: &str, key: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &self.object_url(container, key))
            .send()
            .await
            .with_context(|| format!("DELETE object {container}/{key} failed."))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(container = container, key = key, "object already deleted.");
                Ok(())
            }
            status if status.is_success() => Ok(()),
            status => Err(anyhow!("DELETE object {container}/{key} failed: {status}")),
        }
    }
}

/// Percent-encodes every path segment of `key`, keeping the separators.
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn to_headers(headers: &HeaderMap) -> Headers {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
        })
        .collect()
}

fn with_headers(mut builder: RequestBuilder, headers: &Headers) -> RequestBuilder {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    fn client() -> SwiftClient {
        SwiftClient {
            http: reqwest::Client::new(),
            storage_url: "http://rgw1.local:7480/swift/v1".to_string(),
            token: "token".to_string(),
        }
    }

    #[test]
    fn object_url_encodes_segments() {
        assert_eq!(
            client().object_url("photos 2024", "a b/c#d/é.jpg"),
            "http://rgw1.local:7480/swift/v1/photos%202024/a%20b/c%23d/%C3%A9.jpg"
        );
        assert_eq!(
            client().object_url("photos", "big.bin/seg/0001"),
            "http://rgw1.local:7480/swift/v1/photos/big.bin/seg/0001"
        );
    }

    #[test]
    fn response_headers_are_lowercased() {
        let mut header_map = HeaderMap::new();
        header_map.insert("X-Object-Manifest", HeaderValue::from_static("segments/big"));
        header_map.insert("Content-Type", HeaderValue::from_static("image/jpeg"));

        let headers = to_headers(&header_map);
        assert_eq!(headers.get("x-object-manifest").unwrap(), "segments/big");
        assert_eq!(headers.get("content-type").unwrap(), "image/jpeg");
        assert_eq!(
            header_value(&header_map, "x-object-manifest").as_deref(),
            Some("segments/big")
        );
        assert!(header_value(&header_map, STORAGE_URL_HEADER).is_none());
    }

    #[test]
    fn listing_deserialization() {
        let listed: Vec<ListedObject> = serde_json::from_str(
            r#"[
                {"name": "x.jpg", "bytes": 1024, "hash": "abc", "content_type": "image/jpeg"},
                {"name": "big.bin", "bytes": 0, "hash": "d41d8cd98f00b204e9800998ecf8427e"}
            ]"#,
        )
        .unwrap();

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "x.jpg");
        assert_eq!(listed[0].bytes, 1024);
        assert_eq!(listed[1].bytes, 0);
    }
}
