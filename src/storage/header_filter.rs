use crate::types::{Headers, MANIFEST_HEADER};

const CONTAINER_HEADERS: &[&str] = &[
    "x-storage-policy",
    "default-placement",
    "x-timestamp",
    "x-container-read",
    "x-container-write",
];
const CONTAINER_METADATA_PREFIX: &str = "x-container-meta-";

const OBJECT_HEADERS: &[&str] = &[MANIFEST_HEADER, "content-type", "last-modified", "x-timestamp"];
const OBJECT_METADATA_PREFIX: &str = "x-object-meta-";

/// Headers carried forward when a container is created on the target.
pub fn filter_container_headers(headers: &Headers) -> Headers {
    filter_headers(headers, CONTAINER_HEADERS, CONTAINER_METADATA_PREFIX)
}

/// Headers carried forward when an object is written to the target.
pub fn filter_object_headers(headers: &Headers) -> Headers {
    filter_headers(headers, OBJECT_HEADERS, OBJECT_METADATA_PREFIX)
}

fn filter_headers(headers: &Headers, names: &[&str], prefix: &str) -> Headers {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let name = name.to_ascii_lowercase();
            if names.contains(&name.as_str()) || name.starts_with(prefix) {
                Some((name, value.clone()))
            } else {
                None
            }
        })
        .collect()
}
