use async_trait::async_trait;
use tracing::{debug, warn};

use crate::pipeline::diff_detector::{DiffDetectionStrategy, DiffDetector, Divergence};
use crate::storage::ObjectData;
use crate::types::ObjectRecord;

const FILTER_NAME: &str = "ManifestAwareDiffDetector";

/// Plain objects are equal when size and fingerprint match. A zero-size listing entry may be
/// a manifest, whose real size and manifest pointer come from a HEAD on the source.
pub struct ManifestAwareDiffDetector;

#[async_trait]
impl DiffDetectionStrategy for ManifestAwareDiffDetector {
    async fn classify(
        &self,
        source: &(dyn ObjectData + Send + Sync),
        source_object: &ObjectRecord,
        target_object: Option<&ObjectRecord>,
    ) -> anyhow::Result<Divergence> {
        let Some(target_object) = target_object else {
            return Ok(Divergence::Missing);
        };

        if source_object.size == target_object.size
            && source_object.fingerprint == target_object.fingerprint
        {
            debug!(
                name = FILTER_NAME,
                container = source_object.container.as_str(),
                key = source_object.key.as_str(),
                size = source_object.size,
                "object is up to date."
            );
            return Ok(Divergence::UpToDate);
        }

        if source_object.size != 0 {
            return Ok(Divergence::Stale);
        }

        let head = source
            .head_object(&source_object.container, &source_object.key)
            .await;
        let resolved = match head {
            Ok(Some(resolved)) => resolved,
            Ok(None) => {
                debug!(
                    container = source_object.container.as_str(),
                    key = source_object.key.as_str(),
                    "source object vanished after listing."
                );
                return Ok(Divergence::Stale);
            }
            Err(e) => {
                warn!(
                    container = source_object.container.as_str(),
                    key = source_object.key.as_str(),
                    error = e.to_string(),
                    "source HEAD failed, object is treated as stale."
                );
                return Ok(Divergence::Stale);
            }
        };

        let Some(manifest) = resolved.manifest.as_deref() else {
            return Ok(Divergence::Stale);
        };

        if resolved.size == target_object.size && Some(manifest) == target_object.manifest.as_deref()
        {
            debug!(
                name = FILTER_NAME,
                container = source_object.container.as_str(),
                key = source_object.key.as_str(),
                manifest = manifest,
                size = resolved.size,
                "manifest object is up to date."
            );
            return Ok(Divergence::UpToDate);
        }

        Ok(Divergence::Stale)
    }
}

impl ManifestAwareDiffDetector {
    pub fn boxed_new() -> DiffDetector {
        Box::new(ManifestAwareDiffDetector {})
    }
}

#[cfg(test)]
mod tests {
    use crate::pipeline::tests_support::{OWNER, data_client};
    use crate::storage::memory::InMemoryCluster;
    use crate::types::Headers;

    use super::*;

    const MANIFEST: &str = "photos_segments/big.bin/seg";

    fn record(key: &str, size: u64, fingerprint: &str, manifest: Option<&str>) -> ObjectRecord {
        ObjectRecord {
            container: "photos".to_string(),
            key: key.to_string(),
            size,
            fingerprint: fingerprint.to_string(),
            manifest: manifest.map(str::to_string),
            headers: Headers::new(),
        }
    }

    fn source_with_manifest(resolved_size: u64) -> InMemoryCluster {
        let cluster = InMemoryCluster::new("rgw.local", 7480);
        cluster.seed_identity(OWNER, "Owner");
        cluster.seed_container("photos", OWNER, Headers::new());
        cluster.seed_manifest_object("photos", "big.bin", MANIFEST, Some(resolved_size), Headers::new());
        cluster.seed_object("photos", "empty.txt", Vec::<u8>::new(), Headers::new());
        cluster
    }

    #[tokio::test]
    async fn plain_object_decisions() {
        init_dummy_tracing_subscriber();

        let cluster = InMemoryCluster::new("rgw.local", 7480);
        let source = data_client(&cluster).await;
        let diff_detector = ManifestAwareDiffDetector::boxed_new();
        let source_object = record("x.jpg", 1024, "abc", None);

        assert_eq!(
            diff_detector
                .classify(&*source, &source_object, None)
                .await
                .unwrap(),
            Divergence::Missing
        );
        assert_eq!(
            diff_detector
                .classify(&*source, &source_object, Some(&record("x.jpg", 1024, "abc", None)))
                .await
                .unwrap(),
            Divergence::UpToDate
        );
        assert_eq!(
            diff_detector
                .classify(&*source, &source_object, Some(&record("x.jpg", 1024, "abd", None)))
                .await
                .unwrap(),
            Divergence::Stale
        );
        assert_eq!(
            diff_detector
                .classify(&*source, &source_object, Some(&record("x.jpg", 1000, "abc", None)))
                .await
                .unwrap(),
            Divergence::Stale
        );
    }

    #[tokio::test]
    async fn manifest_object_is_up_to_date() {
        init_dummy_tracing_subscriber();

        let cluster = source_with_manifest(50_000_000);
        let source = data_client(&cluster).await;
        let diff_detector = ManifestAwareDiffDetector::boxed_new();

        let listed = record("big.bin", 0, "d41d8cd98f00b204e9800998ecf8427e", None);
        let target = record("big.bin", 50_000_000, "\"other\"", Some(MANIFEST));

        assert_eq!(
            diff_detector
                .classify(&*source, &listed, Some(&target))
                .await
                .unwrap(),
            Divergence::UpToDate
        );
    }

    #[tokio::test]
    async fn manifest_object_is_stale() {
        init_dummy_tracing_subscriber();

        let cluster = source_with_manifest(50_000_000);
        let source = data_client(&cluster).await;
        let diff_detector = ManifestAwareDiffDetector::boxed_new();

        let listed = record("big.bin", 0, "d41d8cd98f00b204e9800998ecf8427e", None);

        let different_size = record("big.bin", 49_999_999, "\"etag\"", Some(MANIFEST));
        assert_eq!(
            diff_detector
                .classify(&*source, &listed, Some(&different_size))
                .await
                .unwrap(),
            Divergence::Stale
        );

        let different_manifest = record("big.bin", 50_000_000, "\"etag\"", Some("other/prefix"));
        assert_eq!(
            diff_detector
                .classify(&*source, &listed, Some(&different_manifest))
                .await
                .unwrap(),
            Divergence::Stale
        );

        let plain_target = record("big.bin", 50_000_000, "abc", None);
        assert_eq!(
            diff_detector
                .classify(&*source, &listed, Some(&plain_target))
                .await
                .unwrap(),
            Divergence::Stale
        );
    }

    #[tokio::test]
    async fn zero_size_plain_object_differs() {
        init_dummy_tracing_subscriber();

        let cluster = source_with_manifest(1);
        let source = data_client(&cluster).await;
        let diff_detector = ManifestAwareDiffDetector::boxed_new();

        let listed = record("empty.txt", 0, "d41d8cd98f00b204e9800998ecf8427e", None);
        let target = record("empty.txt", 5, "abc", None);

        assert_eq!(
            diff_detector
                .classify(&*source, &listed, Some(&target))
                .await
                .unwrap(),
            Divergence::Stale
        );
    }

    #[tokio::test]
    async fn vanished_source_is_stale() {
        init_dummy_tracing_subscriber();

        let cluster = source_with_manifest(1);
        let source = data_client(&cluster).await;
        let diff_detector = ManifestAwareDiffDetector::boxed_new();

        let listed = record("gone.bin", 0, "d41d8cd98f00b204e9800998ecf8427e", None);
        let target = record("gone.bin", 5, "abc", Some(MANIFEST));

        assert_eq!(
            diff_detector
                .classify(&*source, &listed, Some(&target))
                .await
                .unwrap(),
            Divergence::Stale
        );
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
