use async_trait::async_trait;

use crate::pipeline::diff_detector::{DiffDetectionStrategy, DiffDetector, Divergence};
use crate::storage::ObjectData;
use crate::types::ObjectRecord;

/// Every object is transferred. The put overwrites, so nothing is deleted first.
pub struct AlwaysDifferentDiffDetector;

#[async_trait]
impl DiffDetectionStrategy for AlwaysDifferentDiffDetector {
    async fn classify(
        &self,
        _source: &(dyn ObjectData + Send + Sync),
        _source_object: &ObjectRecord,
        target_object: Option<&ObjectRecord>,
    ) -> anyhow::Result<Divergence> {
        if target_object.is_none() {
            return Ok(Divergence::Missing);
        }

        Ok(Divergence::Unknown)
    }
}

impl AlwaysDifferentDiffDetector {
    pub fn boxed_new() -> DiffDetector {
        Box::new(AlwaysDifferentDiffDetector {})
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::memory::InMemoryCluster;
    use crate::types::Headers;

    use super::*;

    fn record(size: u64, fingerprint: &str) -> ObjectRecord {
        ObjectRecord {
            container: "photos".to_string(),
            key: "x.jpg".to_string(),
            size,
            fingerprint: fingerprint.to_string(),
            manifest: None,
            headers: Headers::new(),
        }
    }

    #[tokio::test]
    async fn check_different() {
        init_dummy_tracing_subscriber();

        let cluster = InMemoryCluster::new("rgw.local", 7480);
        let source = crate::pipeline::tests_support::data_client(&cluster).await;
        let diff_detector = AlwaysDifferentDiffDetector::boxed_new();

        let source_object = record(1024, "abc");
        assert_eq!(
            diff_detector
                .classify(&*source, &source_object, Some(&source_object.clone()))
                .await
                .unwrap(),
            Divergence::Unknown
        );
        assert_eq!(
            diff_detector
                .classify(&*source, &source_object, None)
                .await
                .unwrap(),
            Divergence::Missing
        );
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
