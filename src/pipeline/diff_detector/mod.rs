use anyhow::Result;
use async_trait::async_trait;

use crate::storage::ObjectData;
use crate::types::ObjectRecord;

pub mod always_different_diff_detector;
pub mod manifest_aware_diff_detector;

pub type DiffDetector = Box<dyn DiffDetectionStrategy + Send + Sync>;

/// Outcome of comparing one source object with its counterpart on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Divergence {
    /// no object on the target
    Missing,
    UpToDate,
    /// the target holds different content; it is deleted before the transfer
    Stale,
    /// the comparison itself could not be made; transferred without a delete
    Unknown,
}

impl Divergence {
    pub fn needs_transfer(&self) -> bool {
        *self != Divergence::UpToDate
    }

    pub fn requires_delete(&self) -> bool {
        *self == Divergence::Stale
    }
}

#[async_trait]
pub trait DiffDetectionStrategy {
    /// `source_object` is the listing entry. `source` is consulted when the listing is not
    /// authoritative for the object's content.
    async fn classify(
        &self,
        source: &(dyn ObjectData + Send + Sync),
        source_object: &ObjectRecord,
        target_object: Option<&ObjectRecord>,
    ) -> Result<Divergence>;
}
