//! Duplicate grouping.
//!
//! The grouper consumes the complete multiset of fingerprinted records and
//! emits [`DigestGroup`]s of cardinality ≥ 2. Group ids are dense and
//! assigned in first-seen digest order under a stable sort, so they are
//! deterministic for a fixed input multiset.
//!
//! For very large record sets the sort spills to on-disk runs (see
//! [`spill`]) instead of holding everything in memory.

pub mod grouper;
pub mod similarity;
pub mod spill;

use serde::{Deserialize, Serialize};

use crate::scanner::{Digest, FileRecord};

pub use grouper::{group_records, GrouperStats};
pub use similarity::{ExactMatch, SimilarityProvider, SizeProximity};

/// A confirmed group of byte-identical (same digest, same size) files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestGroup {
    /// Dense id, assigned in first-seen digest order.
    pub id: u64,
    /// Shared content digest.
    pub digest: Digest,
    /// Shared file size in bytes.
    pub size: u64,
    /// Member records; cardinality ≥ 2.
    pub files: Vec<FileRecord>,
}

impl DigestGroup {
    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True when the group holds no members (never produced by the
    /// grouper; possible on deserialized input).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Bytes recoverable if every member but one were removed.
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.size * (self.files.len() as u64).saturating_sub(1)
    }
}
