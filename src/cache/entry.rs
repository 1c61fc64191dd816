//! Cache row model.

use std::path::PathBuf;

use crate::scanner::{Digest, DigestAlgorithm};

/// One persisted fingerprint row.
///
/// Invariant: the digest is only trusted for a file whose current
/// (size, mtime) equals the stored pair; anything else is a miss and the
/// row gets overwritten after re-hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedDigest {
    /// Absolute canonical path (primary key).
    pub path: PathBuf,
    /// Algorithm of the stored digest.
    pub algo: DigestAlgorithm,
    /// Raw digest bytes.
    pub digest: Vec<u8>,
    /// File size at hash time.
    pub size: u64,
    /// Modification time at hash time, epoch seconds.
    pub mtime: i64,
    /// Epoch seconds of the last scan that touched this row.
    pub last_seen: i64,
}

impl CachedDigest {
    /// Whether the row may be reused for a file with the given metadata.
    #[must_use]
    pub fn is_current(&self, size: u64, mtime: i64) -> bool {
        self.size == size && self.mtime == mtime
    }

    /// Rehydrate the stored bytes into a [`Digest`].
    #[must_use]
    pub fn to_digest(&self) -> Digest {
        Digest::new(self.algo, self.digest.clone())
    }
}
