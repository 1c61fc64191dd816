//! File discovery and content fingerprinting.
//!
//! The scanner owns the first half of the pipeline:
//!
//! - [`walker`]: filtered directory traversal producing [`FileRecord`]
//!   skeletons
//! - [`hasher`]: streamed digest computation and byte-level comparison
//! - [`pipeline`]: the producer/worker plumbing that connects the two and
//!   consults the fingerprint cache
//!
//! # Example
//!
//! ```no_run
//! use dupesweep::scanner::{Walker, WalkOptions};
//! use std::path::PathBuf;
//!
//! let opts = WalkOptions {
//!     min_size: 1024,
//!     ..Default::default()
//! };
//! let walker = Walker::new(vec![PathBuf::from("/home/user/Downloads")], opts);
//! for record in walker.walk() {
//!     match record {
//!         Ok(r) => println!("{}: {} bytes", r.path.display(), r.size),
//!         Err(e) => eprintln!("warning: {}", e),
//!     }
//! }
//! ```

pub mod hasher;
pub mod pipeline;
pub mod walker;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub use hasher::{files_identical, hash_file, Deadline, FAST_PREFIX_LEN};
pub use pipeline::{fingerprint_files, PipelineCounters, PipelineOptions};
pub use walker::Walker;

/// Content digest algorithms.
///
/// The algorithm is carried inside every [`Digest`] so records produced
/// under different modes can never compare equal by accident. `Fast64` is
/// the only non-cryptographic member and is never comparable with the
/// strong algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// MD5, 128-bit. The default strong algorithm.
    Md5,
    /// SHA-256.
    Sha256,
    /// SHA-512.
    Sha512,
    /// File size plus XxHash64 of the first 64 KiB. Fast mode only.
    Fast64,
}

impl DigestAlgorithm {
    /// Short tag used in the cache store, reports, and the audit log.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Fast64 => "fast64",
        }
    }

    /// Parse a stored tag back into an algorithm.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "md5" => Some(Self::Md5),
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            "fast64" => Some(Self::Fast64),
            _ => None,
        }
    }

    /// Whether the algorithm hashes full file contents.
    #[must_use]
    pub fn is_strong(self) -> bool {
        !matches!(self, Self::Fast64)
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// An algorithm-tagged content fingerprint.
///
/// Equality requires both the algorithm and the bytes to match, which is
/// what keeps fast-mode and strong-mode records from ever landing in the
/// same duplicate group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest {
    /// Algorithm that produced the bytes.
    pub algo: DigestAlgorithm,
    /// Raw digest bytes (16/32/64 for strong modes, 16 for fast mode).
    pub bytes: Vec<u8>,
}

impl Digest {
    /// Create a digest from raw bytes.
    #[must_use]
    pub fn new(algo: DigestAlgorithm, bytes: Vec<u8>) -> Self {
        Self { algo, bytes }
    }

    /// Lowercase hexadecimal rendering of the digest bytes.
    #[must_use]
    pub fn to_hex(&self) -> String {
        use fmt::Write as _;
        let mut out = String::with_capacity(self.bytes.len() * 2);
        for b in &self.bytes {
            let _ = write!(out, "{b:02x}");
        }
        out
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algo, self.to_hex())
    }
}

/// One candidate file, as discovered by the walker and fingerprinted by the
/// pipeline.
///
/// The path is canonical and was a regular file at discovery time. `dev`
/// identifies the filesystem the file lives on and decides hardlink
/// eligibility later in the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute canonical path.
    pub path: PathBuf,
    /// Size in bytes at discovery.
    pub size: u64,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: i64,
    /// Device id of the containing filesystem.
    pub dev: u64,
    /// Content digest; `None` until the fingerprint pipeline fills it.
    pub digest: Option<Digest>,
}

impl FileRecord {
    /// Create a record skeleton (no digest yet).
    #[must_use]
    pub fn new(path: PathBuf, size: u64, mtime: i64, dev: u64) -> Self {
        Self {
            path,
            size,
            mtime,
            dev,
            digest: None,
        }
    }
}

/// Walker configuration.
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Canonicalized paths whose subtrees are pruned without descent.
    pub exclude: Vec<PathBuf>,
    /// Basename globs; when non-empty a file must match at least one.
    pub patterns: Vec<String>,
    /// Minimum size in bytes (inclusive).
    pub min_size: u64,
    /// Maximum size in bytes (inclusive); `None` means unbounded.
    pub max_size: Option<u64>,
    /// Maximum traversal depth below each root; `None` means unbounded.
    pub max_depth: Option<usize>,
    /// Include dot-named files and descend into dot-named directories.
    pub include_hidden: bool,
    /// Follow symlinks to directories (with cycle detection).
    pub follow_symlinks: bool,
    /// Include zero-byte files.
    pub include_empty: bool,
}

/// Errors surfaced during directory traversal.
///
/// All of these are recovered locally: the entry is skipped and a counter
/// is incremented.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied descending a subtree.
    #[error("permission denied: {0}")]
    Denied(PathBuf),

    /// Transient I/O error while stat'ing an entry.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced during fingerprinting. Recovered per file.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The per-file hashing deadline was exceeded.
    #[error("hashing timed out: {0}")]
    Timeout(PathBuf),

    /// I/O error reading the file.
    #[error("read error for {path}: {source}")]
    Read {
        /// Path where the error occurred.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_equality_includes_algorithm() {
        let a = Digest::new(DigestAlgorithm::Md5, vec![1, 2, 3]);
        let b = Digest::new(DigestAlgorithm::Fast64, vec![1, 2, 3]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_digest_hex() {
        let d = Digest::new(DigestAlgorithm::Sha256, vec![0xab, 0xcd, 0x01]);
        assert_eq!(d.to_hex(), "abcd01");
        assert_eq!(d.to_string(), "sha256:abcd01");
    }

    #[test]
    fn test_algorithm_tags_round_trip() {
        for algo in [
            DigestAlgorithm::Md5,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha512,
            DigestAlgorithm::Fast64,
        ] {
            assert_eq!(DigestAlgorithm::from_tag(algo.tag()), Some(algo));
        }
        assert_eq!(DigestAlgorithm::from_tag("crc32"), None);
    }

    #[test]
    fn test_fast_is_not_strong() {
        assert!(DigestAlgorithm::Sha512.is_strong());
        assert!(!DigestAlgorithm::Fast64.is_strong());
    }

    #[test]
    fn test_file_record_new() {
        let r = FileRecord::new(PathBuf::from("/a"), 10, 1000, 7);
        assert_eq!(r.size, 10);
        assert!(r.digest.is_none());
    }

    #[test]
    fn test_walk_options_default() {
        let opts = WalkOptions::default();
        assert_eq!(opts.min_size, 0);
        assert!(opts.max_size.is_none());
        assert!(!opts.include_hidden);
        assert!(!opts.follow_symlinks);
        assert!(!opts.include_empty);
    }
}
