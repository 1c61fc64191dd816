//! Streamed content digests and byte-level comparison.
//!
//! Files are read in fixed-size chunks so no file is ever fully buffered,
//! and a per-file [`Deadline`] is checked between chunks: a slow or stalled
//! read (network mount, dying disk) costs at most one chunk past the
//! deadline instead of wedging a worker forever.
//!
//! Strong digests cover the full contents with MD5, SHA-256 or SHA-512.
//! The fast digest covers the file size plus an XxHash64 of the first
//! 64 KiB; it carries its own algorithm tag and is never comparable with a
//! strong digest.

use std::fs::File;
use std::hash::Hasher as _;
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

use md5::{Digest as _, Md5};
use sha2::{Sha256, Sha512};
use twox_hash::XxHash64;

use super::{Digest, DigestAlgorithm, HashError};

/// Chunk size for streamed reads.
const CHUNK_LEN: usize = 256 * 1024;

/// Length of the prefix hashed in fast mode.
pub const FAST_PREFIX_LEN: usize = 65_536;

/// A per-file deadline checked between chunk reads.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires: Option<Instant>,
}

impl Deadline {
    /// Deadline `timeout` from now; `None` disables the check.
    #[must_use]
    pub fn after(timeout: Option<Duration>) -> Self {
        Self {
            expires: timeout.map(|t| Instant::now() + t),
        }
    }

    /// No deadline.
    #[must_use]
    pub fn none() -> Self {
        Self { expires: None }
    }

    /// True once the deadline has passed.
    #[must_use]
    pub fn exceeded(&self) -> bool {
        self.expires.is_some_and(|e| Instant::now() > e)
    }
}

/// Compute the content digest of a file.
///
/// # Arguments
///
/// * `path` - File to hash
/// * `algo` - Digest algorithm; [`DigestAlgorithm::Fast64`] hashes only the
///   first [`FAST_PREFIX_LEN`] bytes together with the file size
/// * `deadline` - Per-file deadline, checked between chunks
///
/// # Errors
///
/// [`HashError::Timeout`] when the deadline passes mid-file,
/// [`HashError::Read`] for I/O failures.
pub fn hash_file(path: &Path, algo: DigestAlgorithm, deadline: Deadline) -> Result<Digest, HashError> {
    let mut file = File::open(path).map_err(|e| read_error(path, e))?;

    match algo {
        DigestAlgorithm::Md5 => stream_digest(&mut file, path, deadline, Md5::new(), algo),
        DigestAlgorithm::Sha256 => stream_digest(&mut file, path, deadline, Sha256::new(), algo),
        DigestAlgorithm::Sha512 => stream_digest(&mut file, path, deadline, Sha512::new(), algo),
        DigestAlgorithm::Fast64 => fast_digest(&mut file, path),
    }
}

/// Stream the whole file through a RustCrypto hasher.
fn stream_digest<D: md5::Digest>(
    file: &mut File,
    path: &Path,
    deadline: Deadline,
    mut hasher: D,
    algo: DigestAlgorithm,
) -> Result<Digest, HashError> {
    let mut buf = vec![0u8; CHUNK_LEN];
    loop {
        if deadline.exceeded() {
            return Err(HashError::Timeout(path.to_path_buf()));
        }
        let n = file.read(&mut buf).map_err(|e| read_error(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Digest::new(algo, hasher.finalize().to_vec()))
}

/// Fast digest: big-endian file size followed by XxHash64 of the prefix.
///
/// Embedding the size makes two same-prefix files of different lengths
/// distinguishable without touching more than 64 KiB of either.
fn fast_digest(file: &mut File, path: &Path) -> Result<Digest, HashError> {
    let size = file
        .metadata()
        .map_err(|e| read_error(path, e))?
        .len();

    let mut hasher = XxHash64::with_seed(0);
    let mut remaining = FAST_PREFIX_LEN;
    let mut buf = vec![0u8; CHUNK_LEN.min(FAST_PREFIX_LEN)];
    while remaining > 0 {
        let want = remaining.min(buf.len());
        let n = file
            .read(&mut buf[..want])
            .map_err(|e| read_error(path, e))?;
        if n == 0 {
            break;
        }
        hasher.write(&buf[..n]);
        remaining -= n;
    }

    let mut bytes = Vec::with_capacity(16);
    bytes.extend_from_slice(&size.to_be_bytes());
    bytes.extend_from_slice(&hasher.finish().to_be_bytes());
    Ok(Digest::new(DigestAlgorithm::Fast64, bytes))
}

/// Byte-level comparison of two files, streamed.
///
/// Used by the safety gate to verify fast-mode matches before any
/// destructive action, and by `--verify`.
///
/// # Errors
///
/// [`HashError::Read`] if either file cannot be read.
pub fn files_identical(a: &Path, b: &Path) -> Result<bool, HashError> {
    let mut fa = File::open(a).map_err(|e| read_error(a, e))?;
    let mut fb = File::open(b).map_err(|e| read_error(b, e))?;

    let meta_a = fa.metadata().map_err(|e| read_error(a, e))?;
    let meta_b = fb.metadata().map_err(|e| read_error(b, e))?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }

    let mut buf_a = vec![0u8; 64 * 1024];
    let mut buf_b = vec![0u8; 64 * 1024];
    loop {
        let n = read_full(&mut fa, &mut buf_a).map_err(|e| read_error(a, e))?;
        let m = read_full(&mut fb, &mut buf_b).map_err(|e| read_error(b, e))?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

/// Read until the buffer is full or EOF; returns the bytes read.
fn read_full(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn read_error(path: &Path, error: std::io::Error) -> HashError {
    HashError::Read {
        path: path.to_path_buf(),
        source: error,
    }
}
