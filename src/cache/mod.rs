//! Persistent fingerprint cache.
//!
//! Re-hashing an unchanged multi-gigabyte tree is the single largest cost
//! of a repeat scan, so digests are persisted in a small SQLite store keyed
//! by canonical path. A stored digest is reused only when the file's
//! current (size, mtime) pair equals the stored pair.
//!
//! # Architecture
//!
//! * [`store`]: SQLite persistence, advisory locking, batched writes.
//! * [`entry`]: the row model and its validity rule.
//!
//! # Concurrency
//!
//! The store is process-private: an `fs2` advisory lock is taken on a
//! sidecar file at open, and a second concurrent open fails with
//! [`CacheError::Locked`]. Within the process, reads are serialized by the
//! store's internal mutex; writes are buffered in memory and committed in
//! one transaction at scan end, so readers observe a point-in-time
//! snapshot.

pub mod entry;
pub mod store;

pub use entry::CachedDigest;
pub use store::{CacheError, CacheResult, CacheStats, FingerprintCache, DEFAULT_RETENTION};
