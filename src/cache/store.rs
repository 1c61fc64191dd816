//! SQLite-backed fingerprint store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use fs2::FileExt;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use super::entry::CachedDigest;
use crate::scanner::{Digest, DigestAlgorithm};

/// Default retention window for rows not seen by any scan.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Errors from cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Another run holds the advisory lock on this store.
    #[error("cache store is locked by another run: {0}")]
    Locked(PathBuf),

    /// SQLite error.
    #[error("cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error on the store or lock file.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Hit/miss/write counters, observable after the run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups satisfied from the store.
    pub hits: u64,
    /// Lookups that required hashing.
    pub misses: u64,
    /// Rows written back at flush.
    pub writes: u64,
}

struct PendingRow {
    path: PathBuf,
    digest: Digest,
    size: u64,
    mtime: i64,
}

/// The persistent fingerprint cache.
///
/// One file, single writer, WAL journaling. Lookups go straight to the
/// database; write-backs are buffered and committed in a single
/// transaction by [`flush`](Self::flush) at scan end.
pub struct FingerprintCache {
    conn: Mutex<Connection>,
    pending: Mutex<Vec<PendingRow>>,
    algo: DigestAlgorithm,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    // Held for the life of the run; dropping releases the advisory lock.
    _lock: fs::File,
}

impl FingerprintCache {
    /// Open or create the store at `path`.
    ///
    /// Takes the advisory lock, initializes the schema, restricts the file
    /// mode to 0600, evicts rows older than `retention`, and evicts rows
    /// whose algorithm differs from `algo` (digests computed under another
    /// algorithm are never comparable, so keeping them only wastes space).
    ///
    /// # Errors
    ///
    /// [`CacheError::Locked`] when another run holds the lock; database
    /// and I/O errors otherwise.
    pub fn open(path: &Path, algo: DigestAlgorithm, retention: Duration) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_path = path.with_extension("lock");
        let lock = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        if lock.try_lock_exclusive().is_err() {
            return Err(CacheError::Locked(path.to_path_buf()));
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS digests (
                path      TEXT PRIMARY KEY,
                algo      TEXT NOT NULL,
                digest    BLOB NOT NULL,
                size      INTEGER NOT NULL,
                mtime     INTEGER NOT NULL,
                last_seen INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_digests_digest ON digests (digest)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_digests_size ON digests (size)",
            [],
        )?;

        restrict_permissions(path);
        restrict_permissions(&lock_path);

        let cache = Self {
            conn: Mutex::new(conn),
            pending: Mutex::new(Vec::new()),
            algo,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            _lock: lock,
        };

        let cutoff = now_epoch() - retention.as_secs() as i64;
        let evicted = cache.evict_older_than(cutoff)?;
        if evicted > 0 {
            log::debug!("cache: evicted {} stale rows", evicted);
        }
        let mismatched = cache.evict_algorithm_mismatch()?;
        if mismatched > 0 {
            log::debug!(
                "cache: evicted {} rows from a different algorithm",
                mismatched
            );
        }

        Ok(cache)
    }

    /// Look up a digest for `path`, valid only if (size, mtime) match.
    ///
    /// Counts a hit or a miss either way.
    pub fn lookup(&self, path: &Path, size: u64, mtime: i64) -> Option<Digest> {
        let row = self.fetch(path);
        match row {
            Some(ref cached) if cached.is_current(size, mtime) && cached.algo == self.algo => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(cached.to_digest())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn fetch(&self, path: &Path) -> Option<CachedDigest> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT algo, digest, size, mtime, last_seen FROM digests WHERE path = ?1",
            params![path.to_string_lossy()],
            |row| {
                let tag: String = row.get(0)?;
                Ok((
                    tag,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )
        .optional()
        .ok()
        .flatten()
        .and_then(|(tag, digest, size, mtime, last_seen)| {
            Some(CachedDigest {
                path: path.to_path_buf(),
                algo: DigestAlgorithm::from_tag(&tag)?,
                digest,
                size: size as u64,
                mtime,
                last_seen,
            })
        })
    }

    /// Queue a write-back. Nothing touches the database until
    /// [`flush`](Self::flush).
    pub fn record(&self, path: &Path, digest: &Digest, size: u64, mtime: i64) {
        self.pending.lock().unwrap().push(PendingRow {
            path: path.to_path_buf(),
            digest: digest.clone(),
            size,
            mtime,
        });
    }

    /// Commit all queued write-backs in a single transaction.
    ///
    /// # Errors
    ///
    /// Database errors; the pending queue is drained regardless so a retry
    /// does not duplicate rows.
    pub fn flush(&self) -> CacheResult<usize> {
        let rows: Vec<PendingRow> = std::mem::take(&mut *self.pending.lock().unwrap());
        if rows.is_empty() {
            return Ok(0);
        }

        let now = now_epoch();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO digests (path, algo, digest, size, mtime, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(path) DO UPDATE SET
                   algo = excluded.algo,
                   digest = excluded.digest,
                   size = excluded.size,
                   mtime = excluded.mtime,
                   last_seen = excluded.last_seen",
            )?;
            for row in &rows {
                stmt.execute(params![
                    row.path.to_string_lossy(),
                    row.digest.algo.tag(),
                    row.digest.bytes,
                    row.size as i64,
                    row.mtime,
                    now,
                ])?;
            }
        }
        tx.commit()?;

        self.writes.fetch_add(rows.len() as u64, Ordering::Relaxed);
        Ok(rows.len())
    }

    /// Delete rows whose `last_seen` predates `cutoff` (epoch seconds).
    pub fn evict_older_than(&self, cutoff: i64) -> CacheResult<usize> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM digests WHERE last_seen < ?1", params![cutoff])?;
        Ok(n)
    }

    fn evict_algorithm_mismatch(&self) -> CacheResult<usize> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM digests WHERE algo != ?1",
            params![self.algo.tag()],
        )?;
        Ok(n)
    }

    /// Number of rows currently stored.
    ///
    /// # Errors
    ///
    /// Database errors.
    pub fn len(&self) -> CacheResult<u64> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM digests", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// True when the store holds no rows.
    ///
    /// # Errors
    ///
    /// Database errors.
    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Counters accumulated since open.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        log::warn!("could not restrict {} to 0600: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}
