//! Walker-to-worker fingerprint pipeline.
//!
//! One producer thread runs the walker and feeds a bounded channel; a pool
//! of worker threads drains it, consulting the fingerprint cache before
//! computing. The bounded channel gives backpressure: on a tree with
//! millions of files the resident record count stays at queue depth plus
//! whatever the workers hold.
//!
//! Completion order is unspecified; the grouper downstream only cares
//! about the multiset of records.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::bounded;

use super::{hash_file, Deadline, DigestAlgorithm, FileRecord, HashError, ScanError, Walker};
use crate::cache::FingerprintCache;
use crate::error::ReasonCode;
use crate::progress::ProgressCallback;
use crate::signal::CancelToken;

/// Fingerprint pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Digest algorithm for this run.
    pub algo: DigestAlgorithm,
    /// Worker count; 0 means one per logical core.
    pub threads: usize,
    /// Per-file hashing deadline.
    pub timeout: Option<Duration>,
    /// Bounded queue depth between walker and workers.
    pub queue_depth: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            algo: DigestAlgorithm::Md5,
            threads: 0,
            timeout: Some(Duration::from_secs(30)),
            queue_depth: 1024,
        }
    }
}

impl PipelineOptions {
    fn effective_threads(&self) -> usize {
        if self.threads > 0 {
            self.threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4)
        }
    }
}

/// Counters accumulated across the walk and fingerprint phases.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    /// Files that passed the walker's filters.
    pub discovered: AtomicU64,
    /// Files with a digest at the end of the phase.
    pub fingerprinted: AtomicU64,
    /// Walk errors (denied subtrees, stat failures).
    pub walk_errors: AtomicU64,
    /// Hash errors, including per-file timeouts.
    pub hash_errors: AtomicU64,
    /// Digests served from the cache.
    pub cache_hits: AtomicU64,
}

impl PipelineCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot a counter.
    #[must_use]
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Run the walk and fingerprint phases to completion.
///
/// Returns every record that received a digest, in unspecified order,
/// together with the counters. Cancellation is honored at the next file
/// boundary on every thread; workers finish the file they are hashing.
pub fn fingerprint_files(
    walker: Walker,
    options: &PipelineOptions,
    cache: Option<Arc<FingerprintCache>>,
    cancel: &CancelToken,
    progress: &dyn ProgressCallback,
) -> (Vec<FileRecord>, PipelineCounters) {
    let counters = PipelineCounters::default();
    let threads = options.effective_threads();
    let (tx, rx) = bounded::<FileRecord>(options.queue_depth.max(1));

    progress.on_phase_start("scanning", 0);

    let records: Vec<FileRecord> = std::thread::scope(|scope| {
        // Producer: the walker runs on its own thread so workers can start
        // hashing while discovery is still in flight.
        let producer_counters = &counters;
        let producer_cancel = cancel.clone();
        scope.spawn(move || {
            for result in walker.walk() {
                if producer_cancel.is_cancelled() {
                    break;
                }
                match result {
                    Ok(record) => {
                        PipelineCounters::bump(&producer_counters.discovered);
                        if tx.send(record).is_err() {
                            break;
                        }
                    }
                    Err(e @ ScanError::Denied(_)) => {
                        log::debug!("{} {}", ReasonCode::WalkDenied, e);
                        PipelineCounters::bump(&producer_counters.walk_errors);
                    }
                    Err(e @ ScanError::Io { .. }) => {
                        log::debug!("{} {}", ReasonCode::WalkIo, e);
                        PipelineCounters::bump(&producer_counters.walk_errors);
                    }
                }
            }
            // Sender drops here; workers drain and exit.
        });

        let mut handles = Vec::with_capacity(threads);
        for _ in 0..threads {
            let rx = rx.clone();
            let cache = cache.clone();
            let worker_cancel = cancel.clone();
            let worker_counters = &counters;
            let algo = options.algo;
            let timeout = options.timeout;
            handles.push(scope.spawn(move || {
                let mut done = Vec::new();
                while let Ok(mut record) = rx.recv() {
                    let digest = cache
                        .as_deref()
                        .and_then(|c| c.lookup(&record.path, record.size, record.mtime))
                        .map(|d| {
                            PipelineCounters::bump(&worker_counters.cache_hits);
                            d
                        })
                        .map_or_else(
                            || {
                                let deadline = Deadline::after(timeout);
                                match hash_file(&record.path, algo, deadline) {
                                    Ok(d) => {
                                        if let Some(c) = cache.as_deref() {
                                            c.record(&record.path, &d, record.size, record.mtime);
                                        }
                                        Some(d)
                                    }
                                    Err(e) => {
                                        let code = match e {
                                            HashError::Timeout(_) => ReasonCode::HashTimeout,
                                            HashError::Read { .. } => ReasonCode::HashRead,
                                        };
                                        log::debug!("{} {}", code, e);
                                        PipelineCounters::bump(&worker_counters.hash_errors);
                                        None
                                    }
                                }
                            },
                            Some,
                        );

                    if let Some(d) = digest {
                        record.digest = Some(d);
                        PipelineCounters::bump(&worker_counters.fingerprinted);
                        progress.on_item("scanning", &record.path.to_string_lossy());
                        done.push(record);
                    }

                    // Checked after the current file so a cancelled run
                    // never truncates a digest mid-computation.
                    if worker_cancel.is_cancelled() {
                        break;
                    }
                }
                done
            }));
        }
        drop(rx);

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap_or_default());
        }
        all
    });

    progress.on_phase_end("scanning");
    (records, counters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_RETENTION;
    use crate::progress::SilentProgress;
    use crate::scanner::WalkOptions;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn make_tree(files: &[(&str, &[u8])]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            let mut f = File::create(dir.path().join(name)).unwrap();
            f.write_all(content).unwrap();
        }
        dir
    }

    fn run(
        dir: &TempDir,
        options: &PipelineOptions,
        cache: Option<Arc<FingerprintCache>>,
    ) -> (Vec<FileRecord>, PipelineCounters) {
        let walker = Walker::new(vec![dir.path().to_path_buf()], WalkOptions::default());
        fingerprint_files(walker, options, cache, &CancelToken::new(), &SilentProgress)
    }

    #[test]
    fn test_pipeline_fingerprints_all_files() {
        let dir = make_tree(&[
            ("a.txt", b"one"),
            ("b.txt", b"two"),
            ("c.txt", b"three"),
        ]);
        let (records, counters) = run(&dir, &PipelineOptions::default(), None);

        assert_eq!(records.len(), 3);
        assert_eq!(PipelineCounters::get(&counters.discovered), 3);
        assert_eq!(PipelineCounters::get(&counters.fingerprinted), 3);
        assert!(records.iter().all(|r| r.digest.is_some()));
    }

    #[test]
    fn test_pipeline_identical_files_share_digest() {
        let dir = make_tree(&[("a", b"dup"), ("b", b"dup"), ("c", b"uniq")]);
        let (records, _) = run(&dir, &PipelineOptions::default(), None);

        let get = |name: &str| {
            records
                .iter()
                .find(|r| r.path.file_name().unwrap() == name)
                .unwrap()
                .digest
                .clone()
                .unwrap()
        };
        assert_eq!(get("a"), get("b"));
        assert_ne!(get("a"), get("c"));
    }

    #[test]
    fn test_pipeline_uses_cache_on_second_run() {
        let dir = make_tree(&[("a", b"content-a"), ("b", b"content-b")]);
        let cache_dir = TempDir::new().unwrap();
        let cache = Arc::new(
            FingerprintCache::open(
                &cache_dir.path().join("fp.db"),
                DigestAlgorithm::Md5,
                DEFAULT_RETENTION,
            )
            .unwrap(),
        );

        let (first, counters) = run(&dir, &PipelineOptions::default(), Some(cache.clone()));
        assert_eq!(PipelineCounters::get(&counters.cache_hits), 0);
        cache.flush().unwrap();

        let (second, counters) = run(&dir, &PipelineOptions::default(), Some(cache.clone()));
        assert_eq!(PipelineCounters::get(&counters.cache_hits), 2);

        // Digest equality across runs for unchanged files.
        for record in &second {
            let prior = first.iter().find(|r| r.path == record.path).unwrap();
            assert_eq!(prior.digest, record.digest);
        }
    }

    #[test]
    fn test_pipeline_cancellation_stops_early() {
        let dir = make_tree(&[("a", b"x"), ("b", b"y"), ("c", b"z")]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let walker = Walker::new(vec![dir.path().to_path_buf()], WalkOptions::default())
            .with_cancel(cancel.clone());
        let (records, _) = fingerprint_files(
            walker,
            &PipelineOptions::default(),
            None,
            &cancel,
            &SilentProgress,
        );
        assert!(records.is_empty());
    }

    #[test]
    fn test_pipeline_single_thread() {
        let dir = make_tree(&[("a", b"one"), ("b", b"two")]);
        let options = PipelineOptions {
            threads: 1,
            ..Default::default()
        };
        let (records, _) = run(&dir, &options, None);
        assert_eq!(records.len(), 2);
    }
}
