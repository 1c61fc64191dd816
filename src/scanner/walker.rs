//! Filtered directory walker built on jwalk.
//!
//! Walks one or more roots depth-first with sorted children (deterministic
//! output order), pruning excluded subtrees before descent and applying the
//! size / depth / hidden / pattern filters from [`WalkOptions`].
//!
//! Exclusion is compared against *canonical* paths: a symlink pointing into
//! an excluded subtree is still excluded, because the entry is canonicalized
//! before the prefix comparison. When symlink following is enabled, visited
//! (device, inode) pairs of directories are recorded and revisits pruned,
//! which breaks symlink cycles.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use globset::{Glob, GlobSet, GlobSetBuilder};
use jwalk::WalkDir;

use super::{FileRecord, ScanError, WalkOptions};
use crate::signal::CancelToken;

/// Directory walker producing [`FileRecord`] skeletons.
#[derive(Debug)]
pub struct Walker {
    roots: Vec<PathBuf>,
    options: WalkOptions,
    cancel: CancelToken,
}

impl Walker {
    /// Create a walker over the given roots.
    #[must_use]
    pub fn new(roots: Vec<PathBuf>, options: WalkOptions) -> Self {
        Self {
            roots,
            options,
            cancel: CancelToken::new(),
        }
    }

    /// Attach a cancellation token; the walk stops at the next entry once
    /// it fires.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Build the basename glob set from the configured patterns.
    ///
    /// Invalid patterns are dropped with a warning rather than aborting the
    /// walk; an empty set means "match everything".
    fn build_patterns(&self) -> Option<GlobSet> {
        if self.options.patterns.is_empty() {
            return None;
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.options.patterns {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => log::warn!("invalid pattern '{}': {}", pattern, e),
            }
        }
        match builder.build() {
            Ok(set) => Some(set),
            Err(e) => {
                log::warn!("failed to build pattern set: {}", e);
                None
            }
        }
    }

    fn passes_size(&self, size: u64) -> bool {
        if size < self.options.min_size {
            return false;
        }
        if let Some(max) = self.options.max_size {
            if size > max {
                return false;
            }
        }
        true
    }

    fn passes_patterns(&self, path: &Path, patterns: &Option<GlobSet>) -> bool {
        match patterns {
            None => true,
            Some(set) => path
                .file_name()
                .map(|name| set.is_match(Path::new(name)))
                .unwrap_or(false),
        }
    }

    /// Walk all roots, yielding records in traversal order.
    ///
    /// Unreadable directories are logged once at warning level and skipped;
    /// stat failures on individual entries yield a [`ScanError`] so the
    /// caller can count them.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileRecord, ScanError>> + '_ {
        let patterns = self.build_patterns();
        let excludes: Arc<Vec<PathBuf>> = Arc::new(self.options.exclude.clone());
        // Directories seen while following symlinks, keyed by (dev, ino).
        let visited: Arc<Mutex<HashSet<(u64, u64)>>> = Arc::new(Mutex::new(HashSet::new()));

        self.roots
            .iter()
            .flat_map(move |root| self.walk_root(root, excludes.clone(), visited.clone()))
            .filter_map(move |result| self.filter_entry(result, &patterns))
    }

    /// Walk a single root with subtree pruning.
    fn walk_root(
        &self,
        root: &Path,
        excludes: Arc<Vec<PathBuf>>,
        visited: Arc<Mutex<HashSet<(u64, u64)>>>,
    ) -> jwalk::DirEntryIter<((), ())> {
        let follow = self.options.follow_symlinks;

        let mut walk = WalkDir::new(root)
            .follow_links(follow)
            .skip_hidden(!self.options.include_hidden);

        if let Some(depth) = self.options.max_depth {
            walk = walk.max_depth(depth);
        }

        walk.process_read_dir(move |_depth, _path, _state, children| {
            children.sort_by(|a, b| match (a, b) {
                (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                (Err(_), Err(_)) => std::cmp::Ordering::Equal,
            });

            for child in children.iter_mut().flatten() {
                if !child.file_type().is_dir() {
                    continue;
                }
                let path = child.path();

                if !excludes.is_empty() && is_excluded(&path, &excludes) {
                    log::debug!("pruning excluded subtree: {}", path.display());
                    child.read_children_path = None;
                    continue;
                }

                if follow {
                    if let Some(id) = dir_identity(&path) {
                        let mut seen = visited.lock().unwrap();
                        if !seen.insert(id) {
                            log::debug!("symlink cycle at {}, pruning", path.display());
                            child.read_children_path = None;
                        }
                    }
                }
            }
        })
        .into_iter()
    }

    /// Apply per-file filters and build the record.
    fn filter_entry(
        &self,
        result: jwalk::Result<jwalk::DirEntry<((), ())>>,
        patterns: &Option<GlobSet>,
    ) -> Option<Result<FileRecord, ScanError>> {
        if self.cancel.is_cancelled() {
            return None;
        }

        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .map_or_else(PathBuf::new, std::borrow::ToOwned::to_owned);
                if e.io_error()
                    .is_some_and(|io| io.kind() == std::io::ErrorKind::PermissionDenied)
                {
                    log::warn!("permission denied: {}", path.display());
                    return Some(Err(ScanError::Denied(path)));
                }
                log::warn!("walk error for {}: {}", path.display(), e);
                return Some(Err(ScanError::Io {
                    path,
                    source: std::io::Error::other(e.to_string()),
                }));
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            return None;
        }
        if file_type.is_symlink() && !self.options.follow_symlinks {
            log::trace!("skipping symlink: {}", entry.path().display());
            return None;
        }

        let path = entry.path();

        if !self.passes_patterns(&path, patterns) {
            return None;
        }

        // Resolve to the canonical path once; excludes compare against it
        // and every downstream component relies on it being canonical.
        let canonical = match path.canonicalize() {
            Ok(p) => p,
            Err(e) => return Some(Err(stat_error(&path, e))),
        };

        if !self.options.exclude.is_empty() && is_excluded(&canonical, &self.options.exclude) {
            log::trace!("excluded: {}", canonical.display());
            return None;
        }

        let metadata = match std::fs::metadata(&canonical) {
            Ok(m) => m,
            Err(e) => return Some(Err(stat_error(&canonical, e))),
        };

        if !metadata.is_file() {
            return None;
        }

        let size = metadata.len();
        if size == 0 && !self.options.include_empty {
            log::trace!("skipping empty file: {}", canonical.display());
            return None;
        }
        if !self.passes_size(size) {
            return None;
        }

        let mtime = mtime_epoch(&metadata);
        let dev = device_id(&metadata);

        Some(Ok(FileRecord::new(canonical, size, mtime, dev)))
    }
}

/// True when `path` equals an exclude entry or descends from one.
fn is_excluded(path: &Path, excludes: &[PathBuf]) -> bool {
    // Compare the canonical form so symlinks cannot dodge an exclusion.
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    excludes.iter().any(|ex| canonical.starts_with(ex))
}

/// (dev, ino) pair identifying a directory, for cycle detection.
#[cfg(unix)]
fn dir_identity(path: &Path) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path).ok().map(|m| (m.dev(), m.ino()))
}

#[cfg(not(unix))]
fn dir_identity(_path: &Path) -> Option<(u64, u64)> {
    None
}

fn stat_error(path: &Path, error: std::io::Error) -> ScanError {
    match error.kind() {
        std::io::ErrorKind::PermissionDenied => {
            log::warn!("permission denied: {}", path.display());
            ScanError::Denied(path.to_path_buf())
        }
        _ => {
            log::debug!("stat failed for {}: {}", path.display(), error);
            ScanError::Io {
                path: path.to_path_buf(),
                source: error,
            }
        }
    }
}

/// Modification time as whole seconds since the Unix epoch.
pub(crate) fn mtime_epoch(metadata: &std::fs::Metadata) -> i64 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        metadata.mtime()
    }
    #[cfg(not(unix))]
    {
        metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// Device id of the filesystem containing the file.
pub(crate) fn device_id(metadata: &std::fs::Metadata) -> u64 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        metadata.dev()
    }
    #[cfg(not(unix))]
    {
        0
    }
}
