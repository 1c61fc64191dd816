//! Action execution with backup and dry-run support.
//!
//! The executor receives targets that already passed the safety gate and
//! applies the configured action. Failures are recovered per target: the
//! outcome records the reason and the group continues.
//!
//! The hardlink path never leaves a window where the target is missing: a
//! temporary link to the survivor is created in the target's directory and
//! renamed over the target, and rename within a directory is atomic.

use std::fs;
use std::hash::Hasher as _;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::{ActionKind, ActionOutcome, EffectedAction};
use crate::error::ReasonCode;
use crate::scanner::FileRecord;

/// Errors from a single target's execution.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Pre-action backup failed; the action was aborted.
    #[error("backup failed for {path}: {source}")]
    Backup {
        /// Target that was being backed up.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The mutation itself failed.
    #[error("{action} failed for {path}: {message}")]
    Failed {
        /// Intended action.
        action: ActionKind,
        /// Target path.
        path: PathBuf,
        /// Underlying error text.
        message: String,
    },
}

impl ActionError {
    fn reason(&self) -> ReasonCode {
        match self {
            Self::Backup { .. } => ReasonCode::ActionBackup,
            Self::Failed { .. } => ReasonCode::ActionIo,
        }
    }
}

/// Executor configuration, frozen for the run.
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Record intentions without mutating anything.
    pub dry_run: bool,
    /// Copy each target under this root before acting on it.
    pub backup_root: Option<PathBuf>,
    /// Quarantine directory (required for the quarantine action).
    pub quarantine_dir: Option<PathBuf>,
    /// Operator accepted falling through to delete when trash is
    /// unavailable.
    pub trash_fallback: bool,
    /// Timestamp tag for the backup subtree, set once at run start.
    pub backup_stamp: String,
}

/// Applies resolution actions to gate-approved targets.
pub struct Executor {
    options: ExecutorOptions,
}

impl Executor {
    /// Create an executor.
    #[must_use]
    pub fn new(options: ExecutorOptions) -> Self {
        Self { options }
    }

    /// Execute `action` against `target`, resolving against `survivor`.
    ///
    /// Always returns an outcome; failures are folded into it rather than
    /// propagated, so the caller can continue with the next target.
    pub fn execute(
        &self,
        target: &FileRecord,
        survivor: &FileRecord,
        action: ActionKind,
    ) -> ActionOutcome {
        if action == ActionKind::Report {
            return ActionOutcome {
                path: target.path.clone(),
                intended: action,
                effected: EffectedAction::Skipped,
                bytes_reclaimed: 0,
                failure: None,
                backup: None,
            };
        }

        if self.options.dry_run {
            return self.dry_run_outcome(target, action);
        }

        let backup = match self.take_backup(&target.path) {
            Ok(location) => location,
            Err(e) => {
                log::warn!("{}", e);
                return ActionOutcome::skipped(
                    target.path.clone(),
                    action,
                    e.reason(),
                    e.to_string(),
                );
            }
        };

        let result = match action {
            ActionKind::Delete => self.do_delete(&target.path),
            ActionKind::Trash => self.do_trash(&target.path),
            ActionKind::Hardlink => self.do_hardlink(&target.path, &survivor.path),
            ActionKind::Quarantine => self.do_quarantine(&target.path),
            ActionKind::Report => unreachable!("handled above"),
        };

        match result {
            Ok(effected) => {
                log::debug!("{}: {}", effected, target.path.display());
                ActionOutcome {
                    path: target.path.clone(),
                    intended: action,
                    effected,
                    bytes_reclaimed: reclaimed_bytes(action, target.size),
                    failure: None,
                    backup,
                }
            }
            Err(e) => {
                log::warn!("{}", e);
                ActionOutcome {
                    path: target.path.clone(),
                    intended: action,
                    effected: EffectedAction::Skipped,
                    bytes_reclaimed: 0,
                    failure: Some((e.reason(), e.to_string())),
                    backup,
                }
            }
        }
    }

    /// Walk every branch except the mutation itself.
    fn dry_run_outcome(&self, target: &FileRecord, action: ActionKind) -> ActionOutcome {
        let backup = self
            .options
            .backup_root
            .as_ref()
            .map(|root| self.backup_location(root, &target.path));
        ActionOutcome {
            path: target.path.clone(),
            intended: action,
            effected: EffectedAction::Would(action),
            bytes_reclaimed: reclaimed_bytes(action, target.size),
            failure: None,
            backup,
        }
    }

    /// Mirror the target into the backup subtree, preserving mode and
    /// mtime (ownership best-effort).
    fn take_backup(&self, target: &Path) -> Result<Option<PathBuf>, ActionError> {
        let Some(root) = self.options.backup_root.as_ref() else {
            return Ok(None);
        };
        let destination = self.backup_location(root, target);

        let copy = || -> io::Result<()> {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(target, &destination)?;

            let metadata = fs::metadata(target)?;
            fs::set_permissions(&destination, metadata.permissions())?;
            let mtime = filetime::FileTime::from_last_modification_time(&metadata);
            filetime::set_file_mtime(&destination, mtime)?;
            preserve_ownership(&metadata, &destination);
            Ok(())
        };

        copy().map_err(|e| ActionError::Backup {
            path: target.to_path_buf(),
            source: e,
        })?;
        Ok(Some(destination))
    }

    /// `<root>/<stamp>/<source path relative to />`.
    fn backup_location(&self, root: &Path, target: &Path) -> PathBuf {
        let relative = target
            .strip_prefix("/")
            .unwrap_or(target);
        root.join(&self.options.backup_stamp).join(relative)
    }

    fn do_delete(&self, target: &Path) -> Result<EffectedAction, ActionError> {
        fs::remove_file(target).map_err(|e| ActionError::Failed {
            action: ActionKind::Delete,
            path: target.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(EffectedAction::Done(ActionKind::Delete))
    }

    fn do_trash(&self, target: &Path) -> Result<EffectedAction, ActionError> {
        match trash::delete(target) {
            Ok(()) => Ok(EffectedAction::Done(ActionKind::Trash)),
            Err(e) if self.options.trash_fallback => {
                log::warn!(
                    "trash unavailable for {} ({}), falling back to delete",
                    target.display(),
                    e
                );
                self.do_delete(target)
            }
            Err(e) => Err(ActionError::Failed {
                action: ActionKind::Trash,
                path: target.to_path_buf(),
                message: format!("{e} (no delete fallback accepted)"),
            }),
        }
    }

    /// Replace `target` with a hardlink to `survivor` without a window
    /// where `target` is missing.
    fn do_hardlink(&self, target: &Path, survivor: &Path) -> Result<EffectedAction, ActionError> {
        let failed = |e: io::Error| ActionError::Failed {
            action: ActionKind::Hardlink,
            path: target.to_path_buf(),
            message: e.to_string(),
        };

        let dir = target.parent().ok_or_else(|| {
            failed(io::Error::other("target has no parent directory"))
        })?;
        let temp = dir.join(format!(
            ".{}.dupesweep-link",
            target.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
        ));

        // Link then rename; rename within one directory is atomic, so a
        // crash leaves either the old target or the new link, never
        // neither.
        fs::hard_link(survivor, &temp).map_err(&failed)?;
        if let Err(e) = fs::rename(&temp, target) {
            let _ = fs::remove_file(&temp);
            return Err(failed(e));
        }
        Ok(EffectedAction::Done(ActionKind::Hardlink))
    }

    /// Move the target into quarantine under a collision-proof name.
    fn do_quarantine(&self, target: &Path) -> Result<EffectedAction, ActionError> {
        let failed = |e: io::Error| ActionError::Failed {
            action: ActionKind::Quarantine,
            path: target.to_path_buf(),
            message: e.to_string(),
        };

        let dir = self.options.quarantine_dir.as_ref().ok_or_else(|| {
            failed(io::Error::other("no quarantine directory configured"))
        })?;
        fs::create_dir_all(dir).map_err(&failed)?;

        let name = quarantine_name(target);
        let destination = dir.join(name);

        match fs::rename(target, &destination) {
            Ok(()) => {}
            Err(_) => {
                // Cross-device move: copy then unlink.
                fs::copy(target, &destination).map_err(&failed)?;
                fs::remove_file(target).map_err(&failed)?;
            }
        }
        Ok(EffectedAction::Done(ActionKind::Quarantine))
    }
}

/// Bytes freed by an action. A hardlink replaces the copy with a link, so
/// the target's bytes are reclaimed just like a delete.
fn reclaimed_bytes(action: ActionKind, size: u64) -> u64 {
    match action {
        ActionKind::Delete | ActionKind::Trash | ActionKind::Hardlink | ActionKind::Quarantine => {
            size
        }
        ActionKind::Report => 0,
    }
}

/// `<basename>.<epoch>.<8 hex chars of the path hash>`.
fn quarantine_name(target: &Path) -> String {
    let mut hasher = twox_hash::XxHash64::with_seed(0);
    hasher.write(target.as_os_str().as_encoded_bytes());
    let short = format!("{:08x}", hasher.finish() as u32);
    let epoch = chrono::Utc::now().timestamp();
    let base = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());
    format!("{base}.{epoch}.{short}")
}

/// Chown the backup copy to the source's owner where permitted.
#[cfg(unix)]
fn preserve_ownership(metadata: &fs::Metadata, destination: &Path) {
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::fs::MetadataExt;
    let c_path = match std::ffi::CString::new(destination.as_os_str().as_bytes()) {
        Ok(p) => p,
        Err(_) => return,
    };
    // Safety: path is a valid NUL-terminated C string.
    let rc = unsafe { libc::chown(c_path.as_ptr(), metadata.uid(), metadata.gid()) };
    if rc != 0 {
        log::debug!(
            "could not preserve ownership on {} (requires privilege)",
            destination.display()
        );
    }
}

#[cfg(not(unix))]
fn preserve_ownership(_metadata: &fs::Metadata, _destination: &Path) {}
