//! Pre-flight safety checks for would-be-destroyed targets.
//!
//! Every target passes through the gate before any mutation. A rejection
//! skips that target only; the rest of the group proceeds. Every rejection
//! carries a stable [`ReasonCode`] for the audit log.
//!
//! The checks, in order:
//!
//! 1. system-root containment (override requires an interactive terminal
//!    and a typed confirmation token; non-interactive override is refused)
//! 2. never-delete basename globs (kernel images, the dynamic linker, the
//!    C runtime, init, core shells)
//! 3. critical extensions (shared libraries, kernel modules)
//! 4. open-file probe (`lsof`, time-bounded, best effort)
//! 5. mapped-library scan over `/proc/*/maps`
//! 6. foreign privileged owner
//! 7. device mismatch for hardlink actions
//! 8. byte-level verification when fast fingerprints are in effect

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use globset::{Glob, GlobSet, GlobSetBuilder};

use super::ActionKind;
use crate::error::ReasonCode;
use crate::scanner::{files_identical, FileRecord};

/// Basenames that are never deleted no matter what.
const NEVER_DELETE: &[&str] = &[
    "vmlinuz*",
    "initrd*",
    "initramfs*",
    "ld-linux*",
    "ld.so*",
    "libc.so*",
    "libc-*.so*",
    "systemd",
    "init",
    "sh",
    "bash",
    "dash",
    "busybox",
];

/// Extensions that mark a file as system-critical.
const CRITICAL_EXTENSIONS: &[&str] = &["so", "ko"];

/// Roots that typically house OS binaries, libraries and boot artifacts.
const SYSTEM_ROOTS: &[&str] = &[
    "/bin", "/sbin", "/lib", "/lib32", "/lib64", "/usr", "/boot", "/etc", "/proc", "/sys",
];

/// The default protected system roots.
#[must_use]
pub fn default_system_roots() -> Vec<PathBuf> {
    SYSTEM_ROOTS.iter().map(PathBuf::from).collect()
}

/// Gate configuration, frozen for the run.
#[derive(Debug, Clone)]
pub struct GateOptions {
    /// System roots whose contents are protected.
    pub system_roots: Vec<PathBuf>,
    /// Operator asked to override system protection.
    pub force_system: bool,
    /// Run is attached to a terminal and may prompt.
    pub interactive: bool,
    /// Byte-verify survivor/target pairs before destructive actions.
    /// Forced on when the fingerprints are fast-mode.
    pub verify_bytes: bool,
    /// Time budget for the open-files probe.
    pub probe_timeout: Duration,
    /// Skip the lsof and /proc probes entirely (tests, containers).
    pub skip_probes: bool,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            system_roots: SYSTEM_ROOTS.iter().map(PathBuf::from).collect(),
            force_system: false,
            interactive: false,
            verify_bytes: false,
            probe_timeout: Duration::from_secs(2),
            skip_probes: false,
        }
    }
}

/// The gate's decision for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    /// Target may be acted on.
    Pass,
    /// Target is refused; the reason lands in the audit log.
    Reject {
        /// Stable reason code.
        reason: ReasonCode,
        /// Human-readable detail.
        detail: String,
    },
}

impl GateVerdict {
    fn reject(reason: ReasonCode, detail: impl Into<String>) -> Self {
        Self::Reject {
            reason,
            detail: detail.into(),
        }
    }

    /// True when the target may proceed.
    #[must_use]
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// The safety gate.
pub struct SafetyGate {
    options: GateOptions,
    never_delete: GlobSet,
    /// Set once the operator typed the confirmation token this run.
    system_override_confirmed: std::cell::Cell<Option<bool>>,
}

impl SafetyGate {
    /// Build the gate. The never-delete glob set is static and always
    /// compiles; a failure there is a programming error.
    #[must_use]
    pub fn new(options: GateOptions) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in NEVER_DELETE {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }
        let never_delete = builder.build().unwrap_or_else(|_| GlobSet::empty());
        Self {
            options,
            never_delete,
            system_override_confirmed: std::cell::Cell::new(None),
        }
    }

    /// Check one target against the survivor it would be resolved against.
    ///
    /// `action` decides which checks apply: hardlink adds the device
    /// check, and every destructive action adds byte verification when
    /// configured.
    pub fn check(
        &self,
        target: &FileRecord,
        survivor: &FileRecord,
        action: ActionKind,
    ) -> GateVerdict {
        if !action.is_destructive() {
            return GateVerdict::Pass;
        }

        let protected = self.check_protected(&target.path);
        if !protected.passed() {
            return protected;
        }

        if !self.options.skip_probes {
            if self.probe_open_files(&target.path) {
                return GateVerdict::reject(
                    ReasonCode::GateInUse,
                    format!("{} is open in a running process", target.path.display()),
                );
            }
            if looks_like_shared_library(&target.path) && self.probe_mapped(&target.path) {
                return GateVerdict::reject(
                    ReasonCode::GateLoaded,
                    format!("{} is mapped by a running process", target.path.display()),
                );
            }
        }

        if let Some(verdict) = check_owner(&target.path) {
            return verdict;
        }

        if action == ActionKind::Hardlink && target.dev != survivor.dev {
            return GateVerdict::reject(
                ReasonCode::GateCrossDevice,
                format!(
                    "{} and {} are on different filesystems",
                    survivor.path.display(),
                    target.path.display()
                ),
            );
        }

        if self.options.verify_bytes {
            match files_identical(&survivor.path, &target.path) {
                Ok(true) => {}
                Ok(false) => {
                    return GateVerdict::reject(
                        ReasonCode::GateNotIdentical,
                        format!(
                            "{} differs from {} at byte level",
                            target.path.display(),
                            survivor.path.display()
                        ),
                    );
                }
                Err(e) => {
                    return GateVerdict::reject(
                        ReasonCode::GateNotIdentical,
                        format!("byte verification failed: {e}"),
                    );
                }
            }
        }

        GateVerdict::Pass
    }

    /// Static protection checks only (system roots, never-delete names,
    /// critical extensions), without survivor comparison or probes.
    ///
    /// The controller runs this against the survivor of a destructive
    /// group so a wholly-protected group shows every member in the audit
    /// log, not just the non-survivors.
    pub fn check_protected(&self, path: &Path) -> GateVerdict {
        if let Some(verdict) = self.check_system(path) {
            return verdict;
        }
        if let Some(name) = path.file_name() {
            if self.never_delete.is_match(Path::new(name)) {
                return GateVerdict::reject(
                    ReasonCode::GateSystem,
                    format!("{} matches the never-delete set", path.display()),
                );
            }
        }
        if is_versioned_shared_object(path)
            || path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| CRITICAL_EXTENSIONS.contains(&ext))
        {
            return GateVerdict::reject(
                ReasonCode::GateSystem,
                format!("{} has a critical extension", path.display()),
            );
        }
        GateVerdict::Pass
    }

    /// System-root containment check, with the override protocol.
    fn check_system(&self, path: &Path) -> Option<GateVerdict> {
        let inside = self
            .options
            .system_roots
            .iter()
            .any(|root| path.starts_with(root));
        if !inside {
            return None;
        }

        if !self.options.force_system {
            return Some(GateVerdict::reject(
                ReasonCode::GateSystem,
                format!("{} lies within a protected system root", path.display()),
            ));
        }

        // Override requested. Only honored at an interactive terminal,
        // after the operator types the literal token once per run.
        if !self.options.interactive || !std::io::stdin().is_terminal() {
            return Some(GateVerdict::reject(
                ReasonCode::GateSystem,
                "system override refused outside an interactive terminal".to_string(),
            ));
        }

        if self.system_override_confirmed.get().is_none() {
            self.system_override_confirmed
                .set(Some(ask_confirmation_token()));
        }
        if self.system_override_confirmed.get() == Some(true) {
            None
        } else {
            Some(GateVerdict::reject(
                ReasonCode::GateSystem,
                "system override not confirmed".to_string(),
            ))
        }
    }

    /// Best-effort, time-bounded `lsof` probe. Absent lsof or a timeout
    /// count as "not in use": the probe can only add protection.
    fn probe_open_files(&self, path: &Path) -> bool {
        let child = Command::new("lsof")
            .arg("-t")
            .arg("--")
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();
        let mut child = match child {
            Ok(c) => c,
            Err(_) => return false,
        };

        let deadline = Instant::now() + self.options.probe_timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    // lsof exits 0 with output when the file is open.
                    if !status.success() {
                        return false;
                    }
                    let mut out = String::new();
                    if let Some(mut stdout) = child.stdout.take() {
                        use std::io::Read;
                        let _ = stdout.read_to_string(&mut out);
                    }
                    return !out.trim().is_empty();
                }
                Ok(None) => {
                    if Instant::now() > deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        log::debug!("lsof probe timed out for {}", path.display());
                        return false;
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
                Err(_) => return false,
            }
        }
    }

    /// Scan /proc/*/maps for a mapping of `path`. Best effort and bounded
    /// by the probe timeout.
    fn probe_mapped(&self, path: &Path) -> bool {
        #[cfg(target_os = "linux")]
        {
            let needle = path.to_string_lossy();
            let deadline = Instant::now() + self.options.probe_timeout;
            let Ok(entries) = std::fs::read_dir("/proc") else {
                return false;
            };
            for entry in entries.flatten() {
                if Instant::now() > deadline {
                    log::debug!("maps probe timed out for {}", needle);
                    return false;
                }
                let name = entry.file_name();
                let Some(pid) = name.to_str().filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
                else {
                    continue;
                };
                let maps = PathBuf::from("/proc").join(pid).join("maps");
                if let Ok(content) = std::fs::read_to_string(maps) {
                    if content.lines().any(|line| line.ends_with(needle.as_ref())) {
                        return true;
                    }
                }
            }
            false
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = path;
            false
        }
    }
}

/// `libfoo.so.1.2` style names carry no simple extension but are still
/// shared objects.
fn is_versioned_shared_object(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.contains(".so.") || name.ends_with(".so"))
}

/// Heuristic for "should we bother with the expensive maps scan".
fn looks_like_shared_library(path: &Path) -> bool {
    is_versioned_shared_object(path)
        || path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with("lib"))
}

/// Refuse files owned by a *different* privileged principal: root-owned
/// files when running unprivileged.
#[cfg(unix)]
fn check_owner(path: &Path) -> Option<GateVerdict> {
    use std::os::unix::fs::MetadataExt;
    let metadata = std::fs::metadata(path).ok()?;
    let owner = metadata.uid();
    // Safety: geteuid has no failure modes.
    let me = unsafe { libc::geteuid() };
    if owner != me && owner == 0 {
        return Some(GateVerdict::reject(
            ReasonCode::GateOwner,
            format!("{} is owned by uid {} (running as {})", path.display(), owner, me),
        ));
    }
    None
}

#[cfg(not(unix))]
fn check_owner(_path: &Path) -> Option<GateVerdict> {
    None
}

/// Prompt for the literal confirmation token on stdin.
fn ask_confirmation_token() -> bool {
    use std::io::{BufRead, Write};
    eprint!("Deleting inside a system root. Type CONFIRM to proceed for this run: ");
    let _ = std::io::stderr().flush();
    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    line.trim() == "CONFIRM"
}
