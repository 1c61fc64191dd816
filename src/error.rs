//! Exit codes and the stable audit reason-code taxonomy.

use serde::Serialize;
use std::fmt;

/// Process exit codes.
///
/// - 0: Success (scan and resolution completed normally)
/// - 1: Configuration error (bad flags, bad config file, unusable output dir)
/// - 2: Missing dependency, or refusal to act in non-interactive destructive mode
/// - 130: Cancelled by the operator (Ctrl+C)
///
/// Any other non-zero code indicates an unexpected failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Completed normally.
    Success = 0,
    /// Invalid or contradictory configuration.
    ConfigError = 1,
    /// A required external dependency is missing, or a destructive run was
    /// refused because no interactive confirmation was possible.
    MissingDependency = 2,
    /// Interrupted by the operator.
    Cancelled = 130,
}

impl ExitCode {
    /// Numeric exit code for `std::process::exit`.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Stable reason codes recorded in the audit log.
///
/// These strings are part of the tool's external contract: scripts grep the
/// audit log for them, so variants render to fixed dotted identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReasonCode {
    /// Mutually exclusive options, bad size, inaccessible output directory.
    ConfigInvalid,
    /// Permission error descending a subtree.
    WalkDenied,
    /// Transient I/O while stat'ing an entry.
    WalkIo,
    /// Per-file hashing deadline exceeded.
    HashTimeout,
    /// I/O error during hashing.
    HashRead,
    /// Same digest but different size; records re-bucketed by size.
    GroupCollision,
    /// Target lies in a protected system root, matches a never-delete name,
    /// or carries a critical extension.
    GateSystem,
    /// Target is currently open in some process.
    GateInUse,
    /// Target is a shared library mapped by a running process.
    GateLoaded,
    /// Target is owned by a different privileged principal.
    GateOwner,
    /// Hardlink requested across filesystems.
    GateCrossDevice,
    /// Byte-level comparison between survivor and target failed.
    GateNotIdentical,
    /// Executor I/O failure.
    ActionIo,
    /// Pre-action backup failed; the action was aborted.
    ActionBackup,
    /// Another run holds the cache store's advisory lock.
    CacheLocked,
    /// Checksum mismatch on resume files.
    ResumeCorrupt,
}

impl ReasonCode {
    /// The stable dotted identifier used in the audit log.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigInvalid => "config.invalid",
            Self::WalkDenied => "walk.denied",
            Self::WalkIo => "walk.io",
            Self::HashTimeout => "hash.timeout",
            Self::HashRead => "hash.read",
            Self::GroupCollision => "group.collision",
            Self::GateSystem => "gate.system",
            Self::GateInUse => "gate.in-use",
            Self::GateLoaded => "gate.loaded",
            Self::GateOwner => "gate.owner",
            Self::GateCrossDevice => "gate.cross-device",
            Self::GateNotIdentical => "gate.not-identical",
            Self::ActionIo => "action.io",
            Self::ActionBackup => "action.backup",
            Self::CacheLocked => "cache.locked",
            Self::ResumeCorrupt => "resume.corrupt",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::ConfigError.as_i32(), 1);
        assert_eq!(ExitCode::MissingDependency.as_i32(), 2);
        assert_eq!(ExitCode::Cancelled.as_i32(), 130);
    }

    #[test]
    fn test_reason_codes_are_stable() {
        assert_eq!(ReasonCode::ConfigInvalid.as_str(), "config.invalid");
        assert_eq!(ReasonCode::GateCrossDevice.as_str(), "gate.cross-device");
        assert_eq!(ReasonCode::GateNotIdentical.as_str(), "gate.not-identical");
        assert_eq!(ReasonCode::ResumeCorrupt.as_str(), "resume.corrupt");
        assert_eq!(ReasonCode::HashTimeout.to_string(), "hash.timeout");
    }
}
