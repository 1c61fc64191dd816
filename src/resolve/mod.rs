//! Per-group resolution: survivor selection, safety gating, execution.
//!
//! For each duplicate group the pipeline is: [`keeper`] picks exactly one
//! survivor, [`gate`] pre-flights every other member, and [`executor`]
//! applies the configured action to the members that pass. In interactive
//! mode [`interactive`] inserts a per-target prompt between the gate and
//! the executor.

pub mod executor;
pub mod gate;
pub mod interactive;
pub mod keeper;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::ReasonCode;

pub use executor::{ActionError, Executor, ExecutorOptions};
pub use gate::{default_system_roots, GateOptions, GateVerdict, SafetyGate};
pub use interactive::{InteractivePrompt, PromptChoice};
pub use keeper::{select_survivor, KeepDecision, KeepPolicy, KeepStrategy, LocationPriorities};

/// Resolution actions applicable to a non-survivor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Report only; never mutate.
    Report,
    /// Permanently unlink the target.
    Delete,
    /// Hand off to the platform trash facility.
    Trash,
    /// Replace the target with a hardlink to the survivor.
    Hardlink,
    /// Move the target into the quarantine directory.
    Quarantine,
}

impl ActionKind {
    /// Whether the action mutates the filesystem.
    #[must_use]
    pub fn is_destructive(self) -> bool {
        !matches!(self, Self::Report)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Report => "report",
            Self::Delete => "delete",
            Self::Trash => "trash",
            Self::Hardlink => "hardlink",
            Self::Quarantine => "quarantine",
        };
        f.write_str(name)
    }
}

/// What actually happened to a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectedAction {
    /// The intended action was carried out.
    Done(ActionKind),
    /// Dry-run: the action would have been carried out.
    Would(ActionKind),
    /// The target was skipped (gate rejection, prompt, or failure).
    Skipped,
}

impl fmt::Display for EffectedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done(kind) => write!(f, "{kind}"),
            Self::Would(kind) => write!(f, "would-{kind}"),
            Self::Skipped => f.write_str("skipped"),
        }
    }
}

/// Outcome of one target's resolution, destined for the audit log.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    /// The target path.
    pub path: PathBuf,
    /// What the run intended.
    pub intended: ActionKind,
    /// What happened.
    pub effected: EffectedAction,
    /// Bytes freed (or that a dry-run would free).
    pub bytes_reclaimed: u64,
    /// Failure reason, if the action was not carried out.
    pub failure: Option<(ReasonCode, String)>,
    /// Backup copy location, when a backup was taken.
    pub backup: Option<PathBuf>,
}

impl ActionOutcome {
    /// An outcome for a gate-rejected or otherwise skipped target.
    #[must_use]
    pub fn skipped(path: PathBuf, intended: ActionKind, reason: ReasonCode, detail: String) -> Self {
        Self {
            path,
            intended,
            effected: EffectedAction::Skipped,
            bytes_reclaimed: 0,
            failure: Some((reason, detail)),
            backup: None,
        }
    }

    /// True when the intended action was carried out (or would be, in a
    /// dry run).
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failure.is_none() && !matches!(self.effected, EffectedAction::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_kind_destructive() {
        assert!(!ActionKind::Report.is_destructive());
        assert!(ActionKind::Delete.is_destructive());
        assert!(ActionKind::Hardlink.is_destructive());
        assert!(ActionKind::Quarantine.is_destructive());
        assert!(ActionKind::Trash.is_destructive());
    }

    #[test]
    fn test_effected_display() {
        assert_eq!(EffectedAction::Done(ActionKind::Delete).to_string(), "delete");
        assert_eq!(
            EffectedAction::Would(ActionKind::Hardlink).to_string(),
            "would-hardlink"
        );
        assert_eq!(EffectedAction::Skipped.to_string(), "skipped");
    }

    #[test]
    fn test_outcome_skipped() {
        let outcome = ActionOutcome::skipped(
            PathBuf::from("/t"),
            ActionKind::Delete,
            ReasonCode::GateSystem,
            "protected".into(),
        );
        assert!(!outcome.succeeded());
        assert_eq!(outcome.bytes_reclaimed, 0);
    }
}
