//! Append-only audit log.
//!
//! One event per line, ISO-8601 timestamps, written only from the
//! controller thread. The log is the tool's accountability record: every
//! gate rejection, every action outcome, and the run summary land here
//! with their stable reason codes.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use thiserror::Error;

use crate::error::ReasonCode;
use crate::resolve::ActionOutcome;

/// Errors opening or writing the audit log.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The log file could not be opened or written.
    #[error("audit log error: {0}")]
    Io(#[from] std::io::Error),
}

/// The audit log writer.
///
/// Not `Sync` on purpose: only the controller thread writes, per the
/// shared-resource rules of the run.
pub struct AuditLog {
    writer: BufWriter<File>,
}

impl AuditLog {
    /// Open (append) the audit log at `path`.
    ///
    /// # Errors
    ///
    /// I/O errors creating parent directories or the file.
    pub fn open(path: &Path) -> Result<Self, AuditError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn stamp() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Record a free-form event.
    ///
    /// # Errors
    ///
    /// Write failures.
    pub fn event(&mut self, kind: &str, detail: &str) -> Result<(), AuditError> {
        writeln!(self.writer, "{} {} {}", Self::stamp(), kind, detail)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Record a reason-coded rejection or failure.
    ///
    /// # Errors
    ///
    /// Write failures.
    pub fn reason(&mut self, code: ReasonCode, detail: &str) -> Result<(), AuditError> {
        self.event(code.as_str(), detail)
    }

    /// Record one action outcome.
    ///
    /// # Errors
    ///
    /// Write failures.
    pub fn outcome(&mut self, outcome: &ActionOutcome) -> Result<(), AuditError> {
        match &outcome.failure {
            Some((reason, detail)) => self.event(
                reason.as_str(),
                &format!(
                    "intended={} path={} {}",
                    outcome.intended,
                    outcome.path.display(),
                    detail
                ),
            ),
            None => {
                let backup = outcome
                    .backup
                    .as_ref()
                    .map(|p| format!(" backup={}", p.display()))
                    .unwrap_or_default();
                self.event(
                    "action",
                    &format!(
                        "effected={} path={} reclaimed={}{}",
                        outcome.effected,
                        outcome.path.display(),
                        outcome.bytes_reclaimed,
                        backup
                    ),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{ActionKind, EffectedAction};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_events_are_one_per_line_with_timestamp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        let mut log = AuditLog::open(&path).unwrap();
        log.event("phase", "walk started").unwrap();
        log.reason(ReasonCode::GateSystem, "path=/usr/bin/x").unwrap();
        drop(log);

        let content = read(&path);
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("phase walk started"));
        assert!(lines[1].contains("gate.system"));
        // ISO-8601 timestamps start each line.
        for line in lines {
            assert!(line.starts_with("20"), "line should start with a year: {line}");
            assert!(line.contains('T'));
            assert!(line.contains('Z'));
        }
    }

    #[test]
    fn test_log_is_append_only_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        {
            let mut log = AuditLog::open(&path).unwrap();
            log.event("run", "first").unwrap();
        }
        {
            let mut log = AuditLog::open(&path).unwrap();
            log.event("run", "second").unwrap();
        }
        let content = read(&path);
        assert!(content.contains("first"));
        assert!(content.contains("second"));
    }

    #[test]
    fn test_outcome_success_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        let mut log = AuditLog::open(&path).unwrap();
        log.outcome(&ActionOutcome {
            path: PathBuf::from("/data/dup"),
            intended: ActionKind::Delete,
            effected: EffectedAction::Done(ActionKind::Delete),
            bytes_reclaimed: 42,
            failure: None,
            backup: Some(PathBuf::from("/backups/data/dup")),
        })
        .unwrap();
        drop(log);

        let content = read(&path);
        assert!(content.contains("effected=delete"));
        assert!(content.contains("reclaimed=42"));
        assert!(content.contains("backup=/backups/data/dup"));
    }

    #[test]
    fn test_outcome_failure_uses_reason_code() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        let mut log = AuditLog::open(&path).unwrap();
        log.outcome(&ActionOutcome::skipped(
            PathBuf::from("/x"),
            ActionKind::Hardlink,
            ReasonCode::GateCrossDevice,
            "different filesystems".into(),
        ))
        .unwrap();
        drop(log);

        let content = read(&path);
        assert!(content.contains("gate.cross-device"));
        assert!(content.contains("intended=hardlink"));
    }
}
