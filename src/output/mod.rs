//! Report generation.
//!
//! Reports subscribe to the run's results: the duplicate groups and the
//! final summary. Three formats are supported (CSV, JSON, HTML), written
//! either to explicit paths or into the output directory under
//! `duplicates_<UTC timestamp>.<ext>` names. Email delivery hands a text
//! summary to a system mailer behind a small trait.

pub mod csv;
pub mod email;
pub mod html;
pub mod json;

use chrono::Utc;
use std::path::{Path, PathBuf};

pub use self::csv::CsvReport;
pub use email::{summary_body, MailError, Mailer, SendmailMailer};
pub use html::HtmlReport;
pub use json::JsonReport;

/// Counters and context a finished run exposes to the reporters.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RunSummary {
    /// Scanned roots.
    pub roots: Vec<PathBuf>,
    /// Files that passed the walker's filters.
    pub files_discovered: u64,
    /// Files that received a digest.
    pub files_fingerprinted: u64,
    /// Walk errors (denied, stat failures).
    pub walk_errors: u64,
    /// Hash errors including timeouts.
    pub hash_errors: u64,
    /// Digests served from the cache.
    pub cache_hits: u64,
    /// Duplicate groups found.
    pub groups_found: u64,
    /// Size-split anomalies in the grouper.
    pub group_collisions: u64,
    /// Bytes wasted across all groups.
    pub bytes_wasted: u64,
    /// Actions attempted after gating.
    pub actions_attempted: u64,
    /// Actions that succeeded.
    pub actions_succeeded: u64,
    /// Gate rejections.
    pub gate_rejections: u64,
    /// Bytes actually reclaimed (or that a dry run would reclaim).
    pub bytes_reclaimed: u64,
    /// Digest algorithm tag for this run.
    pub algorithm: String,
    /// Whether system-root protection was active.
    pub system_protection: bool,
    /// Whether the run was interrupted.
    pub interrupted: bool,
}

/// `duplicates_<UTC %Y%m%d_%H%M%S>.<ext>` inside `dir`.
#[must_use]
pub fn report_path(dir: &Path, ext: &str) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("duplicates_{stamp}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_path_shape() {
        let path = report_path(Path::new("/out"), "csv");
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("duplicates_"));
        assert!(name.ends_with(".csv"));
        // duplicates_YYYYMMDD_HHMMSS.csv
        assert_eq!(name.len(), "duplicates_20260802_120000.csv".len());
    }
}
