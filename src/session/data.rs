//! Resume point data model.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::duplicates::DigestGroup;

/// Format version of the resume files.
pub const RESUME_VERSION: u32 = 1;

/// Metadata stored in `resume.meta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeMeta {
    /// Format version.
    pub version: u32,
    /// Epoch seconds at save time.
    pub saved_at: i64,
    /// Digest algorithm tag of the interrupted run.
    pub algorithm: String,
    /// Roots that were scanned.
    pub roots: Vec<PathBuf>,
}

/// A persisted snapshot of grouper output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePoint {
    /// Metadata.
    pub meta: ResumeMeta,
    /// The duplicate groups, ready for the keep-select stage.
    pub groups: Vec<DigestGroup>,
}

impl ResumePoint {
    /// Snapshot the given groups.
    #[must_use]
    pub fn new(algorithm: &str, roots: Vec<PathBuf>, groups: Vec<DigestGroup>) -> Self {
        Self {
            meta: ResumeMeta {
                version: RESUME_VERSION,
                saved_at: chrono::Utc::now().timestamp(),
                algorithm: algorithm.to_string(),
                roots,
            },
            groups,
        }
    }
}
