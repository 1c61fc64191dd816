//! JSON report.
//!
//! Schema: a top-level object with `metadata` (tool version, generation
//! time, roots, counters, algorithm, protection flag) and `groups`
//! (`{id, digest, files: [{path, size, system}]}`). Strings are UTF-8 and
//! serde_json escapes paths per the JSON grammar, backslashes included.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use super::RunSummary;
use crate::duplicates::DigestGroup;

/// Errors during JSON generation.
#[derive(Debug, Error)]
pub enum JsonError {
    /// I/O failure while writing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Report metadata block.
#[derive(Debug, Clone, Serialize)]
pub struct JsonMetadata {
    /// Tool version.
    pub version: String,
    /// UTC generation time, RFC 3339.
    pub generated_utc: String,
    /// Scanned roots.
    pub roots: Vec<String>,
    /// Files discovered by the walker.
    pub files_discovered: u64,
    /// Files fingerprinted.
    pub files_fingerprinted: u64,
    /// Hash errors.
    pub hash_errors: u64,
    /// Groups found.
    pub groups_found: u64,
    /// Bytes wasted across groups.
    pub bytes_wasted: u64,
    /// Actions attempted.
    pub actions_attempted: u64,
    /// Actions succeeded.
    pub actions_succeeded: u64,
    /// Bytes reclaimed.
    pub bytes_reclaimed: u64,
    /// Digest algorithm tag.
    pub algorithm: String,
    /// Whether system-root protection was active.
    pub system_protection: bool,
}

/// One file inside a group.
#[derive(Debug, Clone, Serialize)]
pub struct JsonFile {
    /// Absolute path.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Whether the path lies under a configured system root.
    pub system: bool,
}

/// One duplicate group.
#[derive(Debug, Clone, Serialize)]
pub struct JsonGroup {
    /// Dense group id.
    pub id: u64,
    /// Hex digest (algorithm-tagged form, e.g. `md5:ab...`).
    pub digest: String,
    /// Member files.
    pub files: Vec<JsonFile>,
}

/// The full document.
#[derive(Debug, Clone, Serialize)]
pub struct JsonReport {
    /// Run metadata and counters.
    pub metadata: JsonMetadata,
    /// Duplicate groups.
    pub groups: Vec<JsonGroup>,
}

impl JsonReport {
    /// Build the document from groups and the run summary.
    #[must_use]
    pub fn new(
        groups: &[DigestGroup],
        summary: &RunSummary,
        system_roots: &[std::path::PathBuf],
    ) -> Self {
        let metadata = JsonMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_utc: chrono::Utc::now().to_rfc3339(),
            roots: summary
                .roots
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            files_discovered: summary.files_discovered,
            files_fingerprinted: summary.files_fingerprinted,
            hash_errors: summary.hash_errors,
            groups_found: summary.groups_found,
            bytes_wasted: summary.bytes_wasted,
            actions_attempted: summary.actions_attempted,
            actions_succeeded: summary.actions_succeeded,
            bytes_reclaimed: summary.bytes_reclaimed,
            algorithm: summary.algorithm.clone(),
            system_protection: summary.system_protection,
        };

        let groups = groups
            .iter()
            .map(|g| JsonGroup {
                id: g.id,
                digest: g.digest.to_string(),
                files: g
                    .files
                    .iter()
                    .map(|f| JsonFile {
                        path: f.path.to_string_lossy().into_owned(),
                        size: f.size,
                        system: is_system_path(&f.path, system_roots),
                    })
                    .collect(),
            })
            .collect();

        Self { metadata, groups }
    }

    /// Pretty-printed JSON text.
    ///
    /// # Errors
    ///
    /// Serialization failure.
    pub fn to_json_pretty(&self) -> Result<String, JsonError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the document to `writer`.
    ///
    /// # Errors
    ///
    /// [`JsonError`] on write or serialization failure.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), JsonError> {
        serde_json::to_writer_pretty(&mut *writer, self)?;
        writeln!(writer)?;
        Ok(())
    }
}

fn is_system_path(path: &Path, roots: &[std::path::PathBuf]) -> bool {
    roots.iter().any(|root| path.starts_with(root))
}
