//! Self-contained HTML report rendered with askama.
//!
//! All CSS is embedded so the file can be mailed or archived on its own.
//! Paths are escaped by the template engine.

use std::io::Write;

use askama::Template;
use bytesize::ByteSize;
use chrono::Utc;

use super::RunSummary;
use crate::duplicates::DigestGroup;

/// The report template context.
#[derive(Template)]
#[template(path = "report.html")]
pub struct HtmlReport {
    /// Formatted generation timestamp (UTC).
    pub timestamp: String,
    /// Tool version.
    pub version: String,
    /// Files discovered.
    pub files_discovered: u64,
    /// Groups found.
    pub groups_found: u64,
    /// Human-readable wasted bytes.
    pub bytes_wasted: String,
    /// Human-readable reclaimed bytes.
    pub bytes_reclaimed: String,
    /// Digest algorithm tag.
    pub algorithm: String,
    /// Groups formatted for presentation.
    pub groups: Vec<HtmlGroup>,
}

/// One group, formatted.
pub struct HtmlGroup {
    /// Dense group id.
    pub id: u64,
    /// Hex digest.
    pub digest: String,
    /// Human-readable member size.
    pub size: String,
    /// Member paths.
    pub paths: Vec<String>,
}

impl HtmlReport {
    /// Build the template context from groups and the run summary.
    #[must_use]
    pub fn new(groups: &[DigestGroup], summary: &RunSummary) -> Self {
        let html_groups = groups
            .iter()
            .map(|g| HtmlGroup {
                id: g.id,
                digest: g.digest.to_hex(),
                size: ByteSize::b(g.size).to_string(),
                paths: g
                    .files
                    .iter()
                    .map(|f| f.path.to_string_lossy().into_owned())
                    .collect(),
            })
            .collect();

        Self {
            timestamp: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            files_discovered: summary.files_discovered,
            groups_found: summary.groups_found,
            bytes_wasted: ByteSize::b(summary.bytes_wasted).to_string(),
            bytes_reclaimed: ByteSize::b(summary.bytes_reclaimed).to_string(),
            algorithm: summary.algorithm.clone(),
            groups: html_groups,
        }
    }

    /// Render and write the report.
    ///
    /// # Errors
    ///
    /// Template rendering or write failures.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        let html = self.render()?;
        writer.write_all(html.as_bytes())?;
        Ok(())
    }
}
