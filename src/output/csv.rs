//! CSV report.
//!
//! One row per duplicate file. Columns, in order: digest, path,
//! size_bytes, size_human, group_id, is_system.

use std::io;
use std::path::Path;

use bytesize::ByteSize;
use serde::Serialize;
use thiserror::Error;

use crate::duplicates::DigestGroup;

/// Errors during CSV generation.
#[derive(Debug, Error)]
pub enum CsvError {
    /// I/O failure while writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Serialize)]
struct Row {
    digest: String,
    path: String,
    size_bytes: u64,
    size_human: String,
    group_id: u64,
    is_system: bool,
}

/// CSV report over a set of duplicate groups.
pub struct CsvReport<'a> {
    groups: &'a [DigestGroup],
    system_roots: &'a [std::path::PathBuf],
}

impl<'a> CsvReport<'a> {
    /// Create a report. `system_roots` feeds the is_system column.
    #[must_use]
    pub fn new(groups: &'a [DigestGroup], system_roots: &'a [std::path::PathBuf]) -> Self {
        Self {
            groups,
            system_roots,
        }
    }

    /// Write all rows to `writer`.
    ///
    /// # Errors
    ///
    /// [`CsvError`] on write or serialization failure.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), CsvError> {
        let mut out = csv::Writer::from_writer(writer);
        for group in self.groups {
            let digest = group.digest.to_hex();
            for file in &group.files {
                out.serialize(Row {
                    digest: digest.clone(),
                    path: file.path.to_string_lossy().into_owned(),
                    size_bytes: file.size,
                    size_human: ByteSize::b(file.size).to_string(),
                    group_id: group.id,
                    is_system: is_system_path(&file.path, self.system_roots),
                })?;
            }
        }
        out.flush()?;
        Ok(())
    }
}

fn is_system_path(path: &Path, roots: &[std::path::PathBuf]) -> bool {
    roots.iter().any(|root| path.starts_with(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{Digest, DigestAlgorithm, FileRecord};
    use std::path::PathBuf;

    fn group() -> DigestGroup {
        DigestGroup {
            id: 3,
            digest: Digest::new(DigestAlgorithm::Md5, vec![0xab; 16]),
            size: 2048,
            files: vec![
                FileRecord::new(PathBuf::from("/home/u/a.bin"), 2048, 0, 1),
                FileRecord::new(PathBuf::from("/usr/lib/b.bin"), 2048, 0, 1),
            ],
        }
    }

    #[test]
    fn test_csv_columns_in_order() {
        let groups = vec![group()];
        let roots = vec![PathBuf::from("/usr")];
        let mut buf = Vec::new();
        CsvReport::new(&groups, &roots).write_to(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "digest,path,size_bytes,size_human,group_id,is_system"
        );
        let first = lines.next().unwrap();
        assert!(first.starts_with(&"ab".repeat(16)));
        assert!(first.contains("/home/u/a.bin"));
        assert!(first.ends_with("false"));
        let second = lines.next().unwrap();
        assert!(second.contains("/usr/lib/b.bin"));
        assert!(second.ends_with("true"));
    }

    #[test]
    fn test_csv_quotes_awkward_paths() {
        let mut g = group();
        g.files[0].path = PathBuf::from("/home/u/file,with,commas.txt");
        let groups = vec![g];
        let mut buf = Vec::new();
        CsvReport::new(&groups, &[]).write_to(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("\"/home/u/file,with,commas.txt\""));
    }

    #[test]
    fn test_csv_empty_groups() {
        let mut buf = Vec::new();
        CsvReport::new(&[], &[]).write_to(&mut buf).unwrap();
        // No records serialized, so not even a header is emitted.
        assert!(buf.is_empty());
    }
}
