//! Pluggable grouping providers.
//!
//! Exact digest matching is the default and the only provider that can
//! authorize destructive actions. The size-proximity provider backs
//! `--fuzzy`: it widens groups to records whose sizes lie within a
//! percentage threshold of each other. Its groups are report material:
//! members are generally not byte-identical, so the safety gate's byte
//! verification blocks destructive actions on them.

use super::grouper::{group_records, GrouperStats};
use super::DigestGroup;
use crate::scanner::FileRecord;

/// A grouping strategy.
pub trait SimilarityProvider {
    /// Provider name for logs and the audit trail.
    fn name(&self) -> &'static str;

    /// Group the records.
    fn group(&self, records: Vec<FileRecord>) -> (Vec<DigestGroup>, GrouperStats);
}

/// Exact matching: identical digest, identical size.
#[derive(Debug, Default)]
pub struct ExactMatch;

impl SimilarityProvider for ExactMatch {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn group(&self, records: Vec<FileRecord>) -> (Vec<DigestGroup>, GrouperStats) {
        group_records(records)
    }
}

/// Size-proximity grouping for `--fuzzy`.
///
/// Records are sorted by size and clustered greedily: a record joins the
/// current cluster while its size is within `threshold_pct` percent of the
/// cluster's anchor (its smallest member).
#[derive(Debug)]
pub struct SizeProximity {
    /// Allowed deviation from the anchor size, in percent.
    pub threshold_pct: f64,
}

impl SimilarityProvider for SizeProximity {
    fn name(&self) -> &'static str {
        "size-proximity"
    }

    fn group(&self, records: Vec<FileRecord>) -> (Vec<DigestGroup>, GrouperStats) {
        let mut stats = GrouperStats {
            total_records: records.len(),
            ..Default::default()
        };

        let mut records: Vec<FileRecord> = records
            .into_iter()
            .filter(|r| r.digest.is_some())
            .collect();
        records.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| a.path.cmp(&b.path)));

        let mut groups: Vec<DigestGroup> = Vec::new();
        let mut cluster: Vec<FileRecord> = Vec::new();
        let mut anchor: u64 = 0;

        for record in records {
            let within = !cluster.is_empty() && {
                let limit = anchor as f64 * (1.0 + self.threshold_pct / 100.0);
                (record.size as f64) <= limit
            };
            if within {
                cluster.push(record);
            } else {
                Self::emit(&mut cluster, &mut groups, &mut stats);
                anchor = record.size;
                cluster.push(record);
            }
        }
        Self::emit(&mut cluster, &mut groups, &mut stats);

        stats.groups = groups.len();
        stats.wasted_bytes = groups.iter().map(DigestGroup::wasted_space).sum();
        (groups, stats)
    }
}

impl SizeProximity {
    fn emit(cluster: &mut Vec<FileRecord>, groups: &mut Vec<DigestGroup>, stats: &mut GrouperStats) {
        let members = std::mem::take(cluster);
        match members.len() {
            0 => {}
            1 => stats.unique += 1,
            _ => {
                let digest = members[0]
                    .digest
                    .clone()
                    .expect("filtered to digest-carrying records");
                let size = members[0].size;
                groups.push(DigestGroup {
                    id: groups.len() as u64,
                    digest,
                    size,
                    files: members,
                });
            }
        }
    }
}
