//! Grouping of fingerprinted records into duplicate groups.

use super::spill::sort_records;
use super::DigestGroup;
use crate::scanner::FileRecord;

/// Record count above which the sort spills to disk.
pub const SPILL_THRESHOLD: usize = 500_000;

/// Statistics from the grouping phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrouperStats {
    /// Records consumed.
    pub total_records: usize,
    /// Groups of cardinality ≥ 2 emitted.
    pub groups: usize,
    /// Records discarded as unique.
    pub unique: usize,
    /// Same-digest groups that had to be split by size. Each one is either
    /// a digest collision or a caching error and is worth flagging.
    pub size_collisions: usize,
    /// Total wasted bytes across emitted groups.
    pub wasted_bytes: u64,
}

/// Group records by (algorithm, digest), then by size within a digest.
///
/// Records without a digest are ignored (they failed hashing upstream and
/// were already counted there). Groups of cardinality 1 are dropped.
/// Surviving groups get dense monotonic ids in order of first-seen digest
/// under a stable sort, so ids are deterministic for a fixed input
/// multiset.
///
/// A digest shared by records of different sizes signals a collision or a
/// cache fault; the group is split by size and the anomaly counted.
#[must_use]
pub fn group_records(records: Vec<FileRecord>) -> (Vec<DigestGroup>, GrouperStats) {
    let mut stats = GrouperStats {
        total_records: records.len(),
        ..Default::default()
    };

    // Stable sort keyed on (algo, digest bytes, size, path). Path is part
    // of the key so the member order inside each group is reproducible.
    let sorted = sort_records(records, SPILL_THRESHOLD);

    let mut groups: Vec<DigestGroup> = Vec::new();
    let mut next_id: u64 = 0;

    let mut run: Vec<FileRecord> = Vec::new();
    for record in sorted {
        let same_digest = run
            .last()
            .is_some_and(|prev| prev.digest == record.digest);
        if same_digest {
            run.push(record);
        } else {
            flush_run(&mut run, &mut groups, &mut next_id, &mut stats);
            run.push(record);
        }
    }
    flush_run(&mut run, &mut groups, &mut next_id, &mut stats);

    stats.groups = groups.len();
    stats.wasted_bytes = groups.iter().map(DigestGroup::wasted_space).sum();

    log::debug!(
        "grouper: {} records -> {} groups, {} unique, {} size collisions",
        stats.total_records,
        stats.groups,
        stats.unique,
        stats.size_collisions
    );

    (groups, stats)
}

/// Emit the buffered same-digest run as zero or more groups.
fn flush_run(
    run: &mut Vec<FileRecord>,
    groups: &mut Vec<DigestGroup>,
    next_id: &mut u64,
    stats: &mut GrouperStats,
) {
    if run.is_empty() {
        return;
    }
    let members = std::mem::take(run);
    if members.len() == 1 {
        stats.unique += 1;
        return;
    }

    // Same digest, possibly mixed sizes. The sort already ordered by size
    // within the digest, so size sub-runs are contiguous.
    let distinct_sizes = {
        let mut n = 1;
        for pair in members.windows(2) {
            if pair[0].size != pair[1].size {
                n += 1;
            }
        }
        n
    };
    if distinct_sizes > 1 {
        let shown = members[0]
            .digest
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default();
        log::warn!(
            "{} digest {} spans {} distinct sizes; splitting",
            crate::error::ReasonCode::GroupCollision,
            shown,
            distinct_sizes
        );
        stats.size_collisions += 1;
    }

    let mut by_size: Vec<FileRecord> = Vec::new();
    for member in members {
        let same_size = by_size.last().is_some_and(|prev| prev.size == member.size);
        if same_size || by_size.is_empty() {
            by_size.push(member);
        } else {
            emit_group(std::mem::take(&mut by_size), groups, next_id, stats);
            by_size.push(member);
        }
    }
    emit_group(by_size, groups, next_id, stats);
}

fn emit_group(
    members: Vec<FileRecord>,
    groups: &mut Vec<DigestGroup>,
    next_id: &mut u64,
    stats: &mut GrouperStats,
) {
    if members.is_empty() {
        return;
    }
    if members.len() == 1 {
        stats.unique += 1;
        return;
    }
    let digest = members[0]
        .digest
        .clone()
        .expect("grouper input records carry digests");
    let size = members[0].size;
    groups.push(DigestGroup {
        id: *next_id,
        digest,
        size,
        files: members,
    });
    *next_id += 1;
}
