//! Survivor selection.
//!
//! Given a duplicate group, exactly one member is chosen to keep. The
//! rules run in a fixed order and the first applicable one wins; every
//! rule breaks ties by lexicographically smaller path, so the choice is
//! total and deterministic.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::duplicates::DigestGroup;

/// Configured survivor policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeepPolicy {
    /// Lexicographically smallest path (the default).
    #[default]
    First,
    /// Greatest mtime wins.
    Newest,
    /// Least mtime wins.
    Oldest,
    /// Score members against a location-priority table; lowest score wins.
    Smart,
}

/// The strategy that actually produced a decision.
///
/// Differs from the policy when a keep-path was configured: the path rule
/// runs first regardless of policy, and falls through when it matches
/// zero or several members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeepStrategy {
    /// Keep-path prefix matched exactly one member.
    KeepPath,
    /// Newest-wins.
    Newest,
    /// Oldest-wins.
    Oldest,
    /// Location-priority table.
    Smart,
    /// Lexicographic default.
    First,
}

impl KeepStrategy {
    /// Tag recorded in the audit log.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::KeepPath => "keep-path",
            Self::Newest => "keep-newest",
            Self::Oldest => "keep-oldest",
            Self::Smart => "smart",
            Self::First => "first",
        }
    }
}

/// The survivor choice for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepDecision {
    /// Index of the survivor within the group's member vector.
    pub index: usize,
    /// Which rule made the choice.
    pub strategy: KeepStrategy,
}

/// Location-priority table for smart selection.
///
/// Each entry is a path prefix with a score; a member's score is the score
/// of the *longest* matching prefix, and lower scores are preferred. The
/// default table prefers user data over scratch locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationPriorities {
    entries: Vec<(PathBuf, u32)>,
}

impl Default for LocationPriorities {
    fn default() -> Self {
        Self {
            entries: vec![
                (PathBuf::from("/home"), 10),
                (PathBuf::from("/root"), 15),
                (PathBuf::from("/srv"), 20),
                (PathBuf::from("/opt"), 30),
                (PathBuf::from("/var"), 60),
                (PathBuf::from("/var/tmp"), 80),
                (PathBuf::from("/tmp"), 90),
            ],
        }
    }
}

impl LocationPriorities {
    /// Build a table from explicit entries.
    #[must_use]
    pub fn new(entries: Vec<(PathBuf, u32)>) -> Self {
        Self { entries }
    }

    /// Score for a path: the score of the longest matching prefix, or
    /// `u32::MAX` when nothing matches.
    #[must_use]
    pub fn score(&self, path: &Path) -> u32 {
        self.entries
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.as_os_str().len())
            .map_or(u32::MAX, |(_, score)| *score)
    }
}

/// Choose the survivor for a group.
///
/// Rule order: keep-path prefix (exactly one match), then the configured
/// policy, then the lexicographic default. Always returns a valid index
/// for a non-empty group.
///
/// # Panics
///
/// Panics on an empty group; the grouper never emits one.
#[must_use]
pub fn select_survivor(
    group: &DigestGroup,
    policy: &KeepPolicy,
    keep_path: Option<&Path>,
    priorities: &LocationPriorities,
) -> KeepDecision {
    assert!(!group.files.is_empty(), "empty group reached the keeper");

    if let Some(prefix) = keep_path {
        let matching: Vec<usize> = group
            .files
            .iter()
            .enumerate()
            .filter(|(_, f)| f.path.starts_with(prefix))
            .map(|(i, _)| i)
            .collect();
        if matching.len() == 1 {
            return KeepDecision {
                index: matching[0],
                strategy: KeepStrategy::KeepPath,
            };
        }
        // Zero or ambiguous: fall through to the policy.
    }

    match policy {
        KeepPolicy::Newest => KeepDecision {
            // Greatest mtime; tie to the smaller path.
            index: preferred(group, |a, b| {
                b.mtime.cmp(&a.mtime).then_with(|| a.path.cmp(&b.path))
            }),
            strategy: KeepStrategy::Newest,
        },
        KeepPolicy::Oldest => KeepDecision {
            index: preferred(group, |a, b| {
                a.mtime.cmp(&b.mtime).then_with(|| a.path.cmp(&b.path))
            }),
            strategy: KeepStrategy::Oldest,
        },
        KeepPolicy::Smart => KeepDecision {
            index: preferred(group, |a, b| {
                priorities
                    .score(&a.path)
                    .cmp(&priorities.score(&b.path))
                    .then_with(|| a.path.cmp(&b.path))
            }),
            strategy: KeepStrategy::Smart,
        },
        KeepPolicy::First => KeepDecision {
            index: preferred(group, |a, b| a.path.cmp(&b.path)),
            strategy: KeepStrategy::First,
        },
    }
}

/// Index of the member that compares least under `better`, i.e. the
/// preferred one. The comparators above are total (path is always the
/// final component), so the result is unique.
fn preferred(
    group: &DigestGroup,
    better: impl Fn(&crate::scanner::FileRecord, &crate::scanner::FileRecord) -> std::cmp::Ordering,
) -> usize {
    group
        .files
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| better(a, b))
        .map(|(i, _)| i)
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{Digest, DigestAlgorithm, FileRecord};

    fn group(members: &[(&str, i64)]) -> DigestGroup {
        DigestGroup {
            id: 0,
            digest: Digest::new(DigestAlgorithm::Md5, vec![0; 16]),
            size: 100,
            files: members
                .iter()
                .map(|(path, mtime)| FileRecord::new(PathBuf::from(path), 100, *mtime, 1))
                .collect(),
        }
    }

    fn pick(group: &DigestGroup, policy: KeepPolicy, keep_path: Option<&str>) -> KeepDecision {
        select_survivor(
            group,
            &policy,
            keep_path.map(Path::new),
            &LocationPriorities::default(),
        )
    }

    #[test]
    fn test_default_lexicographic() {
        let g = group(&[("/b", 2), ("/a", 1), ("/c", 3)]);
        let decision = pick(&g, KeepPolicy::First, None);
        assert_eq!(g.files[decision.index].path, PathBuf::from("/a"));
        assert_eq!(decision.strategy, KeepStrategy::First);
    }

    #[test]
    fn test_newest_wins() {
        let g = group(&[("/a", 10), ("/b", 30), ("/c", 20)]);
        let decision = pick(&g, KeepPolicy::Newest, None);
        assert_eq!(g.files[decision.index].path, PathBuf::from("/b"));
        assert_eq!(decision.strategy, KeepStrategy::Newest);
    }

    #[test]
    fn test_newest_tie_smaller_path() {
        let g = group(&[("/z", 30), ("/a", 30), ("/m", 10)]);
        let decision = pick(&g, KeepPolicy::Newest, None);
        assert_eq!(g.files[decision.index].path, PathBuf::from("/a"));
    }

    #[test]
    fn test_oldest_wins() {
        let g = group(&[("/a", 10), ("/b", 30), ("/c", 20)]);
        let decision = pick(&g, KeepPolicy::Oldest, None);
        assert_eq!(g.files[decision.index].path, PathBuf::from("/a"));
        assert_eq!(decision.strategy, KeepStrategy::Oldest);
    }

    #[test]
    fn test_oldest_tie_smaller_path() {
        let g = group(&[("/z", 10), ("/b", 10), ("/y", 20)]);
        let decision = pick(&g, KeepPolicy::Oldest, None);
        assert_eq!(g.files[decision.index].path, PathBuf::from("/b"));
    }

    #[test]
    fn test_keep_path_single_match_wins_over_policy() {
        let g = group(&[("/data/a", 10), ("/tmp/b", 99)]);
        let decision = pick(&g, KeepPolicy::Newest, Some("/data"));
        assert_eq!(g.files[decision.index].path, PathBuf::from("/data/a"));
        assert_eq!(decision.strategy, KeepStrategy::KeepPath);
    }

    #[test]
    fn test_keep_path_ambiguous_falls_through() {
        let g = group(&[("/data/a", 10), ("/data/b", 99)]);
        let decision = pick(&g, KeepPolicy::Newest, Some("/data"));
        assert_eq!(decision.strategy, KeepStrategy::Newest);
        assert_eq!(g.files[decision.index].path, PathBuf::from("/data/b"));
    }

    #[test]
    fn test_keep_path_no_match_falls_through() {
        let g = group(&[("/x/a", 1), ("/y/b", 2)]);
        let decision = pick(&g, KeepPolicy::First, Some("/data"));
        assert_eq!(decision.strategy, KeepStrategy::First);
    }

    #[test]
    fn test_smart_prefers_home_over_tmp() {
        let g = group(&[("/tmp/x", 50), ("/home/user/x", 10)]);
        let decision = pick(&g, KeepPolicy::Smart, None);
        assert_eq!(g.files[decision.index].path, PathBuf::from("/home/user/x"));
        assert_eq!(decision.strategy, KeepStrategy::Smart);
    }

    #[test]
    fn test_smart_longest_prefix_wins() {
        // /var/tmp scores worse than /var, and the longest prefix decides.
        let g = group(&[("/var/tmp/x", 1), ("/var/lib/x", 1)]);
        let decision = pick(&g, KeepPolicy::Smart, None);
        assert_eq!(g.files[decision.index].path, PathBuf::from("/var/lib/x"));
    }

    #[test]
    fn test_smart_unknown_locations_tie_break_by_path() {
        let g = group(&[("/weird/b", 1), ("/weird/a", 1)]);
        let decision = pick(&g, KeepPolicy::Smart, None);
        assert_eq!(g.files[decision.index].path, PathBuf::from("/weird/a"));
    }

    #[test]
    fn test_location_priorities_score() {
        let p = LocationPriorities::default();
        assert_eq!(p.score(Path::new("/home/u/f")), 10);
        assert_eq!(p.score(Path::new("/var/tmp/f")), 80);
        assert_eq!(p.score(Path::new("/var/lib/f")), 60);
        assert_eq!(p.score(Path::new("/elsewhere")), u32::MAX);
    }
}
