//! Resume round-trip: interrupting after grouping and resuming yields the
//! same actions as an uninterrupted run on an unchanged tree.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use dupesweep::config::RunConfig;
use dupesweep::duplicates::group_records;
use dupesweep::progress::SilentProgress;
use dupesweep::resolve::{ActionKind, KeepPolicy};
use dupesweep::runner::RunController;
use dupesweep::scanner::{
    fingerprint_files, DigestAlgorithm, PipelineOptions, WalkOptions, Walker,
};
use dupesweep::session::ResumePoint;
use dupesweep::signal::CancelToken;
use tempfile::TempDir;

fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    File::create(&path).unwrap().write_all(content).unwrap();
    path
}

fn make_tree(dir: &Path) -> Vec<PathBuf> {
    vec![
        write_file(dir, "dup-a", b"resume payload"),
        write_file(dir, "dup-b", b"resume payload"),
        write_file(dir, "dup-c", b"resume payload"),
        write_file(dir, "single", b"lonely"),
    ]
}

/// Group a tree the way the run controller would.
fn group_tree(root: &Path) -> Vec<dupesweep::duplicates::DigestGroup> {
    let walker = Walker::new(vec![root.to_path_buf()], WalkOptions::default());
    let options = PipelineOptions {
        algo: DigestAlgorithm::Md5,
        ..Default::default()
    };
    let (records, _) =
        fingerprint_files(walker, &options, None, &CancelToken::new(), &SilentProgress);
    let (groups, _) = group_records(records);
    groups
}

#[test]
fn resumed_run_performs_the_same_actions() {
    // Two identical trees: one resolved straight through, one via a
    // saved resume point.
    let direct_tree = TempDir::new().unwrap();
    let resumed_tree = TempDir::new().unwrap();
    make_tree(direct_tree.path());
    make_tree(resumed_tree.path());

    // Straight-through run.
    let mut config = RunConfig {
        roots: vec![direct_tree.path().to_path_buf()],
        action: ActionKind::Delete,
        keep_policy: KeepPolicy::First,
        quiet: true,
        system_roots: Vec::new(),
        ..Default::default()
    };
    config.validate().unwrap();
    let direct = RunController::new(config, CancelToken::new())
        .run()
        .unwrap();

    // Simulate an interruption after grouping: persist the grouper
    // output, then resume from it.
    let state_dir = TempDir::new().unwrap();
    let groups = group_tree(resumed_tree.path());
    ResumePoint::new(
        "md5",
        vec![resumed_tree.path().canonicalize().unwrap()],
        groups,
    )
    .save(state_dir.path())
    .unwrap();

    let mut config = RunConfig {
        roots: vec![resumed_tree.path().to_path_buf()],
        action: ActionKind::Delete,
        keep_policy: KeepPolicy::First,
        quiet: true,
        resume: true,
        system_roots: Vec::new(),
        output_dir: Some(state_dir.path().to_path_buf()),
        ..Default::default()
    };
    config.validate().unwrap();
    let resumed = RunController::new(config, CancelToken::new())
        .run()
        .unwrap();

    // Same actions, same reclaimed bytes.
    assert_eq!(
        direct.summary.actions_succeeded,
        resumed.summary.actions_succeeded
    );
    assert_eq!(
        direct.summary.bytes_reclaimed,
        resumed.summary.bytes_reclaimed
    );

    let survivors = |root: &Path| -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(root)
            .unwrap()
            .flatten()
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    };
    assert_eq!(survivors(direct_tree.path()), survivors(resumed_tree.path()));

    // Clean completion removed the resume files.
    assert!(!ResumePoint::exists(state_dir.path()));
}

#[test]
fn resume_with_mismatched_algorithm_is_rejected() {
    let tree = TempDir::new().unwrap();
    make_tree(tree.path());
    let state_dir = TempDir::new().unwrap();

    // Saved under sha256; the run below defaults to md5.
    let groups = group_tree(tree.path());
    ResumePoint::new(
        "sha256",
        vec![tree.path().canonicalize().unwrap()],
        groups,
    )
    .save(state_dir.path())
    .unwrap();

    let mut config = RunConfig {
        roots: vec![tree.path().to_path_buf()],
        action: ActionKind::Delete,
        quiet: true,
        resume: true,
        system_roots: Vec::new(),
        output_dir: Some(state_dir.path().to_path_buf()),
        ..Default::default()
    };
    config.validate().unwrap();
    let result = RunController::new(config, CancelToken::new()).run();
    assert!(result.is_err(), "algorithm mismatch must not be resolved");

    assert!(tree.path().join("dup-a").exists());
    assert!(tree.path().join("dup-b").exists());
    assert!(tree.path().join("dup-c").exists());
}

#[test]
fn resume_with_mismatched_roots_is_rejected() {
    let tree = TempDir::new().unwrap();
    let other = TempDir::new().unwrap();
    make_tree(tree.path());
    let state_dir = TempDir::new().unwrap();

    // Saved under a different tree than the one this run points at.
    let groups = group_tree(tree.path());
    ResumePoint::new("md5", vec![other.path().canonicalize().unwrap()], groups)
        .save(state_dir.path())
        .unwrap();

    let mut config = RunConfig {
        roots: vec![tree.path().to_path_buf()],
        action: ActionKind::Delete,
        quiet: true,
        resume: true,
        system_roots: Vec::new(),
        output_dir: Some(state_dir.path().to_path_buf()),
        ..Default::default()
    };
    config.validate().unwrap();
    let result = RunController::new(config, CancelToken::new()).run();
    assert!(result.is_err(), "root mismatch must not be resolved");

    assert!(tree.path().join("dup-a").exists());
    assert!(tree.path().join("dup-b").exists());
    assert!(tree.path().join("dup-c").exists());
}

#[test]
fn corrupt_resume_files_are_fatal() {
    let tree = TempDir::new().unwrap();
    make_tree(tree.path());
    let state_dir = TempDir::new().unwrap();

    let groups = group_tree(tree.path());
    ResumePoint::new("md5", vec![tree.path().to_path_buf()], groups)
        .save(state_dir.path())
        .unwrap();

    // Corrupt the binary group file.
    let groups_path = state_dir.path().join("resume.groups");
    let mut bytes = fs::read(&groups_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x55;
    fs::write(&groups_path, bytes).unwrap();

    let mut config = RunConfig {
        roots: vec![tree.path().to_path_buf()],
        action: ActionKind::Delete,
        quiet: true,
        resume: true,
        system_roots: Vec::new(),
        output_dir: Some(state_dir.path().to_path_buf()),
        ..Default::default()
    };
    config.validate().unwrap();
    let result = RunController::new(config, CancelToken::new()).run();
    assert!(result.is_err(), "corrupt resume files must not be resolved");

    // Nothing was deleted.
    assert!(tree.path().join("dup-a").exists());
    assert!(tree.path().join("dup-b").exists());
    assert!(tree.path().join("dup-c").exists());
}
