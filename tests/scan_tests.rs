//! Integration tests for discovery: filters, hidden files, exclusions,
//! traversal depth, and completeness of the walked set.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use dupesweep::scanner::{WalkOptions, Walker};
use tempfile::TempDir;

fn write_file(dir: &std::path::Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    File::create(&path).unwrap().write_all(content).unwrap();
    path
}

fn walked_names(roots: Vec<PathBuf>, options: WalkOptions) -> BTreeSet<String> {
    Walker::new(roots, options)
        .walk()
        .filter_map(Result::ok)
        .map(|r| r.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn discovers_exactly_the_regular_files() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "top.txt", b"top");
    write_file(dir.path(), "nested/inner.txt", b"inner");
    write_file(dir.path(), "nested/deeper/leaf.txt", b"leaf");
    fs::create_dir(dir.path().join("empty-dir")).unwrap();

    let names = walked_names(vec![dir.path().to_path_buf()], WalkOptions::default());
    let expected: BTreeSet<String> = ["top.txt", "inner.txt", "leaf.txt"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(names, expected);
}

#[test]
fn size_window_is_inclusive_on_both_ends() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "tiny", b"12");
    write_file(dir.path(), "exact-min", b"1234");
    write_file(dir.path(), "exact-max", b"12345678");
    write_file(dir.path(), "huge", b"123456789012");

    let options = WalkOptions {
        min_size: 4,
        max_size: Some(8),
        ..Default::default()
    };
    let names = walked_names(vec![dir.path().to_path_buf()], options);
    assert!(names.contains("exact-min"));
    assert!(names.contains("exact-max"));
    assert!(!names.contains("tiny"));
    assert!(!names.contains("huge"));
}

#[test]
fn hidden_entries_and_descent_skipped_by_default() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "visible.txt", b"v");
    write_file(dir.path(), ".dotfile", b"d");
    write_file(dir.path(), ".dotdir/buried.txt", b"b");

    let names = walked_names(vec![dir.path().to_path_buf()], WalkOptions::default());
    assert_eq!(names.len(), 1);
    assert!(names.contains("visible.txt"));

    let options = WalkOptions {
        include_hidden: true,
        ..Default::default()
    };
    let names = walked_names(vec![dir.path().to_path_buf()], options);
    assert!(names.contains(".dotfile"));
    assert!(names.contains("buried.txt"));
}

#[test]
fn exclusion_prunes_whole_subtrees() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "keep/a.txt", b"a");
    write_file(dir.path(), "skip/b.txt", b"b");
    write_file(dir.path(), "skip/deep/c.txt", b"c");

    let options = WalkOptions {
        exclude: vec![dir.path().join("skip").canonicalize().unwrap()],
        ..Default::default()
    };
    let names = walked_names(vec![dir.path().to_path_buf()], options);
    assert_eq!(names.len(), 1);
    assert!(names.contains("a.txt"));
}

#[test]
fn pattern_filter_matches_basenames() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "one.iso", b"iso1");
    write_file(dir.path(), "sub/two.iso", b"iso2");
    write_file(dir.path(), "three.txt", b"txt");

    let options = WalkOptions {
        patterns: vec!["*.iso".to_string()],
        ..Default::default()
    };
    let names = walked_names(vec![dir.path().to_path_buf()], options);
    assert_eq!(names.len(), 2);
    assert!(names.iter().all(|n| n.ends_with(".iso")));
}

#[test]
fn depth_limit_stops_descent() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "level1.txt", b"1");
    write_file(dir.path(), "a/level2.txt", b"2");
    write_file(dir.path(), "a/b/level3.txt", b"3");

    let options = WalkOptions {
        max_depth: Some(2),
        ..Default::default()
    };
    let names = walked_names(vec![dir.path().to_path_buf()], options);
    assert!(names.contains("level1.txt"));
    assert!(names.contains("level2.txt"));
    assert!(!names.contains("level3.txt"));
}

#[test]
fn multiple_roots_walk_all() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    write_file(a.path(), "in-a.txt", b"a");
    write_file(b.path(), "in-b.txt", b"b");

    let names = walked_names(
        vec![a.path().to_path_buf(), b.path().to_path_buf()],
        WalkOptions::default(),
    );
    assert!(names.contains("in-a.txt"));
    assert!(names.contains("in-b.txt"));
}

#[test]
fn records_carry_canonical_paths_and_metadata() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "meta.txt", b"payload!");

    let records: Vec<_> = Walker::new(vec![dir.path().to_path_buf()], WalkOptions::default())
        .walk()
        .filter_map(Result::ok)
        .collect();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(record.path.is_absolute());
    assert_eq!(record.path, record.path.canonicalize().unwrap());
    assert_eq!(record.size, 8);
    assert!(record.mtime > 0);
    #[cfg(unix)]
    assert!(record.dev > 0);
    assert!(record.digest.is_none());
}
