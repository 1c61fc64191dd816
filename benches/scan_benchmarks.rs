use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use dupesweep::duplicates::group_records;
use dupesweep::scanner::{
    hash_file, Deadline, Digest, DigestAlgorithm, FileRecord, WalkOptions, Walker,
};
use tempfile::TempDir;

/// Build a tree: `dirs` directories of `files_per_dir` small files, half
/// of them duplicated content.
fn setup_tree(dirs: usize, files_per_dir: usize) -> TempDir {
    let root = TempDir::new().unwrap();
    for d in 0..dirs {
        let dir = root.path().join(format!("dir{d:02}"));
        fs::create_dir_all(&dir).unwrap();
        for f in 0..files_per_dir {
            let mut file = File::create(dir.join(format!("file{f:03}.dat"))).unwrap();
            if f % 2 == 0 {
                writeln!(file, "shared content block {}", f % 5).unwrap();
            } else {
                writeln!(file, "unique content {d}/{f}").unwrap();
            }
        }
    }
    root
}

fn bench_walker(c: &mut Criterion) {
    let tree = setup_tree(8, 50);
    c.bench_function("walk_400_files", |b| {
        b.iter(|| {
            let walker = Walker::new(vec![tree.path().to_path_buf()], WalkOptions::default());
            let count = walker.walk().filter_map(Result::ok).count();
            black_box(count)
        });
    });
}

fn bench_hashing(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("payload.bin");
    let payload = vec![0xa5u8; 4 * 1024 * 1024];
    fs::write(&path, &payload).unwrap();

    let mut group = c.benchmark_group("hash_4mib");
    for algo in [
        DigestAlgorithm::Md5,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha512,
        DigestAlgorithm::Fast64,
    ] {
        group.bench_function(algo.tag(), |b| {
            b.iter(|| black_box(hash_file(&path, algo, Deadline::none()).unwrap()));
        });
    }
    group.finish();
}

fn bench_grouping(c: &mut Criterion) {
    let records: Vec<FileRecord> = (0u64..10_000)
        .map(|i| {
            let mut r = FileRecord::new(
                PathBuf::from(format!("/bench/file{i:05}")),
                (i % 97) + 1,
                0,
                1,
            );
            r.digest = Some(Digest::new(
                DigestAlgorithm::Md5,
                vec![(i % 31) as u8; 16],
            ));
            r
        })
        .collect();

    c.bench_function("group_10k_records", |b| {
        b.iter(|| black_box(group_records(records.clone())));
    });
}

criterion_group!(benches, bench_walker, bench_hashing, bench_grouping);
criterion_main!(benches);
