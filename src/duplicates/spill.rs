//! Sorting of record sets with an on-disk spill path.
//!
//! Small record sets sort in memory. Past a threshold, records are sorted
//! in chunks, each chunk serialized to an anonymous temp file as a sorted
//! run, and the runs merged lazily. Peak memory then stays proportional to
//! the chunk size rather than the tree size.
//!
//! The sort is stable with respect to input order (chunks are formed in
//! order and the merge breaks key ties by run index), which is what makes
//! downstream group ids deterministic.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};

use crate::scanner::FileRecord;

/// Sort records by (algorithm, digest, size, path), spilling to disk when
/// the set exceeds `threshold`.
///
/// Records without a digest are dropped; they failed hashing upstream and
/// were counted there.
pub fn sort_records(
    records: Vec<FileRecord>,
    threshold: usize,
) -> Box<dyn Iterator<Item = FileRecord>> {
    let mut records: Vec<FileRecord> = records
        .into_iter()
        .filter(|r| r.digest.is_some())
        .collect();

    if records.len() <= threshold {
        records.sort_by(compare);
        return Box::new(records.into_iter());
    }

    log::info!(
        "grouper: {} records exceed the in-memory threshold, spilling to sorted runs",
        records.len()
    );

    let chunk = threshold.max(1);
    let mut runs = Vec::new();
    let mut iter = records.into_iter();
    loop {
        let mut front: Vec<FileRecord> = iter.by_ref().take(chunk).collect();
        if front.is_empty() {
            break;
        }
        front.sort_by(compare);
        match write_run(&front) {
            Ok(run) => runs.push(run),
            Err(e) => {
                // Spill failure falls back to finishing in memory.
                log::warn!("spill write failed ({}), sorting remainder in memory", e);
                let mut all: Vec<FileRecord> = runs
                    .into_iter()
                    .flat_map(|r| RunReader::new(r).collect::<Vec<_>>())
                    .chain(front)
                    .chain(iter)
                    .collect();
                all.sort_by(compare);
                return Box::new(all.into_iter());
            }
        }
    }

    Box::new(MergeIter::new(runs))
}

/// Ordering used everywhere: algorithm tag, digest bytes, size, path.
fn compare(a: &FileRecord, b: &FileRecord) -> Ordering {
    let da = a.digest.as_ref().expect("filtered above");
    let db = b.digest.as_ref().expect("filtered above");
    da.algo
        .tag()
        .cmp(db.algo.tag())
        .then_with(|| da.bytes.cmp(&db.bytes))
        .then_with(|| a.size.cmp(&b.size))
        .then_with(|| a.path.cmp(&b.path))
}

/// Serialize one sorted run into an anonymous temp file.
///
/// Format: repeated `u32` little-endian length prefix + bincode record.
fn write_run(records: &[FileRecord]) -> std::io::Result<File> {
    let file = tempfile::tempfile()?;
    let mut writer = BufWriter::new(file);
    for record in records {
        let bytes = bincode::serialize(record)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
        writer.write_all(&bytes)?;
    }
    let mut file = writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    file.seek(SeekFrom::Start(0))?;
    Ok(file)
}

/// Streaming reader over one serialized run.
struct RunReader {
    reader: BufReader<File>,
}

impl RunReader {
    fn new(file: File) -> Self {
        Self {
            reader: BufReader::new(file),
        }
    }
}

impl Iterator for RunReader {
    type Item = FileRecord;

    fn next(&mut self) -> Option<FileRecord> {
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(_) => return None,
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).ok()?;
        bincode::deserialize(&buf).ok()
    }
}

struct HeapEntry {
    record: FileRecord,
    run: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for ascending output. Ties go
        // to the lower run index, which preserves input-order stability.
        compare(&self.record, &other.record)
            .then_with(|| self.run.cmp(&other.run))
            .reverse()
    }
}

/// K-way merge over sorted runs.
struct MergeIter {
    readers: Vec<RunReader>,
    heap: BinaryHeap<HeapEntry>,
}

impl MergeIter {
    fn new(files: Vec<File>) -> Self {
        let mut readers: Vec<RunReader> = files.into_iter().map(RunReader::new).collect();
        let mut heap = BinaryHeap::new();
        for (run, reader) in readers.iter_mut().enumerate() {
            if let Some(record) = reader.next() {
                heap.push(HeapEntry { record, run });
            }
        }
        Self { readers, heap }
    }
}

impl Iterator for MergeIter {
    type Item = FileRecord;

    fn next(&mut self) -> Option<FileRecord> {
        let entry = self.heap.pop()?;
        if let Some(record) = self.readers[entry.run].next() {
            self.heap.push(HeapEntry {
                record,
                run: entry.run,
            });
        }
        Some(entry.record)
    }
}
