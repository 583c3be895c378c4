//! # Packing Pipeline
//!
//! Turns a folder tree into a single archive, storing each distinct file
//! content exactly once.
//!
//! The run has three steps:
//!
//! 1. **Scan** (single-threaded): enumerate regular files, assign 1-based ids
//!    in discovery order and group record indices by byte size.
//! 2. **Phase 1** (worker pool): a size bucket with one member cannot have a
//!    duplicate and is written straight to the stream; members of contested
//!    buckets get a content checksum and move into a second map keyed by
//!    `(checksum, size)`.
//! 3. **Phase 2** (worker pool): each `(checksum, size)` bucket is resolved
//!    serially by one task. The front record is stored as a file node and the
//!    rest are byte-compared against it; matches become link nodes, the
//!    mismatches seed the next sub-pass. A checksum collision therefore never
//!    produces a false link.
//!
//! Every node is appended under one output-stream lock. Within a Phase-2
//! task the representative's file node is appended before any of its links,
//! so in the final stream a link is always preceded by the file node it
//! references, no matter how tasks interleave.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use memmap2::Mmap;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::compress;
use crate::content;
use crate::error::ArchiveError;
use crate::format::{self, MAX_FILE_ID, MAX_NAME_LEN};

/// Counters exposed after a pack run. Shared with worker tasks, so the
/// mutable ones are atomics.
#[derive(Debug, Default)]
pub struct PackStats {
    files: AtomicU64,
    total_size: AtomicU64,
    output_size: AtomicU64,
    saved_files: AtomicU64,
    saved_links: AtomicU64,
}

impl PackStats {
    /// Regular files found by the scan.
    pub fn files(&self) -> u64 {
        self.files.load(Ordering::Relaxed)
    }

    /// Total input bytes across all scanned files.
    pub fn total_size(&self) -> u64 {
        self.total_size.load(Ordering::Relaxed)
    }

    /// Size of the finished archive in bytes.
    pub fn output_size(&self) -> u64 {
        self.output_size.load(Ordering::Relaxed)
    }

    /// Records stored as file nodes.
    pub fn saved_files(&self) -> u64 {
        self.saved_files.load(Ordering::Relaxed)
    }

    /// Records stored as link nodes.
    pub fn saved_links(&self) -> u64 {
        self.saved_links.load(Ordering::Relaxed)
    }
}

/// One scanned regular file. Records live in an id-ordered arena for the
/// whole run; each one is claimed and written by exactly one task, so the
/// flags are per-record and never contended.
#[derive(Debug)]
struct FileRecord {
    /// Path relative to the input root, as stored in the container.
    name: String,
    /// Absolute path used for reading.
    path: PathBuf,
    /// 1-based id in discovery order.
    id: u32,
    size: u64,
    /// Content checksum, filled in once by the Phase-1 task that computes it.
    checksum: OnceLock<u64>,
    /// Written-once guard: a record is never encoded twice.
    saved: AtomicBool,
    /// Set when the node's payload went through the codec.
    compressed: AtomicBool,
}

type SizeBuckets = HashMap<u64, Vec<usize>>;

/// Packs one folder into one archive. Construction performs the entire run;
/// the finished value carries the statistics.
#[derive(Debug)]
pub struct Packer {
    compression_level: i32,
    records: Vec<FileRecord>,
    writer: Mutex<BufWriter<File>>,
    first_error: Mutex<Option<ArchiveError>>,
    stats: PackStats,
}

impl Packer {
    /// Packs `input_folder` into `archive`.
    ///
    /// Fails when the folder holds no regular files, when a format capacity
    /// limit is exceeded (both checked before the archive file is created)
    /// or on an unrecoverable I/O error.
    pub fn new(
        input_folder: &Path,
        archive: &Path,
        compression_level: i32,
    ) -> Result<Self, ArchiveError> {
        let (records, by_size, total_size) = scan_folder(input_folder)?;

        if records.is_empty() {
            return Err(ArchiveError::EmptyInput(input_folder.to_path_buf()));
        }

        let output = File::create(archive).map_err(|e| ArchiveError::io(e, archive))?;

        let packer = Packer {
            compression_level,
            records,
            writer: Mutex::new(BufWriter::new(output)),
            first_error: Mutex::new(None),
            stats: PackStats::default(),
        };
        packer
            .stats
            .files
            .store(packer.records.len() as u64, Ordering::Relaxed);
        packer.stats.total_size.store(total_size, Ordering::Relaxed);

        packer.pack(&by_size)?;

        packer
            .writer
            .lock()
            .unwrap()
            .flush()
            .map_err(|e| ArchiveError::io(e, archive))?;
        let output_size = fs::metadata(archive)
            .map_err(|e| ArchiveError::io(e, archive))?
            .len();
        packer
            .stats
            .output_size
            .store(output_size, Ordering::Relaxed);

        Ok(packer)
    }

    pub fn stats(&self) -> &PackStats {
        &self.stats
    }

    fn pack(&self, by_size: &SizeBuckets) -> Result<(), ArchiveError> {
        self.write_magic()?;

        let refined: Mutex<HashMap<(u64, u64), Vec<usize>>> = Mutex::new(HashMap::new());

        // Phase 1: disambiguate by size.
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_cpus::get())
            .build()?;
        pool.scope(|scope| {
            for bucket in by_size.values() {
                if bucket.len() == 1 {
                    let index = bucket[0];
                    scope.spawn(move |_| {
                        if let Err(e) = self.write_file(index) {
                            self.record_error(e);
                        }
                    });
                } else {
                    for &index in bucket {
                        let refined = &refined;
                        scope.spawn(move |_| {
                            let record = &self.records[index];
                            match content::checksum(&record.path) {
                                Ok(sum) => {
                                    let _ = record.checksum.set(sum);
                                    refined
                                        .lock()
                                        .unwrap()
                                        .entry((sum, record.size))
                                        .or_default()
                                        .push(index);
                                }
                                Err(e) => warn!(
                                    "calculating the checksum of '{}' failed: {e}",
                                    record.path.display()
                                ),
                            }
                        });
                    }
                }
            }
        });
        self.check_error()?;

        // Phase 2: disambiguate by content.
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_cpus::get())
            .build()?;
        let refined = refined.into_inner().unwrap();
        pool.scope(|scope| {
            for (_, bucket) in refined {
                scope.spawn(move |_| {
                    if let Err(e) = self.process_file_group(bucket) {
                        self.record_error(e);
                    }
                });
            }
        });
        self.check_error()
    }

    fn write_magic(&self) -> Result<(), ArchiveError> {
        let mut writer = self.writer.lock().unwrap();
        writer.write_all(&format::MAGIC).map_err(ArchiveError::from)
    }

    /// Resolves one `(checksum, size)` bucket. The front record becomes the
    /// stored representative; every remaining member that compares equal is
    /// written as a link to it, and the mismatches repeat the procedure with
    /// a fresh representative until the bucket is empty.
    fn process_file_group(&self, mut pending: Vec<usize>) -> Result<(), ArchiveError> {
        while !pending.is_empty() {
            let rep = pending.remove(0);
            if !self.write_file(rep)? {
                // Unreadable representative: nothing may link to a node that
                // was never written. The rest of the bucket tries again.
                continue;
            }
            let rep_record = &self.records[rep];

            let mut kept = Vec::new();
            for index in pending.drain(..) {
                match content::bytes_equal(&self.records[index].path, &rep_record.path) {
                    Ok(true) => self.write_link(index, rep_record.id)?,
                    Ok(false) => kept.push(index),
                    Err(e) => warn!(
                        "comparing '{}' and '{}' failed: {e}",
                        self.records[index].path.display(),
                        rep_record.path.display()
                    ),
                }
            }
            pending = kept;
        }
        Ok(())
    }

    /// Writes the record as a file node. Returns `false` when the record had
    /// to be dropped because its contents could not be read; a record that is
    /// already in the stream reports `true`. Output-stream failures are
    /// fatal.
    fn write_file(&self, index: usize) -> Result<bool, ArchiveError> {
        let record = &self.records[index];
        if record.saved.load(Ordering::Acquire) {
            return Ok(true);
        }

        let mapped = match map_contents(&record.path) {
            Ok(m) => m,
            Err(e) => {
                warn!("reading '{}' failed: {e}", record.path.display());
                return Ok(false);
            }
        };
        let data: &[u8] = match &mapped {
            Some(map) => map,
            None => &[],
        };

        let mut payload = data;
        let mut compressed = false;
        let compressed_buffer;
        if self.compression_level > 0 && !data.is_empty() {
            if let Some(buffer) = compress::compress_to_buffer(data, self.compression_level) {
                compressed_buffer = buffer;
                payload = &compressed_buffer;
                compressed = true;
            }
        }

        let prefix = format::file_node_prefix(
            record.name.as_bytes(),
            record.id,
            payload.len() as u32,
            compressed,
        );

        {
            let mut writer = self.writer.lock().unwrap();
            writer.write_all(&prefix).map_err(ArchiveError::from)?;
            writer.write_all(payload).map_err(ArchiveError::from)?;
        }

        record.compressed.store(compressed, Ordering::Release);
        record.saved.store(true, Ordering::Release);
        self.stats.saved_files.fetch_add(1, Ordering::Relaxed);
        debug!("stored '{}' as file id {}", record.name, record.id);
        Ok(true)
    }

    /// Writes the record as a link node referencing `target_id`.
    fn write_link(&self, index: usize, target_id: u32) -> Result<(), ArchiveError> {
        let record = &self.records[index];
        if record.saved.load(Ordering::Acquire) {
            return Ok(());
        }

        let prefix = format::link_node_prefix(record.name.as_bytes(), target_id);
        self.writer
            .lock()
            .unwrap()
            .write_all(&prefix)
            .map_err(ArchiveError::from)?;

        record.saved.store(true, Ordering::Release);
        self.stats.saved_links.fetch_add(1, Ordering::Relaxed);
        debug!("stored '{}' as link to file id {target_id}", record.name);
        Ok(())
    }

    fn record_error(&self, err: ArchiveError) {
        error!("{err}");
        let mut slot = self.first_error.lock().unwrap();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn check_error(&self) -> Result<(), ArchiveError> {
        match self.first_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Enumerates regular files under `root` and groups them by size. Per-entry
/// problems are logged and the entry skipped; capacity violations abort the
/// run before any output exists.
fn scan_folder(root: &Path) -> Result<(Vec<FileRecord>, SizeBuckets, u64), ArchiveError> {
    let mut records = Vec::new();
    let mut by_size: SizeBuckets = HashMap::new();
    let mut total_size = 0u64;

    for entry in WalkDir::new(root).min_depth(1) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("an error has occurred while scanning the input folder: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    "an error has occurred while scanning '{}': {e}",
                    entry.path().display()
                );
                continue;
            }
        };

        let size = metadata.len();
        if size > u64::from(u32::MAX) {
            warn!(
                "'{}' does not fit the 32-bit payload length, skipping",
                entry.path().display()
            );
            continue;
        }

        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let name = rel.to_string_lossy().into_owned();
        if name.len() > MAX_NAME_LEN {
            return Err(ArchiveError::NameTooLong {
                path: rel.to_path_buf(),
                len: name.len(),
            });
        }
        if records.len() as u32 >= MAX_FILE_ID {
            return Err(ArchiveError::TooManyFiles);
        }

        let index = records.len();
        records.push(FileRecord {
            name,
            path: entry.path().to_path_buf(),
            id: index as u32 + 1,
            size,
            checksum: OnceLock::new(),
            saved: AtomicBool::new(false),
            compressed: AtomicBool::new(false),
        });
        by_size.entry(size).or_default().push(index);
        total_size += size;
    }

    Ok((records, by_size, total_size))
}

fn map_contents(path: &Path) -> io::Result<Option<Mmap>> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    let map = unsafe { Mmap::map(&file)? };
    Ok(Some(map))
}

/// Packs `input_folder` into `archive` and logs the run summary.
pub fn pack_folder(
    input_folder: &Path,
    archive: &Path,
    compression_level: i32,
) -> Result<(), ArchiveError> {
    let packer = Packer::new(input_folder, archive, compression_level)?;
    let stats = packer.stats();

    let ratio = if stats.total_size() > 0 {
        stats.output_size() * 100 / stats.total_size()
    } else {
        0
    };
    info!(
        "input files {}, input size: {}, output size: {}, ratio: {}%, saved files: {}, saved links: {}",
        stats.files(),
        stats.total_size(),
        stats.output_size(),
        ratio,
        stats.saved_files(),
        stats.saved_links()
    );
    Ok(())
}
