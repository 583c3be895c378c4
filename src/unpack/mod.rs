//! # Unpacking
//!
//! Reads an archive in one forward pass over a memory map. File nodes are
//! remembered in a running id table and handed to a small worker pool for
//! materialization; link nodes resolve against that table and reuse the
//! referenced node's payload. A link can only reference a file node that
//! appeared earlier in the stream, so the sequential scan never needs a
//! second pass or a lookahead.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use memmap2::Mmap;
use tracing::{debug, error};

use crate::compress;
use crate::error::ArchiveError;
use crate::format::{NodeHeader, NodeKind, DATA_LEN_SIZE, HEADER_SIZE, MAGIC};

/// Reconstruction workers. Writes touch disjoint output paths, so a small
/// pool is enough to keep the disk busy.
const WRITE_WORKERS: usize = 4;

/// A file node's payload as seen in the mapped archive.
#[derive(Clone, Copy)]
struct NodeBody<'a> {
    data: &'a [u8],
    compressed: bool,
}

/// Unpacks one archive into one folder. Construction performs the entire
/// run.
pub struct Unpacker {
    archive: PathBuf,
    output_folder: PathBuf,
}

impl Unpacker {
    /// Unpacks `archive` into `output_folder`, creating the folder if
    /// absent. Fails on a wrong magic tag or a structurally broken node
    /// sequence.
    pub fn new(archive: &Path, output_folder: &Path) -> Result<Self, ArchiveError> {
        let unpacker = Unpacker {
            archive: archive.to_path_buf(),
            output_folder: output_folder.to_path_buf(),
        };
        unpacker.unpack()?;
        Ok(unpacker)
    }

    fn unpack(&self) -> Result<(), ArchiveError> {
        if !self.output_folder.exists() {
            fs::create_dir_all(&self.output_folder)
                .map_err(|e| ArchiveError::io(e, &self.output_folder))?;
        }

        let file = File::open(&self.archive).map_err(|e| ArchiveError::io(e, &self.archive))?;
        let len = file
            .metadata()
            .map_err(|e| ArchiveError::io(e, &self.archive))?
            .len();
        if (len as usize) < MAGIC.len() {
            return Err(ArchiveError::BadMagic);
        }
        let map = unsafe { Mmap::map(&file) }.map_err(|e| ArchiveError::io(e, &self.archive))?;
        let data: &[u8] = &map;

        if data[..MAGIC.len()] != MAGIC {
            return Err(ArchiveError::BadMagic);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(WRITE_WORKERS)
            .build()?;
        let first_error: Mutex<Option<ArchiveError>> = Mutex::new(None);

        let mut scan_result = Ok(());
        pool.scope(|scope| {
            let first_error = &first_error;
            let mut nodes: HashMap<u32, NodeBody> = HashMap::new();
            let mut pos = MAGIC.len();

            while pos < data.len() {
                if data.len() - pos < HEADER_SIZE {
                    scan_result = Err(ArchiveError::Truncated(pos));
                    break;
                }
                let header = NodeHeader::decode(data[pos..pos + HEADER_SIZE].try_into().unwrap());
                let mut cursor = pos + HEADER_SIZE;
                let name_len = header.name_len as usize;

                let body = match header.kind {
                    NodeKind::File => {
                        if data.len() - cursor < DATA_LEN_SIZE {
                            scan_result = Err(ArchiveError::Truncated(pos));
                            break;
                        }
                        let data_len = u32::from_le_bytes(
                            data[cursor..cursor + DATA_LEN_SIZE].try_into().unwrap(),
                        ) as usize;
                        cursor += DATA_LEN_SIZE;
                        if data.len() - cursor < name_len + data_len {
                            scan_result = Err(ArchiveError::Truncated(pos));
                            break;
                        }
                        let body = NodeBody {
                            data: &data[cursor + name_len..cursor + name_len + data_len],
                            compressed: header.compressed,
                        };
                        nodes.insert(header.file_id, body);
                        pos = cursor + name_len + data_len;
                        body
                    }
                    NodeKind::Link => {
                        if data.len() - cursor < name_len {
                            scan_result = Err(ArchiveError::Truncated(pos));
                            break;
                        }
                        // the referenced node must already be in the table
                        let Some(body) = nodes.get(&header.file_id).copied() else {
                            scan_result = Err(ArchiveError::DanglingLink(header.file_id));
                            break;
                        };
                        pos = cursor + name_len;
                        body
                    }
                };

                let name = &data[cursor..cursor + name_len];
                let target = self
                    .output_folder
                    .join(String::from_utf8_lossy(name).as_ref());
                scope.spawn(move |_| {
                    if let Err(e) = reconstruct(body, &target) {
                        record_error(first_error, e);
                    }
                });
            }
        });

        scan_result?;
        match first_error.into_inner().unwrap() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Materializes one output path from a file node's payload.
fn reconstruct(body: NodeBody, target: &Path) -> Result<(), ArchiveError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| ArchiveError::io(e, parent))?;
    }

    let file = File::create(target).map_err(|e| ArchiveError::io(e, target))?;
    let mut writer = BufWriter::new(file);
    if body.compressed {
        compress::decompress_to_writer(body.data, &mut writer)
            .map_err(|e| ArchiveError::io(e, target))?;
    } else {
        writer
            .write_all(body.data)
            .map_err(|e| ArchiveError::io(e, target))?;
    }
    writer.flush().map_err(|e| ArchiveError::io(e, target))?;
    debug!("wrote '{}'", target.display());
    Ok(())
}

fn record_error(slot: &Mutex<Option<ArchiveError>>, err: ArchiveError) {
    error!("an error has occurred while writing a file: {err}");
    let mut slot = slot.lock().unwrap();
    if slot.is_none() {
        *slot = Some(err);
    }
}

/// Unpacks `archive` into `output_folder`.
pub fn unpack_file(archive: &Path, output_folder: &Path) -> Result<(), ArchiveError> {
    Unpacker::new(archive, output_folder)?;
    Ok(())
}
