use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::format::{MAX_FILE_ID, MAX_NAME_LEN};

/// The primary error type for all operations in the `dedupack` crate.
///
/// Per-file scan and compare problems are logged and recovered from, so they
/// never surface here; everything below is fatal to the run that hit it.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// An I/O error tied to a concrete filesystem path.
    #[error("I/O error on path '{}': {source}", path.display())]
    Io { source: io::Error, path: PathBuf },

    /// The input folder holds no regular files, so there is nothing to pack.
    #[error("input folder '{}' is empty, nothing to do", .0.display())]
    EmptyInput(PathBuf),

    /// A relative path is longer than the header's 10-bit name length allows.
    #[error("relative path '{}' is {len} bytes, the format allows at most {MAX_NAME_LEN}", path.display())]
    NameTooLong { path: PathBuf, len: usize },

    /// More distinct files than the header's 20-bit id field can number.
    #[error("more than {MAX_FILE_ID} files in one archive")]
    TooManyFiles,

    /// The input file does not start with the archive magic.
    #[error("input file is not a correct archive")]
    BadMagic,

    /// The archive ended in the middle of a node.
    #[error("incorrect structure of the archive: truncated node at byte {0}")]
    Truncated(usize),

    /// A link node references a file id no earlier file node defined.
    #[error("incorrect structure of the archive: link to unknown file id {0}")]
    DanglingLink(u32),

    #[error("worker pool error: {0}")]
    ThreadPool(String),
}

impl ArchiveError {
    pub(crate) fn io(source: io::Error, path: impl Into<PathBuf>) -> Self {
        ArchiveError::Io {
            source,
            path: path.into(),
        }
    }
}

// I/O errors with no interesting path attached.
impl From<io::Error> for ArchiveError {
    fn from(err: io::Error) -> Self {
        ArchiveError::Io {
            source: err,
            path: PathBuf::new(),
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for ArchiveError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        ArchiveError::ThreadPool(err.to_string())
    }
}
