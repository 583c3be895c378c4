//! Post-pack self-check: unpack the freshly produced archive into a scratch
//! directory and compare fingerprints with the source tree.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, error};

use crate::content;
use crate::unpack;

/// Returns true iff unpacking `archive` reproduces `input` exactly, i.e.
/// both directory fingerprints are computable and equal. The scratch
/// directory is removed in every outcome.
pub fn test_unpack(input: &Path, archive: &Path) -> bool {
    let scratch = match tempfile::Builder::new().prefix("dedupack-verify-").tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            error!("creating the scratch directory failed: {e}");
            return false;
        }
    };

    debug!("unpacking the output file...");
    let started = Instant::now();
    if let Err(e) = unpack::unpack_file(archive, scratch.path()) {
        error!("{e}");
        return false;
    }
    debug!("unpacking takes {} ms", started.elapsed().as_millis());

    debug!("comparing directories...");
    let started = Instant::now();
    let pool = match rayon::ThreadPoolBuilder::new().num_threads(2).build() {
        Ok(pool) => pool,
        Err(e) => {
            error!("{e}");
            return false;
        }
    };
    let (source, unpacked) = pool.join(
        || content::directory_fingerprint(input),
        || content::directory_fingerprint(scratch.path()),
    );
    debug!("comparing takes {} ms", started.elapsed().as_millis());

    match (source, unpacked) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
