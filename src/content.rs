//! Content identity: checksums, byte equality and directory fingerprints.
//!
//! The checksum is a cheap, collision-tolerant pre-filter; `bytes_equal` is
//! the arbiter of "same content". All file access goes through memory maps.

use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::Mmap;
use tracing::error;
use walkdir::WalkDir;
use xxhash_rust::xxh3::{xxh3_64, Xxh3};

fn map_file(file: &File) -> io::Result<Option<Mmap>> {
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    let map = unsafe { Mmap::map(file)? };
    Ok(Some(map))
}

/// Content hash of one file, used to split same-size groups of candidate
/// duplicates. Order-sensitive, non-cryptographic; collisions only cost an
/// extra byte comparison.
pub fn checksum(path: &Path) -> io::Result<u64> {
    let file = File::open(path)?;
    match map_file(&file)? {
        Some(map) => Ok(xxh3_64(&map)),
        None => Ok(xxh3_64(&[])),
    }
}

/// Byte-for-byte comparison of the full contents of two files.
///
/// Both arguments are mapped and compared against each other; this is what
/// decides whether a candidate becomes a link, so a cheaper answer is never
/// acceptable here.
pub fn bytes_equal(a: &Path, b: &Path) -> io::Result<bool> {
    let file_a = File::open(a)?;
    let file_b = File::open(b)?;
    if file_a.metadata()?.len() != file_b.metadata()?.len() {
        return Ok(false);
    }
    match (map_file(&file_a)?, map_file(&file_b)?) {
        (Some(map_a), Some(map_b)) => Ok(map_a[..] == map_b[..]),
        // equal lengths, so both are empty
        _ => Ok(true),
    }
}

/// Fingerprint of a directory tree: the sorted set of relative paths is
/// folded together with the contents of every regular file. Independent of
/// filesystem iteration order. Returns `None` when the walk or a file map
/// fails; the cause is logged.
pub fn directory_fingerprint(root: &Path) -> Option<u64> {
    match try_fingerprint(root) {
        Ok(hash) => Some(hash),
        Err(e) => {
            error!("computing the fingerprint of '{}' failed: {e}", root.display());
            None
        }
    }
}

fn try_fingerprint(root: &Path) -> io::Result<u64> {
    let mut entries = BTreeMap::new();

    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        let kind = entry.file_type();
        if kind.is_file() || kind.is_dir() {
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            entries.insert(rel.to_string_lossy().into_owned(), kind.is_file());
        }
    }

    let mut hasher = Xxh3::new();
    for (rel, is_file) in &entries {
        hasher.update(rel.as_bytes());
        if *is_file {
            let file = File::open(root.join(rel))?;
            if let Some(map) = map_file(&file)? {
                hasher.update(&map);
            }
        }
    }
    Ok(hasher.digest())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn checksum_is_content_sensitive() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let c = dir.path().join("c");
        fs::write(&a, b"hello").unwrap();
        fs::write(&b, b"hello").unwrap();
        fs::write(&c, b"olleh").unwrap();
        assert_eq!(checksum(&a).unwrap(), checksum(&b).unwrap());
        assert_ne!(checksum(&a).unwrap(), checksum(&c).unwrap());
    }

    #[test]
    fn unequal_same_size_files() {
        // Same length, different bytes: the comparison has to read both
        // arguments to notice.
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"0123456789").unwrap();
        fs::write(&b, b"0123456780").unwrap();
        assert!(!bytes_equal(&a, &b).unwrap());
        assert!(!bytes_equal(&b, &a).unwrap());
    }

    #[test]
    fn equal_files_compare_equal() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"same bytes").unwrap();
        fs::write(&b, b"same bytes").unwrap();
        assert!(bytes_equal(&a, &b).unwrap());

        let e1 = dir.path().join("e1");
        let e2 = dir.path().join("e2");
        fs::write(&e1, b"").unwrap();
        fs::write(&e2, b"").unwrap();
        assert!(bytes_equal(&e1, &e2).unwrap());
    }

    #[test]
    fn fingerprint_matches_identical_trees() {
        let left = tempdir().unwrap();
        let right = tempdir().unwrap();
        for root in [left.path(), right.path()] {
            fs::create_dir(root.join("sub")).unwrap();
            fs::write(root.join("sub").join("a.txt"), b"alpha").unwrap();
            fs::write(root.join("b.txt"), b"beta").unwrap();
        }
        let lhs = directory_fingerprint(left.path());
        assert!(lhs.is_some());
        assert_eq!(lhs, directory_fingerprint(right.path()));

        fs::write(right.path().join("sub").join("a.txt"), b"ALPHA").unwrap();
        assert_ne!(lhs, directory_fingerprint(right.path()));
    }

    #[test]
    fn fingerprint_sees_renames() {
        let left = tempdir().unwrap();
        let right = tempdir().unwrap();
        fs::write(left.path().join("a.txt"), b"same").unwrap();
        fs::write(right.path().join("b.txt"), b"same").unwrap();
        assert_ne!(
            directory_fingerprint(left.path()),
            directory_fingerprint(right.path())
        );
    }
}
