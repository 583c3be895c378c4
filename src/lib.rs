//! # dedupack Core Library
//!
//! Packs a folder tree into a single container file with duplicate-content
//! elimination, and unpacks such containers back into a tree.
//!
//! Duplicate detection runs in three stages: files are grouped by size,
//! same-size groups are split by a cheap content checksum, and a full byte
//! comparison settles every remaining candidate pair, so a checksum
//! collision can never corrupt an archive. Each duplicate beyond the first
//! is stored as a link node referencing the id of its representative file
//! node, and the writer guarantees that the representative always precedes
//! its links in the stream.
//!
//! ## Key Modules
//!
//! - [`format`]: the container's magic tag and bit-packed node headers.
//! - [`content`]: checksums, byte equality and directory fingerprints.
//! - [`compress`]: the zstd byte-buffer adapter.
//! - [`pack`]: the two-phase concurrent packer.
//! - [`unpack`]: the single-pass concurrent unpacker.
//! - [`verify`]: the pack-then-unpack self check.

pub mod cli;
pub mod compress;
pub mod content;
pub mod error;
pub mod format;
pub mod pack;
pub mod unpack;
pub mod verify;

pub use error::ArchiveError;
