//! Byte-buffer compression adapter backed by zstd.
//!
//! The packer offers every non-empty payload to [`compress_to_buffer`] when a
//! positive level is configured and stores the result only when it is
//! strictly smaller; the unpacker streams compressed payloads back out with
//! [`decompress_to_writer`]. Level 0 means "no compression requested" and
//! never reaches this module.

use std::io::{self, Write};

use tracing::error;

/// Compresses `data` at `level` (1-9). Returns `None` when zstd fails or
/// when the result would not be strictly smaller than the input; the caller
/// then stores the raw bytes.
pub fn compress_to_buffer(data: &[u8], level: i32) -> Option<Vec<u8>> {
    match zstd::bulk::compress(data, level) {
        Ok(buffer) if buffer.len() < data.len() => Some(buffer),
        Ok(_) => None,
        Err(e) => {
            error!("zstd compress failed: {e}");
            None
        }
    }
}

/// Stream-decompresses `data` into `dest`. Fails on malformed input.
pub fn decompress_to_writer<W: Write>(data: &[u8], dest: &mut W) -> io::Result<()> {
    zstd::stream::copy_decode(data, dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    #[test]
    fn roundtrip() {
        let data = b"a piece of text that zstd shrinks easily, over and over. ".repeat(32);
        let compressed = compress_to_buffer(&data, 3).expect("compressible input");
        assert!(compressed.len() < data.len());

        let mut out = Vec::new();
        decompress_to_writer(&compressed, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn incompressible_input_is_rejected() {
        let mut data = vec![0u8; 4096];
        rand::thread_rng().fill_bytes(&mut data);
        assert!(compress_to_buffer(&data, 9).is_none());
    }

    #[test]
    fn malformed_input_fails_to_decompress() {
        let mut out = Vec::new();
        assert!(decompress_to_writer(b"definitely not a zstd frame", &mut out).is_err());
    }
}
