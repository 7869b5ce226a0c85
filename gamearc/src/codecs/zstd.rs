//! Zstandard frames, occasionally used by newer engines for whole-file packing.

use std::io::Read;

use anyhow::{Context, Result};

use super::{Codec, MAX_OUTPUT};

const MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

pub struct Zstd;

impl Codec for Zstd {
    fn name(&self) -> &'static str {
        "Zstd"
    }

    fn is_match(&self, data: &[u8]) -> bool {
        data.starts_with(&MAGIC)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        decompress_zstd_with_limit(data, MAX_OUTPUT).context("zstd decode failed")
    }
}

/// Decompress Zstandard data, refusing output beyond `max_size` bytes
pub fn decompress_zstd_with_limit(data: &[u8], max_size: u64) -> Result<Vec<u8>, std::io::Error> {
    let decoder = ::zstd::stream::Decoder::new(data)?;
    let mut output = Vec::new();
    decoder.take(max_size + 1).read_to_end(&mut output)?;
    if output.len() as u64 > max_size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("decoded zstd data exceeds {} bytes", max_size),
        ));
    }
    Ok(output)
}

#[cfg(test)]
pub(crate) fn compress_zstd(data: &[u8], level: i32) -> Result<Vec<u8>, std::io::Error> {
    ::zstd::stream::encode_all(data, level)
}
