//! zlib and gzip wrappers around deflate streams.

use std::io::Read;

use anyhow::{bail, Context, Result};
use flate2::read::{MultiGzDecoder, ZlibDecoder};

use super::{Codec, MAX_OUTPUT};

pub struct ZLib;

pub struct Gzip;

impl Codec for ZLib {
    fn name(&self) -> &'static str {
        "ZLib"
    }

    /// CMF says deflate with a window of at most 32K and the header checksum holds.
    fn is_match(&self, data: &[u8]) -> bool {
        data.len() > 2
            && data[0] & 0x0F == 8
            && data[0] >> 4 <= 7
            && u16::from_be_bytes([data[0], data[1]]) % 31 == 0
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        read_limited(ZlibDecoder::new(data)).context("zlib decode failed")
    }
}

impl Codec for Gzip {
    fn name(&self) -> &'static str {
        "Gzip"
    }

    fn is_match(&self, data: &[u8]) -> bool {
        data.len() > 2 && data[0] == 0x1F && data[1] == 0x8B
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        read_limited(MultiGzDecoder::new(data)).context("gzip decode failed")
    }
}

fn read_limited<R: Read>(reader: R) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.take(MAX_OUTPUT + 1).read_to_end(&mut out)?;
    if out.len() as u64 > MAX_OUTPUT {
        bail!("decoded data exceeds {} bytes", MAX_OUTPUT);
    }
    Ok(out)
}

/// Inflate a raw zlib payload, as table formats store their compressed entries.
pub fn inflate_zlib(data: &[u8]) -> Result<Vec<u8>> {
    ZLib.decompress(data)
}
