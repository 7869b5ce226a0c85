//! CRI Middleware CRILAYLA block compression (CPK payloads).
//!
//! The compressed body is read backwards as a bit stream and the output is
//! written back to front. A 0x100-byte uncompressed prefix is stored after the
//! compressed body and becomes the first 0x100 bytes of the result.

use anyhow::Result;

use super::{check_output_size, Codec};
use crate::core::error::FormatError;

pub const MAGIC: &[u8; 8] = b"CRILAYLA";
const HEADER_LEN: usize = 0x10;
const PREFIX_LEN: usize = 0x100;

pub struct Crilayla;

impl Codec for Crilayla {
    fn name(&self) -> &'static str {
        "CRILAYLA"
    }

    fn is_match(&self, data: &[u8]) -> bool {
        data.len() >= HEADER_LEN + PREFIX_LEN && data.starts_with(MAGIC)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        decompress(data)
    }
}

/// Reads bits MSB first from bytes consumed back to front.
struct BackwardBits<'a> {
    data: &'a [u8],
    /// Index of the next byte to load; `None` once the stream is exhausted.
    next: Option<usize>,
    pool: u8,
    left: u32,
}

impl BackwardBits<'_> {
    fn take(&mut self, count: u32) -> Result<usize> {
        let mut value = 0usize;
        let mut produced = 0;
        while produced < count {
            if self.left == 0 {
                let idx = self.next.ok_or(FormatError::Truncated("CRILAYLA"))?;
                self.pool = self.data[idx];
                self.left = 8;
                self.next = idx.checked_sub(1).filter(|&i| i >= HEADER_LEN);
            }
            let round = self.left.min(count - produced);
            value <<= round;
            value |= ((self.pool >> (self.left - round)) as usize) & ((1 << round) - 1);
            self.left -= round;
            produced += round;
        }
        Ok(value)
    }
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if !data.starts_with(MAGIC) || data.len() < HEADER_LEN + PREFIX_LEN {
        return Err(FormatError::InvalidIdentifier("CRILAYLA").into());
    }
    let body_len = u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize;
    let prefix_at = u32::from_le_bytes([data[12], data[13], data[14], data[15]]) as usize + HEADER_LEN;
    let body_len = check_output_size("CRILAYLA", body_len as u64)?;
    let prefix = data
        .get(prefix_at..prefix_at + PREFIX_LEN)
        .ok_or(FormatError::OutOfBounds {
            offset: prefix_at as u64,
            size: PREFIX_LEN as u64,
            len: data.len() as u64,
        })?;

    let mut out = vec![0u8; PREFIX_LEN + body_len];
    out[..PREFIX_LEN].copy_from_slice(prefix);
    if body_len == 0 {
        return Ok(out);
    }

    let last = data.len() - PREFIX_LEN - 1;
    let mut bits = BackwardBits {
        data,
        next: (last >= HEADER_LEN).then_some(last),
        pool: 0,
        left: 0,
    };
    const LEVELS: [u32; 4] = [2, 3, 5, 8];

    let output_end = PREFIX_LEN + body_len - 1;
    let mut written = 0usize;
    while written < body_len {
        if bits.take(1)? == 0 {
            out[output_end - written] = bits.take(8)? as u8;
            written += 1;
            continue;
        }
        let mut from = output_end - written + bits.take(13)? + 3;
        let mut length = 3usize;
        let mut level = 0;
        while level < LEVELS.len() {
            let chunk = bits.take(LEVELS[level])?;
            length += chunk;
            if chunk != (1 << LEVELS[level]) - 1 {
                break;
            }
            level += 1;
        }
        if level == LEVELS.len() {
            loop {
                let chunk = bits.take(8)?;
                length += chunk;
                if chunk != 0xFF {
                    break;
                }
            }
        }
        for _ in 0..length {
            if written >= body_len {
                break;
            }
            let b = *out.get(from).ok_or(FormatError::BadReference {
                codec: "CRILAYLA",
                distance: from,
            })?;
            out[output_end - written] = b;
            written += 1;
            from = from.wrapping_sub(1);
        }
    }
    Ok(out)
}
