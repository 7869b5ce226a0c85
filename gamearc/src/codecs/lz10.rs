//! Nintendo LZ10 (GBA/DS BIOS LZ77 variant).

use anyhow::Result;

use super::{check_output_size, Codec};
use crate::core::error::FormatError;

const TAG: u8 = 0x10;

pub struct Lz10;

impl Lz10 {
    /// Decoded size and header length; a zero 24-bit size means a 32-bit size follows.
    fn header(data: &[u8]) -> Option<(u64, usize)> {
        if data.len() < 4 || data[0] != TAG {
            return None;
        }
        let short = u32::from_le_bytes([data[1], data[2], data[3], 0]) as u64;
        if short != 0 {
            return Some((short, 4));
        }
        let long = data.get(4..8)?;
        Some((u32::from_le_bytes([long[0], long[1], long[2], long[3]]) as u64, 8))
    }
}

impl Codec for Lz10 {
    fn name(&self) -> &'static str {
        "LZ10"
    }

    /// The one-byte tag is weak, so also require a plausible decoded size
    /// (LZ10 never expands beyond 8x + header).
    fn is_match(&self, data: &[u8]) -> bool {
        match Self::header(data) {
            Some((size, _)) => size > 0 && size <= (data.len() as u64) * 8,
            None => false,
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let (size, mut src) = Self::header(data).ok_or(FormatError::InvalidIdentifier("LZ10"))?;
        let size = check_output_size("LZ10", size)?;
        let mut out = Vec::with_capacity(size);
        let truncated = || FormatError::Truncated("LZ10");

        while out.len() < size {
            let flags = *data.get(src).ok_or_else(truncated)?;
            src += 1;
            for bit in (0..8).rev() {
                if out.len() >= size {
                    break;
                }
                if flags & (1 << bit) == 0 {
                    out.push(*data.get(src).ok_or_else(truncated)?);
                    src += 1;
                    continue;
                }
                let b1 = *data.get(src).ok_or_else(truncated)? as usize;
                let b2 = *data.get(src + 1).ok_or_else(truncated)? as usize;
                src += 2;
                let count = (b1 >> 4) + 3;
                let distance = (((b1 & 0x0F) << 8) | b2) + 1;
                if distance > out.len() {
                    return Err(FormatError::BadReference { codec: "LZ10", distance }.into());
                }
                let start = out.len() - distance;
                for i in 0..count {
                    if out.len() >= size {
                        break;
                    }
                    let b = out[start + i];
                    out.push(b);
                }
            }
        }
        Ok(out)
    }
}
