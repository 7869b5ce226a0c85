//! Nintendo Yaz0 run-length/LZ hybrid.
//!
//! Header: `Yaz0`, big-endian decoded size, 8 reserved bytes. Each group starts
//! with a code byte read MSB first: 1 = literal, 0 = back-reference of two or
//! three bytes.

use anyhow::Result;

use super::{check_output_size, Codec};
use crate::core::error::FormatError;

const MAGIC: &[u8; 4] = b"Yaz0";
const HEADER_LEN: usize = 16;

pub struct Yaz0;

impl Codec for Yaz0 {
    fn name(&self) -> &'static str {
        "Yaz0"
    }

    fn is_match(&self, data: &[u8]) -> bool {
        data.len() >= HEADER_LEN && data.starts_with(MAGIC)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if !self.is_match(data) {
            return Err(FormatError::InvalidIdentifier("Yaz0").into());
        }
        let size = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let size = check_output_size("Yaz0", size as u64)?;
        let mut out = Vec::with_capacity(size);
        let mut src = HEADER_LEN;
        let truncated = || FormatError::Truncated("Yaz0");

        while out.len() < size {
            let code = *data.get(src).ok_or_else(truncated)?;
            src += 1;
            for bit in (0..8).rev() {
                if out.len() >= size {
                    break;
                }
                if code & (1 << bit) != 0 {
                    out.push(*data.get(src).ok_or_else(truncated)?);
                    src += 1;
                    continue;
                }
                let b1 = *data.get(src).ok_or_else(truncated)? as usize;
                let b2 = *data.get(src + 1).ok_or_else(truncated)? as usize;
                src += 2;
                let distance = (((b1 & 0x0F) << 8) | b2) + 1;
                let count = match b1 >> 4 {
                    0 => {
                        let extra = *data.get(src).ok_or_else(truncated)? as usize;
                        src += 1;
                        extra + 0x12
                    }
                    n => n + 2,
                };
                if distance > out.len() {
                    return Err(FormatError::BadReference { codec: "Yaz0", distance }.into());
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
