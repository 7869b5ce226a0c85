//! Okumura-style LZSS behind an `LZSS` header.
//!
//! Window parameters default to 10 offset bits, 6 length bits and a threshold of
//! 2 (the layout used by Mario Party); Pokemon FSYS archives use 12/4/2.

use anyhow::Result;

use super::{check_output_size, Codec};
use crate::core::error::FormatError;

const MAGIC: &[u8; 4] = b"LZSS";
const HEADER_LEN: usize = 16;

pub struct Lzss;

/// Sliding-window parameters.
#[derive(Debug, Clone, Copy)]
pub struct LzssParams {
    pub offset_bits: u8,
    pub length_bits: u8,
    pub threshold: u8,
}

impl Default for LzssParams {
    fn default() -> Self {
        Self {
            offset_bits: 10,
            length_bits: 6,
            threshold: 2,
        }
    }
}

impl Codec for Lzss {
    fn name(&self) -> &'static str {
        "LZSS"
    }

    fn is_match(&self, data: &[u8]) -> bool {
        data.len() > 112 && data.starts_with(MAGIC)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if !data.starts_with(MAGIC) || data.len() < HEADER_LEN {
            return Err(FormatError::InvalidIdentifier("LZSS").into());
        }
        // The first size field is informational; the second bounds the output.
        let output_len = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        let output_len = check_output_size("LZSS", output_len as u64)?;
        decompress_window(&data[HEADER_LEN..], output_len, LzssParams::default())
    }
}

/// Decode a headerless LZSS stream until `output_len` bytes are produced.
pub fn decompress_window(input: &[u8], output_len: usize, params: LzssParams) -> Result<Vec<u8>> {
    let n = 1usize << params.offset_bits;
    let f = 1usize << params.length_bits;
    let threshold = params.threshold as usize;
    let mut window = vec![0u8; n];
    let mut r = n - f - threshold;
    let n_mask = n - 1;
    let f_mask = f - 1;

    let mut out = Vec::with_capacity(output_len);
    let mut src = 0usize;
    let mut next = || -> Result<usize> {
        let b = *input.get(src).ok_or(FormatError::Truncated("LZSS"))?;
        src += 1;
        Ok(b as usize)
    };

    let mut flags = 0usize;
    while out.len() < output_len {
        if flags & 0x100 == 0 {
            flags = next()? | 0xFF00;
        }
        if flags & 1 != 0 {
            let c = next()? as u8;
            out.push(c);
            window[r] = c;
            r = (r + 1) & n_mask;
        } else {
            let mut b1 = next()?;
            let mut b2 = next()?;
            b1 |= (b2 >> params.length_bits) << 8;
            b2 = (b2 & f_mask) + threshold;
            for i in 0..=b2 {
                let c = window[(b1 + i) & n_mask];
                out.push(c);
                window[r] = c;
                r = (r + 1) & n_mask;
            }
        }
        flags >>= 1;
    }
    out.truncate(output_len);
    Ok(out)
}
