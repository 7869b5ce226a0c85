//! Small binary-reading helpers shared by the container parsers.

use std::io::Read;

use anyhow::{Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

pub fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf).context("Unexpected end of stream")?;
    Ok(buf[0])
}

pub fn read_u16<R: Read>(reader: &mut R, endian: Endian) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf).context("Unexpected end of stream")?;
    Ok(match endian {
        Endian::Big => u16::from_be_bytes(buf),
        Endian::Little => u16::from_le_bytes(buf),
    })
}

pub fn read_u32<R: Read>(reader: &mut R, endian: Endian) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).context("Unexpected end of stream")?;
    Ok(match endian {
        Endian::Big => u32::from_be_bytes(buf),
        Endian::Little => u32::from_le_bytes(buf),
    })
}

pub fn read_u64<R: Read>(reader: &mut R, endian: Endian) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf).context("Unexpected end of stream")?;
    Ok(match endian {
        Endian::Big => u64::from_be_bytes(buf),
        Endian::Little => u64::from_le_bytes(buf),
    })
}

pub fn read_stringz<R: Read>(reader: &mut R) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        let b = read_u8(reader)?;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read a fixed-width name field, cut at the first NUL.
pub fn read_fixed_string<R: Read>(reader: &mut R, len: usize) -> Result<String> {
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes).context("Unexpected end of stream")?;
    Ok(cstr_lossy(&bytes))
}

/// NUL-terminated string starting at `offset` inside `data`.
pub fn string_at(data: &[u8], offset: usize) -> Option<String> {
    data.get(offset..).map(cstr_lossy)
}

fn cstr_lossy(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

/// True when `magic` occurs in `data` at `offset`.
pub fn matches_at(data: &[u8], magic: &[u8], offset: usize) -> bool {
    data.get(offset..offset + magic.len())
        .is_some_and(|window| window == magic)
}

/// Position of the first occurrence of `needle` in `haystack`.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
