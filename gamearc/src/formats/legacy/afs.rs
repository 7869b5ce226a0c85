//! CRI `AFS` file tables (little-endian).
//!
//! `AFS\0`, entry count, then (offset, size) pairs. The optional name table is
//! located by the pair right after the entries, or failing that by the pair
//! stored 8 bytes before the first entry's data. Name records are 0x30 bytes:
//! a 32-byte name, six u16 timestamp fields and a u32 size.

use std::collections::HashSet;
use std::io::{Cursor, Seek, SeekFrom};

use anyhow::Result;
use bytes::Bytes;
use log::debug;

use super::{dedup_name, LegacyEntry};
use crate::core::archive::ArchiveFile;
use crate::core::error::FormatError;
use crate::core::reader::{read_fixed_string, read_u32, Endian};

pub const MAGIC: &[u8; 4] = b"AFS\0";
const NAME_RECORD_LEN: u64 = 0x30;

pub(super) fn read_entries(data: &Bytes) -> Result<Vec<LegacyEntry>> {
    if !data.starts_with(MAGIC) {
        return Err(FormatError::InvalidIdentifier("AFS").into());
    }
    let mut cursor = Cursor::new(&data[..]);
    cursor.seek(SeekFrom::Start(4))?;
    let count = read_u32(&mut cursor, Endian::Little)?;

    let mut table = Vec::with_capacity(count.min(0x10000) as usize);
    for _ in 0..count {
        let offset = read_u32(&mut cursor, Endian::Little)? as u64;
        let size = read_u32(&mut cursor, Endian::Little)? as u64;
        table.push((offset, size));
    }

    let names = read_names(data, &mut cursor, &table).unwrap_or_else(|e| {
        debug!("AFS: no usable name table: {e:#}");
        Vec::new()
    });

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for (i, &(offset, size)) in table.iter().enumerate() {
        // null entries reserve a slot without data
        if offset == 0 && size == 0 {
            continue;
        }
        let name = names
            .get(i)
            .filter(|n| !n.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("{i:05}"));
        let path = dedup_name(&mut seen, sanitize(&name), i);
        let payload = ArchiveFile::slice("", data, offset, size).map(|f| f.data);
        entries.push(LegacyEntry { path, payload });
    }
    Ok(entries)
}

fn read_names(data: &Bytes, cursor: &mut Cursor<&[u8]>, table: &[(u64, u64)]) -> Result<Vec<String>> {
    let mut at = read_u32(cursor, Endian::Little)? as u64;
    let mut size = read_u32(cursor, Endian::Little)? as u64;
    if at == 0 || size == 0 {
        let first = table
            .iter()
            .map(|&(offset, _)| offset)
            .filter(|&o| o >= 8)
            .min()
            .ok_or(FormatError::Truncated("AFS"))?;
        cursor.seek(SeekFrom::Start(first - 8))?;
        at = read_u32(cursor, Endian::Little)? as u64;
        size = read_u32(cursor, Endian::Little)? as u64;
    }
    if at == 0 || size < table.len() as u64 * NAME_RECORD_LEN || at + size > data.len() as u64 {
        return Err(FormatError::OutOfBounds {
            offset: at,
            size,
            len: data.len() as u64,
        }
        .into());
    }

    let mut names = Vec::with_capacity(table.len());
    for i in 0..table.len() as u64 {
        cursor.seek(SeekFrom::Start(at + i * NAME_RECORD_LEN))?;
        names.push(read_fixed_string(cursor, 32)?);
    }
    Ok(names)
}

/// Strip characters that cannot appear in a file name on common filesystems.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
