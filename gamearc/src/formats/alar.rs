//! Aqualead archive (`ALAR`), big-endian.
//!
//! Two table layouts exist, selected by the flag byte after the magic:
//! - flag 2: 16-byte records (`?`, offset, size, pad); the member name is a
//!   0x20-byte field stored 0x22 bytes before the member data.
//! - flag 3: a list of u16 record positions; each record holds id, offset,
//!   size, six unknown bytes and a NUL-terminated name.

use std::io::{Cursor, Seek, SeekFrom};

use anyhow::{Context, Result};
use bytes::Bytes;

use crate::core::archive::{Archive, ArchiveFile};
use crate::core::error::FormatError;
use crate::core::reader::{read_fixed_string, read_stringz, read_u16, read_u32, read_u8, Endian};
use crate::formats::ArchiveFormat;

const MAGIC: &[u8; 4] = b"ALAR";
const HEADER_LEN: u64 = 0x10;
const NAME_BACKOFF: u64 = 0x22;
const NAME_LEN: usize = 0x20;

pub struct Alar;

impl ArchiveFormat for Alar {
    fn name(&self) -> &'static str {
        "ALAR"
    }

    fn is_match(&self, data: &[u8]) -> bool {
        data.starts_with(MAGIC)
    }

    fn open(&self, data: Bytes) -> Result<Archive> {
        if !self.is_match(&data) {
            return Err(FormatError::InvalidIdentifier("ALAR").into());
        }
        let mut cursor = Cursor::new(&data[..]);
        cursor.seek(SeekFrom::Start(4))?;
        let flag = read_u8(&mut cursor)?;
        let _unknown = read_u8(&mut cursor)?;
        let entries = read_u16(&mut cursor, Endian::Big)?;
        cursor.seek(SeekFrom::Start(HEADER_LEN))?;

        let mut archive = Archive::new();
        match flag {
            2 => {
                for i in 0..entries {
                    let _mystery = read_u32(&mut cursor, Endian::Big)?;
                    let offset = read_u32(&mut cursor, Endian::Big)? as u64;
                    let size = read_u32(&mut cursor, Endian::Big)? as u64;
                    let _pad = read_u32(&mut cursor, Endian::Big)?;
                    let resume = cursor.position();

                    let name_at = offset
                        .checked_sub(NAME_BACKOFF)
                        .ok_or(FormatError::OutOfBounds {
                            offset,
                            size,
                            len: data.len() as u64,
                        })?;
                    cursor.seek(SeekFrom::Start(name_at))?;
                    let name = read_fixed_string(&mut cursor, NAME_LEN)
                        .with_context(|| format!("ALAR entry {i}: name at {name_at:#x}"))?;
                    archive
                        .root
                        .add_file(&name, ArchiveFile::slice("", &data, offset, size)?, i);
                    cursor.seek(SeekFrom::Start(resume))?;
                }
            }
            3 => {
                let _unknown = read_u16(&mut cursor, Endian::Big)?;
                let mut positions = Vec::with_capacity(entries as usize);
                for _ in 0..entries {
                    positions.push(read_u16(&mut cursor, Endian::Big)?);
                }
                for position in positions {
                    cursor.seek(SeekFrom::Start(position as u64))?;
                    let id = read_u32(&mut cursor, Endian::Big)?;
                    let offset = read_u32(&mut cursor, Endian::Big)? as u64;
                    let size = read_u32(&mut cursor, Endian::Big)? as u64;
                    cursor.seek(SeekFrom::Current(6))?;
                    let name = read_stringz(&mut cursor)
                        .with_context(|| format!("ALAR entry {id}: name at {position:#x}"))?;
                    archive
                        .root
                        .add_file(&name, ArchiveFile::slice("", &data, offset, size)?, id);
                }
            }
            flag => {
                return Err(FormatError::UnsupportedLayout {
                    format: "ALAR",
                    flag: flag as u32,
                }
                .into())
            }
        }
        Ok(archive)
    }

    fn self_signature(&self) -> Option<&'static [u8]> {
        Some(MAGIC)
    }
}
