//! Terminal Reality `POD5` archives, little-endian.
//!
//! The file count sits at 0x58 and the offset of the info table at 0x108. Each
//! 0x1C-byte info record is (name offset, size, offset, stored size,
//! compressed flag, two unknowns); names live in a string table right after
//! the records. Records whose stored size differs from the size hold zlib data.

use std::io::{Cursor, Seek, SeekFrom};

use anyhow::{Context, Result};
use bytes::Bytes;

use crate::codecs::deflate::inflate_zlib;
use crate::core::archive::{Archive, ArchiveFile};
use crate::core::error::FormatError;
use crate::core::reader::{read_u32, string_at, Endian};
use crate::formats::ArchiveFormat;

const MAGIC: &[u8; 4] = b"POD5";
const COUNT_AT: u64 = 0x58;
const INFO_TABLE_AT: u64 = 0x108;
const RECORD_LEN: u64 = 0x1C;

pub struct Pod5;

impl ArchiveFormat for Pod5 {
    fn name(&self) -> &'static str {
        "POD5"
    }

    fn is_match(&self, data: &[u8]) -> bool {
        data.starts_with(MAGIC)
    }

    fn open(&self, data: Bytes) -> Result<Archive> {
        if !self.is_match(&data) {
            return Err(FormatError::InvalidIdentifier("POD5").into());
        }
        let mut cursor = Cursor::new(&data[..]);
        cursor.seek(SeekFrom::Start(COUNT_AT))?;
        let count = read_u32(&mut cursor, Endian::Little)? as u64;
        cursor.seek(SeekFrom::Start(INFO_TABLE_AT))?;
        let info_table = read_u32(&mut cursor, Endian::Little)? as u64;
        let string_table = count * RECORD_LEN + info_table;

        let mut archive = Archive::new();
        cursor.seek(SeekFrom::Start(info_table))?;
        for i in 0..count {
            let name_offset = read_u32(&mut cursor, Endian::Little)? as u64;
            let size = read_u32(&mut cursor, Endian::Little)? as u64;
            let offset = read_u32(&mut cursor, Endian::Little)? as u64;
            let stored = read_u32(&mut cursor, Endian::Little)? as u64;
            let _compressed = read_u32(&mut cursor, Endian::Little)?;
            cursor.seek(SeekFrom::Current(8))?;

            let name = string_at(&data, (string_table + name_offset) as usize)
                .with_context(|| format!("POD5 entry {i}: name outside the stream"))?;

            let file = if size == stored {
                ArchiveFile::slice("", &data, offset, size)?
            } else {
                let packed = ArchiveFile::slice("", &data, offset, stored)?;
                let unpacked = inflate_zlib(&packed.data)
                    .with_context(|| format!("POD5 entry {name}: inflate failed"))?;
                ArchiveFile::owned("", unpacked)
            };
            archive.root.add_file(&name, file, i);
        }
        Ok(archive)
    }

    fn self_signature(&self) -> Option<&'static [u8]> {
        Some(MAGIC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    struct Entry<'a> {
        name: &'a str,
        size: usize,
        stored: Vec<u8>,
    }

    fn build(entries: &[Entry]) -> Vec<u8> {
        let info_table = 0x110usize;
        let string_table = info_table + entries.len() * RECORD_LEN as usize;
        let names: Vec<u8> = entries
            .iter()
            .flat_map(|e| e.name.bytes().chain(std::iter::once(0)))
            .collect();
        let mut data_at = string_table + names.len();

        let mut out = MAGIC.to_vec();
        out.resize(COUNT_AT as usize, 0);
        out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        out.resize(INFO_TABLE_AT as usize, 0);
        out.extend_from_slice(&(info_table as u32).to_le_bytes());
        out.resize(info_table, 0);

        let mut name_at = 0usize;
        for e in entries {
            out.extend_from_slice(&(name_at as u32).to_le_bytes());
            out.extend_from_slice(&(e.size as u32).to_le_bytes());
            out.extend_from_slice(&(data_at as u32).to_le_bytes());
            out.extend_from_slice(&(e.stored.len() as u32).to_le_bytes());
            out.extend_from_slice(&((e.size != e.stored.len()) as u32).to_le_bytes());
            out.extend_from_slice(&[0u8; 8]);
            name_at += e.name.len() + 1;
            data_at += e.stored.len();
        }
        out.extend_from_slice(&names);
        for e in entries {
            out.extend_from_slice(&e.stored);
        }
        out
    }

    #[test]
    fn test_plain_and_compressed_members() {
        let text = b"level geometry level geometry level geometry".to_vec();
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::best());
        enc.write_all(&text).unwrap();
        let packed = enc.finish().unwrap();

        let raw = build(&[
            Entry {
                name: "data\\a.tex",
                size: 4,
                stored: b"TEX!".to_vec(),
            },
            Entry {
                name: "b.geo",
                size: text.len(),
                stored: packed,
            },
        ]);
        let archive = Pod5.open(Bytes::from(raw)).unwrap();
        assert_eq!(archive.total_file_count(), 2);
        let files = archive.into_files();
        assert_eq!(files[0].0, std::path::PathBuf::from("data/a.tex"));
        assert_eq!(&files[0].1.data[..], b"TEX!");
        assert!(files[0].1.span.is_some());
        assert_eq!(files[1].1.data.to_vec(), text);
        assert!(files[1].1.span.is_none());
    }

    #[test]
    fn test_truncated_table() {
        let mut raw = build(&[Entry {
            name: "x",
            size: 2,
            stored: b"ok".to_vec(),
        }]);
        raw.truncate(0x110 + 8);
        assert!(Pod5.open(Bytes::from(raw)).is_err());
    }
}
