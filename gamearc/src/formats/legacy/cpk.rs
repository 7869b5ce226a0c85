//! CRI `CPK` packed files.
//!
//! Layout: `CPK ` + 4 bytes + u64 LE packet size, with the header `@UTF`
//! table at 0x10. The header row gives `TocOffset` and `ContentOffset`; the
//! `TOC ` section at `TocOffset` has the same framing and lists one row per
//! file (`DirName`, `FileName`, `FileSize`, `FileOffset`). File offsets are
//! relative to the smaller of the TOC and content offsets. Payloads starting
//! with `CRILAYLA` are block-compressed.

use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use bytes::Bytes;

use super::utf::UtfTable;
use super::{dedup_name, LegacyEntry};
use crate::codecs::crilayla;
use crate::core::archive::ArchiveFile;
use crate::core::error::FormatError;

pub const MAGIC: &[u8; 4] = b"CPK ";
const TOC_MAGIC: &[u8; 4] = b"TOC ";
const PACKET_AT: usize = 0x10;

pub(super) fn read_entries(data: &Bytes) -> Result<Vec<LegacyEntry>> {
    let header = read_section(data, 0, MAGIC).context("CPK header")?;
    let toc_offset = header.get_u64(0, "TocOffset").unwrap_or(0);
    let content_offset = header.get_u64(0, "ContentOffset").unwrap_or(0);
    if toc_offset == 0 {
        bail!("CPK without a TOC section (ITOC-only packs are not supported)");
    }
    let base = match content_offset {
        0 => toc_offset,
        content => content.min(toc_offset),
    };

    let toc_at = usize::try_from(toc_offset).map_err(|_| out_of_bounds(data, toc_offset, 0))?;
    let toc = read_section(data, toc_at, TOC_MAGIC).context("CPK TOC")?;
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(toc.row_count());
    for row in 0..toc.row_count() {
        let file_name = toc.get_str(row, "FileName").unwrap_or_default();
        let file_name = if file_name.is_empty() {
            format!("{row:05}")
        } else {
            file_name.to_string()
        };
        let path = match toc.get_str(row, "DirName") {
            Some(dir) if !dir.is_empty() => format!("{dir}/{file_name}"),
            _ => file_name,
        };
        let path = dedup_name(&mut seen, path, row);
        let payload = entry_payload(data, &toc, row, base);
        entries.push(LegacyEntry { path, payload });
    }
    Ok(entries)
}

fn entry_payload(data: &Bytes, toc: &UtfTable, row: usize, base: u64) -> Result<Bytes> {
    let offset = toc
        .get_u64(row, "FileOffset")
        .ok_or_else(|| FormatError::Table("row without FileOffset".into()))?;
    let size = toc
        .get_u64(row, "FileSize")
        .ok_or_else(|| FormatError::Table("row without FileSize".into()))?;
    let at = base
        .checked_add(offset)
        .ok_or_else(|| out_of_bounds(data, offset, size))?;
    let chunk = ArchiveFile::slice("", data, at, size)?.data;
    if chunk.starts_with(crilayla::MAGIC) {
        return Ok(Bytes::from(crilayla::decompress(&chunk)?));
    }
    Ok(chunk)
}

/// Read the `@UTF` packet framed by `magic` at `at`.
fn read_section(data: &[u8], at: usize, magic: &[u8; 4]) -> Result<UtfTable> {
    let start = at
        .checked_add(PACKET_AT)
        .ok_or_else(|| out_of_bounds(data, at as u64, PACKET_AT as u64))?;
    let header = data.get(at..start).ok_or(FormatError::Truncated("CPK"))?;
    if &header[..4] != magic {
        return Err(FormatError::InvalidIdentifier("CPK section").into());
    }
    let size = u64::from_le_bytes([
        header[8], header[9], header[10], header[11], header[12], header[13], header[14], header[15],
    ]) as usize;
    let packet = start
        .checked_add(size)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| out_of_bounds(data, start as u64, size as u64))?;
    UtfTable::parse(packet)
}

fn out_of_bounds(data: &[u8], offset: u64, size: u64) -> FormatError {
    FormatError::OutOfBounds {
        offset,
        size,
        len: data.len() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::crilayla::tests::encode_literals;
    use crate::formats::legacy::utf::descramble;
    use crate::formats::legacy::utf::tests::{build_table, Cell};

    fn section(magic: &[u8; 4], packet: &[u8]) -> Vec<u8> {
        let mut out = magic.to_vec();
        out.extend_from_slice(&[0u8; 4]);
        out.extend_from_slice(&(packet.len() as u64).to_le_bytes());
        out.extend_from_slice(packet);
        out
    }

    /// CPK with a plain header table and a scrambled TOC.
    fn build(files: &[(&str, &str, Vec<u8>)]) -> Vec<u8> {
        // the header table size does not depend on the offsets it stores
        let probe = build_table(
            "CpkHeader",
            &["TocOffset", "ContentOffset", "Files"],
            &[vec![Cell::U64(0), Cell::U64(0), Cell::U32(0)]],
        );
        let toc_offset = (PACKET_AT + probe.len() + 0xF) & !0xF;

        let names: Vec<(String, String)> = files
            .iter()
            .map(|(d, f, _)| (d.to_string(), f.to_string()))
            .collect();
        // toc size is independent of the offsets too; compute it once with zero offsets
        let toc_probe_rows: Vec<Vec<Cell>> = names
            .iter()
            .map(|(d, f)| vec![Cell::Str(d.as_str()), Cell::Str(f.as_str()), Cell::U32(0), Cell::U64(0)])
            .collect();
        let toc_probe = build_table("CpkTocInfo", &["DirName", "FileName", "FileSize", "FileOffset"], &toc_probe_rows);
        let content_offset = toc_offset + PACKET_AT + toc_probe.len();
        let mut relative = (content_offset - toc_offset) as u64;
        let mut rows = Vec::new();
        for ((d, f), (_, _, payload)) in names.iter().zip(files) {
            rows.push(vec![
                Cell::Str(d.as_str()),
                Cell::Str(f.as_str()),
                Cell::U32(payload.len() as u32),
                Cell::U64(relative),
            ]);
            relative += payload.len() as u64;
        }
        let mut toc = build_table("CpkTocInfo", &["DirName", "FileName", "FileSize", "FileOffset"], &rows);
        descramble(&mut toc);

        let header = build_table(
            "CpkHeader",
            &["TocOffset", "ContentOffset", "Files"],
            &[vec![
                Cell::U64(toc_offset as u64),
                Cell::U64(content_offset as u64),
                Cell::U32(files.len() as u32),
            ]],
        );
        let mut out = section(MAGIC, &header);
        out.resize(toc_offset, 0);
        out.extend_from_slice(&section(TOC_MAGIC, &toc));
        for (_, _, payload) in files {
            out.extend_from_slice(payload);
        }
        out
    }

    #[test]
    fn test_plain_and_crilayla_entries() {
        let prefix = [0x11u8; 0x100];
        let packed = encode_literals(&prefix, b"compressed tail");
        let data = Bytes::from(build(&[
            ("", "sys.bin", b"SYSTEM".to_vec()),
            ("chr", "mario.brres", packed),
            ("chr", "mario.brres", b"dup".to_vec()),
        ]));

        let entries = read_entries(&data).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].path, "sys.bin");
        assert_eq!(&entries[0].payload.as_ref().unwrap()[..], b"SYSTEM");

        assert_eq!(entries[1].path, "chr/mario.brres");
        let unpacked = entries[1].payload.as_ref().unwrap();
        assert_eq!(unpacked.len(), 0x100 + 15);
        assert_eq!(&unpacked[0x100..], b"compressed tail");

        assert_eq!(entries[2].path, "chr/mario.brres_2");
        assert_eq!(&entries[2].payload.as_ref().unwrap()[..], b"dup");
    }

    #[test]
    fn test_offsets_near_overflow_are_rejected() {
        let header = build_table(
            "CpkHeader",
            &["TocOffset", "ContentOffset", "Files"],
            &[vec![Cell::U64(u64::MAX - 4), Cell::U64(0), Cell::U32(1)]],
        );
        let err = read_entries(&Bytes::from(section(MAGIC, &header))).unwrap_err();
        assert!(err.downcast_ref::<FormatError>().is_some());

        let toc = UtfTable::parse(&build_table(
            "CpkTocInfo",
            &["FileSize", "FileOffset"],
            &[vec![Cell::U32(4), Cell::U64(u64::MAX)]],
        ))
        .unwrap();
        let data = Bytes::from_static(b"0123456789");
        assert!(entry_payload(&data, &toc, 0, 16).is_err());
    }

    #[test]
    fn test_not_a_cpk() {
        assert!(read_entries(&Bytes::from_static(b"CPK \0\0\0\0\xFF\xFF\0\0\0\0\0\0")).is_err());
        assert!(read_entries(&Bytes::from_static(b"RIFF")).is_err());
    }
}
