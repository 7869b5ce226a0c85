//! Signature-driven re-segmentation.
//!
//! Scans a stream for known signatures and splits it at every occurrence;
//! each member runs from one occurrence to the next (or to the end). Bytes
//! before the first occurrence are not part of any member.

use bytes::Bytes;
use log::debug;

use crate::core::archive::{Archive, ArchiveFile};

/// Cut `data` at every occurrence of any of `signatures` at or after `start`.
///
/// The result is empty when nothing matched, or when the only match starts at
/// offset 0 and would therefore reproduce the whole stream.
pub fn cut(data: &Bytes, start: u64, signatures: &[&[u8]]) -> Archive {
    let mut archive = Archive::new();
    let hits = find_signatures(data, start as usize, signatures);
    if hits.is_empty() || (hits.len() == 1 && hits[0] == 0) {
        return archive;
    }

    debug!("cutter: {} segment(s) from offset {:#x}", hits.len(), start);
    for (i, &from) in hits.iter().enumerate() {
        let to = hits.get(i + 1).copied().unwrap_or(data.len());
        let name = format!("{from:08X}");
        // hits are strictly increasing and inside the stream, so the slice is in bounds
        if let Ok(file) = ArchiveFile::slice(name.clone(), data, from as u64, (to - from) as u64) {
            archive.root.add_file(&name, file, "");
        }
    }
    archive
}

/// Offsets of signature occurrences. After a hit the scan resumes past the
/// matched signature so one header never yields overlapping members.
fn find_signatures(data: &[u8], start: usize, signatures: &[&[u8]]) -> Vec<usize> {
    let mut by_first: Vec<Vec<&[u8]>> = vec![Vec::new(); 256];
    for sig in signatures.iter().copied().filter(|s| !s.is_empty()) {
        by_first[sig[0] as usize].push(sig);
    }

    let mut hits = Vec::new();
    let mut pos = start;
    while pos < data.len() {
        let matched = by_first[data[pos] as usize]
            .iter()
            .find(|sig| data[pos..].starts_with(**sig));
        match matched {
            Some(sig) => {
                hits.push(pos);
                pos += sig.len();
            }
            None => pos += 1,
        }
    }
    hits
}
