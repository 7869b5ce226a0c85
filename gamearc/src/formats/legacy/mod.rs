//! Entry-table formats that are read directly rather than opened into an
//! [`Archive`](crate::core::archive::Archive) tree.
//!
//! Each entry is yielded independently with its own payload result, so one
//! broken entry never takes the rest of the table down with it.

mod afs;
mod cpk;
pub mod utf;

use std::collections::HashSet;

use anyhow::Result;
use bytes::Bytes;

/// One entry of a legacy table.
#[derive(Debug)]
pub struct LegacyEntry {
    /// `/`-separated path relative to the table, as stored.
    pub path: String,
    pub payload: Result<Bytes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyTable {
    /// CRI `AFS` file table.
    Afs,
    /// CRI `CPK` packed files, described by `@UTF` tables.
    Cpk,
}

impl LegacyTable {
    pub fn name(&self) -> &'static str {
        match self {
            LegacyTable::Afs => "AFS",
            LegacyTable::Cpk => "CPK",
        }
    }

    /// Read every entry of the table. An `Err` means the table itself could
    /// not be read; per-entry failures are reported in [`LegacyEntry::payload`].
    pub fn read_entries(&self, data: &Bytes) -> Result<Vec<LegacyEntry>> {
        match self {
            LegacyTable::Afs => afs::read_entries(data),
            LegacyTable::Cpk => cpk::read_entries(data),
        }
    }
}

/// Make a stored name unique within one table.
fn dedup_name(seen: &mut HashSet<String>, name: String, index: usize) -> String {
    let name = if seen.contains(&name) {
        format!("{name}_{index}")
    } else {
        name
    };
    seen.insert(name.clone());
    name
}
