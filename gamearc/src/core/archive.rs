//! In-memory tree of an opened container.
//!
//! Members are zero-copy [`Bytes`] slices of the container stream whenever the
//! parser can express them that way, so the tree keeps its backing stream alive
//! exactly as long as some member still needs it.

use std::ops::Range;
use std::path::{Component, Path, PathBuf};

use anyhow::Result;
use bytes::Bytes;

use crate::core::error::FormatError;
use crate::normalize_extension;

#[derive(Debug, Clone)]
pub struct ArchiveFile {
    pub name: String,
    pub data: Bytes,
    /// Backing range inside the parent stream; `None` for materialized data.
    pub span: Option<Range<u64>>,
}

impl ArchiveFile {
    /// Member backed by `size` bytes of `parent` starting at `offset`.
    pub fn slice(name: impl Into<String>, parent: &Bytes, offset: u64, size: u64) -> Result<Self> {
        let len = parent.len() as u64;
        let end = offset
            .checked_add(size)
            .filter(|&end| end <= len)
            .ok_or(FormatError::OutOfBounds { offset, size, len })?;
        Ok(Self {
            name: name.into(),
            data: parent.slice(offset as usize..end as usize),
            span: Some(offset..end),
        })
    }

    /// Member whose bytes were produced by the parser (e.g. decompressed).
    pub fn owned(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data: Bytes::from(data),
            span: None,
        }
    }

    pub fn extension(&self) -> String {
        Path::new(&self.name)
            .extension()
            .map(|e| normalize_extension(&e.to_string_lossy()))
            .unwrap_or_default()
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum ArchiveNode {
    File(ArchiveFile),
    Directory(ArchiveDirectory),
}

impl ArchiveNode {
    pub fn name(&self) -> &str {
        match self {
            ArchiveNode::File(f) => &f.name,
            ArchiveNode::Directory(d) => &d.name,
        }
    }
}

/// Ordered name -> child mapping.
#[derive(Debug, Clone, Default)]
pub struct ArchiveDirectory {
    pub name: String,
    items: Vec<ArchiveNode>,
}

impl ArchiveDirectory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    pub fn items(&self) -> &[ArchiveNode] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|item| item.name() == name)
    }

    /// Insert a file at a `/`- or `\`-separated path, creating intermediate
    /// directories. A name already taken at the final level gets `suffix`
    /// appended, the way the table formats disambiguate duplicate entries.
    pub fn add_file(&mut self, path: &str, mut file: ArchiveFile, suffix: impl std::fmt::Display) {
        let mut parts: Vec<&str> = path
            .split(['/', '\\'])
            .filter(|p| !p.is_empty())
            .collect();
        let leaf = parts.pop().unwrap_or("");
        let mut dir = self;
        for part in parts {
            dir = dir.directory_mut(part);
        }
        let mut name = leaf.to_string();
        if dir.contains(&name) {
            name = format!("{name}{suffix}");
        }
        file.name = name;
        dir.items.push(ArchiveNode::File(file));
    }

    fn directory_mut(&mut self, name: &str) -> &mut ArchiveDirectory {
        let idx = match self
            .items
            .iter()
            .position(|item| matches!(item, ArchiveNode::Directory(d) if d.name == name))
        {
            Some(idx) => idx,
            None => {
                self.items
                    .push(ArchiveNode::Directory(ArchiveDirectory::new(name)));
                self.items.len() - 1
            }
        };
        match &mut self.items[idx] {
            ArchiveNode::Directory(d) => d,
            ArchiveNode::File(_) => unreachable!("index points at a directory"),
        }
    }

    /// The last file reached by always descending into the last item.
    pub fn last_file(&self) -> Option<&ArchiveFile> {
        match self.items.last()? {
            ArchiveNode::File(f) => Some(f),
            ArchiveNode::Directory(d) => d.last_file(),
        }
    }

    pub fn file_count(&self) -> usize {
        self.items
            .iter()
            .map(|item| match item {
                ArchiveNode::File(_) => 1,
                ArchiveNode::Directory(d) => d.file_count(),
            })
            .sum()
    }

    fn collect_into(self, prefix: &Path, out: &mut Vec<(PathBuf, ArchiveFile)>) {
        for item in self.items {
            match item {
                ArchiveNode::File(f) => out.push((join_sanitized(prefix, &f.name), f)),
                ArchiveNode::Directory(d) => {
                    let next = join_sanitized(prefix, &d.name);
                    d.collect_into(&next, out);
                }
            }
        }
    }
}

/// A parsed container: the member tree over its backing stream.
#[derive(Debug, Clone, Default)]
pub struct Archive {
    pub root: ArchiveDirectory,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_file_count(&self) -> usize {
        self.root.file_count()
    }

    /// End offset of the last member's declared extent, when it is a slice.
    pub fn last_member_end(&self) -> Option<u64> {
        self.root.last_file()?.span.as_ref().map(|s| s.end)
    }

    /// Flatten into (archive-relative path, file) pairs in tree order.
    pub fn into_files(self) -> Vec<(PathBuf, ArchiveFile)> {
        let mut out = Vec::with_capacity(self.total_file_count());
        self.root.collect_into(Path::new(""), &mut out);
        out
    }
}

/// Append an archive-supplied name, dropping components that could escape the
/// output tree (`..`, roots, drive prefixes).
fn join_sanitized(base: &Path, name: &str) -> PathBuf {
    let mut out = base.to_path_buf();
    for part in name.split(['/', '\\']) {
        for component in Path::new(part).components() {
            if let Component::Normal(c) = component {
                out.push(c);
            }
        }
    }
    out
}
