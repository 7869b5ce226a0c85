//! Format descriptors.
//!
//! A [`FormatInfo`] says what a stream is (coarse [`FileType`], extension,
//! description), how to recognize it ([`Matcher`]) and, when the crate can do
//! something with it, which capability handles it ([`Handler`]).

use std::fmt;

use crate::codecs::Codec;
use crate::core::reader::matches_at;
use crate::formats::legacy::LegacyTable;
use crate::formats::ArchiveFormat;

/// Coarse classification of a recognized stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Unknown,
    Archive,
    Texture,
    Audio,
    Model,
    Collision,
    Video,
    Text,
    Font,
    Layout,
    Animation,
    Script,
    Parameter,
    Executable,
    Effect,
    Shader,
    Rom,
    Else,
}

/// Identifying byte pattern located at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Magic {
    pub bytes: &'static [u8],
    pub offset: usize,
}

impl Magic {
    /// Short magics collide too often to be trusted on their own.
    pub fn is_reliable(&self) -> bool {
        self.bytes.len() > 3
    }

    pub fn display(&self) -> String {
        String::from_utf8_lossy(self.bytes)
            .chars()
            .map(|c| if c.is_control() { '.' } else { c })
            .collect()
    }
}

/// Predicate deciding whether a stream is an instance of a format.
#[derive(Clone, Copy)]
pub enum Matcher {
    /// The magic is present at its offset.
    Magic,
    /// The extension hint equals the format extension.
    Extension,
    /// Magic present and extension hint equal.
    MagicAndExtension,
    /// Content sniffing reports this MIME type.
    Sniffed(&'static str),
    Custom(fn(&[u8], &str) -> bool),
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Magic => f.write_str("Magic"),
            Matcher::Extension => f.write_str("Extension"),
            Matcher::MagicAndExtension => f.write_str("MagicAndExtension"),
            Matcher::Sniffed(mime) => write!(f, "Sniffed({mime})"),
            Matcher::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Capability bound to a format.
#[derive(Clone, Copy)]
pub enum Handler {
    /// Payload is a tree of named sub-streams.
    Container(&'static dyn ArchiveFormat),
    /// Payload decodes to one replacement stream.
    Codec(&'static dyn Codec),
    /// Bespoke entry table read directly by the engine.
    Legacy(LegacyTable),
}

impl Handler {
    pub fn name(&self) -> &'static str {
        match self {
            Handler::Container(c) => c.name(),
            Handler::Codec(c) => c.name(),
            Handler::Legacy(t) => t.name(),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Container(c) => write!(f, "Container({})", c.name()),
            Handler::Codec(c) => write!(f, "Codec({})", c.name()),
            Handler::Legacy(t) => write!(f, "Legacy({})", t.name()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormatInfo {
    /// Lowercase with a leading dot, or empty.
    pub extension: String,
    pub file_type: FileType,
    pub magic: Option<Magic>,
    pub description: String,
    pub handler: Option<Handler>,
    matcher: Matcher,
}

impl FormatInfo {
    pub fn new(extension: &str, file_type: FileType, description: &str) -> Self {
        Self {
            extension: crate::normalize_extension(extension),
            file_type,
            magic: None,
            description: description.to_string(),
            handler: None,
            matcher: Matcher::Extension,
        }
    }

    /// Descriptor for a stream nothing recognized; matches later streams that
    /// carry the same extension.
    pub fn unknown(extension: &str) -> Self {
        Self::new(extension, FileType::Unknown, "Unknown")
    }

    pub fn with_magic(mut self, bytes: &'static [u8], offset: usize) -> Self {
        self.magic = Some(Magic { bytes, offset });
        self.matcher = Matcher::Magic;
        self
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn matcher(&self) -> Matcher {
        self.matcher
    }

    pub fn is_match(&self, data: &[u8], extension: &str) -> bool {
        let magic_ok = || {
            self.magic
                .is_some_and(|m| matches_at(data, m.bytes, m.offset))
        };
        match self.matcher {
            Matcher::Magic => magic_ok(),
            Matcher::Extension => self.extension == extension,
            Matcher::MagicAndExtension => magic_ok() && self.extension == extension,
            Matcher::Sniffed(mime) => infer::get(data).is_some_and(|t| t.mime_type() == mime),
            Matcher::Custom(predicate) => predicate(data, extension),
        }
    }

    /// 4-byte lookup key for formats whose magic sits at offset 0.
    pub fn header_key(&self) -> Option<[u8; 4]> {
        let magic = self.magic?;
        if magic.offset != 0 || magic.bytes.len() < 4 {
            return None;
        }
        let mut key = [0u8; 4];
        key.copy_from_slice(&magic.bytes[..4]);
        Some(key)
    }

    /// True when the format carries a signature long enough to trust.
    pub fn has_reliable_magic(&self) -> bool {
        self.magic.is_some_and(|m| m.is_reliable())
    }

    pub fn full_description(&self) -> String {
        let mut out = format!("{} ({:?}", self.description, self.file_type);
        if !self.extension.is_empty() {
            out.push_str(&format!(", {}", self.extension));
        }
        if let Some(handler) = &self.handler {
            out.push_str(&format!(", {}", handler.name()));
        }
        out.push(')');
        out
    }
}

/// Two descriptors are the same format when they agree on everything that
/// identifies it; handlers and predicates follow from those fields.
impl PartialEq for FormatInfo {
    fn eq(&self, other: &Self) -> bool {
        self.extension == other.extension
            && self.file_type == other.file_type
            && self.magic == other.magic
            && self.description == other.description
    }
}

impl Eq for FormatInfo {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_matcher_respects_offset() {
        let info = FormatInfo::new(".iso", FileType::Rom, "Disc image").with_magic(b"\xC2\x33\x9F\x3D", 4);
        let mut data = vec![0u8; 4];
        data.extend_from_slice(b"\xC2\x33\x9F\x3D");
        assert!(info.is_match(&data, ""));
        assert!(!info.is_match(&data[4..], ""));
        assert_eq!(info.header_key(), None);
    }

    #[test]
    fn test_unknown_matches_by_extension() {
        let info = FormatInfo::unknown("XYZ");
        assert_eq!(info.extension, ".xyz");
        assert!(info.is_match(b"anything", ".xyz"));
        assert!(!info.is_match(b"anything", ".abc"));
        assert!(!info.has_reliable_magic());
    }

    #[test]
    fn test_header_key_and_description() {
        let info = FormatInfo::new(".rarc", FileType::Archive, "Nintendo RARC").with_magic(b"RARC", 0);
        assert_eq!(info.header_key(), Some(*b"RARC"));
        assert!(info.has_reliable_magic());
        assert_eq!(info.full_description(), "Nintendo RARC (Archive, .rarc)");
        assert_eq!(info, info.clone());
    }
}
