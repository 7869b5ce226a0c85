//! gamearc - readers for proprietary game archive formats
//!
//! This crate knows how to recognize a byte stream (magic headers, content
//! sniffing, extension hints), how to open the containers it recognizes into an
//! [`Archive`] tree, and how to decompress the codecs commonly wrapped around
//! game assets. It never walks the filesystem and never writes anything; the
//! traversal engine lives in `oremine-core`.

pub mod codecs;
pub mod core;
pub mod formats;

pub use crate::core::archive::{Archive, ArchiveDirectory, ArchiveFile, ArchiveNode};
pub use crate::core::error::FormatError;
pub use crate::core::format::{FileType, FormatInfo, Handler, Magic, Matcher};
pub use crate::core::registry::{registry, FormatRegistry};
pub use crate::codecs::{try_decompress_any, Codec};
pub use crate::formats::legacy::{LegacyEntry, LegacyTable};
pub use crate::formats::ArchiveFormat;

/// Normalize an extension to the form used throughout the crate: lowercase
/// with a leading dot, or empty.
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(".{}", trimmed.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("BTI"), ".bti");
        assert_eq!(normalize_extension(".Arc"), ".arc");
        assert_eq!(normalize_extension(""), "");
        assert_eq!(normalize_extension("."), "");
    }
}
