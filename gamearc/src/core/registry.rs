//! The static table of formats this crate knows about.
//!
//! Built once on first use. Formats with a magic at offset 0 are also indexed
//! by their first four bytes so the common case is a single hash lookup.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::codecs::{self, Codec};
use crate::core::format::{FileType, FormatInfo, Handler, Matcher};
use crate::formats::legacy::LegacyTable;
use crate::formats::{Alar, Pod5};

pub struct FormatRegistry {
    formats: Vec<Arc<FormatInfo>>,
    by_header: HashMap<[u8; 4], Vec<Arc<FormatInfo>>>,
}

static REGISTRY: OnceLock<FormatRegistry> = OnceLock::new();

/// The process-wide registry.
pub fn registry() -> &'static FormatRegistry {
    REGISTRY.get_or_init(|| FormatRegistry::new(builtin_formats()))
}

impl FormatRegistry {
    pub fn new(formats: Vec<FormatInfo>) -> Self {
        let formats: Vec<Arc<FormatInfo>> = formats.into_iter().map(Arc::new).collect();
        let mut by_header: HashMap<[u8; 4], Vec<Arc<FormatInfo>>> = HashMap::new();
        for format in &formats {
            if let Some(key) = format.header_key() {
                by_header.entry(key).or_default().push(Arc::clone(format));
            }
        }
        Self { formats, by_header }
    }

    pub fn formats(&self) -> &[Arc<FormatInfo>] {
        &self.formats
    }

    /// Candidates whose magic starts with `header`.
    pub fn lookup(&self, header: [u8; 4]) -> &[Arc<FormatInfo>] {
        self.by_header.get(&header).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Full probe for streams the header index did not resolve: every
    /// registered predicate in order, then content sniffing, then an
    /// extension-keyed Unknown descriptor.
    pub fn identify_unknown(&self, data: &[u8], extension: &str) -> Arc<FormatInfo> {
        if let Some(format) = self.formats.iter().find(|f| f.is_match(data, extension)) {
            return Arc::clone(format);
        }
        if let Some(kind) = infer::get(data) {
            let info = FormatInfo::new(kind.extension(), sniffed_type(kind.matcher_type()), kind.mime_type())
                .with_matcher(Matcher::Sniffed(kind.mime_type()));
            return Arc::new(info);
        }
        Arc::new(FormatInfo::unknown(extension))
    }

    /// Magics of at least four bytes located at offset 0, deduplicated; the
    /// set the cutter segments on.
    pub fn signatures(&self) -> Vec<&'static [u8]> {
        let mut out: Vec<&'static [u8]> = Vec::new();
        for magic in self.formats.iter().filter_map(|f| f.magic) {
            if magic.offset == 0 && magic.is_reliable() && !out.contains(&magic.bytes) {
                out.push(magic.bytes);
            }
        }
        out
    }
}

fn sniffed_type(kind: infer::MatcherType) -> FileType {
    use infer::MatcherType;
    match kind {
        MatcherType::Archive => FileType::Archive,
        MatcherType::Audio => FileType::Audio,
        MatcherType::Image => FileType::Texture,
        MatcherType::Video => FileType::Video,
        MatcherType::Font => FileType::Font,
        MatcherType::Text | MatcherType::Doc | MatcherType::Book => FileType::Text,
        MatcherType::App => FileType::Executable,
        _ => FileType::Else,
    }
}

fn codec(extension: &str, description: &str, codec: &'static dyn Codec) -> FormatInfo {
    FormatInfo::new(extension, FileType::Archive, description).with_handler(Handler::Codec(codec))
}

fn is_wave(data: &[u8], _extension: &str) -> bool {
    data.starts_with(b"RIFF") && data.get(8..12) == Some(b"WAVE".as_slice())
}

fn is_zlib(data: &[u8], extension: &str) -> bool {
    extension == ".zlib" && codecs::ZLib.is_match(data)
}

fn is_lz10(data: &[u8], extension: &str) -> bool {
    matches!(extension, ".lz" | ".lz77" | ".cmp") && codecs::Lz10.is_match(data)
}

fn builtin_formats() -> Vec<FormatInfo> {
    vec![
        // containers
        FormatInfo::new(".alar", FileType::Archive, "Aqualead Archive")
            .with_magic(b"ALAR", 0)
            .with_handler(Handler::Container(&Alar)),
        FormatInfo::new(".pod", FileType::Archive, "Terminal Reality POD5")
            .with_magic(b"POD5", 0)
            .with_handler(Handler::Container(&Pod5)),
        FormatInfo::new(".afs", FileType::Archive, "CRI AFS")
            .with_magic(b"AFS\0", 0)
            .with_handler(Handler::Legacy(LegacyTable::Afs)),
        FormatInfo::new(".cpk", FileType::Archive, "CRI CPK")
            .with_magic(b"CPK ", 0)
            .with_handler(Handler::Legacy(LegacyTable::Cpk)),
        FormatInfo::new(".arc", FileType::Archive, "Nintendo RARC").with_magic(b"RARC", 0),
        FormatInfo::new(".arc", FileType::Archive, "Nintendo U8").with_magic(b"\x55\xAA\x38\x2D", 0),
        FormatInfo::new(".brres", FileType::Archive, "Nintendo BRRES").with_magic(b"bres", 0),
        // codecs
        codec(".yaz0", "Nintendo Yaz0", &codecs::Yaz0).with_magic(b"Yaz0", 0),
        codec(".lzss", "LZSS", &codecs::Lzss).with_magic(b"LZSS", 0),
        codec(".cri", "CRILAYLA", &codecs::Crilayla).with_magic(b"CRILAYLA", 0),
        codec(".zst", "Zstandard", &codecs::Zstd).with_magic(b"\x28\xB5\x2F\xFD", 0),
        codec(".gz", "GZip", &codecs::Gzip).with_magic(b"\x1F\x8B", 0),
        codec(".zlib", "ZLib", &codecs::ZLib).with_matcher(Matcher::Custom(is_zlib)),
        codec(".lz", "Nintendo LZ10", &codecs::Lz10).with_matcher(Matcher::Custom(is_lz10)),
        // textures
        FormatInfo::new(".tpl", FileType::Texture, "Nintendo TPL").with_magic(b"\x00\x20\xAF\x30", 0),
        FormatInfo::new(".dds", FileType::Texture, "DirectDraw Surface").with_magic(b"DDS ", 0),
        FormatInfo::new(".png", FileType::Texture, "Portable Network Graphics").with_magic(b"\x89PNG", 0),
        FormatInfo::new(".tex0", FileType::Texture, "Nintendo TEX0").with_magic(b"TEX0", 0),
        FormatInfo::new(".bti", FileType::Texture, "Nintendo BTI"),
        // audio
        FormatInfo::new(".brstm", FileType::Audio, "Nintendo RSTM").with_magic(b"RSTM", 0),
        FormatInfo::new(".wav", FileType::Audio, "RIFF WAVE")
            .with_magic(b"RIFF", 0)
            .with_matcher(Matcher::Custom(is_wave)),
        // models, video, executables
        FormatInfo::new(".bmd", FileType::Model, "Nintendo J3D model").with_magic(b"J3D2", 0),
        FormatInfo::new(".thp", FileType::Video, "Nintendo THP").with_magic(b"THP\0", 0),
        FormatInfo::new(".elf", FileType::Executable, "ELF executable").with_magic(b"\x7FELF", 0),
        FormatInfo::new(".dol", FileType::Executable, "GameCube DOL"),
        // disc images
        FormatInfo::new(".iso", FileType::Rom, "GameCube disc").with_magic(b"\xC2\x33\x9F\x3D", 0x1C),
        FormatInfo::new(".iso", FileType::Rom, "Wii disc").with_magic(b"\x5D\x1C\x9E\xA3", 0x18),
        // recognized layout without a known purpose
        FormatInfo::new(".rtdp", FileType::Unknown, "RTDP").with_magic(b"RTDP", 0),
    ]
}
