//! Compression codecs found wrapped around game assets.
//!
//! Every codec is a unit struct implementing [`Codec`]; [`ALL`] is the probe
//! order used by the generic decompression cascade.

pub mod crilayla;
pub mod deflate;
pub mod lz10;
pub mod lzss;
pub mod yaz0;
pub mod zstd;

use anyhow::Result;
use log::debug;

use crate::core::error::FormatError;

pub use self::crilayla::Crilayla;
pub use self::deflate::{Gzip, ZLib};
pub use self::lz10::Lz10;
pub use self::lzss::Lzss;
pub use self::yaz0::Yaz0;
pub use self::zstd::Zstd;

/// Upper bound on a single decoded stream.
pub const MAX_OUTPUT: u64 = 1 << 30;

/// A format whose payload decodes to one replacement stream.
pub trait Codec: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap structural check; decoding may still fail afterwards.
    fn is_match(&self, data: &[u8]) -> bool;

    fn can_decompress(&self) -> bool {
        true
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Probe order for [`try_decompress_any`]: long signatures first, the
/// one-byte LZ10 header last.
pub static ALL: &[&'static dyn Codec] = &[
    &Yaz0, &Crilayla, &Lzss, &Zstd, &Gzip, &ZLib, &Lz10,
];

/// Try every codec whose predicate accepts `data`; the first successful
/// decode wins.
pub fn try_decompress_any(data: &[u8]) -> Option<(Vec<u8>, &'static dyn Codec)> {
    for &codec in ALL {
        if !codec.can_decompress() || !codec.is_match(data) {
            continue;
        }
        match codec.decompress(data) {
            Ok(out) => return Some((out, codec)),
            Err(e) => debug!("{} matched but failed to decode: {:#}", codec.name(), e),
        }
    }
    None
}

pub(crate) fn check_output_size(codec: &'static str, size: u64) -> Result<usize> {
    if size > MAX_OUTPUT {
        return Err(FormatError::TooLarge {
            codec,
            size,
            limit: MAX_OUTPUT,
        }
        .into());
    }
    Ok(size as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascade_picks_matching_codec() {
        let compressed = zstd::compress_zstd(b"cascade payload", 3).unwrap();
        let (out, codec) = try_decompress_any(&compressed).unwrap();
        assert_eq!(out, b"cascade payload");
        assert_eq!(codec.name(), "Zstd");
    }

    #[test]
    fn test_cascade_rejects_plain_data() {
        assert!(try_decompress_any(b"just some text that is not compressed").is_none());
        assert!(try_decompress_any(b"").is_none());
    }

    #[test]
    fn test_output_limit() {
        assert!(check_output_size("test", MAX_OUTPUT + 1).is_err());
        assert_eq!(check_output_size("test", 16).unwrap(), 16);
    }
}
