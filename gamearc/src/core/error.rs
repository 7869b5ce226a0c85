use thiserror::Error;

/// Structural failures raised while parsing a container or decoding a codec.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Invalid identifier, expected \"{0}\"")]
    InvalidIdentifier(&'static str),

    #[error("{format}: unsupported table layout (flag {flag})")]
    UnsupportedLayout { format: &'static str, flag: u32 },

    #[error("Range {offset:#x}+{size:#x} exceeds stream length {len:#x}")]
    OutOfBounds { offset: u64, size: u64, len: u64 },

    #[error("{0}: compressed data ended early")]
    Truncated(&'static str),

    #[error("{codec}: back-reference {distance} points before the start of the output")]
    BadReference { codec: &'static str, distance: usize },

    #[error("{codec}: declared size {size} exceeds the {limit} byte limit")]
    TooLarge { codec: &'static str, size: u64, limit: u64 },

    #[error("@UTF table: {0}")]
    Table(String),
}
