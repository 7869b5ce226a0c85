//! Shared building blocks: the archive tree, format descriptors and the
//! static format registry.

pub mod archive;
pub mod error;
pub mod format;
pub mod reader;
pub mod registry;
