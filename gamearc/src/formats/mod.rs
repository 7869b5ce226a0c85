//! Container parsers.
//!
//! A container opens into an [`Archive`] whose members are slices of the
//! container stream. Table formats that do not fit the tree model live in
//! [`legacy`]; [`cutter`] re-segments streams nothing could parse.

pub mod alar;
pub mod cutter;
pub mod legacy;
pub mod pod5;

use anyhow::Result;
use bytes::Bytes;

use crate::core::archive::Archive;

pub use self::alar::Alar;
pub use self::pod5::Pod5;

pub trait ArchiveFormat: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_match(&self, data: &[u8]) -> bool;

    /// Parse the member table. Members must not outlive `data`'s backing
    /// buffer, which `Bytes` guarantees by construction.
    fn open(&self, data: Bytes) -> Result<Archive>;

    /// Signature the container starts with, used to look for further
    /// instances appended after the last member.
    fn self_signature(&self) -> Option<&'static [u8]> {
        None
    }
}
