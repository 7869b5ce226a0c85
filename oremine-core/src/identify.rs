//! Format identification with a run-wide cache of discovered formats.
//!
//! Order: exact header lookup in the static registry, then the discovered
//! cache, then a full registry probe whose result is cached. Streams are
//! immutable slices, so no step can disturb what a later step reads.

use std::sync::Arc;

use gamearc::{registry, FileType, FormatInfo, FormatRegistry};
use log::debug;
use parking_lot::Mutex;

const HEADER_LEN: usize = 16;

pub struct FormatIdentifier {
    registry: &'static FormatRegistry,
    discovered: Mutex<Vec<Arc<FormatInfo>>>,
}

impl Default for FormatIdentifier {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatIdentifier {
    pub fn new() -> Self {
        Self::with_registry(registry())
    }

    pub fn with_registry(registry: &'static FormatRegistry) -> Self {
        Self {
            registry,
            discovered: Mutex::new(Vec::new()),
        }
    }

    pub fn identify(&self, data: &[u8], extension: &str) -> Arc<FormatInfo> {
        let header = &data[..data.len().min(HEADER_LEN)];
        if let Some(key) = header.get(..4) {
            let key = [key[0], key[1], key[2], key[3]];
            if let Some(format) = self
                .registry
                .lookup(key)
                .iter()
                .find(|f| f.is_match(data, extension))
            {
                return Arc::clone(format);
            }
        }

        if let Some(format) = self
            .discovered
            .lock()
            .iter()
            .find(|f| f.is_match(data, extension))
        {
            return Arc::clone(format);
        }

        // the full probe runs unlocked; concurrent discoveries of the same
        // format collapse onto the first cached instance
        let found = self.registry.identify_unknown(data, extension);
        if !cacheable(&found) {
            return found;
        }
        let mut discovered = self.discovered.lock();
        if let Some(existing) = discovered.iter().find(|f| ***f == *found) {
            return Arc::clone(existing);
        }
        debug!("Discovered format: {}", found.full_description());
        discovered.push(Arc::clone(&found));
        found
    }

    pub fn discovered_count(&self) -> usize {
        self.discovered.lock().len()
    }
}

/// An Unknown descriptor with no extension would match every extensionless
/// stream, hiding formats that a later probe could still recognize.
fn cacheable(format: &FormatInfo) -> bool {
    !(format.file_type == FileType::Unknown && format.extension.is_empty())
}
