use std::path::{Component, Path, PathBuf};

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human-readable size with 1024 steps, e.g. `1.50 KB`.
pub fn size_suffix(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// Uppercase hex of at most `limit` leading bytes.
pub fn hex_preview(data: &[u8], limit: usize) -> String {
    hex::encode_upper(&data[..data.len().min(limit)])
}

/// Relative path from an archive-supplied name; `..`, roots and prefixes are dropped.
pub fn sanitized_relative(name: &str) -> PathBuf {
    let mut out = PathBuf::new();
    for part in name.split(['/', '\\']) {
        for component in Path::new(part).components() {
            if let Component::Normal(c) = component {
                out.push(c);
            }
        }
    }
    out
}

/// Split a relative path into (path without extension, normalized extension).
pub fn split_extension(path: &Path) -> (PathBuf, String) {
    match path.extension() {
        Some(ext) => (
            path.with_extension(""),
            gamearc::normalize_extension(&ext.to_string_lossy()),
        ),
        None => (path.to_path_buf(), String::new()),
    }
}

pub fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
