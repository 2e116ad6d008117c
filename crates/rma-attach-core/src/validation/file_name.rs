//! Input validation for values that end up as path segments.
//!
//! File names, category keys and record ids all become directory or file
//! segments under the storage root, so anything that could escape a segment
//! is rejected here before a path is ever built.

use anyhow::Result;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::constants::MAX_FILE_NAME_BYTES;

fn category_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-]{1,64}$").expect("static regex"))
}

/// Validate a client-supplied file name.
///
/// Rules:
/// - not empty, not `.` or `..`
/// - no `/`, `\` or NUL
/// - at most 255 bytes
pub fn validate_file_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(anyhow::anyhow!("File name cannot be empty"));
    }
    if name == "." || name == ".." {
        return Err(anyhow::anyhow!("File name '{}' is not allowed", name));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(anyhow::anyhow!(
            "File name '{}' must not contain path separators",
            name
        ));
    }
    if name.len() > MAX_FILE_NAME_BYTES {
        return Err(anyhow::anyhow!(
            "File name exceeds maximum length of {} bytes",
            MAX_FILE_NAME_BYTES
        ));
    }
    Ok(())
}

/// Validate a category key used as a directory segment.
pub fn validate_category_key(key: &str) -> Result<()> {
    if !category_key_pattern().is_match(key) {
        return Err(anyhow::anyhow!(
            "Category key '{}' contains invalid characters. Allowed: letters, digits, underscore, hyphen",
            key
        ));
    }
    Ok(())
}

/// Parse a caller-supplied record id. Record ids are positive integers.
pub fn parse_record_id(raw: &str) -> Result<i64> {
    let id: i64 = raw
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Record id '{}' is not a valid number", raw))?;
    if id <= 0 {
        return Err(anyhow::anyhow!("Record id must be positive, got {}", id));
    }
    Ok(id)
}

/// Lower-case extension without the dot, if any.
pub fn file_extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_lowercase())
}

/// `"name (n).ext"` for the n-th rename candidate of `name`.
///
/// Only the last extension is kept aside: `a.tar.gz` becomes `a.tar (1).gz`.
pub fn numbered_name(name: &str, n: u32) -> String {
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str());
    let ext = path.extension().and_then(|s| s.to_str());
    match (stem, ext) {
        (Some(stem), Some(ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, n, ext),
        _ => format!("{} ({})", name, n),
    }
}
