use std::path::{Component, Path};

use crate::TransferError;

/// Replacement used when a session does not specify one.
pub const DEFAULT_REPLACEMENT_CHARACTER: &str = "_";

const RESERVED: [char; 8] = ['<', '>', ':', '"', '\\', '|', '?', '*'];

/// Makes a session-supplied filename safe to create below a download
/// directory.
///
/// Reserved characters and control characters are replaced with
/// `replacement`; forward slashes are kept as directory separators.
///
/// Rejects:
/// - Empty names
/// - Absolute paths
/// - Parent directory traversal (`..`)
pub fn sanitize_filename(filename: &str, replacement: &str) -> Result<String, TransferError> {
    if filename.trim().is_empty() {
        return Err(TransferError::InvalidFilename("empty filename".into()));
    }

    if filename.starts_with('/') || Path::new(filename).is_absolute() {
        return Err(TransferError::InvalidFilename(format!(
            "absolute path not allowed: {filename}"
        )));
    }

    let sanitized: String = filename
        .chars()
        .map(|c| {
            if RESERVED.contains(&c) || c.is_control() {
                replacement.to_string()
            } else {
                c.to_string()
            }
        })
        .collect();

    for component in Path::new(&sanitized).components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidFilename(format!(
                    "parent directory traversal not allowed: {filename}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(TransferError::InvalidFilename(format!(
                    "path prefix not allowed: {filename}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(sanitized)
}
