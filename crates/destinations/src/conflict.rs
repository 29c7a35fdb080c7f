//! Filename conflict pre-flight for local downloads.

use pagedrop_protocol::ConflictAction;
use tracing::debug;

use crate::{BoxFuture, UploadError};

/// Characters escaped before a filename is embedded in a pattern.
const PATTERN_SPECIAL: &[char] = &[
    '{', '}', '(', ')', '^', '$', '&', '.', '*', '?', '/', '+', '|', '[', '\\', ']', '-',
];

/// Index of completed local downloads that still exist on disk.
pub trait DownloadIndex: Send + Sync {
    /// Returns `true` if any entry's full path matches the regular
    /// expression `pattern`.
    fn any_matching<'a>(&'a self, pattern: &'a str) -> BoxFuture<'a, Result<bool, UploadError>>;
}

/// Outcome of the conflict pre-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub skip: bool,
    /// Action to hand to the destination. Never [`ConflictAction::Skip`].
    pub action: ConflictAction,
}

/// Resolves the requested conflict action against the download index.
///
/// `skip` becomes `skip = true` when a previous download matches, and
/// `uniquify` otherwise. Other actions pass through without a lookup.
pub async fn resolve(
    index: &dyn DownloadIndex,
    filename: &str,
    requested: ConflictAction,
) -> Result<Resolution, UploadError> {
    if requested != ConflictAction::Skip {
        return Ok(Resolution {
            skip: false,
            action: requested,
        });
    }

    let pattern = filename_pattern(filename);
    if index.any_matching(&pattern).await? {
        debug!(filename, "existing download found, skipping");
        Ok(Resolution {
            skip: true,
            action: ConflictAction::Skip,
        })
    } else {
        Ok(Resolution {
            skip: false,
            action: ConflictAction::Uniquify,
        })
    }
}

/// Pattern matching `filename` as the last component of a path.
pub fn filename_pattern(filename: &str) -> String {
    format!("(\\\\|/){}$", escape_pattern(filename))
}

/// Backslash-escapes pattern metacharacters.
pub fn escape_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if PATTERN_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
