//! Local filesystem download contract.

use pagedrop_protocol::ConflictAction;

use crate::{BoxFuture, UploadError};

/// A request to save an ephemeral handle's bytes to the download directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Ephemeral handle holding the content.
    pub url: String,
    pub filename: String,
    /// Ask the user to confirm the name.
    pub save_as: bool,
    pub conflict_action: ConflictAction,
    pub incognito: bool,
    /// Substitute for characters the filesystem reserves.
    pub replacement_character: String,
    pub include_infobar: bool,
}

/// Host download facility.
pub trait Downloader: Send + Sync {
    /// Saves the content and resolves with the path it was written to, or
    /// `None` when nothing was written.
    fn download(
        &self,
        request: DownloadRequest,
    ) -> BoxFuture<'_, Result<Option<String>, UploadError>>;
}

/// Percent-encodes `#` so the name survives as a URL path segment.
pub fn encode_sharp_character(path: &str) -> String {
    path.replace('#', "%23")
}

/// Turns a resolved download path into a `file:` URL.
pub fn file_url(path: &str) -> String {
    if path.starts_with("file:") {
        return path.to_string();
    }
    let path = path.strip_prefix('/').unwrap_or(path);
    format!("file:///{}", encode_sharp_character(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sharp_is_encoded() {
        assert_eq!(encode_sharp_character("a#b#c.html"), "a%23b%23c.html");
        assert_eq!(encode_sharp_character("plain.html"), "plain.html");
    }

    #[test]
    fn unix_path_to_file_url() {
        assert_eq!(
            file_url("/home/me/Downloads/a#b.html"),
            "file:///home/me/Downloads/a%23b.html"
        );
    }

    #[test]
    fn windows_path_to_file_url() {
        assert_eq!(
            file_url("C:\\Users\\me\\page.html"),
            "file:///C:\\Users\\me\\page.html"
        );
    }

    #[test]
    fn file_url_is_kept() {
        assert_eq!(file_url("file:///tmp/x#y"), "file:///tmp/x#y");
    }
}
