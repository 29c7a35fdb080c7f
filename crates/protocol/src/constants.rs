use serde::{Deserialize, Serialize};

/// MIME type of a saved page.
pub const MIMETYPE_HTML: &str = "text/html";

/// Method of the chunk messages sent back to a session for foreground delivery.
pub const CONTENT_DOWNLOAD_METHOD: &str = "content.download";

/// Method of the filename prompt round trip.
pub const CONTENT_PROMPT_METHOD: &str = "content.prompt";

/// Text shown to the user when a remote destination reports a name collision.
pub const FILENAME_CONFLICT_PROMPT: &str = "Filename conflict, please enter a new filename";

/// Size of the chunks streamed back to a session (8 MiB).
pub const DEFAULT_STREAM_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Inbound method, identified by the suffix of the `method` field.
///
/// Sessions namespace their methods (`downloads.download`,
/// `downloads.cancel`, ...); only the last segment is significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Method {
    Download,
    DisableGDrive,
    End,
    GetInfo,
    Cancel,
    CancelAll,
    SaveUrls,
}

impl Method {
    const SUFFIXES: [(&'static str, Method); 7] = [
        (".download", Method::Download),
        (".disableGDrive", Method::DisableGDrive),
        (".end", Method::End),
        (".getInfo", Method::GetInfo),
        (".cancel", Method::Cancel),
        (".cancelAll", Method::CancelAll),
        (".saveUrls", Method::SaveUrls),
    ];

    /// Classifies a raw method name. Returns `None` for methods this layer
    /// does not handle.
    pub fn classify(method: &str) -> Option<Self> {
        Self::SUFFIXES
            .iter()
            .find(|(suffix, _)| method.ends_with(suffix))
            .map(|(_, m)| *m)
    }
}
