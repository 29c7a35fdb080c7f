//! External collaborators driven by the coordinator.

use std::sync::Arc;

use pagedrop_destinations::{BoxFuture, DownloadIndex, UploadContent, UploadError};
use pagedrop_protocol::{CompressionOptions, SessionId};

use crate::blob::BlobStore;

/// Input of the archival engine.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressRequest {
    pub session: SessionId,
    /// URL of the saved page.
    pub url: Option<String>,
    pub page_data: serde_json::Value,
    pub options: CompressionOptions,
}

/// Archival engine turning captured page data into a self-contained archive.
pub trait PageCompressor: Send + Sync {
    /// Resolves with a new blob handle holding the archive.
    fn compress(&self, request: CompressRequest) -> BoxFuture<'_, Result<String, UploadError>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditorRequest {
    /// Tab position to open the editor at.
    pub tab_index: Option<u32>,
    pub filename: String,
    pub content: UploadContent,
    /// Set for archives, with the flags they were built with.
    pub compression: Option<CompressionOptions>,
}

/// In-browser page editor.
pub trait Editor: Send + Sync {
    fn open(&self, request: EditorRequest) -> BoxFuture<'_, Result<(), UploadError>>;
}

/// Bookmark storage.
pub trait Bookmarks: Send + Sync {
    fn update<'a>(
        &'a self,
        bookmark_id: &'a str,
        url: &'a str,
    ) -> BoxFuture<'a, Result<(), UploadError>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerRequest {
    pub blob_url: String,
    pub compressed: bool,
    pub tab_index: Option<u32>,
}

/// Viewer for a freshly saved page. Once `open` succeeds the viewer owns
/// the handle and releases it when done.
pub trait Viewer: Send + Sync {
    fn open(&self, request: ViewerRequest) -> BoxFuture<'_, Result<(), UploadError>>;
}

/// Proof-of-existence anchoring service.
pub trait Notarizer: Send + Sync {
    fn anchor<'a>(
        &'a self,
        hash: &'a str,
        key: Option<&'a str>,
    ) -> BoxFuture<'a, Result<(), UploadError>>;
}

/// Saves a list of URLs in the background.
pub trait BatchSaver: Send + Sync {
    fn save_urls(&self, urls: Vec<String>) -> BoxFuture<'_, Result<(), UploadError>>;
}

/// Everything outside this layer the coordinator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub blobs: Arc<dyn BlobStore>,
    pub downloads: Arc<dyn DownloadIndex>,
    pub compressor: Arc<dyn PageCompressor>,
    pub editor: Arc<dyn Editor>,
    pub bookmarks: Arc<dyn Bookmarks>,
    pub viewer: Arc<dyn Viewer>,
    pub notarizer: Arc<dyn Notarizer>,
    pub batch: Arc<dyn BatchSaver>,
}
