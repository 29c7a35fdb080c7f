//! Filesystem-backed local downloads.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use pagedrop_coordinator::BlobStore;
use pagedrop_destinations::{BoxFuture, DownloadIndex, DownloadRequest, Downloader, UploadError};
use pagedrop_protocol::ConflictAction;
use pagedrop_transfer::sanitize_filename;
use regex::Regex;
use tracing::debug;

/// Writes downloads below a root directory and remembers what it wrote.
pub struct LocalDownloads {
    root: PathBuf,
    blobs: Arc<dyn BlobStore>,
    completed: Mutex<Vec<PathBuf>>,
    /// Held while a target name is chosen and written.
    writing: tokio::sync::Mutex<()>,
}

impl LocalDownloads {
    pub fn new(root: PathBuf, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            root,
            blobs,
            completed: Mutex::new(Vec::new()),
            writing: tokio::sync::Mutex::new(()),
        }
    }

    async fn save(&self, request: DownloadRequest) -> Result<Option<String>, UploadError> {
        let name = sanitize_filename(&request.filename, &request.replacement_character)
            .map_err(|e| UploadError::Backend(e.to_string()))?;
        let bytes = self.blobs.fetch(&request.url).await?;

        let target = self.root.join(&name);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let _writing = self.writing.lock().await;
        // No UI here: prompt and save-as behave like uniquify.
        let path = match request.conflict_action {
            ConflictAction::Overwrite => target,
            _ => unique_path(&target).await?,
        };
        tokio::fs::write(&path, &bytes).await?;
        debug!(path = %path.display(), size = bytes.len(), "download written");

        let resolved = path.to_string_lossy().into_owned();
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path);
        Ok(Some(resolved))
    }
}

impl Downloader for LocalDownloads {
    fn download(
        &self,
        request: DownloadRequest,
    ) -> BoxFuture<'_, Result<Option<String>, UploadError>> {
        Box::pin(self.save(request))
    }
}

impl DownloadIndex for LocalDownloads {
    fn any_matching<'a>(&'a self, pattern: &'a str) -> BoxFuture<'a, Result<bool, UploadError>> {
        Box::pin(async move {
            let regex = Regex::new(pattern)
                .map_err(|e| UploadError::Backend(format!("invalid filename pattern: {e}")))?;
            let completed = self
                .completed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for path in completed {
                if regex.is_match(&path.to_string_lossy()) && tokio::fs::try_exists(&path).await? {
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }
}

/// First of `name.ext`, `name (1).ext`, `name (2).ext`, ... that does not
/// exist yet.
async fn unique_path(target: &Path) -> std::io::Result<PathBuf> {
    if !tokio::fs::try_exists(target).await? {
        return Ok(target.to_path_buf());
    }
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let mut n = 1u32;
    loop {
        let candidate = target.with_file_name(format!("{stem} ({n}){extension}"));
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}
