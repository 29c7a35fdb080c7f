//! Ephemeral binary-object handles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use pagedrop_destinations::{BoxFuture, UploadError};
use tracing::{debug, warn};

/// Host facility that maps handle URLs to bytes.
pub trait BlobStore: Send + Sync {
    fn create<'a>(
        &'a self,
        content: Vec<u8>,
        mime_type: &'a str,
    ) -> BoxFuture<'a, Result<String, UploadError>>;

    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, UploadError>>;

    fn release<'a>(&'a self, url: &'a str) -> BoxFuture<'a, ()>;
}

/// Scoped ownership of one handle.
///
/// The handle is released exactly once: by [`release`](Self::release), or
/// on drop if the lease is still armed. [`disarm`](Self::disarm) hands the
/// handle to another owner without releasing it.
pub struct BlobLease {
    store: Arc<dyn BlobStore>,
    url: String,
    armed: bool,
}

impl BlobLease {
    pub fn new(store: Arc<dyn BlobStore>, url: String) -> Self {
        Self {
            store,
            url,
            armed: true,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn release(mut self) {
        self.armed = false;
        self.store.release(&self.url).await;
    }

    /// Gives up ownership; the caller is now responsible for the handle.
    pub fn disarm(mut self) -> String {
        self.armed = false;
        std::mem::take(&mut self.url)
    }
}

impl Drop for BlobLease {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let store = Arc::clone(&self.store);
        let url = std::mem::take(&mut self.url);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { store.release(&url).await });
            }
            Err(_) => warn!(url = %url, "blob handle dropped outside a runtime, not released"),
        }
    }
}

impl std::fmt::Debug for BlobLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobLease")
            .field("url", &self.url)
            .field("armed", &self.armed)
            .finish()
    }
}

/// In-process blob store with `blob:pagedrop/<uuid>` handles.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    released: Mutex<Vec<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `content` and returns its handle.
    pub fn insert(&self, content: Vec<u8>) -> String {
        let url = format!("blob:pagedrop/{}", uuid::Uuid::new_v4());
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.clone(), content);
        url
    }

    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    /// Handles released so far, in order.
    pub fn released(&self) -> Vec<String> {
        self.released
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn live_count(&self) -> usize {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl BlobStore for MemoryBlobStore {
    fn create<'a>(
        &'a self,
        content: Vec<u8>,
        _mime_type: &'a str,
    ) -> BoxFuture<'a, Result<String, UploadError>> {
        Box::pin(async move { Ok(self.insert(content)) })
    }

    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, UploadError>> {
        Box::pin(async move {
            self.get(url)
                .ok_or_else(|| UploadError::Backend(format!("unknown blob handle {url}")))
        })
    }

    fn release<'a>(&'a self, url: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let existed = self
                .blobs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(url)
                .is_some();
            debug!(url, existed, "blob handle released");
            self.released
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(url.to_string());
        })
    }
}
