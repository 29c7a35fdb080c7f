use std::sync::Arc;

use pagedrop_auth::{FileCredentialStore, TokenManager};
use pagedrop_coordinator::{BlobStore, Collaborators, Coordinator, MemoryBlobStore};
use pagedrop_destinations::Dispatcher;
use pagedrop_tasks::TaskRegistry;

use crate::config::HostConfig;
use crate::local_fs::LocalDownloads;
use crate::unavailable::Unavailable;

/// Wires the coordinator with the facilities this host provides: in-memory
/// blob handles, filesystem downloads and a file-backed credential store.
pub fn build_coordinator(config: &HostConfig) -> anyhow::Result<Arc<Coordinator>> {
    let registry = Arc::new(TaskRegistry::new());
    let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let downloads = Arc::new(LocalDownloads::new(
        config.download_dir.clone(),
        Arc::clone(&blobs),
    ));

    let credentials = FileCredentialStore::new(config.credentials_path.clone())?;
    let tokens = Arc::new(TokenManager::new(
        config.oauth_client(),
        Arc::new(credentials),
        Arc::new(Unavailable),
        Arc::new(Unavailable),
    ));

    let dispatcher = Dispatcher::new(
        Arc::clone(&registry),
        Arc::clone(&tokens),
        Arc::new(Unavailable),
        downloads.clone(),
        Arc::new(Unavailable),
    );
    let collaborators = Collaborators {
        blobs,
        downloads,
        compressor: Arc::new(Unavailable),
        editor: Arc::new(Unavailable),
        bookmarks: Arc::new(Unavailable),
        viewer: Arc::new(Unavailable),
        notarizer: Arc::new(Unavailable),
        batch: Arc::new(Unavailable),
    };

    tracing::info!(
        download_dir = %config.download_dir.display(),
        credentials = %config.credentials_path.display(),
        "coordinator ready"
    );
    Ok(Arc::new(Coordinator::new(
        registry,
        tokens,
        dispatcher,
        collaborators,
        config.coordinator_config(),
    )))
}
