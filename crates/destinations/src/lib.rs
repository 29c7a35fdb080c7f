//! Destination contract and dispatch.
//!
//! Every remote backend implements [`RemoteDestination`]: one `upload` and
//! one `abort`. The [`Dispatcher`] picks exactly one destination per save,
//! wires the client's abort hook into the task registry and tags failures
//! with the destination name.

mod conflict;
mod dispatcher;
mod error;
mod local;

use std::fmt;
use std::sync::Arc;

use pagedrop_auth::Credential;
use pagedrop_protocol::{ConflictAction, RepositoryCredentials, WebDavCredentials};
use pagedrop_transfer::ProgressForwarder;

pub use conflict::{DownloadIndex, Resolution, escape_pattern, filename_pattern, resolve};
pub use dispatcher::{CompanionHandoff, DispatchOutcome, DispatchRequest, Dispatcher};
pub use error::{DestinationKind, DispatchError, UploadError};
pub use local::{DownloadRequest, Downloader, encode_sharp_character, file_url};
pub use pagedrop_auth::BoxFuture;

/// Content handed to a destination. Cheap to clone for retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadContent {
    Text(Arc<str>),
    Binary(Arc<[u8]>),
}

impl UploadContent {
    pub fn len(&self) -> usize {
        match self {
            UploadContent::Text(text) => text.len(),
            UploadContent::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            UploadContent::Text(text) => text.as_bytes(),
            UploadContent::Binary(bytes) => bytes,
        }
    }
}

impl From<String> for UploadContent {
    fn from(text: String) -> Self {
        UploadContent::Text(text.into())
    }
}

impl From<Vec<u8>> for UploadContent {
    fn from(bytes: Vec<u8>) -> Self {
        UploadContent::Binary(bytes.into())
    }
}

/// Asks the originating session for another filename. Resolves with
/// `None` when the user declines or the session is gone.
pub type PromptFn = Arc<dyn Fn(String) -> BoxFuture<'static, Option<String>> + Send + Sync>;

/// Per-upload options.
#[derive(Clone, Default)]
pub struct UploadOptions {
    pub conflict_action: ConflictAction,
    pub prompt: Option<PromptFn>,
    pub progress: Option<ProgressForwarder>,
}

impl fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOptions")
            .field("conflict_action", &self.conflict_action)
            .field("prompt", &self.prompt.is_some())
            .field("progress", &self.progress)
            .finish()
    }
}

/// Result of a successful upload.
#[derive(Default)]
pub struct UploadResponse {
    pub url: Option<String>,
    /// Work still running after `upload` returned (a repository push);
    /// the save is complete only once it resolves.
    pub push: Option<BoxFuture<'static, Result<(), UploadError>>>,
}

impl UploadResponse {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            push: None,
        }
    }
}

/// A remote storage backend.
pub trait RemoteDestination: Send + Sync {
    fn upload<'a>(
        &'a self,
        filename: &'a str,
        content: UploadContent,
        options: UploadOptions,
    ) -> BoxFuture<'a, Result<UploadResponse, UploadError>>;

    /// Interrupts the current network operation.
    fn abort(&self);
}

/// Constructs remote clients from connection parameters.
pub trait DestinationFactory: Send + Sync {
    fn web_dav(
        &self,
        credentials: &WebDavCredentials,
    ) -> Result<Arc<dyn RemoteDestination>, UploadError>;

    fn token_store(&self, credential: &Credential)
    -> Result<Arc<dyn RemoteDestination>, UploadError>;

    fn repository(
        &self,
        credentials: &RepositoryCredentials,
    ) -> Result<Arc<dyn RemoteDestination>, UploadError>;
}
