use std::fmt;

use pagedrop_auth::{AuthError, CredentialFailure};

/// Errors reported by destination clients and the local download contract.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The task was cancelled; never surfaced to the user.
    #[error("upload cancelled")]
    Cancelled,

    /// The backend rejected the access token.
    #[error("invalid_token")]
    InvalidCredential,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Backend(String),

    /// A failure the user can act on by following `link`.
    #[error("{message}")]
    WithLink { message: String, link: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Returns `true` for the silent outcomes: a cancelled task or a
    /// dismissed authorization page.
    pub fn is_cancelled(&self) -> bool {
        match self {
            UploadError::Cancelled => true,
            UploadError::Auth(e) => e.is_cancelled(),
            _ => false,
        }
    }

    pub fn link(&self) -> Option<&str> {
        match self {
            UploadError::WithLink { link, .. } => Some(link),
            _ => None,
        }
    }
}

impl CredentialFailure for UploadError {
    fn is_invalid_credential(&self) -> bool {
        matches!(self, UploadError::InvalidCredential)
    }
}

/// Remote destinations, named the way errors are tagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationKind {
    WebDav,
    TokenStore,
    Repository,
}

impl DestinationKind {
    pub fn label(self) -> &'static str {
        match self {
            DestinationKind::WebDav => "WebDAV",
            DestinationKind::TokenStore => "Google Drive",
            DestinationKind::Repository => "GitHub",
        }
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A failed dispatch.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A remote destination failed; displayed as `"<message> (<destination>)"`.
    #[error("{source} ({kind})")]
    Destination {
        kind: DestinationKind,
        #[source]
        source: UploadError,
    },

    /// Local download or companion handoff failure.
    #[error(transparent)]
    Local(UploadError),
}

impl DispatchError {
    pub fn link(&self) -> Option<&str> {
        match self {
            DispatchError::Destination { source, .. } | DispatchError::Local(source) => {
                source.link()
            }
        }
    }

    pub fn kind(&self) -> Option<DestinationKind> {
        match self {
            DispatchError::Destination { kind, .. } => Some(*kind),
            DispatchError::Local(_) => None,
        }
    }
}
