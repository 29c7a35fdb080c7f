//! Credential management for the token-authenticated object store.
//!
//! [`TokenManager`] drives the `NoCredential -> Authorizing -> Authorized ->
//! (Refreshing | Revoked)` lifecycle on top of three seams: a
//! [`CredentialStore`] for persistence, an [`AuthorizationBackend`] for
//! the token endpoint and a [`WebAuthLauncher`] for the interactive page.

mod credential;
mod flow;
mod manager;

use std::future::Future;
use std::pin::Pin;

pub use credential::{Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use flow::{
    AuthorizationRequest, OAuthClientConfig, extract_auth_code, generate_state, validate_state,
};
pub use manager::{
    AuthState, AuthorizationBackend, CredentialFailure, TokenManager, WebAuthLauncher,
};

/// Boxed future returned by the async collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors from credential operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The user dismissed the authorization page.
    #[error("authorization cancelled")]
    Cancelled,

    /// The backend does not know the refresh token.
    #[error("unknown_token")]
    UnknownToken,

    #[error("authorization denied: {0}")]
    Denied(String),

    #[error("authorization state mismatch")]
    StateMismatch,

    #[error("authorization code missing from redirect")]
    MissingCode,

    #[error("{0}")]
    Backend(String),
}

impl AuthError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AuthError::Cancelled)
    }
}
