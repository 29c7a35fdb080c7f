use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::AuthError;

/// Tokens for the token-authenticated store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Token to revoke when `access_token` is not revocable itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revokable_access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            revokable_access_token: None,
            expires_at: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Returns `true` if the access token can be used as of `now`.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && self.expires_at.is_none_or(|expiry| expiry > now)
    }

    /// The token to send to the revocation endpoint.
    pub fn revocation_token(&self) -> Option<&str> {
        if !self.access_token.is_empty() {
            Some(&self.access_token)
        } else {
            self.revokable_access_token
                .as_deref()
                .filter(|token| !token.is_empty())
        }
    }
}

/// Process-wide persistence for the single credential set.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Option<Credential>;
    fn set(&self, credential: &Credential) -> Result<(), AuthError>;
    fn remove(&self) -> Result<(), AuthError>;
}

/// Credential store backed by a JSON file, cached in memory.
pub struct FileCredentialStore {
    path: PathBuf,
    cached: RwLock<Option<Credential>>,
}

impl FileCredentialStore {
    /// Creates a store, loading an existing credential from disk.
    pub fn new(path: PathBuf) -> Result<Self, AuthError> {
        let cached = load_credential(&path)?;
        Ok(Self {
            path,
            cached: RwLock::new(cached),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), AuthError> {
        let cached = self.cached.read().unwrap_or_else(PoisonError::into_inner);
        match &*cached {
            Some(credential) => {
                let json = serde_json::to_string_pretty(credential)?;
                if let Some(parent) = self.path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&self.path, json)?;
                debug!("persisted credential to {:?}", self.path);
            }
            None => match std::fs::remove_file(&self.path) {
                Ok(()) => debug!("removed credential file {:?}", self.path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Option<Credential> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, credential: &Credential) -> Result<(), AuthError> {
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
        self.persist()
    }

    fn remove(&self) -> Result<(), AuthError> {
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.persist()
    }
}

fn load_credential(path: &Path) -> Result<Option<Credential>, AuthError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let credential: Credential = serde_json::from_str(&data)?;
    debug!("loaded credential from {:?}", path);
    Ok(Some(credential))
}

/// Non-persistent store, for tests and ephemeral hosts.
#[derive(Default)]
pub struct MemoryCredentialStore {
    cached: RwLock<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            cached: RwLock::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Option<Credential> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, credential: &Credential) -> Result<(), AuthError> {
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
        Ok(())
    }

    fn remove(&self) -> Result<(), AuthError> {
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
