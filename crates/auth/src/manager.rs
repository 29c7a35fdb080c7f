use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use crate::credential::{Credential, CredentialStore};
use crate::flow::{OAuthClientConfig, extract_auth_code};
use crate::{AuthError, BoxFuture};

/// Token endpoint of the object store.
pub trait AuthorizationBackend: Send + Sync {
    /// Exchanges an authorization code for a credential.
    fn exchange_code<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<Credential, AuthError>>;

    /// Obtains a new access token. Fails with [`AuthError::UnknownToken`]
    /// when the refresh token is not recognized.
    fn refresh<'a>(&'a self, refresh_token: &'a str)
    -> BoxFuture<'a, Result<Credential, AuthError>>;

    fn revoke<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<(), AuthError>>;
}

/// Opens the interactive authorization page.
pub trait WebAuthLauncher: Send + Sync {
    /// Resolves with the URL the page redirected to. A dismissed page
    /// resolves with [`AuthError::Cancelled`].
    fn launch<'a>(
        &'a self,
        url: &'a Url,
        force_web_flow: bool,
    ) -> BoxFuture<'a, Result<String, AuthError>>;
}

/// Errors that may mean "the access token was rejected".
pub trait CredentialFailure {
    fn is_invalid_credential(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NoCredential,
    Authorizing,
    Authorized,
    Refreshing,
    Revoked,
}

/// Owns the cached credential of the token-authenticated store.
pub struct TokenManager {
    config: OAuthClientConfig,
    store: Arc<dyn CredentialStore>,
    backend: Arc<dyn AuthorizationBackend>,
    launcher: Arc<dyn WebAuthLauncher>,
    state: Mutex<AuthState>,
}

impl TokenManager {
    pub fn new(
        config: OAuthClientConfig,
        store: Arc<dyn CredentialStore>,
        backend: Arc<dyn AuthorizationBackend>,
        launcher: Arc<dyn WebAuthLauncher>,
    ) -> Self {
        let state = match store.get() {
            Some(credential) if credential.is_usable(Utc::now()) => AuthState::Authorized,
            _ => AuthState::NoCredential,
        };
        Self {
            config,
            store,
            backend,
            launcher,
            state: Mutex::new(state),
        }
    }

    pub fn state(&self) -> AuthState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: AuthState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// The stored credential, usable or not.
    pub fn cached(&self) -> Option<Credential> {
        self.store.get()
    }

    /// Returns a usable credential, running the interactive flow when none
    /// is cached or when `force` is set. An expired credential with a
    /// refresh token is refreshed silently first; only an unknown refresh
    /// token falls through to the interactive flow.
    ///
    /// The outcome is persisted: the new credential on success, no
    /// credential on failure.
    pub async fn acquire(
        &self,
        force_web_flow: bool,
        force: bool,
    ) -> Result<Credential, AuthError> {
        if !force && let Some(credential) = self.store.get() {
            if credential.is_usable(Utc::now()) {
                return Ok(credential);
            }
            if credential.refresh_token.is_some() {
                match self.refresh().await {
                    Err(AuthError::UnknownToken) => {
                        debug!("refresh token unknown, re-authorizing");
                    }
                    result => return result,
                }
            }
        }

        self.set_state(AuthState::Authorizing);
        match self.authorize(force_web_flow).await {
            Ok(credential) => {
                self.store.set(&credential)?;
                self.set_state(AuthState::Authorized);
                info!("token store authorized");
                Ok(credential)
            }
            Err(e) => {
                if let Err(remove_err) = self.store.remove() {
                    warn!(error = %remove_err, "failed to clear stored credential");
                }
                self.set_state(AuthState::NoCredential);
                if !e.is_cancelled() {
                    debug!(error = %e, "authorization failed");
                }
                Err(e)
            }
        }
    }

    async fn authorize(&self, force_web_flow: bool) -> Result<Credential, AuthError> {
        let request = self.config.authorization_request()?;
        let redirect = self.launcher.launch(&request.url, force_web_flow).await?;
        let code = extract_auth_code(&redirect, &request.state)?;
        self.backend.exchange_code(&code).await
    }

    /// Exchanges the cached refresh token for a new credential and persists it.
    pub async fn refresh(&self) -> Result<Credential, AuthError> {
        let Some(refresh_token) = self.store.get().and_then(|c| c.refresh_token) else {
            return Err(AuthError::UnknownToken);
        };

        self.set_state(AuthState::Refreshing);
        match self.backend.refresh(&refresh_token).await {
            Ok(mut credential) => {
                if credential.refresh_token.is_none() {
                    credential.refresh_token = Some(refresh_token);
                }
                self.store.set(&credential)?;
                self.set_state(AuthState::Authorized);
                debug!("access token refreshed");
                Ok(credential)
            }
            Err(e) => {
                self.set_state(AuthState::NoCredential);
                Err(e)
            }
        }
    }

    /// Recovers from a rejected access token: one silent refresh, falling
    /// back to forced interactive authorization when the refresh token is
    /// unknown.
    pub async fn recover(&self, force_web_flow: bool) -> Result<Credential, AuthError> {
        match self.refresh().await {
            Err(AuthError::UnknownToken) => {
                debug!("refresh token unknown, re-authorizing");
                self.acquire(force_web_flow, true).await
            }
            result => result,
        }
    }

    /// Forgets the credential locally, then revokes it remotely.
    ///
    /// Remote revocation is best effort; its failure is logged and does not
    /// affect the result.
    pub async fn revoke(&self) -> Result<(), AuthError> {
        let credential = self.store.get();
        let removed = self.store.remove();
        self.set_state(AuthState::Revoked);

        if let Some(token) = credential.as_ref().and_then(Credential::revocation_token) {
            match self.backend.revoke(token).await {
                Ok(()) => info!("token store credential revoked"),
                Err(e) => warn!(error = %e, "remote credential revocation failed"),
            }
        }
        removed
    }

    /// Runs `op` with a usable credential. If `op` fails with a rejected
    /// credential, recovers once and retries once; a second rejection is
    /// returned to the caller.
    pub async fn run_with_refresh<T, E, F, Fut>(
        &self,
        force_web_flow: bool,
        mut op: F,
    ) -> Result<T, E>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<AuthError> + CredentialFailure,
    {
        let mut credential = self.acquire(force_web_flow, false).await?;
        let mut retried = false;
        loop {
            match op(credential).await {
                Err(e) if !retried && e.is_invalid_credential() => {
                    debug!("credential rejected, refreshing once");
                    retried = true;
                    credential = self.recover(force_web_flow).await?;
                }
                result => return result,
            }
        }
    }
}
