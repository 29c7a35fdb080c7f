//! Stand-ins for collaborators this host does not provide.
//!
//! Each operation fails with a message naming the missing facility, so a
//! save routed to it ends with `onError` instead of hanging.

use std::sync::Arc;

use pagedrop_auth::{AuthError, AuthorizationBackend, Credential, WebAuthLauncher};
use pagedrop_coordinator::{
    BatchSaver, Bookmarks, CompressRequest, Editor, EditorRequest, Notarizer, PageCompressor,
    Viewer, ViewerRequest,
};
use pagedrop_destinations::{
    BoxFuture, CompanionHandoff, DestinationFactory, RemoteDestination, UploadContent,
    UploadError,
};
use pagedrop_protocol::{ConflictAction, RepositoryCredentials, WebDavCredentials};
use url::Url;

#[derive(Debug, Clone, Copy)]
pub struct Unavailable;

fn missing(facility: &str) -> UploadError {
    UploadError::Backend(format!("{facility} is not available in this host"))
}

fn ready<'a, T: Send + 'a>(result: T) -> BoxFuture<'a, T> {
    Box::pin(async move { result })
}

impl PageCompressor for Unavailable {
    fn compress(&self, _request: CompressRequest) -> BoxFuture<'_, Result<String, UploadError>> {
        ready(Err(missing("page compression")))
    }
}

impl Editor for Unavailable {
    fn open(&self, _request: EditorRequest) -> BoxFuture<'_, Result<(), UploadError>> {
        ready(Err(missing("the page editor")))
    }
}

impl Bookmarks for Unavailable {
    fn update<'a>(
        &'a self,
        _bookmark_id: &'a str,
        _url: &'a str,
    ) -> BoxFuture<'a, Result<(), UploadError>> {
        ready(Err(missing("bookmark storage")))
    }
}

impl Viewer for Unavailable {
    fn open(&self, _request: ViewerRequest) -> BoxFuture<'_, Result<(), UploadError>> {
        ready(Err(missing("the page viewer")))
    }
}

impl Notarizer for Unavailable {
    fn anchor<'a>(
        &'a self,
        _hash: &'a str,
        _key: Option<&'a str>,
    ) -> BoxFuture<'a, Result<(), UploadError>> {
        ready(Err(missing("notarization")))
    }
}

impl BatchSaver for Unavailable {
    fn save_urls(&self, _urls: Vec<String>) -> BoxFuture<'_, Result<(), UploadError>> {
        ready(Err(missing("batch saving")))
    }
}

impl CompanionHandoff for Unavailable {
    fn save<'a>(
        &'a self,
        _filename: &'a str,
        _content: UploadContent,
        _conflict_action: ConflictAction,
    ) -> BoxFuture<'a, Result<(), UploadError>> {
        ready(Err(missing("the companion process")))
    }
}

impl DestinationFactory for Unavailable {
    fn web_dav(
        &self,
        _credentials: &WebDavCredentials,
    ) -> Result<Arc<dyn RemoteDestination>, UploadError> {
        Err(missing("the WebDAV client"))
    }

    fn token_store(
        &self,
        _credential: &Credential,
    ) -> Result<Arc<dyn RemoteDestination>, UploadError> {
        Err(missing("the token store client"))
    }

    fn repository(
        &self,
        _credentials: &RepositoryCredentials,
    ) -> Result<Arc<dyn RemoteDestination>, UploadError> {
        Err(missing("the repository client"))
    }
}

fn no_token_endpoint() -> AuthError {
    AuthError::Backend("token endpoint is not available in this host".into())
}

impl AuthorizationBackend for Unavailable {
    fn exchange_code<'a>(&'a self, _code: &'a str) -> BoxFuture<'a, Result<Credential, AuthError>> {
        ready(Err(no_token_endpoint()))
    }

    fn refresh<'a>(
        &'a self,
        _refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<Credential, AuthError>> {
        ready(Err(no_token_endpoint()))
    }

    fn revoke<'a>(&'a self, _token: &'a str) -> BoxFuture<'a, Result<(), AuthError>> {
        ready(Err(no_token_endpoint()))
    }
}

impl WebAuthLauncher for Unavailable {
    fn launch<'a>(
        &'a self,
        _url: &'a Url,
        _force_web_flow: bool,
    ) -> BoxFuture<'a, Result<String, AuthError>> {
        ready(Err(AuthError::Backend(
            "interactive authorization is not available in this host".into(),
        )))
    }
}
