//! Shared mocks for the coordinator scenario tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pagedrop_auth::{
    AuthError, AuthorizationBackend, Credential, CredentialStore, MemoryCredentialStore,
    OAuthClientConfig, TokenManager, WebAuthLauncher,
};
use pagedrop_coordinator::{
    BatchSaver, BlobStore, Bookmarks, Collaborators, CompressRequest, Coordinator,
    CoordinatorConfig, Editor, EditorRequest, MemoryBlobStore, Notarizer, Outbound,
    PageCompressor, SessionEvent, SessionHandle, Viewer, ViewerRequest,
};
use pagedrop_destinations::{
    BoxFuture, CompanionHandoff, DestinationFactory, Dispatcher, DownloadIndex, DownloadRequest,
    Downloader, RemoteDestination, UploadContent, UploadError, UploadOptions, UploadResponse,
};
use pagedrop_protocol::{
    ConflictAction, RepositoryCredentials, SessionMessage, SessionNotification,
    WebDavCredentials,
};
use pagedrop_tasks::TaskRegistry;
use regex::Regex;
use tokio::sync::mpsc;

pub type Hook = Box<dyn Fn() + Send + Sync>;

// ---------------------------------------------------------------------------
// Destinations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub filename: String,
    pub content: Vec<u8>,
    pub conflict_action: ConflictAction,
}

#[derive(Default)]
pub struct MockClient {
    pub uploads: Mutex<Vec<Upload>>,
    pub results: Mutex<VecDeque<Result<UploadResponse, UploadError>>>,
    pub aborts: AtomicUsize,
    pub during_upload: Mutex<Option<Hook>>,
}

impl MockClient {
    pub fn push(&self, result: Result<UploadResponse, UploadError>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }
}

impl RemoteDestination for MockClient {
    fn upload<'a>(
        &'a self,
        filename: &'a str,
        content: UploadContent,
        options: UploadOptions,
    ) -> BoxFuture<'a, Result<UploadResponse, UploadError>> {
        Box::pin(async move {
            self.uploads.lock().unwrap().push(Upload {
                filename: filename.to_string(),
                content: content.as_bytes().to_vec(),
                conflict_action: options.conflict_action,
            });
            if let Some(progress) = &options.progress {
                let size = content.len() as u64;
                for offset in [0, size / 3, size / 4, 2 * size / 3, size] {
                    progress.report(offset, size);
                }
            }
            if let Some(hook) = self.during_upload.lock().unwrap().as_ref() {
                hook();
            }
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(UploadResponse::with_url(
                        "https://remote.example.org/page.html",
                    ))
                })
        })
    }

    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockFactory {
    pub client: Arc<MockClient>,
    pub constructed: Mutex<Vec<String>>,
}

impl MockFactory {
    fn construct(&self, label: String) -> Result<Arc<dyn RemoteDestination>, UploadError> {
        self.constructed.lock().unwrap().push(label);
        Ok(Arc::clone(&self.client) as Arc<dyn RemoteDestination>)
    }

    pub fn constructed(&self) -> Vec<String> {
        self.constructed.lock().unwrap().clone()
    }
}

impl DestinationFactory for MockFactory {
    fn web_dav(
        &self,
        credentials: &WebDavCredentials,
    ) -> Result<Arc<dyn RemoteDestination>, UploadError> {
        self.construct(format!("webdav:{}", credentials.url))
    }

    fn token_store(
        &self,
        credential: &Credential,
    ) -> Result<Arc<dyn RemoteDestination>, UploadError> {
        self.construct(format!("token:{}", credential.access_token))
    }

    fn repository(
        &self,
        credentials: &RepositoryCredentials,
    ) -> Result<Arc<dyn RemoteDestination>, UploadError> {
        self.construct(format!("repo:{}", credentials.repository))
    }
}

/// Records download requests and "writes" into `/home/me/Downloads`.
#[derive(Default)]
pub struct MockDownloader {
    pub requests: Mutex<Vec<DownloadRequest>>,
    pub fail_with: Mutex<Option<String>>,
}

impl MockDownloader {
    pub fn requests(&self) -> Vec<DownloadRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Downloader for MockDownloader {
    fn download(
        &self,
        request: DownloadRequest,
    ) -> BoxFuture<'_, Result<Option<String>, UploadError>> {
        Box::pin(async move {
            let path = format!("/home/me/Downloads/{}", request.filename);
            self.requests.lock().unwrap().push(request);
            match self.fail_with.lock().unwrap().clone() {
                Some(message) => Err(UploadError::Backend(message)),
                None => Ok(Some(path)),
            }
        })
    }
}

#[derive(Default)]
pub struct MockCompanion {
    pub saved: Mutex<Vec<(String, Vec<u8>)>>,
}

impl CompanionHandoff for MockCompanion {
    fn save<'a>(
        &'a self,
        filename: &'a str,
        content: UploadContent,
        _conflict_action: ConflictAction,
    ) -> BoxFuture<'a, Result<(), UploadError>> {
        Box::pin(async move {
            self.saved
                .lock()
                .unwrap()
                .push((filename.to_string(), content.as_bytes().to_vec()));
            Ok(())
        })
    }
}

/// Download index backed by a list of full paths.
#[derive(Default)]
pub struct MockIndex {
    pub paths: Mutex<Vec<String>>,
    pub queries: Mutex<Vec<String>>,
}

impl MockIndex {
    pub fn add(&self, path: &str) {
        self.paths.lock().unwrap().push(path.to_string());
    }
}

impl DownloadIndex for MockIndex {
    fn any_matching<'a>(&'a self, pattern: &'a str) -> BoxFuture<'a, Result<bool, UploadError>> {
        Box::pin(async move {
            self.queries.lock().unwrap().push(pattern.to_string());
            let regex = Regex::new(pattern).map_err(|e| UploadError::Backend(e.to_string()))?;
            Ok(self.paths.lock().unwrap().iter().any(|p| regex.is_match(p)))
        })
    }
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockBackend {
    pub exchanges: AtomicUsize,
    pub revoked: Mutex<Vec<String>>,
}

impl AuthorizationBackend for MockBackend {
    fn exchange_code<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<Credential, AuthError>> {
        Box::pin(async move {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            Ok(Credential::new(format!("access-{code}")).with_refresh_token("refresh-1"))
        })
    }

    fn refresh<'a>(
        &'a self,
        _refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<Credential, AuthError>> {
        Box::pin(async { Ok(Credential::new("refreshed")) })
    }

    fn revoke<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async move {
            self.revoked.lock().unwrap().push(token.to_string());
            Ok(())
        })
    }
}

/// Completes the authorization page immediately with code `c1`.
pub struct EchoLauncher;

impl WebAuthLauncher for EchoLauncher {
    fn launch<'a>(
        &'a self,
        url: &'a url::Url,
        _force_web_flow: bool,
    ) -> BoxFuture<'a, Result<String, AuthError>> {
        Box::pin(async move {
            let state = url
                .query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default();
            Ok(format!("https://pagedrop.invalid/cb?code=c1&state={state}"))
        })
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Archival engine producing `ARCHIVE:<page url>` in a new handle.
pub struct MockCompressor {
    pub blobs: Arc<MemoryBlobStore>,
    pub requests: Mutex<Vec<CompressRequest>>,
}

impl PageCompressor for MockCompressor {
    fn compress(&self, request: CompressRequest) -> BoxFuture<'_, Result<String, UploadError>> {
        Box::pin(async move {
            let archive = format!("ARCHIVE:{}", request.url.clone().unwrap_or_default());
            self.requests.lock().unwrap().push(request);
            Ok(self.blobs.insert(archive.into_bytes()))
        })
    }
}

#[derive(Default)]
pub struct MockEditor {
    pub opened: Mutex<Vec<EditorRequest>>,
}

impl Editor for MockEditor {
    fn open(&self, request: EditorRequest) -> BoxFuture<'_, Result<(), UploadError>> {
        Box::pin(async move {
            self.opened.lock().unwrap().push(request);
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct MockBookmarks {
    pub updates: Mutex<Vec<(String, String)>>,
}

impl Bookmarks for MockBookmarks {
    fn update<'a>(
        &'a self,
        bookmark_id: &'a str,
        url: &'a str,
    ) -> BoxFuture<'a, Result<(), UploadError>> {
        Box::pin(async move {
            self.updates
                .lock()
                .unwrap()
                .push((bookmark_id.to_string(), url.to_string()));
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct MockViewer {
    pub opened: Mutex<Vec<ViewerRequest>>,
    pub fail: Mutex<bool>,
}

impl Viewer for MockViewer {
    fn open(&self, request: ViewerRequest) -> BoxFuture<'_, Result<(), UploadError>> {
        Box::pin(async move {
            self.opened.lock().unwrap().push(request);
            if *self.fail.lock().unwrap() {
                Err(UploadError::Backend("viewer unavailable".into()))
            } else {
                Ok(())
            }
        })
    }
}

#[derive(Default)]
pub struct MockNotarizer {
    pub anchored: Mutex<Vec<(String, Option<String>)>>,
    pub fail: Mutex<Option<UploadError>>,
}

impl Notarizer for MockNotarizer {
    fn anchor<'a>(
        &'a self,
        hash: &'a str,
        key: Option<&'a str>,
    ) -> BoxFuture<'a, Result<(), UploadError>> {
        Box::pin(async move {
            self.anchored
                .lock()
                .unwrap()
                .push((hash.to_string(), key.map(str::to_string)));
            match self.fail.lock().unwrap().take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }
}

#[derive(Default)]
pub struct MockBatch {
    pub batches: Mutex<Vec<Vec<String>>>,
}

impl BatchSaver for MockBatch {
    fn save_urls(&self, urls: Vec<String>) -> BoxFuture<'_, Result<(), UploadError>> {
        Box::pin(async move {
            self.batches.lock().unwrap().push(urls);
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub coordinator: Arc<Coordinator>,
    pub registry: Arc<TaskRegistry>,
    pub blobs: Arc<MemoryBlobStore>,
    pub factory: Arc<MockFactory>,
    pub downloader: Arc<MockDownloader>,
    pub companion: Arc<MockCompanion>,
    pub index: Arc<MockIndex>,
    pub compressor: Arc<MockCompressor>,
    pub editor: Arc<MockEditor>,
    pub bookmarks: Arc<MockBookmarks>,
    pub viewer: Arc<MockViewer>,
    pub notarizer: Arc<MockNotarizer>,
    pub batch: Arc<MockBatch>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub backend: Arc<MockBackend>,
    pub session: SessionHandle,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(CoordinatorConfig::default(), MemoryCredentialStore::new())
    }

    pub fn with(config: CoordinatorConfig, credentials: MemoryCredentialStore) -> Self {
        let registry = Arc::new(TaskRegistry::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let factory = Arc::new(MockFactory::default());
        let downloader = Arc::new(MockDownloader::default());
        let companion = Arc::new(MockCompanion::default());
        let index = Arc::new(MockIndex::default());
        let compressor = Arc::new(MockCompressor {
            blobs: Arc::clone(&blobs),
            requests: Mutex::new(Vec::new()),
        });
        let editor = Arc::new(MockEditor::default());
        let bookmarks = Arc::new(MockBookmarks::default());
        let viewer = Arc::new(MockViewer::default());
        let notarizer = Arc::new(MockNotarizer::default());
        let batch = Arc::new(MockBatch::default());
        let credentials = Arc::new(credentials);
        let backend = Arc::new(MockBackend::default());

        let tokens = Arc::new(TokenManager::new(
            OAuthClientConfig {
                client_id: "client".into(),
                auth_endpoint: "https://auth.example.org/auth".into(),
                redirect_url: "https://pagedrop.invalid/cb".into(),
                scopes: vec!["drive.file".into()],
            },
            Arc::clone(&credentials) as Arc<dyn CredentialStore>,
            Arc::clone(&backend) as Arc<dyn AuthorizationBackend>,
            Arc::new(EchoLauncher),
        ));
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&tokens),
            Arc::clone(&factory) as Arc<dyn DestinationFactory>,
            Arc::clone(&downloader) as Arc<dyn Downloader>,
            Arc::clone(&companion) as Arc<dyn CompanionHandoff>,
        );
        let collaborators = Collaborators {
            blobs: Arc::clone(&blobs) as Arc<dyn BlobStore>,
            downloads: Arc::clone(&index) as Arc<dyn DownloadIndex>,
            compressor: Arc::clone(&compressor) as Arc<dyn PageCompressor>,
            editor: Arc::clone(&editor) as Arc<dyn Editor>,
            bookmarks: Arc::clone(&bookmarks) as Arc<dyn Bookmarks>,
            viewer: Arc::clone(&viewer) as Arc<dyn Viewer>,
            notarizer: Arc::clone(&notarizer) as Arc<dyn Notarizer>,
            batch: Arc::clone(&batch) as Arc<dyn BatchSaver>,
        };
        let coordinator = Arc::new(Coordinator::new(
            Arc::clone(&registry),
            tokens,
            dispatcher,
            collaborators,
            config,
        ));

        let (tx, events) = mpsc::unbounded_channel();
        let mut session = SessionHandle::new(7, tx);
        session.tab_index = Some(2);
        session.url = Some("https://news.example.org/story".into());

        Self {
            coordinator,
            registry,
            blobs,
            factory,
            downloader,
            companion,
            index,
            compressor,
            editor,
            bookmarks,
            viewer,
            notarizer,
            batch,
            credentials,
            backend,
            session,
            events,
        }
    }

    pub fn client(&self) -> &MockClient {
        &self.factory.client
    }

    /// Drains the notifications sent so far. Prompts are declined.
    pub fn notifications(&mut self) -> Vec<SessionNotification> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            match event.outbound {
                Outbound::Notify(notification) => out.push(notification),
                Outbound::Prompt { reply, .. } => {
                    let _ = reply.send(None);
                }
            }
        }
        out
    }

    /// Only the `onEnd`/`onError` notifications.
    pub fn terminal(&mut self) -> Vec<SessionNotification> {
        self.notifications()
            .into_iter()
            .filter(SessionNotification::is_terminal)
            .collect()
    }
}

/// A complete, non-truncated save request.
pub fn page(task_id: u64, filename: &str, content: &str) -> SessionMessage {
    SessionMessage {
        method: "downloads.download".into(),
        content: Some(content.into()),
        filename: filename.into(),
        task_id: Some(task_id),
        ..Default::default()
    }
}

pub fn control(method: &str) -> SessionMessage {
    SessionMessage {
        method: format!("downloads.{method}"),
        ..Default::default()
    }
}
