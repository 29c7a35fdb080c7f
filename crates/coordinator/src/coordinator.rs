use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use pagedrop_auth::TokenManager;
use pagedrop_destinations::{
    DispatchOutcome, DispatchRequest, Dispatcher, UploadContent, resolve,
};
use pagedrop_protocol::constants::{DEFAULT_STREAM_CHUNK_SIZE, MIMETYPE_HTML};
use pagedrop_protocol::{
    ConflictAction, DestinationSelector, MessageResponse, Method, SessionId, SessionMessage,
    SessionNotification, TaskId,
};
use pagedrop_stream_codec::{StreamEncoder, Value, decode};
use pagedrop_tasks::TaskRegistry;
use pagedrop_transfer::{DEFAULT_REPLACEMENT_CHARACTER, Fragment, Ingest, Reassembled, Reassembler};
use tracing::{debug, error, info, warn};

use crate::CoordinatorError;
use crate::blob::BlobLease;
use crate::collaborators::{Collaborators, CompressRequest, EditorRequest, ViewerRequest};
use crate::session::SessionHandle;

/// First id handed to saves whose session did not supply one.
const SYNTHETIC_TASK_BASE: TaskId = 1 << 53;

/// Tunables of the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Size of the chunks streamed back to a session.
    pub chunk_size: usize,
    /// Replacement for reserved filename characters when the session
    /// does not specify one.
    pub replacement_character: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_STREAM_CHUNK_SIZE,
            replacement_character: DEFAULT_REPLACEMENT_CHARACTER.to_string(),
        }
    }
}

/// Outcome of routing one inbound message.
#[derive(Debug)]
pub enum Routed {
    /// Handled synchronously; reply right away.
    Ready(MessageResponse),
    /// Needs async work; run it with [`Coordinator::complete`].
    Pending(PendingWork),
}

/// Async work produced by [`Coordinator::route`].
pub struct PendingWork {
    session: SessionHandle,
    job: Job,
    _claim: Option<SessionClaim>,
}

impl PendingWork {
    pub fn session(&self) -> SessionId {
        self.session.id
    }
}

impl std::fmt::Debug for PendingWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingWork")
            .field("session", &self.session.id)
            .field("job", &self.job.name())
            .finish()
    }
}

enum Job {
    Save {
        message: Box<SessionMessage>,
        content: UploadContent,
    },
    Archive {
        message: Box<SessionMessage>,
    },
    Blob {
        message: Box<SessionMessage>,
        blob_url: String,
    },
    End {
        hash: Option<String>,
        key: Option<String>,
        task: Option<TaskId>,
    },
    DisableTokenStore,
    SaveUrls(Vec<String>),
}

impl Job {
    fn name(&self) -> &'static str {
        match self {
            Job::Save { .. } => "save",
            Job::Archive { .. } => "archive",
            Job::Blob { .. } => "blob",
            Job::End { .. } => "end",
            Job::DisableTokenStore => "disableTokenStore",
            Job::SaveUrls(_) => "saveUrls",
        }
    }

    fn is_save(&self) -> bool {
        matches!(self, Job::Save { .. } | Job::Archive { .. } | Job::Blob { .. })
    }
}

/// Marks a session as having a save in flight; released on drop.
struct SessionClaim {
    sessions: Arc<Mutex<HashSet<SessionId>>>,
    session: SessionId,
}

impl Drop for SessionClaim {
    fn drop(&mut self) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.session);
    }
}

/// Payload read from a session-created handle.
enum BlobPayload {
    Text(String),
    PageData(serde_json::Value),
}

/// Terminal state of a save that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SaveOutcome {
    Completed { url: Option<String> },
    Skipped,
    Cancelled,
}

impl From<DispatchOutcome> for SaveOutcome {
    fn from(outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Completed { url } => SaveOutcome::Completed { url },
            DispatchOutcome::Cancelled => SaveOutcome::Cancelled,
        }
    }
}

/// Entry point for session messages.
///
/// Every save ends with exactly one `onEnd` or `onError` to its session,
/// and every blob handle the coordinator creates is released exactly once
/// unless the viewer takes it over.
pub struct Coordinator {
    registry: Arc<TaskRegistry>,
    tokens: Arc<TokenManager>,
    dispatcher: Dispatcher,
    collaborators: Collaborators,
    config: CoordinatorConfig,
    reassembler: Mutex<Reassembler>,
    in_flight: Arc<Mutex<HashSet<SessionId>>>,
    next_task: AtomicU64,
}

impl Coordinator {
    pub fn new(
        registry: Arc<TaskRegistry>,
        tokens: Arc<TokenManager>,
        dispatcher: Dispatcher,
        collaborators: Collaborators,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            tokens,
            dispatcher,
            collaborators,
            config,
            reassembler: Mutex::new(Reassembler::new()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            next_task: AtomicU64::new(SYNTHETIC_TASK_BASE),
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Routes and, when needed, completes one message.
    pub async fn handle_message(
        &self,
        message: SessionMessage,
        session: &SessionHandle,
    ) -> MessageResponse {
        match self.route(message, session) {
            Routed::Ready(response) => response,
            Routed::Pending(work) => self.complete(work).await,
        }
    }

    /// Handles everything that does not need to suspend: control messages
    /// and fragment ingestion.
    ///
    /// Messages of one session must be routed in arrival order; the
    /// returned work may then run concurrently with later messages.
    pub fn route(&self, mut message: SessionMessage, session: &SessionHandle) -> Routed {
        let Some(method) = Method::classify(&message.method) else {
            debug!(session = session.id, method = %message.method, "ignoring unknown method");
            return Routed::Ready(MessageResponse::Empty);
        };

        let job = match method {
            Method::GetInfo => {
                return Routed::Ready(MessageResponse::Tasks(self.registry.tasks_info()));
            }
            Method::Cancel => {
                if let Some(task) = message.task_id {
                    self.registry.cancel(task);
                }
                return Routed::Ready(MessageResponse::Empty);
            }
            Method::CancelAll => {
                self.registry.cancel_all();
                return Routed::Ready(MessageResponse::Empty);
            }
            Method::End => Job::End {
                hash: message.hash.take(),
                key: message.woleet_key.take(),
                task: message.task_id,
            },
            Method::DisableGDrive => Job::DisableTokenStore,
            Method::SaveUrls => Job::SaveUrls(std::mem::take(&mut message.urls)),
            Method::Download => match self.route_download(message, session) {
                Ok(Some(job)) => job,
                Ok(None) => return Routed::Ready(MessageResponse::Empty),
                Err(e) => {
                    warn!(session = session.id, error = %e, "cannot assemble payload");
                    session.notify(SessionNotification::Error {
                        message: e.to_string(),
                        link: None,
                    });
                    return Routed::Ready(MessageResponse::Failed);
                }
            },
        };

        let claim = if job.is_save() {
            let Some(claim) = self.claim(session.id) else {
                warn!(session = session.id, "save already in progress, payload rejected");
                session.notify(SessionNotification::Error {
                    message: "a save is already in progress for this page".into(),
                    link: None,
                });
                return Routed::Ready(MessageResponse::Failed);
            };
            Some(claim)
        } else {
            None
        };

        Routed::Pending(PendingWork {
            session: session.clone(),
            job,
            _claim: claim,
        })
    }

    /// Runs the work returned by [`route`](Self::route).
    pub async fn complete(&self, work: PendingWork) -> MessageResponse {
        let session = &work.session;
        match &work.job {
            Job::Save { message, content } => self.save(message, content.clone(), session).await,
            Job::Archive { message } => self.save_archive(message, session).await,
            Job::Blob { message, blob_url } => {
                self.save_from_blob(message, blob_url.clone(), session).await
            }
            Job::End { hash, key, task } => {
                self.end(hash.as_deref(), key.as_deref(), *task, session)
                    .await
            }
            Job::DisableTokenStore => {
                if let Err(e) = self.tokens.revoke().await {
                    warn!(error = %e, "failed to remove token store credential");
                }
                MessageResponse::Empty
            }
            Job::SaveUrls(urls) => {
                if let Err(e) = self.collaborators.batch.save_urls(urls.clone()).await {
                    warn!(count = urls.len(), error = %e, "batch save failed");
                }
                MessageResponse::Empty
            }
        }
    }

    /// Drops any partial payload of a session that went away.
    pub fn session_closed(&self, session: SessionId) {
        let discarded = self
            .reassembler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .discard(session);
        if discarded {
            debug!(session, "partial payload discarded");
        }
    }

    // ------------------------------------------------------------------
    // Routing helpers
    // ------------------------------------------------------------------

    fn route_download(
        &self,
        mut message: SessionMessage,
        session: &SessionHandle,
    ) -> Result<Option<Job>, CoordinatorError> {
        if let Some(blob_url) = message.blob_url.take() {
            return Ok(Some(Job::Blob {
                message: Box::new(message),
                blob_url,
            }));
        }

        let fragment = if message.compress_content {
            Fragment::Binary(message.data.take())
        } else if message.truncated {
            Fragment::Text {
                content: message.content.take().unwrap_or_default(),
                finished: message.finished,
            }
        } else {
            let content = message
                .content
                .take()
                .ok_or(CoordinatorError::MissingContent)?;
            return Ok(Some(Job::Save {
                message: Box::new(message),
                content: content.into(),
            }));
        };

        let ingest = self
            .reassembler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ingest(session.id, fragment)?;

        match ingest {
            Ingest::Incomplete => Ok(None),
            Ingest::Complete(Reassembled::Text(content)) => Ok(Some(Job::Save {
                message: Box::new(message),
                content: content.into(),
            })),
            // The record is the full save request, page data included.
            Ingest::Complete(Reassembled::Record(record)) => {
                let request: SessionMessage = serde_json::from_value(record.into_json())?;
                Ok(Some(Job::Archive {
                    message: Box::new(request),
                }))
            }
        }
    }

    fn claim(&self, session: SessionId) -> Option<SessionClaim> {
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session);
        inserted.then(|| SessionClaim {
            sessions: Arc::clone(&self.in_flight),
            session,
        })
    }

    fn task_id(&self, message: &SessionMessage) -> TaskId {
        message
            .task_id
            .unwrap_or_else(|| self.next_task.fetch_add(1, Ordering::Relaxed))
    }

    // ------------------------------------------------------------------
    // Saves
    // ------------------------------------------------------------------

    async fn save_from_blob(
        &self,
        message: &SessionMessage,
        blob_url: String,
        session: &SessionHandle,
    ) -> MessageResponse {
        let lease = BlobLease::new(Arc::clone(&self.collaborators.blobs), blob_url);
        let payload = self.read_blob(lease.url(), message.compress_content).await;
        lease.release().await;

        match payload {
            Ok(BlobPayload::Text(content)) => self.save(message, content.into(), session).await,
            Ok(BlobPayload::PageData(page_data)) => {
                let mut request = message.clone();
                request.page_data = Some(page_data);
                self.save_archive(&request, session).await
            }
            Err(e) => {
                warn!(session = session.id, error = %e, "cannot read payload handle");
                session.notify(SessionNotification::Error {
                    message: e.to_string(),
                    link: e.link().map(str::to_string),
                });
                MessageResponse::Failed
            }
        }
    }

    async fn read_blob(
        &self,
        url: &str,
        compressed: bool,
    ) -> Result<BlobPayload, CoordinatorError> {
        let bytes = self.collaborators.blobs.fetch(url).await?;
        if compressed {
            Ok(BlobPayload::PageData(decode(&bytes)?.into_json()))
        } else {
            Ok(BlobPayload::Text(String::from_utf8(bytes)?))
        }
    }

    /// Saves an assembled page.
    async fn save(
        &self,
        message: &SessionMessage,
        content: UploadContent,
        session: &SessionHandle,
    ) -> MessageResponse {
        let task = self.task_id(message);
        self.registry.register(task);
        debug!(task, session = session.id, filename = %message.filename, "saving page");

        let mut handle = None;
        let result = self
            .save_content(task, message, content, session, &mut handle)
            .await;
        self.finish(task, message, session, result, handle, false)
            .await
    }

    async fn save_content(
        &self,
        task: TaskId,
        message: &SessionMessage,
        content: UploadContent,
        session: &SessionHandle,
        handle: &mut Option<BlobLease>,
    ) -> Result<SaveOutcome, CoordinatorError> {
        if self.registry.is_cancelled(task) {
            return Ok(SaveOutcome::Cancelled);
        }
        let selector = message.selector();
        let Some(conflict_action) = self.preflight(message, &selector).await? else {
            return Ok(SaveOutcome::Skipped);
        };

        match selector {
            DestinationSelector::Editor => {
                session.notify(SessionNotification::Edit);
                self.collaborators
                    .editor
                    .open(EditorRequest {
                        tab_index: next_tab(session),
                        filename: message.filename.clone(),
                        content,
                        compression: None,
                    })
                    .await?;
                Ok(SaveOutcome::Completed { url: None })
            }
            DestinationSelector::Clipboard => Ok(SaveOutcome::Completed { url: None }),
            selector => {
                if selector == DestinationSelector::LocalDownload || message.open_saved_page {
                    let url = self
                        .collaborators
                        .blobs
                        .create(content.as_bytes().to_vec(), MIMETYPE_HTML)
                        .await?;
                    *handle = Some(BlobLease::new(Arc::clone(&self.collaborators.blobs), url));
                }
                let mut request = self.dispatch_request(
                    task,
                    message,
                    selector,
                    content,
                    conflict_action,
                    session,
                );
                request.blob_url = handle.as_ref().map(|lease| lease.url().to_string());
                Ok(self.dispatcher.dispatch(&request).await?.into())
            }
        }
    }

    /// Saves a compressed page: builds the archive, then delivers it.
    async fn save_archive(
        &self,
        message: &SessionMessage,
        session: &SessionHandle,
    ) -> MessageResponse {
        let task = self.task_id(message);
        self.registry.register(task);
        debug!(task, session = session.id, filename = %message.filename, "saving archive");

        let mut handle = None;
        let result = self
            .save_compressed(task, message, session, &mut handle)
            .await;
        self.finish(task, message, session, result, handle, true)
            .await
    }

    async fn save_compressed(
        &self,
        task: TaskId,
        message: &SessionMessage,
        session: &SessionHandle,
        handle: &mut Option<BlobLease>,
    ) -> Result<SaveOutcome, CoordinatorError> {
        if self.registry.is_cancelled(task) {
            return Ok(SaveOutcome::Cancelled);
        }
        let selector = message.selector();
        let Some(conflict_action) = self.preflight(message, &selector).await? else {
            return Ok(SaveOutcome::Skipped);
        };

        let page_data = message.page_data.clone().unwrap_or_default();
        let url = page_data
            .get("url")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .or_else(|| session.url.clone());
        let archive_url = self
            .collaborators
            .compressor
            .compress(CompressRequest {
                session: session.id,
                url,
                page_data,
                options: message.compression.clone(),
            })
            .await?;
        let lease = handle.insert(BlobLease::new(
            Arc::clone(&self.collaborators.blobs),
            archive_url,
        ));
        let content = UploadContent::from(self.collaborators.blobs.fetch(lease.url()).await?);

        if self.registry.is_cancelled(task) {
            return Ok(SaveOutcome::Cancelled);
        }

        match selector {
            DestinationSelector::Editor => {
                session.notify(SessionNotification::Edit);
                self.collaborators
                    .editor
                    .open(EditorRequest {
                        tab_index: next_tab(session),
                        filename: message.filename.clone(),
                        content,
                        compression: Some(message.compression.clone()),
                    })
                    .await?;
                Ok(SaveOutcome::Completed { url: None })
            }
            DestinationSelector::Clipboard => Ok(SaveOutcome::Completed { url: None }),
            _ if message.foreground_save => {
                self.deliver_foreground(task, &message.filename, &content, true, session)?;
                Ok(SaveOutcome::Completed { url: None })
            }
            DestinationSelector::LocalDownload if !message.background_save => {
                self.deliver_foreground(task, &message.filename, &content, false, session)?;
                Ok(SaveOutcome::Completed { url: None })
            }
            selector => {
                let mut request = self.dispatch_request(
                    task,
                    message,
                    selector,
                    content,
                    conflict_action,
                    session,
                );
                request.blob_url = Some(lease.url().to_string());
                Ok(self.dispatcher.dispatch(&request).await?.into())
            }
        }
    }

    /// Conflict pre-flight for background saves to local destinations.
    /// Returns `None` when the save must be skipped.
    async fn preflight(
        &self,
        message: &SessionMessage,
        selector: &DestinationSelector,
    ) -> Result<Option<ConflictAction>, CoordinatorError> {
        if !message.background_save || selector.is_remote() {
            return Ok(Some(message.filename_conflict_action));
        }
        let resolution = resolve(
            self.collaborators.downloads.as_ref(),
            &message.filename,
            message.filename_conflict_action,
        )
        .await?;
        Ok((!resolution.skip).then_some(resolution.action))
    }

    fn dispatch_request(
        &self,
        task: TaskId,
        message: &SessionMessage,
        selector: DestinationSelector,
        content: UploadContent,
        conflict_action: ConflictAction,
        session: &SessionHandle,
    ) -> DispatchRequest {
        let mut request = DispatchRequest::new(task, selector, message.filename.clone(), content);
        request.conflict_action = conflict_action;
        request.prompt = Some(session.prompt_fn());
        request.progress = Some(session.progress_forwarder());
        request.force_web_auth_flow = message.force_web_auth_flow;
        request.save_as = message.confirm_filename;
        request.incognito = session.incognito;
        request.include_infobar = message.include_infobar;
        request.replacement_character = message
            .filename_replacement_character
            .clone()
            .unwrap_or_else(|| self.config.replacement_character.clone());
        request
    }

    /// Streams `{filename, taskId, foregroundSave, content}` back to the
    /// session as `content.download` chunks, then an empty terminator.
    fn deliver_foreground(
        &self,
        task: TaskId,
        filename: &str,
        content: &UploadContent,
        foreground_save: bool,
        session: &SessionHandle,
    ) -> Result<(), CoordinatorError> {
        let record = Value::map([
            ("filename", Value::from(filename)),
            ("taskId", Value::Int(i64::try_from(task).unwrap_or(i64::MAX))),
            ("foregroundSave", Value::Bool(foreground_save)),
            ("content", Value::Bytes(content.as_bytes().to_vec())),
        ]);

        let mut chunks = 0usize;
        for chunk in StreamEncoder::new(&record, self.config.chunk_size)? {
            session.notify(SessionNotification::Download { data: Some(chunk) });
            chunks += 1;
        }
        session.notify(SessionNotification::Download { data: None });
        debug!(task, chunks, "payload streamed to session");
        Ok(())
    }

    /// Reports the terminal state of a save and settles its handle.
    async fn finish(
        &self,
        task: TaskId,
        message: &SessionMessage,
        session: &SessionHandle,
        result: Result<SaveOutcome, CoordinatorError>,
        handle: Option<BlobLease>,
        compressed: bool,
    ) -> MessageResponse {
        let result = match result {
            Ok(SaveOutcome::Completed { url }) => self
                .replace_bookmark(message, url.as_deref())
                .await
                .map(|()| SaveOutcome::Completed { url }),
            other => other,
        };

        let mut open_viewer = false;
        match result {
            Ok(SaveOutcome::Completed { url }) => {
                info!(task, url = url.as_deref().unwrap_or(""), "save completed");
                session.notify(SessionNotification::End);
                open_viewer = message.open_saved_page;
            }
            Ok(SaveOutcome::Skipped) => {
                info!(task, filename = %message.filename, "file exists, save skipped");
                session.notify(SessionNotification::End);
            }
            Ok(SaveOutcome::Cancelled) => {
                debug!(task, "save cancelled");
                session.notify(SessionNotification::End);
            }
            Err(e) if e.is_cancelled() => {
                debug!(task, "save cancelled");
                session.notify(SessionNotification::End);
            }
            Err(e) => {
                error!(task, error = %e, "save failed");
                session.notify(SessionNotification::Error {
                    message: e.to_string(),
                    link: e.link().map(str::to_string),
                });
            }
        }

        if let Some(lease) = handle {
            self.settle_handle(lease, open_viewer, compressed, session)
                .await;
        }
        self.registry.on_save_end(task);
        MessageResponse::Empty
    }

    async fn replace_bookmark(
        &self,
        message: &SessionMessage,
        url: Option<&str>,
    ) -> Result<(), CoordinatorError> {
        if let (Some(bookmark), Some(url)) = (message.bookmark_to_replace(), url) {
            self.collaborators.bookmarks.update(bookmark, url).await?;
            debug!(bookmark, url, "bookmark updated");
        }
        Ok(())
    }

    /// Hands the handle to the viewer when requested, releases it otherwise.
    async fn settle_handle(
        &self,
        lease: BlobLease,
        open_viewer: bool,
        compressed: bool,
        session: &SessionHandle,
    ) {
        if !open_viewer {
            lease.release().await;
            return;
        }
        let request = ViewerRequest {
            blob_url: lease.url().to_string(),
            compressed,
            tab_index: next_tab(session),
        };
        match self.collaborators.viewer.open(request).await {
            Ok(()) => {
                lease.disarm();
            }
            Err(e) => {
                warn!(session = session.id, error = %e, "cannot open saved page");
                lease.release().await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Control messages
    // ------------------------------------------------------------------

    async fn end(
        &self,
        hash: Option<&str>,
        key: Option<&str>,
        task: Option<TaskId>,
        session: &SessionHandle,
    ) -> MessageResponse {
        if let Some(hash) = hash
            && let Err(e) = self.collaborators.notarizer.anchor(hash, key).await
        {
            warn!(session = session.id, error = %e, "cannot anchor saved page");
            session.notify(SessionNotification::Error {
                message: e.to_string(),
                link: e.link().map(str::to_string),
            });
        }
        if let Some(task) = task {
            self.registry.on_save_end(task);
        }
        MessageResponse::Empty
    }
}

/// Tab position right after the session's tab.
fn next_tab(session: &SessionHandle) -> Option<u32> {
    session.tab_index.map(|index| index + 1)
}
