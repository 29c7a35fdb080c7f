use std::sync::Arc;

use pagedrop_auth::TokenManager;
use pagedrop_protocol::{ConflictAction, DestinationSelector, TaskId};
use pagedrop_tasks::TaskRegistry;
use pagedrop_transfer::{DEFAULT_REPLACEMENT_CHARACTER, ProgressForwarder};
use tracing::debug;

use crate::local::{DownloadRequest, Downloader, encode_sharp_character, file_url};
use crate::{
    BoxFuture, DestinationFactory, DestinationKind, DispatchError, PromptFn, RemoteDestination,
    UploadContent, UploadError, UploadOptions,
};

/// Companion process that saves pages outside the browser.
pub trait CompanionHandoff: Send + Sync {
    fn save<'a>(
        &'a self,
        filename: &'a str,
        content: UploadContent,
        conflict_action: ConflictAction,
    ) -> BoxFuture<'a, Result<(), UploadError>>;
}

/// Everything needed to deliver one payload.
#[derive(Clone)]
pub struct DispatchRequest {
    pub task_id: TaskId,
    pub selector: DestinationSelector,
    pub filename: String,
    pub content: UploadContent,
    /// Ephemeral handle holding `content`, required for local downloads.
    pub blob_url: Option<String>,
    pub conflict_action: ConflictAction,
    pub prompt: Option<PromptFn>,
    pub progress: Option<ProgressForwarder>,
    pub force_web_auth_flow: bool,
    pub save_as: bool,
    pub incognito: bool,
    pub replacement_character: String,
    /// Ask the download facility to keep the saved-page info bar.
    pub include_infobar: bool,
}

impl DispatchRequest {
    pub fn new(
        task_id: TaskId,
        selector: DestinationSelector,
        filename: impl Into<String>,
        content: UploadContent,
    ) -> Self {
        Self {
            task_id,
            selector,
            filename: filename.into(),
            content,
            blob_url: None,
            conflict_action: ConflictAction::default(),
            prompt: None,
            progress: None,
            force_web_auth_flow: false,
            save_as: false,
            incognito: false,
            replacement_character: DEFAULT_REPLACEMENT_CHARACTER.to_string(),
            include_infobar: false,
        }
    }

    fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            conflict_action: self.conflict_action,
            prompt: self.prompt.clone(),
            progress: self.progress.clone(),
        }
    }
}

/// Terminal result of a dispatch that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed { url: Option<String> },
    /// The task was cancelled; reported as a clean end.
    Cancelled,
}

/// Routes a payload to exactly one destination.
pub struct Dispatcher {
    registry: Arc<TaskRegistry>,
    tokens: Arc<TokenManager>,
    factory: Arc<dyn DestinationFactory>,
    downloader: Arc<dyn Downloader>,
    companion: Arc<dyn CompanionHandoff>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<TaskRegistry>,
        tokens: Arc<TokenManager>,
        factory: Arc<dyn DestinationFactory>,
        downloader: Arc<dyn Downloader>,
        companion: Arc<dyn CompanionHandoff>,
    ) -> Self {
        Self {
            registry,
            tokens,
            factory,
            downloader,
            companion,
        }
    }

    /// Delivers `request` to the destination its selector names.
    ///
    /// Remote failures come back tagged with the destination; cancellation
    /// at any point yields [`DispatchOutcome::Cancelled`].
    pub async fn dispatch(
        &self,
        request: &DispatchRequest,
    ) -> Result<DispatchOutcome, DispatchError> {
        let task = request.task_id;
        if self.registry.is_cancelled(task) {
            debug!(task, "task cancelled before dispatch");
            return Ok(DispatchOutcome::Cancelled);
        }

        let (kind, result) = match &request.selector {
            DestinationSelector::Editor | DestinationSelector::Clipboard => {
                return Ok(DispatchOutcome::Completed { url: None });
            }
            DestinationSelector::WebDav(credentials) => (
                DestinationKind::WebDav,
                self.upload_with(request, || self.factory.web_dav(credentials))
                    .await,
            ),
            DestinationSelector::TokenStore => (
                DestinationKind::TokenStore,
                self.upload_to_token_store(request).await,
            ),
            DestinationSelector::Repository(credentials) => (
                DestinationKind::Repository,
                self.upload_with(request, || self.factory.repository(credentials))
                    .await,
            ),
            DestinationSelector::Companion => return self.hand_off(request).await,
            DestinationSelector::LocalDownload => return self.download(request).await,
        };

        match result {
            Ok(url) => {
                debug!(task, destination = %kind, "upload completed");
                Ok(DispatchOutcome::Completed { url })
            }
            Err(e) if e.is_cancelled() => {
                debug!(task, destination = %kind, "upload cancelled");
                Ok(DispatchOutcome::Cancelled)
            }
            Err(source) => Err(DispatchError::Destination { kind, source }),
        }
    }

    async fn upload_with<F>(
        &self,
        request: &DispatchRequest,
        construct: F,
    ) -> Result<Option<String>, UploadError>
    where
        F: FnOnce() -> Result<Arc<dyn RemoteDestination>, UploadError>,
    {
        if self.registry.is_cancelled(request.task_id) {
            return Err(UploadError::Cancelled);
        }
        let client = construct()?;
        self.run_upload(client, request).await
    }

    async fn upload_to_token_store(
        &self,
        request: &DispatchRequest,
    ) -> Result<Option<String>, UploadError> {
        let task = request.task_id;
        self.tokens
            .run_with_refresh(request.force_web_auth_flow, move |credential| async move {
                if self.registry.is_cancelled(task) {
                    return Err(UploadError::Cancelled);
                }
                let client = self.factory.token_store(&credential)?;
                self.run_upload(client, request).await
            })
            .await
    }

    /// Arms the client's abort hook, uploads, and awaits any pending push.
    async fn run_upload(
        &self,
        client: Arc<dyn RemoteDestination>,
        request: &DispatchRequest,
    ) -> Result<Option<String>, UploadError> {
        let task = request.task_id;
        let abort_handle = Arc::clone(&client);
        // Fails if a cancel landed between the entry check and now.
        self.registry
            .set_cancel_callback(task, Box::new(move || abort_handle.abort()))
            .map_err(|_| UploadError::Cancelled)?;

        let filename = encode_sharp_character(&request.filename);
        let result: Result<Option<String>, UploadError> = async {
            let response = client
                .upload(&filename, request.content.clone(), request.upload_options())
                .await?;
            if let Some(push) = response.push {
                push.await?;
            }
            Ok(response.url)
        }
        .await;

        self.registry.clear_cancel_callback(task);
        if self.registry.is_cancelled(task) {
            return Err(UploadError::Cancelled);
        }
        result
    }

    async fn hand_off(&self, request: &DispatchRequest) -> Result<DispatchOutcome, DispatchError> {
        let result = self
            .companion
            .save(
                &request.filename,
                request.content.clone(),
                request.conflict_action,
            )
            .await;
        match result {
            Ok(()) => Ok(DispatchOutcome::Completed { url: None }),
            Err(e) if e.is_cancelled() => Ok(DispatchOutcome::Cancelled),
            Err(e) => Err(DispatchError::Local(e)),
        }
    }

    async fn download(&self, request: &DispatchRequest) -> Result<DispatchOutcome, DispatchError> {
        let Some(url) = request.blob_url.clone() else {
            return Err(DispatchError::Local(UploadError::Backend(
                "no content handle to download".into(),
            )));
        };

        // The download facility has no "skip"; the pre-flight already ran.
        let conflict_action = match request.conflict_action {
            ConflictAction::Skip => ConflictAction::Uniquify,
            action => action,
        };
        let download = DownloadRequest {
            url,
            filename: request.filename.clone(),
            save_as: request.save_as,
            conflict_action,
            incognito: request.incognito,
            replacement_character: request.replacement_character.clone(),
            include_infobar: request.include_infobar,
        };

        match self.downloader.download(download).await {
            Ok(path) => Ok(DispatchOutcome::Completed {
                url: path.as_deref().map(file_url),
            }),
            Err(e) if e.is_cancelled() => Ok(DispatchOutcome::Cancelled),
            Err(e) => Err(DispatchError::Local(e)),
        }
    }
}
