use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::constants::FILENAME_CONFLICT_PROMPT;
use crate::types::{
    ConflictAction, DestinationSelector, RepositoryCredentials, TaskId, TaskInfo,
    WebDavCredentials,
};

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A message sent by a capture session to the coordinator.
///
/// One shape covers every method. Payload messages use the content fields
/// (`content`, `data`, `blobURL`), control messages only `method` plus the
/// fields they need (`taskId`, `hash`, `urls`). Absent fields take their
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionMessage {
    pub method: String,

    // Payload transfer.
    pub truncated: bool,
    pub finished: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    pub compress_content: bool,
    #[serde(rename = "blobURL", skip_serializing_if = "Option::is_none")]
    pub blob_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_data: Option<serde_json::Value>,

    // Save request.
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub filename_conflict_action: ConflictAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename_replacement_character: Option<String>,
    pub confirm_filename: bool,
    pub open_editor: bool,
    pub save_to_clipboard: bool,
    pub open_saved_page: bool,
    pub background_save: bool,
    pub foreground_save: bool,
    pub force_web_auth_flow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmark_id: Option<String>,
    #[serde(rename = "replaceBookmarkURL")]
    pub replace_bookmark_url: bool,
    pub include_infobar: bool,

    // Destination selectors and their credentials.
    pub save_to_g_drive: bool,
    #[serde(rename = "saveWithWebDAV")]
    pub save_with_web_dav: bool,
    #[serde(rename = "webDAVURL")]
    pub web_dav_url: String,
    #[serde(rename = "webDAVUser")]
    pub web_dav_user: String,
    #[serde(rename = "webDAVPassword")]
    pub web_dav_password: String,
    #[serde(rename = "saveToGitHub")]
    pub save_to_github: bool,
    pub github_token: String,
    pub github_user: String,
    pub github_repository: String,
    pub github_branch: String,
    pub save_with_companion: bool,

    #[serde(flatten)]
    pub compression: CompressionOptions,

    // Control messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub woleet_key: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
}

/// Options forwarded to the archival engine for compressed payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompressionOptions {
    pub insert_text_body: bool,
    pub create_root_directory: bool,
    pub self_extracting_archive: bool,
    pub extract_data_from_page: bool,
    pub insert_canonical_link: bool,
    pub insert_meta_no_index: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl SessionMessage {
    /// Picks the destination in fixed precedence order:
    /// editor > clipboard > WebDAV > token store > repository > companion > download.
    pub fn selector(&self) -> DestinationSelector {
        if self.open_editor {
            DestinationSelector::Editor
        } else if self.save_to_clipboard {
            DestinationSelector::Clipboard
        } else if self.save_with_web_dav {
            DestinationSelector::WebDav(WebDavCredentials {
                url: self.web_dav_url.clone(),
                user: self.web_dav_user.clone(),
                password: self.web_dav_password.clone(),
            })
        } else if self.save_to_g_drive {
            DestinationSelector::TokenStore
        } else if self.save_to_github {
            DestinationSelector::Repository(RepositoryCredentials {
                token: self.github_token.clone(),
                user: self.github_user.clone(),
                repository: self.github_repository.clone(),
                branch: self.github_branch.clone(),
            })
        } else if self.save_with_companion {
            DestinationSelector::Companion
        } else {
            DestinationSelector::LocalDownload
        }
    }

    /// Bookmark to rewrite after a successful save, if requested.
    pub fn bookmark_to_replace(&self) -> Option<&str> {
        if self.replace_bookmark_url {
            self.bookmark_id.as_deref()
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Lifecycle notification sent from the coordinator to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum SessionNotification {
    #[serde(rename = "onEdit")]
    Edit,
    #[serde(rename = "onEnd")]
    End,
    #[serde(rename = "onError")]
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        link: Option<String>,
    },
    #[serde(rename = "onUploadProgress")]
    UploadProgress { offset: u64, size: u64 },
    /// One chunk of a foreground delivery; `data: None` terminates the stream.
    #[serde(rename = "content.download")]
    Download {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Vec<u8>>,
    },
}

impl SessionNotification {
    /// Returns `true` for `End` and `Error`, the two terminal notifications.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionNotification::End | SessionNotification::Error { .. }
        )
    }
}

/// Filename prompt sent to a session when a remote destination reports a
/// conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub method: String,
    pub message: String,
    pub value: String,
}

impl PromptRequest {
    pub fn filename_conflict(filename: impl Into<String>) -> Self {
        Self {
            method: crate::constants::CONTENT_PROMPT_METHOD.to_string(),
            message: FILENAME_CONFLICT_PROMPT.to_string(),
            value: filename.into(),
        }
    }
}

/// Direct reply to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageResponse {
    /// `{}`
    Empty,
    /// `{"error": true}`
    Failed,
    /// Task list for `getInfo`.
    Tasks(Vec<TaskInfo>),
}

impl Serialize for MessageResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MessageResponse::Empty => serializer.serialize_map(Some(0))?.end(),
            MessageResponse::Failed => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", &true)?;
                map.end()
            }
            MessageResponse::Tasks(tasks) => tasks.serialize(serializer),
        }
    }
}
