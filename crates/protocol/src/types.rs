use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a capture session (one browser tab).
pub type SessionId = i64;

/// Identifier of a save operation.
pub type TaskId = u64;

/// Policy for naming collisions at the destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictAction {
    /// Let the destination pick a unique name.
    #[default]
    Uniquify,
    /// Replace the existing item.
    Overwrite,
    /// Ask the user for another name.
    Prompt,
    /// Do not save if an item with the same name already exists.
    Skip,
}

impl ConflictAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictAction::Uniquify => "uniquify",
            ConflictAction::Overwrite => "overwrite",
            ConflictAction::Prompt => "prompt",
            ConflictAction::Skip => "skip",
        }
    }
}

impl fmt::Display for ConflictAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection parameters for a WebDAV-like store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebDavCredentials {
    pub url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

/// Connection parameters for a version-controlled repository store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryCredentials {
    pub token: String,
    pub user: String,
    pub repository: String,
    #[serde(default)]
    pub branch: String,
}

/// Where an assembled payload goes. Exactly one variant is selected per save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationSelector {
    /// Hand the page to the in-browser editor.
    Editor,
    /// The session already copied the page; nothing to persist.
    Clipboard,
    /// Basic/Digest-authenticated remote store.
    WebDav(WebDavCredentials),
    /// Token-authenticated object store.
    TokenStore,
    /// Version-controlled repository store.
    Repository(RepositoryCredentials),
    /// Companion process running outside the browser.
    Companion,
    /// Local filesystem download.
    LocalDownload,
}

impl DestinationSelector {
    /// Returns `true` for destinations that run their own existence checks.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            DestinationSelector::WebDav(_)
                | DestinationSelector::TokenStore
                | DestinationSelector::Repository(_)
        )
    }

    /// Returns `true` for destinations that never reach the dispatcher.
    pub fn bypasses_upload(&self) -> bool {
        matches!(
            self,
            DestinationSelector::Editor | DestinationSelector::Clipboard
        )
    }
}

/// Status of a registered task, as reported to `getInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub id: TaskId,
    pub cancelled: bool,
}
