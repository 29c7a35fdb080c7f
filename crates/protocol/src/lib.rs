//! Messages exchanged between capture sessions and the save coordinator.
//!
//! A capture session (one browser tab) sends [`SessionMessage`]s; the
//! coordinator answers each with a [`MessageResponse`] and reports save
//! progress through [`SessionNotification`]s.

pub mod constants;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::Method;
pub use messages::{
    CompressionOptions, MessageResponse, PromptRequest, SessionMessage, SessionNotification,
};
pub use types::{
    ConflictAction, DestinationSelector, RepositoryCredentials, SessionId, TaskId, TaskInfo,
    WebDavCredentials,
};
