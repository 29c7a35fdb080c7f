//! Session coordinator.
//!
//! Receives session messages, reassembles payloads, runs the conflict
//! pre-flight, hands the payload to the dispatcher and reports the outcome
//! to the originating session. Every save ends with exactly one `onEnd`
//! or `onError`.

pub mod blob;
pub mod collaborators;
mod coordinator;
pub mod session;

pub use blob::{BlobLease, BlobStore, MemoryBlobStore};
pub use collaborators::{
    BatchSaver, Bookmarks, Collaborators, CompressRequest, Editor, EditorRequest, Notarizer,
    PageCompressor, Viewer, ViewerRequest,
};
pub use coordinator::{Coordinator, CoordinatorConfig, PendingWork, Routed};
pub use session::{Outbound, SessionEvent, SessionHandle};

use pagedrop_destinations::{DispatchError, UploadError};
use pagedrop_stream_codec::CodecError;
use pagedrop_transfer::ReassemblyError;

/// Errors that end a save or reject a payload.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Reassembly(#[from] ReassemblyError),

    #[error("invalid save request: {0}")]
    Record(#[from] serde_json::Error),

    #[error("cannot decode payload: {0}")]
    Codec(#[from] CodecError),

    #[error("page content is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("message carries no page content")]
    MissingContent,
}

impl CoordinatorError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            CoordinatorError::Upload(e) => e.is_cancelled(),
            CoordinatorError::Dispatch(
                DispatchError::Destination { source, .. } | DispatchError::Local(source),
            ) => source.is_cancelled(),
            _ => false,
        }
    }

    /// Actionable link to show alongside the error message.
    pub fn link(&self) -> Option<&str> {
        match self {
            CoordinatorError::Upload(e) => e.link(),
            CoordinatorError::Dispatch(e) => e.link(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagedrop_destinations::DestinationKind;

    #[test]
    fn destination_errors_keep_their_tag() {
        let err = CoordinatorError::from(DispatchError::Destination {
            kind: DestinationKind::Repository,
            source: UploadError::Backend("409 conflict".into()),
        });
        assert_eq!(err.to_string(), "409 conflict (GitHub)");
        assert!(!err.is_cancelled());
    }

    #[test]
    fn cancellation_and_links() {
        assert!(CoordinatorError::Upload(UploadError::Cancelled).is_cancelled());
        let err = CoordinatorError::Upload(UploadError::WithLink {
            message: "quota exceeded".into(),
            link: "https://notary.example.org/plans".into(),
        });
        assert_eq!(err.link(), Some("https://notary.example.org/plans"));
        assert_eq!(CoordinatorError::MissingContent.link(), None);
    }
}
