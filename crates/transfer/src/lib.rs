//! Reassembly of chunked page payloads, upload progress forwarding and
//! filename sanitizing.

mod progress;
mod reassembler;
mod validation;

pub use progress::{ProgressCallback, ProgressForwarder};
pub use reassembler::{Fragment, Ingest, Reassembled, Reassembler};
pub use validation::{DEFAULT_REPLACEMENT_CHARACTER, sanitize_filename};

use pagedrop_protocol::SessionId;
use pagedrop_stream_codec::CodecError;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    Reassembly(#[from] ReassemblyError),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),
}

/// Terminal reassembly failure for one session. The session's buffer is
/// discarded when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum ReassemblyError {
    #[error("session {session} mixed text and binary fragments")]
    ModeMismatch { session: SessionId },

    #[error("session {session}: cannot decode payload: {source}")]
    Decode {
        session: SessionId,
        #[source]
        source: CodecError,
    },
}
