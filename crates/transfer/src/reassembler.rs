use std::collections::HashMap;

use pagedrop_protocol::SessionId;
use pagedrop_stream_codec::{Value, decode};
use tracing::debug;

use crate::ReassemblyError;

/// One piece of a payload sent by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// Truncated-text mode. `finished` marks the last piece.
    Text { content: String, finished: bool },
    /// Structured-binary mode. `None` or an empty chunk ends the stream.
    Binary(Option<Vec<u8>>),
}

/// A complete payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Reassembled {
    Text(String),
    Record(Value),
}

/// Result of feeding one fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    Incomplete,
    Complete(Reassembled),
}

enum Buffer {
    Text(String),
    Binary(Vec<u8>),
}

impl Buffer {
    fn len(&self) -> usize {
        match self {
            Buffer::Text(s) => s.len(),
            Buffer::Binary(b) => b.len(),
        }
    }
}

/// Per-session fragment buffers.
///
/// A buffer is opened by the first fragment for a session and removed as
/// soon as the payload completes, fails, or the session is discarded.
/// Fragments are appended strictly in the order they are ingested.
#[derive(Default)]
pub struct Reassembler {
    buffers: HashMap<SessionId, Buffer>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one fragment for `session`.
    pub fn ingest(
        &mut self,
        session: SessionId,
        fragment: Fragment,
    ) -> Result<Ingest, ReassemblyError> {
        match fragment {
            Fragment::Text { content, finished } => self.ingest_text(session, content, finished),
            Fragment::Binary(Some(chunk)) if !chunk.is_empty() => {
                self.ingest_chunk(session, chunk)
            }
            Fragment::Binary(_) => self.finish_binary(session),
        }
    }

    fn ingest_text(
        &mut self,
        session: SessionId,
        content: String,
        finished: bool,
    ) -> Result<Ingest, ReassemblyError> {
        let text = match self.buffers.remove(&session) {
            None => content,
            Some(Buffer::Text(mut text)) => {
                text.push_str(&content);
                text
            }
            Some(Buffer::Binary(_)) => return Err(ReassemblyError::ModeMismatch { session }),
        };

        if finished {
            debug!(session, bytes = text.len(), "text payload reassembled");
            Ok(Ingest::Complete(Reassembled::Text(text)))
        } else {
            self.buffers.insert(session, Buffer::Text(text));
            Ok(Ingest::Incomplete)
        }
    }

    fn ingest_chunk(
        &mut self,
        session: SessionId,
        chunk: Vec<u8>,
    ) -> Result<Ingest, ReassemblyError> {
        match self.buffers.get_mut(&session) {
            None => {
                self.buffers.insert(session, Buffer::Binary(chunk));
            }
            Some(Buffer::Binary(bytes)) => bytes.extend_from_slice(&chunk),
            Some(Buffer::Text(_)) => {
                self.buffers.remove(&session);
                return Err(ReassemblyError::ModeMismatch { session });
            }
        }
        Ok(Ingest::Incomplete)
    }

    fn finish_binary(&mut self, session: SessionId) -> Result<Ingest, ReassemblyError> {
        let bytes = match self.buffers.remove(&session) {
            None => Vec::new(),
            Some(Buffer::Binary(bytes)) => bytes,
            Some(Buffer::Text(_)) => return Err(ReassemblyError::ModeMismatch { session }),
        };

        let record =
            decode(&bytes).map_err(|source| ReassemblyError::Decode { session, source })?;
        debug!(session, bytes = bytes.len(), "binary payload reassembled");
        Ok(Ingest::Complete(Reassembled::Record(record)))
    }

    /// Drops any partial payload for `session`. Returns `true` if one existed.
    pub fn discard(&mut self, session: SessionId) -> bool {
        self.buffers.remove(&session).is_some()
    }

    pub fn is_pending(&self, session: SessionId) -> bool {
        self.buffers.contains_key(&session)
    }

    /// Bytes buffered so far for `session`.
    pub fn pending_bytes(&self, session: SessionId) -> usize {
        self.buffers.get(&session).map_or(0, Buffer::len)
    }
}
