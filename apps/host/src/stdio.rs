//! Line-delimited JSON transport between sessions and the coordinator.
//!
//! Each input line is one [`Inbound`] object, each output line one
//! [`OutboundLine`]. Messages of a session are routed in input order;
//! saves then run concurrently and answer with their `requestId` when done.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pagedrop_coordinator::{Coordinator, Outbound, Routed, SessionEvent, SessionHandle};
use pagedrop_protocol::{
    MessageResponse, PromptRequest, SessionId, SessionMessage, SessionNotification,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inbound {
    #[serde(rename_all = "camelCase")]
    Message {
        session: SessionId,
        #[serde(default)]
        request_id: Option<u64>,
        #[serde(default)]
        tab_index: Option<u32>,
        #[serde(default)]
        incognito: bool,
        #[serde(default)]
        url: Option<String>,
        message: SessionMessage,
    },
    #[serde(rename_all = "camelCase")]
    PromptReply {
        prompt_id: u64,
        #[serde(default)]
        value: Option<String>,
    },
    SessionClosed { session: SessionId },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundLine<'a> {
    Notification {
        session: SessionId,
        notification: &'a SessionNotification,
    },
    #[serde(rename_all = "camelCase")]
    Prompt {
        session: SessionId,
        prompt_id: u64,
        prompt: &'a PromptRequest,
    },
    #[serde(rename_all = "camelCase")]
    Response {
        session: SessionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        response: &'a MessageResponse,
    },
}

type PromptReply = oneshot::Sender<Option<String>>;

/// Prompts awaiting an answer, keyed by prompt id.
#[derive(Default)]
struct PromptTable {
    last_id: u64,
    pending: HashMap<u64, (SessionId, PromptReply)>,
}

impl PromptTable {
    fn insert(&mut self, session: SessionId, reply: PromptReply) -> u64 {
        self.last_id += 1;
        self.pending.insert(self.last_id, (session, reply));
        self.last_id
    }

    fn resolve(&mut self, prompt_id: u64, value: Option<String>) -> bool {
        match self.pending.remove(&prompt_id) {
            Some((_, reply)) => {
                let _ = reply.send(value);
                true
            }
            None => false,
        }
    }

    /// Drops the prompts of a closed session; their waiters see a decline.
    fn close_session(&mut self, session: SessionId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, (owner, _)| *owner != session);
        before - self.pending.len()
    }

    fn clear(&mut self) {
        self.pending.clear();
    }
}

#[derive(Clone, Default)]
struct PendingPrompts(Arc<Mutex<PromptTable>>);

impl PendingPrompts {
    fn lock(&self) -> MutexGuard<'_, PromptTable> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Serializes outbound lines onto one channel.
#[derive(Clone)]
struct LineSink(mpsc::UnboundedSender<String>);

impl LineSink {
    fn send(&self, line: &OutboundLine<'_>) {
        match serde_json::to_string(line) {
            Ok(json) => {
                let _ = self.0.send(json);
            }
            Err(e) => warn!(error = %e, "failed to serialize outbound line"),
        }
    }

    fn respond(
        &self,
        session: SessionId,
        request_id: Option<u64>,
        response: &MessageResponse,
    ) {
        self.send(&OutboundLine::Response {
            session,
            request_id,
            response,
        });
    }
}

/// Runs the transport until `input` is exhausted and every started save
/// has finished. Returns the writer.
pub async fn serve<R, W>(
    coordinator: Arc<Coordinator>,
    input: R,
    output: W,
) -> anyhow::Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    let sink = LineSink(line_tx);
    let writer = tokio::spawn(write_lines(line_rx, output));

    let prompts = PendingPrompts::default();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let forwarder = tokio::spawn(forward_events(event_rx, sink.clone(), prompts.clone()));

    let mut saves = JoinSet::new();
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let inbound: Inbound = match serde_json::from_str(&line) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, "ignoring malformed input line");
                continue;
            }
        };

        match inbound {
            Inbound::Message {
                session,
                request_id,
                tab_index,
                incognito,
                url,
                message,
            } => {
                let mut handle = SessionHandle::new(session, event_tx.clone());
                handle.tab_index = tab_index;
                handle.incognito = incognito;
                handle.url = url;

                match coordinator.route(message, &handle) {
                    Routed::Ready(response) => sink.respond(session, request_id, &response),
                    Routed::Pending(work) => {
                        let coordinator = Arc::clone(&coordinator);
                        let sink = sink.clone();
                        saves.spawn(async move {
                            let response = coordinator.complete(work).await;
                            sink.respond(session, request_id, &response);
                        });
                    }
                }
            }
            Inbound::PromptReply { prompt_id, value } => {
                if !prompts.lock().resolve(prompt_id, value) {
                    debug!(prompt_id, "reply for unknown prompt");
                }
            }
            Inbound::SessionClosed { session } => {
                let dropped = prompts.lock().close_session(session);
                if dropped > 0 {
                    debug!(session, dropped, "prompts of closed session declined");
                }
                coordinator.session_closed(session);
            }
        }
    }

    debug!(pending = saves.len(), "input closed, waiting for saves");
    while let Some(result) = saves.join_next().await {
        if let Err(e) = result {
            warn!(error = %e, "save task failed");
        }
    }

    // Unanswered prompts resolve as declined once their senders drop.
    prompts.lock().clear();
    drop(event_tx);
    forwarder.await?;
    drop(sink);
    Ok(writer.await??)
}

async fn forward_events(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    sink: LineSink,
    prompts: PendingPrompts,
) {
    while let Some(SessionEvent { session, outbound }) = events.recv().await {
        match outbound {
            Outbound::Notify(notification) => sink.send(&OutboundLine::Notification {
                session,
                notification: &notification,
            }),
            Outbound::Prompt { request, reply } => {
                let prompt_id = prompts.lock().insert(session, reply);
                sink.send(&OutboundLine::Prompt {
                    session,
                    prompt_id,
                    prompt: &request,
                });
            }
        }
    }
}

async fn write_lines<W>(
    mut lines: mpsc::UnboundedReceiver<String>,
    mut output: W,
) -> std::io::Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(output)
}
