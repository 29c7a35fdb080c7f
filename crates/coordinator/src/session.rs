use std::sync::Arc;

use pagedrop_destinations::PromptFn;
use pagedrop_protocol::{PromptRequest, SessionId, SessionNotification};
use pagedrop_transfer::ProgressForwarder;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Something the coordinator sends to a session.
#[derive(Debug)]
pub enum Outbound {
    Notify(SessionNotification),
    /// Filename prompt; the session answers through `reply`.
    Prompt {
        request: PromptRequest,
        reply: oneshot::Sender<Option<String>>,
    },
}

/// Outbound event tagged with its session.
#[derive(Debug)]
pub struct SessionEvent {
    pub session: SessionId,
    pub outbound: Outbound,
}

/// The originating session of an inbound message.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub tab_index: Option<u32>,
    pub incognito: bool,
    /// URL of the captured page.
    pub url: Option<String>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    pub fn new(id: SessionId, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            id,
            tab_index: None,
            incognito: false,
            url: None,
            events,
        }
    }

    pub fn notify(&self, notification: SessionNotification) {
        let event = SessionEvent {
            session: self.id,
            outbound: Outbound::Notify(notification),
        };
        if self.events.send(event).is_err() {
            debug!(session = self.id, "session channel closed, notification dropped");
        }
    }

    /// Asks the session for a new filename. Resolves with `None` if the
    /// session disconnects before replying.
    pub async fn prompt(&self, filename: String) -> Option<String> {
        let (reply, answer) = oneshot::channel();
        let event = SessionEvent {
            session: self.id,
            outbound: Outbound::Prompt {
                request: PromptRequest::filename_conflict(filename),
                reply,
            },
        };
        if self.events.send(event).is_err() {
            return None;
        }
        answer.await.ok().flatten()
    }

    pub fn prompt_fn(&self) -> PromptFn {
        let session = self.clone();
        Arc::new(move |filename| {
            let session = session.clone();
            Box::pin(async move { session.prompt(filename).await })
        })
    }

    /// Forwards upload progress to the session as `onUploadProgress`.
    pub fn progress_forwarder(&self) -> ProgressForwarder {
        let session = self.clone();
        ProgressForwarder::new(Arc::new(move |offset, size| {
            session.notify(SessionNotification::UploadProgress { offset, size });
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prompt_round_trip() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = SessionHandle::new(3, tx);

        let answer = tokio::spawn({
            let session = session.clone();
            async move { session.prompt("page.html".into()).await }
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.session, 3);
        match event.outbound {
            Outbound::Prompt { request, reply } => {
                assert_eq!(request.method, "content.prompt");
                assert_eq!(request.value, "page.html");
                reply.send(Some("page (2).html".into())).unwrap();
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(answer.await.unwrap(), Some("page (2).html".into()));
    }

    #[tokio::test]
    async fn disconnected_prompt_resolves_none() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = SessionHandle::new(1, tx);
        let answer = tokio::spawn({
            let session = session.clone();
            async move { session.prompt("x.html".into()).await }
        });
        // Dropping the event drops the reply sender.
        drop(rx.recv().await.unwrap());
        assert_eq!(answer.await.unwrap(), None);

        drop(rx);
        assert_eq!(session.prompt("y.html".into()).await, None);
    }

    #[tokio::test]
    async fn progress_is_forwarded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = SessionHandle::new(2, tx);
        let progress = session.progress_forwarder();
        progress.report(5, 10);
        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.outbound,
            Outbound::Notify(SessionNotification::UploadProgress { offset: 5, size: 10 })
        ));
    }
}
