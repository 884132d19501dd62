//! Per-run progress channels.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;

use super::FinalOutput;

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Update(String),
    /// Terminal: the run produced an answer (or a redirect).
    Final(Box<FinalOutput>),
    /// Terminal: the run aborted.
    Failed(String),
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Update(_))
    }
}

/// Sending half of a session's channel. Sends after the receiver is gone are
/// dropped.
#[derive(Clone)]
pub struct ProgressSink {
    session_id: String,
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSink {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn update(&self, message: impl Into<String>) {
        let message = message.into();
        debug!(session_id = %self.session_id, %message, "progress");
        let _ = self.tx.send(ProgressEvent::Update(message));
    }

    pub fn finish(&self, output: FinalOutput) {
        let _ = self.tx.send(ProgressEvent::Final(Box::new(output)));
    }

    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.tx.send(ProgressEvent::Failed(reason.into()));
    }
}

/// Receiving half. Yields events until the terminal one, then `None`; the
/// session leaves the registry once the terminal event is delivered or the
/// stream is dropped.
pub struct ProgressStream {
    session_id: String,
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
    registry: Arc<SessionRegistry>,
    done: bool,
}

impl ProgressStream {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn next(&mut self) -> Option<ProgressEvent> {
        if self.done {
            return None;
        }
        let event = self.rx.recv().await;
        match &event {
            Some(e) if !e.is_terminal() => {}
            _ => {
                self.done = true;
                self.registry.close(&self.session_id);
            }
        }
        event
    }
}

impl Drop for ProgressStream {
    fn drop(&mut self) {
        self.registry.close(&self.session_id);
    }
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: String,
    pub question: String,
    pub started_at: DateTime<Utc>,
}

/// Live pipeline runs, each with its own channel. Channels are never shared
/// between sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionInfo>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(self: &Arc<Self>, question: &str) -> (ProgressSink, ProgressStream) {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let info = SessionInfo {
            id: id.clone(),
            question: question.to_string(),
            started_at: Utc::now(),
        };
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(id.clone(), info);
        }
        debug!(session_id = %id, "session opened");
        (
            ProgressSink {
                session_id: id.clone(),
                tx,
            },
            ProgressStream {
                session_id: id,
                rx,
                registry: self.clone(),
                done: false,
            },
        )
    }

    fn close(&self, id: &str) {
        let removed = self
            .sessions
            .lock()
            .map(|mut s| s.remove(id).is_some())
            .unwrap_or(false);
        if removed {
            debug!(session_id = %id, "session closed");
        }
    }

    /// Running sessions, oldest first.
    pub fn active(&self) -> Vec<SessionInfo> {
        let mut list: Vec<SessionInfo> = self
            .sessions
            .lock()
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default();
        list.sort_by_key(|s| s.started_at);
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_ends_after_final_and_session_is_removed() {
        let registry = SessionRegistry::new();
        let (sink, mut stream) = registry.open("Is coffee healthy?");
        assert_eq!(registry.active().len(), 1);
        assert_eq!(sink.session_id(), stream.session_id());

        sink.update("searching");
        sink.finish(FinalOutput::default());
        sink.update("late");

        assert!(matches!(stream.next().await, Some(ProgressEvent::Update(m)) if m == "searching"));
        assert!(matches!(stream.next().await, Some(ProgressEvent::Final(_))));
        assert!(registry.active().is_empty());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let registry = SessionRegistry::new();
        let (a_sink, mut a) = registry.open("a");
        let (b_sink, mut b) = registry.open("b");
        assert_ne!(a.session_id(), b.session_id());

        a_sink.update("for a");
        b_sink.fail("b broke");
        a_sink.fail("a done");

        assert!(matches!(b.next().await, Some(ProgressEvent::Failed(r)) if r == "b broke"));
        assert!(matches!(a.next().await, Some(ProgressEvent::Update(m)) if m == "for a"));
        assert_eq!(registry.active().len(), 1);
        drop(a);
        assert!(registry.active().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_sender_ends_stream() {
        let registry = SessionRegistry::new();
        let (sink, mut stream) = registry.open("q");
        drop(sink);
        assert!(stream.next().await.is_none());
        assert!(registry.active().is_empty());
    }
}
