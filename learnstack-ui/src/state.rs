//! Shared application state for the UI server.

use std::sync::Arc;

use learnstack::io::config::LearnstackConfig;
use learnstack::io::service::ReasoningService;
use learnstack::session::Session;
use tokio::sync::{Mutex, broadcast};
use tracing::debug;

/// Events broadcast to SSE clients when the session changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A new session replaced the previous one.
    SessionStarted,
    /// The stack state was replaced.
    StateChanged,
    /// Entries were appended to the transcript.
    TranscriptAppended { len: usize },
    /// A gate was opened, updated or closed.
    GateChanged,
}

/// The single in-memory session.
///
/// `generation` increases every time the session is replaced, so results of
/// remote calls issued against an older session can be discarded.
#[derive(Debug, Default)]
pub struct SessionSlot {
    pub generation: u64,
    pub session: Option<Session>,
}

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<LearnstackConfig>,
    /// Backend for chat turns and gate verification.
    pub service: Arc<dyn ReasoningService + Send + Sync>,
    /// Never held across a remote call.
    pub slot: Arc<Mutex<SessionSlot>>,
    /// Broadcast sender for session change events.
    pub event_tx: Arc<broadcast::Sender<ChangeEvent>>,
}

impl AppState {
    pub fn new(config: LearnstackConfig, service: Arc<dyn ReasoningService + Send + Sync>) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            config: Arc::new(config),
            service,
            slot: Arc::new(Mutex::new(SessionSlot::default())),
            event_tx: Arc::new(event_tx),
        }
    }

    /// Publish an event; having no subscribers is fine.
    pub fn notify(&self, event: ChangeEvent) {
        if self.event_tx.send(event.clone()).is_err() {
            debug!(?event, "no SSE subscribers");
        }
    }
}
