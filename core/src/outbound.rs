use quill_protocol::OutboundEvent;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::watch;

/// Sending half of the transport as seen by the engine. Events are queued on
/// an unbounded channel drained by the embedding application.
#[derive(Clone, Debug)]
pub struct OutboundSender {
    tx: UnboundedSender<OutboundEvent>,
}

impl OutboundSender {
    pub fn new(tx: UnboundedSender<OutboundEvent>) -> Self {
        Self { tx }
    }

    /// Creates a sender together with the receiver the transport drains.
    pub fn channel() -> (Self, UnboundedReceiver<OutboundEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Queue `event` for delivery. Returns `false` when the transport side
    /// has gone away; the failure is logged, never propagated as a panic.
    pub fn send(&self, event: OutboundEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("failed to send outbound event: {e}");
                false
            }
        }
    }
}

/// Connectivity and model selection as reported by the session store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub connected: bool,
    pub model: Option<String>,
}

impl SessionStatus {
    /// Messages may only be composed when connected with a model selected.
    pub fn can_submit(&self) -> bool {
        self.connected && self.model.as_deref().is_some_and(|m| !m.is_empty())
    }
}

/// Shared, observable session status. The session store writes it; the
/// dispatcher and composer read it.
#[derive(Debug, Clone)]
pub struct SessionStatusHandle {
    tx: Arc<watch::Sender<SessionStatus>>,
}

impl SessionStatusHandle {
    pub fn new(initial: SessionStatus) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> SessionStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.tx.subscribe()
    }

    pub fn set_connected(&self, connected: bool) {
        self.tx.send_modify(|status| status.connected = connected);
    }

    pub fn set_model(&self, model: Option<String>) {
        self.tx.send_modify(|status| status.model = model);
    }
}

impl Default for SessionStatusHandle {
    fn default() -> Self {
        Self::new(SessionStatus::default())
    }
}
