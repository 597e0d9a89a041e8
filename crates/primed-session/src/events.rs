//! Session event system for observability.
//!
//! Emits [`SessionEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! servers and tooling can follow compilation and invocations without
//! coupling to the session internals.

use serde::{Deserialize, Serialize};

use crate::advisory::Advisory;

/// Events emitted while compiling and serving invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    CompileCompleted {
        namespaces: Vec<String>,
        artifacts: usize,
        duration_ms: u64,
    },
    ArtifactMaterialized {
        dataset: String,
        shared_by: usize,
    },
    InvocationStarted {
        run_id: String,
        namespace: String,
    },
    InvocationCompleted {
        run_id: String,
        namespace: String,
        duration_ms: u64,
    },
    InvocationFailed {
        run_id: String,
        namespace: String,
        error: String,
    },
    AdvisoryRaised {
        advisory: Advisory,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<SessionEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}
