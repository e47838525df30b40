//! Typed change notifications published by the state store.
//!
//! Subscribers register per event kind (plus a wildcard feed) at
//! construction time; there are no ambient global hooks. Delivery uses
//! tokio broadcast channels, so a slow subscriber can never stall a
//! store mutation.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use focusguard_core_types::TaskId;

use crate::model::{AgentMetrics, AgentPhase, ErrorRecord};

/// Event published after a store mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StateEvent {
    PhaseChange {
        from: AgentPhase,
        to: AgentPhase,
    },
    TaskUpdate {
        task_id: TaskId,
        update: TaskUpdateKind,
    },
    Error {
        record: ErrorRecord,
    },
    MetricsUpdate {
        metrics: AgentMetrics,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskUpdateKind {
    Queued,
    Completed,
}

impl StateEvent {
    pub fn kind(&self) -> StateEventKind {
        match self {
            StateEvent::PhaseChange { .. } => StateEventKind::PhaseChange,
            StateEvent::TaskUpdate { .. } => StateEventKind::TaskUpdate,
            StateEvent::Error { .. } => StateEventKind::Error,
            StateEvent::MetricsUpdate { .. } => StateEventKind::MetricsUpdate,
        }
    }
}

/// Subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateEventKind {
    PhaseChange,
    TaskUpdate,
    Error,
    MetricsUpdate,
}

/// Broadcast hub: one channel per event kind plus a wildcard feed.
pub(crate) struct EventHub {
    phase: broadcast::Sender<StateEvent>,
    task: broadcast::Sender<StateEvent>,
    error: broadcast::Sender<StateEvent>,
    metrics: broadcast::Sender<StateEvent>,
    wildcard: broadcast::Sender<StateEvent>,
}

impl EventHub {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (phase, _) = broadcast::channel(capacity);
        let (task, _) = broadcast::channel(capacity);
        let (error, _) = broadcast::channel(capacity);
        let (metrics, _) = broadcast::channel(capacity);
        let (wildcard, _) = broadcast::channel(capacity);
        Self {
            phase,
            task,
            error,
            metrics,
            wildcard,
        }
    }

    pub(crate) fn subscribe(&self, kind: StateEventKind) -> broadcast::Receiver<StateEvent> {
        match kind {
            StateEventKind::PhaseChange => self.phase.subscribe(),
            StateEventKind::TaskUpdate => self.task.subscribe(),
            StateEventKind::Error => self.error.subscribe(),
            StateEventKind::MetricsUpdate => self.metrics.subscribe(),
        }
    }

    pub(crate) fn subscribe_all(&self) -> broadcast::Receiver<StateEvent> {
        self.wildcard.subscribe()
    }

    /// Send failures only mean nobody is listening; they are never
    /// propagated back into the mutation path.
    pub(crate) fn publish(&self, event: StateEvent) {
        let sender = match event.kind() {
            StateEventKind::PhaseChange => &self.phase,
            StateEventKind::TaskUpdate => &self.task,
            StateEventKind::Error => &self.error,
            StateEventKind::MetricsUpdate => &self.metrics,
        };
        if sender.send(event.clone()).is_err() {
            debug!(kind = ?event.kind(), "no subscribers for state event");
        }
        let _ = self.wildcard.send(event);
    }
}
