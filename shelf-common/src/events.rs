//! Event types and the broadcast event bus
//!
//! Scan jobs publish their stage transitions here so that API layers
//! (or tests) can observe a run without touching the run task itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted by shelf services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShelfEvent {
    /// A scan job was accepted and its background run started
    ScanJobStarted {
        job_id: Uuid,
        shelf_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A scan job moved to a new pipeline stage
    ScanJobStepChanged {
        job_id: Uuid,
        step: String,
        progress: f64,
        timestamp: DateTime<Utc>,
    },

    /// A scan job finished successfully
    ScanJobCompleted {
        job_id: Uuid,
        added_count: usize,
        needs_review_count: usize,
        warning_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A scan job failed
    ScanJobFailed {
        job_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A scan job stopped at a stage boundary after an abort request
    ScanJobAborted {
        job_id: Uuid,
        step: String,
        timestamp: DateTime<Utc>,
    },
}

impl ShelfEvent {
    /// Job the event refers to
    pub fn job_id(&self) -> Uuid {
        match self {
            ShelfEvent::ScanJobStarted { job_id, .. }
            | ShelfEvent::ScanJobStepChanged { job_id, .. }
            | ShelfEvent::ScanJobCompleted { job_id, .. }
            | ShelfEvent::ScanJobFailed { job_id, .. }
            | ShelfEvent::ScanJobAborted { job_id, .. } => *job_id,
        }
    }
}

/// Broadcast bus for [`ShelfEvent`]s
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ShelfEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Old events are dropped for slow subscribers once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ShelfEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ShelfEvent,
    ) -> Result<usize, broadcast::error::SendError<ShelfEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ShelfEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
