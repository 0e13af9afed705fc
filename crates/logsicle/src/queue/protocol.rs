//! Messages exchanged between the host-side [`super::QueueManager`] and the queue worker.

use std::fmt;

use serde::Serialize;
use tokio::sync::{broadcast, oneshot};

use crate::resource::{ResourceData, ResourceType};

/// Host to worker.
#[derive(Debug)]
pub enum WorkerCommand {
    Enqueue(ResourceData),
    /// Acknowledged once every item enqueued before it is delivered or dropped.
    Flush(oneshot::Sender<()>),
    /// Acknowledged once the worker loop has exited.
    Stop(Option<oneshot::Sender<()>>),
}

/// Why a record left the queue without being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DropReason {
    QueueFull,
    Rejected,
    MaxRetries,
    /// Still queued, or failed in flight, when the worker stopped.
    Shutdown,
}

impl DropReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::QueueFull => "queue-full",
            DropReason::Rejected => "rejected",
            DropReason::MaxRetries => "max-retries",
            DropReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker to host lifecycle notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    BatchProcessed {
        resource_type: ResourceType,
        count: usize,
        retries: u32,
    },
    ItemDropped {
        resource_type: ResourceType,
        reason: DropReason,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Batching,
    Sending,
    Backoff,
    Stopped,
}

pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Fan-out of [`QueueEvent`]s to every subscriber.
///
/// Emitting never blocks; subscribers that fall more than the channel capacity behind observe a
/// `Lagged` error and lose the oldest events.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<QueueEvent>,
}

impl EventSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: QueueEvent) {
        // no subscribers is fine
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}
