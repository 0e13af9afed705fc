//! Buffering, batching and retrying of records.
//!
//! The host talks to a [`QueueManager`]; the manager forwards [`protocol::WorkerCommand`]s to a
//! [`worker::QueueWorker`] running on its own thread and relays the worker's
//! [`protocol::QueueEvent`]s to subscribers.

pub mod backoff;
pub mod batch;
pub mod dedup;
pub mod item;
pub mod manager;
pub mod protocol;
pub mod worker;

pub use item::generate_payload_hash;
pub use manager::QueueManager;
pub use protocol::{DropReason, QueueEvent, WorkerState};
