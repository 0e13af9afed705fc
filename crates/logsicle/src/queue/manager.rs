use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::{ClientError, FlushError};
use crate::flusher::Dispatcher;
use crate::queue::protocol::{EventSink, QueueEvent};
use crate::queue::worker::{QueueWorker, WorkerConfig, WorkerHandle};
use crate::resource::ResourceData;

pub const WORKER_THREAD_NAME: &str = "logsicle-worker";

/// Host-side proxy of the queue worker.
///
/// The worker runs on a dedicated `logsicle-worker` thread with its own current-thread tokio
/// runtime, so enqueueing never depends on the host's executor. `flush` and `stop_and_wait` must
/// be awaited inside a tokio runtime.
#[derive(Debug)]
pub struct QueueManager {
    handle: WorkerHandle,
    events: EventSink,
    flush_timeout: Duration,
}

impl QueueManager {
    /// Spawns the worker thread.
    ///
    /// # Errors
    ///
    /// Fails when the OS refuses to spawn the thread.
    pub fn start(config: &Config, dispatcher: Arc<dyn Dispatcher>) -> Result<Self, ClientError> {
        let events = EventSink::default();
        let (worker, handle) =
            QueueWorker::new(WorkerConfig::from(config), dispatcher, events.clone());

        let worker_events = events.clone();
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(worker, &worker_events))
            .map_err(ClientError::WorkerSpawn)?;

        Ok(Self {
            handle,
            events,
            flush_timeout: config.flush_timeout,
        })
    }

    /// Hands a record to the worker. Never blocks and never fails; records sent after the
    /// worker has exited are discarded with a warning.
    pub fn enqueue(&self, data: ResourceData) {
        let resource_type = data.resource_type;
        if self.handle.enqueue(data).is_err() {
            warn!(
                "LOGSICLE | Queue worker is not running, discarding {} record",
                resource_type
            );
        }
    }

    /// Waits until every record enqueued before this call is delivered or dropped.
    ///
    /// # Errors
    ///
    /// [`FlushError::Timeout`] after `flush_timeout`, and [`FlushError::WorkerUnavailable`] when
    /// the worker is stopped or crashed.
    pub async fn flush(&self) -> Result<(), FlushError> {
        let Ok(ack) = self.handle.flush() else {
            return Err(FlushError::WorkerUnavailable);
        };

        match tokio::time::timeout(self.flush_timeout, ack).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(FlushError::WorkerUnavailable),
            Err(_) => {
                let message = format!(
                    "flush did not complete within {} ms",
                    self.flush_timeout.as_millis()
                );
                warn!("LOGSICLE | {}", message);
                self.events.emit(QueueEvent::Error { message });
                Err(FlushError::Timeout(self.flush_timeout))
            }
        }
    }

    /// Asks the worker to stop without delivering what is still queued.
    pub fn stop(&self) {
        if self.handle.stop(None).is_err() {
            debug!("LOGSICLE | Queue worker already stopped");
        }
    }

    /// Stops the worker and waits for its loop to exit, bounded by `flush_timeout`.
    ///
    /// # Errors
    ///
    /// [`FlushError::Timeout`] when the worker does not exit in time.
    pub async fn stop_and_wait(&self) -> Result<(), FlushError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.handle.stop(Some(ack_tx)).is_err() {
            debug!("LOGSICLE | Queue worker already stopped");
            return Ok(());
        }

        match tokio::time::timeout(self.flush_timeout, ack_rx).await {
            // a dropped acknowledgement means the worker is gone already
            Ok(_) => Ok(()),
            Err(_) => {
                warn!(
                    "LOGSICLE | Queue worker did not stop within {} ms",
                    self.flush_timeout.as_millis()
                );
                Err(FlushError::Timeout(self.flush_timeout))
            }
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_closed()
    }
}

fn run_worker(worker: QueueWorker, events: &EventSink) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("LOGSICLE | Failed to start queue worker runtime: {}", e);
            events.emit(QueueEvent::Error {
                message: format!("failed to start queue worker runtime: {e}"),
            });
            return;
        }
    };

    if let Err(panic) = runtime.block_on(AssertUnwindSafe(worker.run()).catch_unwind()) {
        let message = panic_message(panic.as_ref());
        error!("LOGSICLE | Queue worker crashed: {}", message);
        events.emit(QueueEvent::Error {
            message: format!("queue worker crashed: {message}"),
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
