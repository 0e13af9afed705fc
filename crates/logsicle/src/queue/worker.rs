//! The queue worker owns every piece of mutable delivery state: the queue, the dedup cache,
//! the batch deadline, the backoff timer and the single in-flight send. Commands, timers and
//! send completion are multiplexed in one `select!` loop, so no locks are needed.
//!
//! ```text
//!   Idle ──enqueue──> Batching ──size/deadline/flush──> Sending ──ok──> Idle | Batching
//!                                                          │
//!                                                          └─retryable──> Backoff ──timer──> Batching
//!   any ──stop──> Stopped
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::config::{BatchingConfig, Config, DedupConfig, RetryConfig};
use crate::flusher::{DispatchOutcome, Dispatcher};
use crate::queue::backoff::Backoff;
use crate::queue::batch::{Batch, TypeGroup};
use crate::queue::dedup::{DedupCache, DedupDecision};
use crate::queue::item::QueueItem;
use crate::queue::protocol::{DropReason, EventSink, QueueEvent, WorkerCommand, WorkerState};
use crate::resource::ResourceData;

/// Settings the worker reads from [`Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    pub batching: BatchingConfig,
    pub retry: RetryConfig,
    pub dedup: DedupConfig,
    /// Log batch outcomes at `info` instead of `debug`.
    pub debug: bool,
}

impl From<&Config> for WorkerConfig {
    fn from(config: &Config) -> Self {
        Self {
            batching: config.batching,
            retry: config.retry,
            dedup: config.dedup,
            debug: config.debug,
        }
    }
}

/// Sending half of the worker's command channel.
#[derive(Clone, Debug)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<WorkerCommand>,
}

impl WorkerHandle {
    /// # Errors
    ///
    /// Returns the command back when the worker has exited.
    pub fn enqueue(&self, data: ResourceData) -> Result<(), mpsc::error::SendError<WorkerCommand>> {
        self.tx.send(WorkerCommand::Enqueue(data))
    }

    /// Returns a receiver that resolves once everything enqueued so far is terminal. It errors
    /// if the worker exits first.
    ///
    /// # Errors
    ///
    /// Returns the command back when the worker has exited.
    pub fn flush(&self) -> Result<oneshot::Receiver<()>, mpsc::error::SendError<WorkerCommand>> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx.send(WorkerCommand::Flush(ack_tx))?;
        Ok(ack_rx)
    }

    /// # Errors
    ///
    /// Returns the command back when the worker has exited.
    pub fn stop(
        &self,
        ack: Option<oneshot::Sender<()>>,
    ) -> Result<(), mpsc::error::SendError<WorkerCommand>> {
        self.tx.send(WorkerCommand::Stop(ack))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Outcome of one type group of a send.
#[derive(Debug)]
pub struct GroupResult {
    pub group: TypeGroup,
    pub outcome: DispatchOutcome,
}

type SendFuture = Pin<Box<dyn Future<Output = Vec<GroupResult>> + Send>>;

struct InFlight {
    min_seq: u64,
    sending: SendFuture,
}

struct FlushWaiter {
    /// Resolved once no pending item has a sequence number below this.
    watermark: u64,
    ack: oneshot::Sender<()>,
}

pub struct QueueWorker {
    config: WorkerConfig,
    dispatcher: Arc<dyn Dispatcher>,
    rx: mpsc::UnboundedReceiver<WorkerCommand>,
    events: EventSink,
    queue: VecDeque<QueueItem>,
    dedup: DedupCache,
    backoff: Backoff,
    state: WorkerState,
    next_seq: u64,
    backoff_until: Option<Instant>,
    in_flight: Option<InFlight>,
    flush_waiters: Vec<FlushWaiter>,
    stop_acks: Vec<oneshot::Sender<()>>,
}

impl QueueWorker {
    #[must_use]
    pub fn new(
        config: WorkerConfig,
        dispatcher: Arc<dyn Dispatcher>,
        events: EventSink,
    ) -> (Self, WorkerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Self {
            dedup: DedupCache::new(config.dedup.ttl, config.dedup.max_entries),
            backoff: Backoff::from(&config.retry),
            config,
            dispatcher,
            rx,
            events,
            queue: VecDeque::new(),
            state: WorkerState::Idle,
            next_seq: 0,
            backoff_until: None,
            in_flight: None,
            flush_waiters: Vec::new(),
            stop_acks: Vec::new(),
        };
        (worker, WorkerHandle { tx })
    }

    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub async fn run(mut self) {
        debug!("LOGSICLE | Queue worker started");

        while self.state != WorkerState::Stopped {
            let now = Instant::now();
            self.expire_backoff(now);
            if self.should_send(now) {
                self.start_send();
            }

            let wakeup = self.next_wakeup();
            let sending = self.in_flight.is_some();

            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("LOGSICLE | Command channel closed, stopping queue worker");
                        self.stop();
                    }
                },
                results = wait_in_flight(&mut self.in_flight), if sending => {
                    self.in_flight = None;
                    self.complete_send(results);
                },
                () = sleep_until_deadline(wakeup), if wakeup.is_some() => {}
            }
        }

        self.finish().await;
    }

    fn handle_command(&mut self, command: WorkerCommand) {
        match command {
            WorkerCommand::Enqueue(data) => self.enqueue(data, Instant::now()),
            WorkerCommand::Flush(ack) => {
                self.flush_waiters.push(FlushWaiter {
                    watermark: self.next_seq,
                    ack,
                });
                self.resolve_flush_waiters();
            }
            WorkerCommand::Stop(ack) => {
                self.stop_acks.extend(ack);
                self.stop();
            }
        }
    }

    pub(crate) fn enqueue(&mut self, mut data: ResourceData, now: Instant) {
        if self.state == WorkerState::Stopped {
            debug!("LOGSICLE | Queue worker stopped, discarding {} record", data.resource_type);
            return;
        }

        data.ensure_timestamp(Utc::now());
        let item = QueueItem::new(data, self.next_seq, now);

        if let DedupDecision::Duplicate { duplicates } = self.dedup.check(&item.hash, now) {
            debug!(
                "LOGSICLE | Discarding duplicate {} record {} (seen {} times)",
                item.resource_type(),
                item.hash,
                duplicates + 1
            );
            return;
        }

        self.next_seq += 1;
        self.dedup.acquire(&item.hash);
        self.queue.push_back(item);
        self.enforce_capacity();

        if self.state == WorkerState::Idle {
            self.set_state(WorkerState::Batching);
        }
        self.resolve_flush_waiters();
    }

    fn enforce_capacity(&mut self) {
        while self.queue.len() > self.config.batching.max_queue_size {
            let Some(evicted) = self.queue.pop_front() else {
                break;
            };
            warn!(
                "LOGSICLE | Queue full ({} items), dropping oldest {} record",
                self.config.batching.max_queue_size,
                evicted.resource_type()
            );
            self.drop_items([evicted], DropReason::QueueFull);
        }
    }

    fn should_send(&self, now: Instant) -> bool {
        if self.in_flight.is_some() || self.backoff_until.is_some() {
            return false;
        }
        let Some(oldest) = self.queue.front() else {
            return false;
        };
        self.queue.len() >= self.config.batching.max_size
            || !self.flush_waiters.is_empty()
            || now >= oldest.enqueued_at + self.config.batching.max_wait
    }

    fn next_wakeup(&self) -> Option<Instant> {
        if self.in_flight.is_some() {
            return None;
        }
        if let Some(until) = self.backoff_until {
            return Some(until);
        }
        self.queue
            .front()
            .map(|oldest| oldest.enqueued_at + self.config.batching.max_wait)
    }

    fn expire_backoff(&mut self, now: Instant) {
        if self.backoff_until.is_some_and(|until| now >= until) {
            self.backoff_until = None;
            if self.state == WorkerState::Backoff {
                self.settle();
            }
        }
    }

    fn start_send(&mut self) {
        let batch = Batch::take_from(
            &mut self.queue,
            self.config.batching.max_size,
            self.config.batching.max_batch_bytes,
        );
        let Some(min_seq) = batch.min_seq() else {
            return;
        };
        let count = batch.len();
        let groups = batch.into_groups();
        debug!(
            "LOGSICLE | Sending {} records in {} requests, {} still queued",
            count,
            groups.len(),
            self.queue.len()
        );

        let dispatcher = Arc::clone(&self.dispatcher);
        let sending = async move {
            let sends = groups.into_iter().map(|group| {
                let dispatcher = Arc::clone(&dispatcher);
                async move {
                    let outcome = match group.encode() {
                        Ok(body) => dispatcher.dispatch(group.resource_type, body).await,
                        Err(e) => DispatchOutcome::Rejected {
                            status: None,
                            message: format!("failed to encode batch: {e}"),
                        },
                    };
                    GroupResult { group, outcome }
                }
            });
            join_all(sends).await
        };

        self.in_flight = Some(InFlight {
            min_seq,
            sending: Box::pin(sending),
        });
        self.set_state(WorkerState::Sending);
    }

    fn complete_send(&mut self, results: Vec<GroupResult>) {
        let stopped = self.state == WorkerState::Stopped;
        let max_retries = self.config.batching.max_retries;
        let mut retry: Vec<QueueItem> = Vec::new();

        for GroupResult { group, outcome } in results {
            let resource_type = group.resource_type;
            let count = group.len();
            match outcome {
                DispatchOutcome::Delivered { status } => {
                    let retries = group.retries();
                    for item in &group.items {
                        self.dedup.release(&item.hash);
                    }
                    self.log_outcome(&format!(
                        "Delivered {count} {resource_type} records (status {status}, {retries} retries)"
                    ));
                    self.events.emit(QueueEvent::BatchProcessed {
                        resource_type,
                        count,
                        retries,
                    });
                }
                DispatchOutcome::Rejected { status, message } => {
                    warn!(
                        "LOGSICLE | Dropping {} {} records rejected by ingestion (status {:?}): {}",
                        count, resource_type, status, message
                    );
                    self.drop_items(group.items, DropReason::Rejected);
                }
                DispatchOutcome::Retryable { message, .. } if stopped => {
                    warn!(
                        "LOGSICLE | Discarding {} {} records that failed after shutdown: {}",
                        count, resource_type, message
                    );
                    self.drop_items(group.items, DropReason::Shutdown);
                }
                DispatchOutcome::Retryable { status, message } => {
                    let mut exhausted = Vec::new();
                    for mut item in group.items {
                        item.attempts += 1;
                        if item.attempts > max_retries {
                            exhausted.push(item);
                        } else {
                            retry.push(item);
                        }
                    }
                    let exhausted_count = exhausted.len();
                    if count > exhausted_count {
                        self.log_outcome(&format!(
                            "Failed to deliver {} {resource_type} records (status {status:?}), will retry: {message}",
                            count - exhausted_count
                        ));
                    }
                    if exhausted_count > 0 {
                        error!(
                            "LOGSICLE | Dropping {} {} records after {} retries: {}",
                            exhausted_count, resource_type, max_retries, message
                        );
                        self.drop_items(exhausted, DropReason::MaxRetries);
                        self.events.emit(QueueEvent::Error {
                            message: format!(
                                "failed to deliver {exhausted_count} {resource_type} records after {max_retries} retries: {message}"
                            ),
                        });
                    }
                }
            }
        }

        if !retry.is_empty() {
            let attempt = retry.iter().map(|item| item.attempts).max().unwrap_or(1);
            retry.sort_by_key(|item| item.seq);
            for item in retry.into_iter().rev() {
                self.queue.push_front(item);
            }
            self.enforce_capacity();

            let delay = self.backoff.delay(attempt);
            debug!(
                "LOGSICLE | Retry {} scheduled in {} ms",
                attempt,
                delay.as_millis()
            );
            self.backoff_until = Some(Instant::now() + delay);
            self.set_state(WorkerState::Backoff);
        } else if !stopped {
            self.settle();
        }

        self.resolve_flush_waiters();
    }

    fn drop_items(&mut self, items: impl IntoIterator<Item = QueueItem>, reason: DropReason) {
        for item in items {
            self.dedup.release(&item.hash);
            self.events.emit(QueueEvent::ItemDropped {
                resource_type: item.resource_type(),
                reason,
            });
        }
    }

    fn oldest_pending_seq(&self) -> Option<u64> {
        let in_flight = self.in_flight.as_ref().map(|in_flight| in_flight.min_seq);
        // queue is kept in ascending sequence order
        let queued = self.queue.front().map(|item| item.seq);
        match (in_flight, queued) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn resolve_flush_waiters(&mut self) {
        if self.flush_waiters.is_empty() {
            return;
        }
        let oldest = self.oldest_pending_seq();
        let (done, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.flush_waiters)
            .into_iter()
            .partition(|waiter| match oldest {
                None => true,
                Some(seq) => seq >= waiter.watermark,
            });
        self.flush_waiters = pending;
        for waiter in done {
            // the caller may have timed out already
            let _ = waiter.ack.send(());
        }
    }

    fn stop(&mut self) {
        if self.state == WorkerState::Stopped {
            return;
        }
        debug!(
            "LOGSICLE | Stopping queue worker with {} queued records",
            self.queue.len()
        );
        self.backoff_until = None;
        self.set_state(WorkerState::Stopped);
    }

    async fn finish(mut self) {
        self.rx.close();
        if let Some(in_flight) = self.in_flight.take() {
            debug!("LOGSICLE | Waiting for in-flight send before exiting");
            let results = in_flight.sending.await;
            self.complete_send(results);
        }
        self.resolve_flush_waiters();
        // unresolved flushes observe a closed channel
        self.flush_waiters.clear();

        if !self.queue.is_empty() {
            warn!(
                "LOGSICLE | Queue worker exiting with {} undelivered records",
                self.queue.len()
            );
            let undelivered = std::mem::take(&mut self.queue);
            self.drop_items(undelivered, DropReason::Shutdown);
        }
        for ack in self.stop_acks.drain(..) {
            let _ = ack.send(());
        }
        debug!("LOGSICLE | Queue worker stopped");
    }

    fn settle(&mut self) {
        if self.queue.is_empty() {
            self.set_state(WorkerState::Idle);
        } else {
            self.set_state(WorkerState::Batching);
        }
    }

    fn set_state(&mut self, state: WorkerState) {
        if self.state != state {
            trace!("LOGSICLE | Queue worker {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn log_outcome(&self, message: &str) {
        if self.config.debug {
            info!("LOGSICLE | {}", message);
        } else {
            debug!("LOGSICLE | {}", message);
        }
    }
}

async fn wait_in_flight(in_flight: &mut Option<InFlight>) -> Vec<GroupResult> {
    match in_flight {
        Some(in_flight) => (&mut in_flight.sending).await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
