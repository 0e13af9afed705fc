use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use crate::config::{get_config, Config};
use crate::error::{ClientError, FlushError};
use crate::flusher::{Dispatcher, HttpDispatcher};
use crate::queue::{QueueEvent, QueueManager};
use crate::resource::ResourceData;
use crate::transport::hostname::{default_resolver, HostnameResolver};
use crate::transport::{
    AppStructuredLogTransport, EventTransport, MetricTransport, RequestTransport, TransportContext,
};

/// Entry point of the SDK.
///
/// ```rust,ignore
/// let client = LogsicleClient::new(Config::new("api-key", "project-id"))?;
/// client.app.info("service started", AppLogOptions::default());
/// client.shutdown().await?;
/// ```
///
/// Dropping the client (and every transport cloned from it) closes the worker's command channel,
/// which ends the worker without delivering what is still queued.
#[derive(Debug)]
pub struct LogsicleClient {
    config: Arc<Config>,
    queue: Arc<QueueManager>,
    pub app: AppStructuredLogTransport,
    pub event: EventTransport,
    pub request: RequestTransport,
    pub metric: MetricTransport,
}

impl LogsicleClient {
    /// Validates `config`, builds the HTTP dispatcher and starts the queue worker.
    ///
    /// # Errors
    ///
    /// Fails on an invalid config, when the HTTP client cannot be built or when the worker
    /// thread cannot be spawned.
    pub fn new(config: Config) -> Result<Self, ClientError> {
        Self::builder(config).build()
    }

    /// Loads `logsicle.yaml` from `config_directory` and `LOGSICLE_*` variables, then starts a
    /// client.
    ///
    /// # Errors
    ///
    /// See [`LogsicleClient::new`].
    pub fn from_directory(config_directory: &Path) -> Result<Self, ClientError> {
        Self::new(get_config(config_directory))
    }

    #[must_use]
    pub fn builder(config: Config) -> LogsicleClientBuilder {
        LogsicleClientBuilder {
            config,
            dispatcher: None,
            hostname_resolver: None,
        }
    }

    /// Queues a prebuilt record. Prefer the typed transports.
    pub fn enqueue(&self, data: ResourceData) {
        self.queue.enqueue(data);
    }

    /// Waits until every record logged before this call is delivered or dropped.
    ///
    /// # Errors
    ///
    /// Fails when the flush times out or the worker is not running. Delivery failures are
    /// reported through [`LogsicleClient::subscribe`] instead.
    pub async fn flush(&self) -> Result<(), FlushError> {
        self.queue.flush().await
    }

    /// Flushes, then stops the worker. The worker is stopped even when the flush fails.
    ///
    /// # Errors
    ///
    /// Returns the flush error if any, otherwise the stop error.
    pub async fn shutdown(&self) -> Result<(), FlushError> {
        let flushed = self.queue.flush().await;
        if let Err(e) = &flushed {
            debug!("LOGSICLE | Flush before shutdown failed: {}", e);
        }
        let stopped = self.queue.stop_and_wait().await;
        flushed.and(stopped)
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.queue.subscribe()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.queue.is_running()
    }
}

/// Overrides the pieces [`LogsicleClient::new`] picks by default.
pub struct LogsicleClientBuilder {
    config: Config,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    hostname_resolver: Option<HostnameResolver>,
}

impl LogsicleClientBuilder {
    /// Sends batches through `dispatcher` instead of HTTP.
    #[must_use]
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    #[must_use]
    pub fn hostname_resolver(mut self, resolver: HostnameResolver) -> Self {
        self.hostname_resolver = Some(resolver);
        self
    }

    /// # Errors
    ///
    /// See [`LogsicleClient::new`].
    pub fn build(self) -> Result<LogsicleClient, ClientError> {
        self.config.validate()?;

        let dispatcher: Arc<dyn Dispatcher> = match self.dispatcher {
            Some(dispatcher) => dispatcher,
            None => Arc::new(HttpDispatcher::new(&self.config)?),
        };
        let resolver = self.hostname_resolver.unwrap_or_else(default_resolver);
        let hostname = resolver();

        let queue = Arc::new(QueueManager::start(&self.config, dispatcher)?);
        let config = Arc::new(self.config);
        let ctx = TransportContext::new(Arc::clone(&config), Arc::clone(&queue), &hostname);
        debug!(
            "LOGSICLE | Client started for project {} on host {}",
            config.project_id, hostname
        );

        Ok(LogsicleClient {
            app: AppStructuredLogTransport::new(ctx.clone()),
            event: EventTransport::new(ctx.clone()),
            request: RequestTransport::new(ctx.clone()),
            metric: MetricTransport::new(ctx),
            config,
            queue,
        })
    }
}

impl std::fmt::Debug for LogsicleClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogsicleClientBuilder")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher.is_some())
            .field("hostname_resolver", &self.hostname_resolver.is_some())
            .finish()
    }
}
