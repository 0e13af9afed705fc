//! Forwards stdin to Logsicle, one application log per non-empty line.
//!
//! Besides the client's own `LOGSICLE_*` settings (and `logsicle.yaml`), the binary reads:
//!
//! - `LOGSICLE_LOG_LEVEL`: filter for the SDK's own diagnostics, default `info`
//! - `LOGSICLE_CLI_LEVEL`: level the lines are sent at, default `info`
//! - `LOGSICLE_CONFIG_DIR`: directory holding `logsicle.yaml`, default the working directory
//!
//! The client is flushed and stopped on end of input or Ctrl-C.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::path::PathBuf;

use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use logsicle::transport::AppLogOptions;
use logsicle::{config, logger, Level, LogsicleClient, QueueEvent};

const DEFAULT_LOG_LEVEL: &str = "info";

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOGSICLE_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());
    if let Err(e) = logger::init(&log_level) {
        eprintln!("LOGSICLE | Failed to set up logging: {e}");
        return;
    }

    let line_level = match env::var("LOGSICLE_CLI_LEVEL") {
        Ok(val) => val.parse::<Level>().unwrap_or_else(|e| {
            warn!("{e}, sending lines at info");
            Level::Info
        }),
        Err(_) => Level::Info,
    };

    let config_directory = env::var("LOGSICLE_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    let config = config::get_config(&config_directory);

    let client = match LogsicleClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            error!("Unable to start Logsicle client: {e}");
            return;
        }
    };

    let mut events = client.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(QueueEvent::BatchProcessed {
                    resource_type,
                    count,
                    retries,
                }) => debug!("Delivered {count} {resource_type} records ({retries} retries)"),
                Ok(QueueEvent::ItemDropped {
                    resource_type,
                    reason,
                }) => warn!("Dropped {resource_type} record: {reason}"),
                Ok(QueueEvent::Error { message }) => error!("{message}"),
                Err(RecvError::Lagged(skipped)) => debug!("Missed {skipped} queue events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    info!(
        "Forwarding stdin to project {} as {} logs",
        client.config().project_id,
        line_level
    );

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !line.trim().is_empty() {
                        client.app.log(line_level, line, AppLogOptions::default());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read stdin: {e}");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted, shutting down");
                break;
            }
        }
    }

    if let Err(e) = client.shutdown().await {
        error!("Shutdown did not complete cleanly: {e}");
    }
}
