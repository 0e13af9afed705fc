//! Tracing formatter and subscriber setup for the SDK's own diagnostics.
//!
//! Lines look like:
//! ```text
//! LOGSICLE | WARN | Queue full, dropped oldest app record
//! LOGSICLE | DEBUG | flush{pending=3}: Sending batch items=3
//! ```
//!
//! The library only emits `tracing` events. Hosts that already install a subscriber need none of
//! this; [`init`] is for binaries that want the SDK's format.

use std::error::Error;
use std::fmt;

use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

pub const LOG_PREFIX: &str = "LOGSICLE";

/// Noisy transport crates are silenced regardless of the requested level.
const BASE_FILTER: &str = "h2=off,hyper=off,rustls=off,reqwest=warn";

/// Prefixes every line with `LOGSICLE | LEVEL |` followed by the active spans.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "{} | {} | ", LOG_PREFIX, event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Builds the filter for `log_level`, e.g. `"debug"` or `"logsicle=trace"`.
///
/// # Errors
///
/// Fails when `log_level` is not a valid filter directive.
pub fn env_filter(log_level: &str) -> Result<EnvFilter, tracing_subscriber::filter::ParseError> {
    EnvFilter::try_new(format!("{BASE_FILTER},{}", log_level.to_lowercase()))
}

/// Installs a global subscriber using [`Formatter`].
///
/// # Errors
///
/// Fails when the level cannot be parsed or a global subscriber is already set.
pub fn init(log_level: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(log_level)?)
        .event_format(Formatter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
