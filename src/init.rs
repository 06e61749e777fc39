use crate::appname::app_name;
use crate::env::{
    env_parse_or, EVENT_LOG_BATCH_SIZE_ENV, EVENT_LOG_CHANNEL_BUFFER_ENV,
    EVENT_LOG_FLUSH_INTERVAL_MS_ENV, EVENT_LOG_MIRROR_ENV, EVENT_LOG_RETRY_LIMIT_ENV,
};
use crate::logger::Logger;
use crate::sink::LogSink;
use std::sync::Arc;
use tokio::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Configuration of a [`Logger`].
///
/// **Fields**
/// - `app_name`: identity stamped into the `app` field of every record and
///   used to derive the inbound timing header names.
/// - `channel_buffer`: maximum number of records queued before new ones
///   are dropped.
/// - `batch_size`: number of records sent to the sink per batch.
/// - `flush_interval`: maximum interval between flushes even when the
///   batch is not full.
/// - `retry_limit`: send attempts per batch before it is dropped.
/// - `mirror_to_tracing`: if `true`, every record is also emitted as a
///   `tracing` event so a console subscriber shows it.
#[derive(Clone, Debug)]
pub struct LoggerConfig {
    pub app_name: String,
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub retry_limit: usize,
    pub mirror_to_tracing: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            app_name: app_name(),
            channel_buffer: 1024,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
            retry_limit: 5,
            mirror_to_tracing: true,
        }
    }
}

impl LoggerConfig {
    /// Defaults overridden by the `EVENT_LOG_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            app_name: defaults.app_name,
            channel_buffer: env_parse_or(EVENT_LOG_CHANNEL_BUFFER_ENV, defaults.channel_buffer),
            batch_size: env_parse_or(EVENT_LOG_BATCH_SIZE_ENV, defaults.batch_size),
            flush_interval: Duration::from_millis(env_parse_or(
                EVENT_LOG_FLUSH_INTERVAL_MS_ENV,
                defaults.flush_interval.as_millis() as u64,
            )),
            retry_limit: env_parse_or(EVENT_LOG_RETRY_LIMIT_ENV, defaults.retry_limit),
            mirror_to_tracing: env_parse_or(EVENT_LOG_MIRROR_ENV, defaults.mirror_to_tracing),
        }
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }
}

/// Build a [`Logger`] over `sink` with the provided [`LoggerConfig`].
///
/// Must be called from within a Tokio runtime: the dispatch worker is
/// spawned onto it.
pub fn init_logger_with_config(sink: Arc<dyn LogSink>, config: LoggerConfig) -> Logger {
    Logger::new(sink, config)
}

/// Build a [`Logger`] with [`LoggerConfig::from_env`].
///
/// This is the recommended entrypoint for typical services.
pub fn init_logger(sink: Arc<dyn LogSink>) -> Logger {
    init_logger_with_config(sink, LoggerConfig::from_env())
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Install a console `tracing` subscriber as the global default.
///
/// `RUST_LOG` wins over `default_filter` when set. Records mirrored by a
/// [`Logger`] and the crate's own diagnostics show up through it.
pub fn init_console_tracing(default_filter: &str) -> Result<(), InitError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)?,
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
