//! Environment variable names used by this crate for convenient
//! configuration of the [`Logger`](crate::logger::Logger) from services.
//!
//! These are purely helpers; the core types remain decoupled from
//! environment access.

/// Overrides the identity name stamped on every record.
pub const EVENT_LOG_APP_NAME_ENV: &str = "EVENT_LOG_APP_NAME";

/// Capacity of the dispatch channel.
pub const EVENT_LOG_CHANNEL_BUFFER_ENV: &str = "EVENT_LOG_CHANNEL_BUFFER";

/// Number of records sent to the sink per batch.
pub const EVENT_LOG_BATCH_SIZE_ENV: &str = "EVENT_LOG_BATCH_SIZE";

/// Maximum time between flushes, in milliseconds.
pub const EVENT_LOG_FLUSH_INTERVAL_MS_ENV: &str = "EVENT_LOG_FLUSH_INTERVAL_MS";

/// Attempts per batch before a failing sink's batch is dropped.
pub const EVENT_LOG_RETRY_LIMIT_ENV: &str = "EVENT_LOG_RETRY_LIMIT";

/// `true`/`false`: mirror records as `tracing` events.
pub const EVENT_LOG_MIRROR_ENV: &str = "EVENT_LOG_MIRROR";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read and parse an environment variable, falling back to `default` when
/// it is unset or does not parse.
pub fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
