//! Relational-database query tracer.
//!
//! The database layer reports every finished query through
//! [`QueryTracer::trace`]; the tracer decides whether it is worth a record
//! and at which severity:
//!
//! | condition                                               | record              |
//! |---------------------------------------------------------|---------------------|
//! | level is `Silent`                                       | none                |
//! | error, level ≥ `Error`, not a suppressed "not found"    | error `query_error` |
//! | elapsed > threshold, threshold ≠ 0, level ≥ `Warn`      | warn `warn_slow_query` |
//! | level is `Info`                                         | info `query_info`   |
//! | otherwise                                               | none                |
//!
//! Rows affected of `-1` means "unknown" and is rendered as `"-"`.

use crate::fields;
use crate::event_log::EventLog;
use crate::logger::Logger;
use crate::record::Level;
use crate::tracker;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::error::Error;
use std::panic::Location;
use std::time::Duration;

/// Default event name of query records.
pub const QUERY_EVENT: &str = "GORM_QUERY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Silent = 1,
    Error,
    Warn,
    Info,
}

#[derive(Debug, Clone)]
pub struct TracerConfig {
    /// `Duration::ZERO` disables slow-query warnings.
    pub slow_threshold: Duration,
    pub ignore_record_not_found: bool,
    pub level: LogLevel,
    pub event: String,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            slow_threshold: Duration::from_secs(5),
            ignore_record_not_found: false,
            level: LogLevel::Warn,
            event: QUERY_EVENT.to_string(),
        }
    }
}

/// Classification of one traced query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryClass {
    Error,
    SlowWarning,
    RoutineInfo,
}

/// The "no row matched" outcome of a lookup.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[error("record not found")]
pub struct RecordNotFound;

/// Whether `err`, or anything in its source chain, is a "not found".
pub fn is_record_not_found(err: &(dyn Error + 'static)) -> bool {
    let mut current: Option<&(dyn Error + 'static)> = Some(err);
    while let Some(e) = current {
        if e.is::<RecordNotFound>() {
            return true;
        }
        #[cfg(feature = "sqlx")]
        if matches!(e.downcast_ref::<sqlx::Error>(), Some(sqlx::Error::RowNotFound)) {
            return true;
        }
        current = e.source();
    }
    false
}

#[derive(Clone)]
pub struct QueryTracer {
    logger: Logger,
    config: TracerConfig,
}

impl QueryTracer {
    pub fn new(logger: Logger, config: TracerConfig) -> Self {
        Self { logger, config }
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// Copy of this tracer running at `level`.
    pub fn log_mode(&self, level: LogLevel) -> Self {
        let mut tracer = self.clone();
        tracer.config.level = level;
        tracer
    }

    #[track_caller]
    pub fn info(&self, message: &str) {
        if self.config.level >= LogLevel::Info {
            self.log().info(message);
        }
    }

    #[track_caller]
    pub fn warn(&self, message: &str) {
        if self.config.level >= LogLevel::Warn {
            self.log().warn(message);
        }
    }

    #[track_caller]
    pub fn error(&self, message: &str, err: &dyn std::fmt::Display) {
        if self.config.level >= LogLevel::Error {
            self.log().error(message, err);
        }
    }

    /// Classify a finished query and emit at most one record for it.
    ///
    /// `fc` yields `(sql, rows_affected)` and is only called when a record
    /// is actually emitted.
    #[track_caller]
    pub fn trace<F>(
        &self,
        begin: DateTime<Utc>,
        fc: F,
        err: Option<&(dyn Error + 'static)>,
    ) -> Option<QueryClass>
    where
        F: FnOnce() -> (String, i64),
    {
        let location = Location::caller();
        let level = self.config.level;
        if level <= LogLevel::Silent {
            return None;
        }

        let elapsed = (Utc::now() - begin).to_std().unwrap_or_default();
        let slow = !self.config.slow_threshold.is_zero() && elapsed > self.config.slow_threshold;

        let class = match err {
            Some(e)
                if level >= LogLevel::Error
                    && !(self.config.ignore_record_not_found && is_record_not_found(e)) =>
            {
                QueryClass::Error
            }
            _ if slow && level >= LogLevel::Warn => QueryClass::SlowWarning,
            _ if level == LogLevel::Info => QueryClass::RoutineInfo,
            _ => return None,
        };

        let (sql, rows) = fc();
        let rows = if rows == -1 { Value::from("-") } else { Value::from(rows) };
        let data = fields! { "rows" => rows, "query" => sql };

        let mut log = self.log();
        log.set_timer_start(begin);
        let record = match (class, err) {
            (QueryClass::Error, Some(e)) => {
                log.build(Level::Error, "query_error", data.into(), Some(&e), location)
            }
            (QueryClass::SlowWarning, _) => {
                log.build(Level::Warn, "warn_slow_query", data.into(), None, location)
            }
            _ => log.build(Level::Info, "query_info", data.into(), None, location),
        };
        self.logger.emit(record);

        Some(class)
    }

    fn log(&self) -> EventLog {
        let mut log = self.logger.event(self.config.event.clone());
        log.set_tracker_id(tracker::current());
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::LoggerConfig;
    use crate::memory_sink::MemorySink;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(thiserror::Error, Debug)]
    #[error("lookup failed")]
    struct Wrapped(#[source] RecordNotFound);

    #[derive(thiserror::Error, Debug)]
    #[error("connection reset")]
    struct ConnectionReset;

    fn tracer(sink: &MemorySink, config: TracerConfig) -> QueryTracer {
        let logger_config = LoggerConfig { mirror_to_tracing: false, ..LoggerConfig::default() };
        QueryTracer::new(Logger::new(Arc::new(sink.clone()), logger_config), config)
    }

    fn long_ago() -> DateTime<Utc> {
        Utc::now() - chrono::Duration::seconds(10)
    }

    fn query() -> (String, i64) {
        ("SELECT * FROM users".to_string(), -1)
    }

    #[tokio::test]
    async fn error_wins_over_slow_warning() {
        let sink = MemorySink::new();
        let t = tracer(&sink, TracerConfig::default());

        let class = t.trace(long_ago(), query, Some(&ConnectionReset));
        assert_eq!(class, Some(QueryClass::Error));
        t.logger.flush().await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, Level::Error);
        assert_eq!(records[0].message, "query_error");
        assert_eq!(records[0].error, "connection reset");
        assert_eq!(records[0].data["general"], json!({ "rows": "-", "query": "SELECT * FROM users" }));
        assert!(records[0].processing_time >= 10_000);
    }

    #[tokio::test]
    async fn not_found_is_suppressed_only_when_configured() {
        let sink = MemorySink::new();
        let suppressing = tracer(&sink, TracerConfig { ignore_record_not_found: true, ..TracerConfig::default() });
        assert_eq!(suppressing.trace(Utc::now(), query, Some(&Wrapped(RecordNotFound))), None);

        let strict = tracer(&sink, TracerConfig::default());
        assert_eq!(strict.trace(Utc::now(), query, Some(&RecordNotFound)), Some(QueryClass::Error));

        strict.logger.flush().await;
        suppressing.logger.flush().await;
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn slow_queries_warn_and_fast_ones_pass_silently() {
        let sink = MemorySink::new();
        let t = tracer(&sink, TracerConfig::default());

        let called = std::cell::Cell::new(false);
        let fast = t.trace(Utc::now(), || { called.set(true); query() }, None);
        assert_eq!(fast, None);
        assert!(!called.get());

        let slow = t.trace(long_ago(), || ("UPDATE t SET a = 1".to_string(), 3), None);
        assert_eq!(slow, Some(QueryClass::SlowWarning));

        t.logger.flush().await;
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "warn_slow_query");
        assert_eq!(records[0].data["general"]["rows"], json!(3));
    }

    #[tokio::test]
    async fn levels_gate_classification() {
        let sink = MemorySink::new();
        let t = tracer(&sink, TracerConfig::default());

        assert_eq!(t.log_mode(LogLevel::Silent).trace(long_ago(), query, Some(&ConnectionReset)), None);
        assert_eq!(t.log_mode(LogLevel::Info).trace(Utc::now(), query, None), Some(QueryClass::RoutineInfo));
        assert_eq!(t.log_mode(LogLevel::Error).trace(long_ago(), query, None), None);

        let no_threshold = tracer(&sink, TracerConfig { slow_threshold: Duration::ZERO, ..TracerConfig::default() });
        assert_eq!(no_threshold.trace(long_ago(), query, None), None);

        t.logger.flush().await;
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "query_info");
        assert_eq!(records[0].event, QUERY_EVENT);
    }

    #[tokio::test]
    async fn tracker_id_comes_from_the_enclosing_scope() {
        let sink = MemorySink::new();
        let t = tracer(&sink, TracerConfig::default());

        tracker::scope(tracker::TrackerId::new("req-1"), async {
            t.trace(Utc::now(), query, Some(&ConnectionReset));
        })
        .await;

        t.logger.flush().await;
        assert_eq!(sink.records()[0].tracker_id, "req-1");
        assert!(sink.records()[0].caller.starts_with("query_tracer.rs:"));
    }

    #[test]
    fn not_found_is_found_through_the_source_chain() {
        assert!(is_record_not_found(&RecordNotFound));
        assert!(is_record_not_found(&Wrapped(RecordNotFound)));
        assert!(!is_record_not_found(&ConnectionReset));
    }
}
