//! Per-unit-of-work event records.
//!
//! An [`EventLog`] is created once per request, query or outbound call,
//! owned by that unit of work, and emits any number of records. Each
//! emission measures elapsed time against the current timing anchor and
//! then clears any explicit anchor, so the next emission falls back to the
//! creation time unless it is re-anchored first.

use crate::logger::Logger;
use crate::record::{Level, LogRecord, Payload};
use chrono::{DateTime, Utc};
use std::fmt::Display;
use std::future::Future;
use std::panic::Location;
use std::path::Path;

pub struct EventLog {
    logger: Logger,
    event: String,
    tracker_id: String,
    caller: Option<String>,
    default_timer_start: DateTime<Utc>,
    timer_start: Option<DateTime<Utc>>,
}

impl EventLog {
    pub fn new(logger: Logger, event: impl Into<String>) -> Self {
        Self {
            logger,
            event: event.into(),
            tracker_id: String::new(),
            caller: None,
            default_timer_start: Utc::now(),
            timer_start: None,
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn tracker_id(&self) -> &str {
        &self.tracker_id
    }

    pub fn set_tracker_id(&mut self, tracker_id: impl Into<String>) {
        self.tracker_id = tracker_id.into();
    }

    /// Report `caller` verbatim instead of the emission call site.
    pub fn set_caller(&mut self, caller: impl Into<String>) {
        self.caller = Some(caller.into());
    }

    /// Re-anchor timing to now.
    pub fn timer_start(&mut self) {
        self.timer_start = Some(Utc::now());
    }

    /// Re-anchor timing to an instant captured before this log existed.
    pub fn set_timer_start(&mut self, start: DateTime<Utc>) {
        self.timer_start = Some(start);
    }

    /// Build the record for one emission.
    ///
    /// Consumes the explicit timing anchor: elapsed time is measured from
    /// it when set, from the creation time otherwise, and the anchor is
    /// cleared afterwards.
    pub fn build(
        &mut self,
        level: Level,
        message: &str,
        data: Payload,
        err: Option<&dyn Display>,
        location: &Location<'_>,
    ) -> LogRecord {
        let caller = match &self.caller {
            Some(caller) => caller.clone(),
            None => format_location(location),
        };

        let start = self.timer_start.take().unwrap_or(self.default_timer_start);
        let end = Utc::now();

        LogRecord {
            timestamp: end,
            level,
            message: message.to_string(),
            app: self.logger.app().to_string(),
            event: self.event.clone(),
            tracker_id: self.tracker_id.clone(),
            caller,
            timer_start: start,
            timer_end: end,
            processing_time: (end - start).num_milliseconds(),
            data: data.into_data(),
            error: err.map(|e| e.to_string()).unwrap_or_default(),
        }
    }

    fn emit(&mut self, level: Level, message: &str, data: Payload, err: Option<&dyn Display>, location: &Location<'_>) {
        let record = self.build(level, message, data, err, location);
        self.logger.emit(record);
    }

    #[track_caller]
    pub fn info(&mut self, message: &str) {
        self.emit(Level::Info, message, Payload::empty(), None, Location::caller());
    }

    #[track_caller]
    pub fn info_with_data(&mut self, message: &str, data: impl Into<Payload>) {
        self.emit(Level::Info, message, data.into(), None, Location::caller());
    }

    #[track_caller]
    pub fn warn(&mut self, message: &str) {
        self.emit(Level::Warn, message, Payload::empty(), None, Location::caller());
    }

    #[track_caller]
    pub fn warn_with_data(&mut self, message: &str, data: impl Into<Payload>) {
        self.emit(Level::Warn, message, data.into(), None, Location::caller());
    }

    #[track_caller]
    pub fn error(&mut self, message: &str, err: &dyn Display) {
        self.emit(Level::Error, message, Payload::empty(), Some(err), Location::caller());
    }

    #[track_caller]
    pub fn error_with_data(&mut self, message: &str, data: impl Into<Payload>, err: &dyn Display) {
        self.emit(Level::Error, message, data.into(), Some(err), Location::caller());
    }

    /// Emit at fatal severity and wait until the sink has accepted the
    /// record.
    ///
    /// Callers must not continue past the `.await`: a fatal record marks
    /// the end of the process. Whether the process actually stops is the
    /// sink's decision (see [`StdoutSink`](crate::stdout_sink::StdoutSink)).
    #[track_caller]
    pub fn fatal(&mut self, message: &str, err: &dyn Display) -> impl Future<Output = ()> + Send + 'static {
        self.emit_fatal(message, Payload::empty(), err, Location::caller())
    }

    #[track_caller]
    pub fn fatal_with_data(
        &mut self,
        message: &str,
        data: impl Into<Payload>,
        err: &dyn Display,
    ) -> impl Future<Output = ()> + Send + 'static {
        self.emit_fatal(message, data.into(), err, Location::caller())
    }

    // Built eagerly: caller and elapsed time belong to the call, not the poll.
    fn emit_fatal(
        &mut self,
        message: &str,
        data: Payload,
        err: &dyn Display,
        location: &Location<'_>,
    ) -> impl Future<Output = ()> + Send + 'static {
        let record = self.build(Level::Fatal, message, data, Some(err), location);
        let logger = self.logger.clone();
        async move { logger.emit_and_flush(record).await }
    }
}

/// `file:line` with the file reduced to its base name.
pub fn format_location(location: &Location<'_>) -> String {
    let file = Path::new(location.file())
        .file_name()
        .map(|f| f.to_string_lossy())
        .unwrap_or_default();
    format!("{}:{}", file, location.line())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::LoggerConfig;
    use crate::memory_sink::MemorySink;
    use chrono::Duration;
    use serde_json::json;
    use std::sync::Arc;

    fn logger(sink: &MemorySink) -> Logger {
        let config = LoggerConfig { mirror_to_tracing: false, ..LoggerConfig::default() }
            .with_app_name("event-log-test");
        Logger::new(Arc::new(sink.clone()), config)
    }

    #[tokio::test]
    async fn processing_time_follows_the_anchor_and_resets() {
        let sink = MemorySink::new();
        let mut log = logger(&sink).event("PHASED");
        let created = log.default_timer_start;

        // No anchor: measured from creation.
        let first = log.build(Level::Info, "first", Payload::empty(), None, Location::caller());
        assert_eq!(first.timer_start, created);

        // Explicit anchor 300ms in the past.
        let anchor = Utc::now() - Duration::milliseconds(300);
        log.set_timer_start(anchor);
        let second = log.build(Level::Info, "second", Payload::empty(), None, Location::caller());
        assert_eq!(second.timer_start, anchor);
        assert!(second.processing_time >= 300);
        assert!(second.processing_time < 300 + 1_000);

        // Anchor consumed: back to creation time.
        let third = log.build(Level::Info, "third", Payload::empty(), None, Location::caller());
        assert_eq!(third.timer_start, created);
        assert_eq!(third.processing_time, (third.timer_end - created).num_milliseconds());
    }

    #[tokio::test]
    async fn processing_time_is_truncated_not_rounded() {
        let sink = MemorySink::new();
        let mut log = logger(&sink).event("TRUNC");
        log.set_timer_start(Utc::now() - Duration::microseconds(1_999));
        let record = log.build(Level::Info, "m", Payload::empty(), None, Location::caller());
        assert!(record.processing_time >= 1);
        assert_eq!(record.processing_time, (record.timer_end - record.timer_start).num_milliseconds());
    }

    #[tokio::test]
    async fn emission_reports_call_site_unless_overridden() {
        let sink = MemorySink::new();
        let logger = logger(&sink);
        let mut log = logger.event("CALLER");

        let line = line!() + 1;
        log.info("here");
        log.set_caller("query.rs:42");
        log.warn("there");
        logger.flush().await;

        let records = sink.records();
        assert_eq!(records[0].caller, format!("event_log.rs:{}", line));
        assert_eq!(records[1].caller, "query.rs:42");
    }

    #[tokio::test]
    async fn schema_is_stable_for_empty_data_and_error() {
        let sink = MemorySink::new();
        let logger = logger(&sink);
        let mut log = logger.event("SCHEMA");
        log.set_tracker_id("abc-123");

        log.info("plain");
        log.error_with_data("failed", crate::fields! { "id" => 7 }, &"boom");
        logger.flush().await;

        let records = sink.records();
        let plain = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(plain["data"], json!({}));
        assert_eq!(plain["error"], json!(""));
        assert_eq!(plain["tracker_id"], json!("abc-123"));
        assert_eq!(plain["app"], json!("event-log-test"));

        let failed = &records[1];
        assert_eq!(failed.level, Level::Error);
        assert_eq!(failed.error, "boom");
        assert_eq!(json!(failed.data), json!({ "general": { "id": 7 } }));
    }

    #[tokio::test]
    async fn every_severity_reaches_the_sink_unmodified() {
        let sink = MemorySink::new();
        let logger = logger(&sink);
        let mut log = logger.event("LEVELS");

        log.info("i");
        log.warn_with_data("w", Payload::network(crate::fields! { "method" => "GET" }));
        log.error("e", &"err");
        log.fatal("f", &"fatal err").await;

        let levels: Vec<_> = sink.records().iter().map(|r| r.level).collect();
        assert_eq!(levels, vec![Level::Info, Level::Warn, Level::Error, Level::Fatal]);
        assert_eq!(json!(sink.records()[1].data), json!({ "net": { "method": "GET" } }));
    }

    #[tokio::test]
    async fn fatal_returns_only_after_the_sink_holds_the_record() {
        let sink = MemorySink::new();
        let config = LoggerConfig {
            mirror_to_tracing: false,
            flush_interval: std::time::Duration::from_secs(3600),
            ..LoggerConfig::default()
        };
        let mut log = Logger::new(Arc::new(sink.clone()), config).event("SHUTDOWN");

        log.info("still fine");
        let line = line!() + 1;
        log.fatal_with_data("cannot continue", crate::fields! { "db" => "primary" }, &"db gone").await;

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].level, Level::Fatal);
        assert_eq!(records[1].error, "db gone");
        assert_eq!(records[1].caller, format!("event_log.rs:{}", line));
    }
}
