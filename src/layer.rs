use crate::dispatch::DISPATCH_TARGET;
use crate::logger::{Logger, MIRROR_TARGET};
use crate::record::{Level as RecordLevel, Payload};
use crate::tracker;
use serde_json::{Map, Value};
use std::panic::Location;
use std::path::Path;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Event name of records bridged from `tracing`.
pub const TRACING_EVENT: &str = "TRACING_EVENT";

/// `tracing_subscriber` layer that turns the host application's `tracing`
/// events into records emitted through a [`Logger`].
///
/// Only events at or above `min_level` (default `ERROR`) are captured.
/// Mirrored records and the dispatcher's own diagnostics are skipped, so
/// nothing this crate logs comes back as a new record.
pub struct EventLogLayer {
    logger: Logger,
    min_level: Level,
}

impl EventLogLayer {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            min_level: Level::ERROR,
        }
    }

    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }
}

impl<S> Layer<S> for EventLogLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        // tracing orders levels by verbosity: ERROR is the smallest.
        if *meta.level() > self.min_level || is_internal(meta.target()) {
            return;
        }

        let mut fields = Map::new();
        let mut message = None;
        event.record(&mut FieldVisitor { fields: &mut fields, message: &mut message });

        let error = match fields.remove("error") {
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
            None => None,
        };
        fields.insert("target".into(), Value::from(meta.target()));

        let level = match *meta.level() {
            Level::ERROR => RecordLevel::Error,
            Level::WARN => RecordLevel::Warn,
            _ => RecordLevel::Info,
        };

        let mut log = self.logger.event(TRACING_EVENT);
        log.set_tracker_id(tracker::current());
        if let (Some(file), Some(line)) = (meta.file(), meta.line()) {
            let file = Path::new(file).file_name().map(|f| f.to_string_lossy()).unwrap_or_default();
            log.set_caller(format!("{}:{}", file, line));
        }

        let record = log.build(
            level,
            message.as_deref().unwrap_or_default(),
            Payload::Raw(fields),
            error.as_ref().map(|e| e as &dyn std::fmt::Display),
            Location::caller(),
        );
        self.logger.emit(record);
    }
}

fn is_internal(target: &str) -> bool {
    target == MIRROR_TARGET || target.starts_with(DISPATCH_TARGET)
}

struct FieldVisitor<'a> {
    fields: &'a mut Map<String, Value>,
    message: &'a mut Option<String>,
}

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), Value::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), Value::String(format!("{:?}", value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::LoggerConfig;
    use crate::memory_sink::MemorySink;
    use serde_json::json;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    #[tokio::test]
    async fn error_events_become_records() {
        let sink = MemorySink::new();
        let config = LoggerConfig { mirror_to_tracing: false, ..LoggerConfig::default() };
        let logger = Logger::new(Arc::new(sink.clone()), config);
        let subscriber = tracing_subscriber::registry().with(EventLogLayer::new(logger.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("below the threshold");
            tracing::error!(order_id = 42, error = "card declined", "payment failed");
            tracing::error!(target: "event_log::mirror", "mirrored");
        });
        logger.flush().await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.event, TRACING_EVENT);
        assert_eq!(record.level, RecordLevel::Error);
        assert_eq!(record.message, "payment failed");
        assert_eq!(record.error, "card declined");
        assert_eq!(record.data["general"]["order_id"], json!(42));
        assert!(record.caller.starts_with("layer.rs:"));
    }

    #[tokio::test]
    async fn threshold_can_be_lowered() {
        let sink = MemorySink::new();
        let config = LoggerConfig { mirror_to_tracing: false, ..LoggerConfig::default() };
        let logger = Logger::new(Arc::new(sink.clone()), config);
        let layer = EventLogLayer::new(logger.clone()).with_min_level(Level::WARN);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("disk almost full");
            tracing::debug!("ignored");
        });
        logger.flush().await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, RecordLevel::Warn);
        assert_eq!(records[0].error, "");
    }
}
