use crate::dispatch::{DispatchSnapshot, Dispatcher};
use crate::event_log::EventLog;
use crate::init::LoggerConfig;
use crate::record::{Level, LogRecord};
use crate::sink::LogSink;
use std::sync::Arc;

/// `tracing` target used when records are mirrored to the console.
pub const MIRROR_TARGET: &str = "event_log::mirror";

/// Handle to the process's structured-log sink.
///
/// Built once at the composition root and passed to every adapter; clones
/// share the same dispatcher. Safe to use from many tasks at once.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

struct Inner {
    app: String,
    dispatcher: Dispatcher,
    mirror: bool,
}

impl Logger {
    /// Create a logger and spawn its dispatch worker on the current Tokio
    /// runtime.
    pub fn new(sink: Arc<dyn LogSink>, config: LoggerConfig) -> Self {
        let (dispatcher, _handle) = Dispatcher::new(
            sink,
            config.channel_buffer,
            config.batch_size,
            config.flush_interval,
            config.retry_limit,
        );

        Self {
            inner: Arc::new(Inner {
                app: config.app_name,
                dispatcher,
                mirror: config.mirror_to_tracing,
            }),
        }
    }

    /// Identity name stamped into every record.
    pub fn app(&self) -> &str {
        &self.inner.app
    }

    /// Start a new [`EventLog`] for one unit of work.
    pub fn event(&self, name: impl Into<String>) -> EventLog {
        EventLog::new(self.clone(), name)
    }

    /// Hand a fully built record to the sink, unmodified.
    pub fn emit(&self, record: LogRecord) {
        if self.inner.mirror {
            mirror(&record);
        }
        self.inner.dispatcher.dispatch(record);
    }

    /// Hand a record to the sink and wait until the sink has accepted it,
    /// along with everything emitted before it.
    pub async fn emit_and_flush(&self, record: LogRecord) {
        if self.inner.mirror {
            mirror(&record);
        }
        self.inner.dispatcher.dispatch_wait(record).await;
        self.inner.dispatcher.flush().await;
    }

    /// Wait until every record emitted so far has reached the sink.
    pub async fn flush(&self) {
        self.inner.dispatcher.flush().await;
    }

    pub fn stats(&self) -> DispatchSnapshot {
        self.inner.dispatcher.snapshot()
    }
}

fn mirror(record: &LogRecord) {
    macro_rules! mirror_at {
        ($level:expr) => {
            tracing::event!(
                target: MIRROR_TARGET,
                $level,
                event = %record.event,
                tracker_id = %record.tracker_id,
                caller = %record.caller,
                processing_time = record.processing_time,
                error = %record.error,
                "{}",
                record.message
            )
        };
    }

    match record.level {
        Level::Info => mirror_at!(tracing::Level::INFO),
        Level::Warn => mirror_at!(tracing::Level::WARN),
        Level::Error | Level::Fatal => mirror_at!(tracing::Level::ERROR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noop_sink::NoopSink;

    #[tokio::test]
    async fn clones_share_one_dispatcher() {
        let sink = NoopSink::new();
        let config = LoggerConfig { mirror_to_tracing: false, ..LoggerConfig::default() }
            .with_app_name("svc");
        let logger = Logger::new(Arc::new(sink.clone()), config);
        let other = logger.clone();

        logger.event("A").info("one");
        other.event("B").warn("two");
        other.flush().await;

        assert_eq!(logger.app(), "svc");
        assert_eq!(sink.discarded(), 2);
        let stats = logger.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.dropped, 0);
    }

    #[tokio::test]
    async fn concurrent_emitters_all_reach_the_sink() {
        let sink = NoopSink::new();
        let config = LoggerConfig { mirror_to_tracing: false, ..LoggerConfig::default() };
        let logger = Logger::new(Arc::new(sink.clone()), config);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let logger = logger.clone();
                tokio::spawn(async move {
                    let mut log = logger.event(format!("TASK_{}", i));
                    for _ in 0..10 {
                        log.info("tick");
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        logger.flush().await;

        assert_eq!(sink.discarded(), 80);
    }
}
