pub mod record;
pub mod sink;
pub mod noop_sink;
pub mod stdout_sink;
pub mod memory_sink;
pub mod dispatch;

pub mod logger;
pub mod event_log;
pub mod tracker;

pub mod appname;
pub mod env;
pub mod init;
pub mod layer;

pub mod dump;
pub mod xml;
pub mod outbound;
pub mod inbound;
pub mod query_tracer;
pub mod command_monitor;

pub use event_log::EventLog;
pub use init::{init_console_tracing, init_logger, init_logger_with_config, LoggerConfig};
pub use logger::Logger;
pub use record::{Level, LogRecord, Payload};
pub use sink::LogSink;
pub use tracker::TrackerId;
