use crate::record::LogRecord;
use async_trait::async_trait;
use std::error::Error;

/// Asynchronous destination for [`LogRecord`]s produced by an
/// [`EventLog`](crate::event_log::EventLog).
///
/// A single sink is shared by every emitter in the process, so
/// implementations must be safe for concurrent use. The dispatcher calls
/// `send` from a background task and never awaits it on the emitting
/// thread.
///
/// Fatal records: the core never terminates the process itself. A sink
/// that receives a record with [`Level::Fatal`](crate::record::Level::Fatal)
/// owns that decision (see [`StdoutSink`](crate::stdout_sink::StdoutSink)).
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Send a single log record to the underlying writer.
    ///
    /// **Parameters**
    /// - `record`: fully-built [`LogRecord`].
    ///
    /// **Returns**
    /// - `Ok(())` if the record was accepted.
    /// - `Err(..)` if the writer failed. The dispatcher treats this as a
    ///   transient failure and retries the batch with backoff.
    async fn send(&self, record: &LogRecord) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Flush any buffered records, if the writer buffers.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
