use crate::record::{Level, LogRecord};
use crate::sink::LogSink;
use async_trait::async_trait;
use std::error::Error;
use std::io::Write;

/// Writes every record as one JSON line on stdout.
///
/// After a [`Level::Fatal`] record has been written and flushed the
/// process exits with status 1, unless [`StdoutSink::exit_on_fatal`] turned
/// that off.
#[derive(Clone, Debug)]
pub struct StdoutSink {
    exit_on_fatal: bool,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self { exit_on_fatal: true }
    }

    pub fn exit_on_fatal(mut self, enabled: bool) -> Self {
        self.exit_on_fatal = enabled;
        self
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogSink for StdoutSink {
    async fn send(&self, record: &LogRecord) -> Result<(), Box<dyn Error + Send + Sync>> {
        let line = serde_json::to_string(record)? + "\n";

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        out.write_all(line.as_bytes())?;

        if record.level == Level::Fatal {
            out.flush()?;
            if self.exit_on_fatal {
                std::process::exit(1);
            }
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        std::io::stdout().lock().flush()?;
        Ok(())
    }
}
