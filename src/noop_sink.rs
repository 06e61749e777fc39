use crate::record::LogRecord;
use crate::sink::LogSink;
use async_trait::async_trait;
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Discards every record, keeping only a count.
///
/// For services that run the adapters without a log destination, and for
/// measuring dispatch overhead without I/O.
#[derive(Clone, Default)]
pub struct NoopSink {
    discarded: Arc<AtomicU64>,
}

impl NoopSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records received so far.
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LogSink for NoopSink {
    async fn send(&self, _record: &LogRecord) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.discarded.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
