use crate::record::LogRecord;
use crate::sink::LogSink;
use std::error::Error;
use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};

/// `tracing` target of the dispatcher's own diagnostics.
pub const DISPATCH_TARGET: &str = "event_log::dispatch";

enum Command {
    Record(LogRecord),
    Flush(oneshot::Sender<()>),
}

/// Counters maintained by a [`Dispatcher`].
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Records handed to the dispatcher.
    pub total: AtomicU64,
    /// Records accepted by the worker.
    pub enqueued: AtomicU64,
    /// Records lost, either to a full channel or to an exhausted retry budget.
    pub dropped: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub total: u64,
    pub enqueued: u64,
    pub dropped: u64,
}

/// Forwards [`LogRecord`]s to a [`LogSink`] through a bounded channel and
/// a background task.
///
/// Enqueueing never blocks the emitting thread: when the channel is full
/// the record is dropped and counted. The worker batches records and
/// retries a failing sink with exponential backoff.
pub struct Dispatcher {
    sender: mpsc::Sender<Command>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    /// Create a dispatcher and spawn its worker on the current Tokio runtime.
    ///
    /// Minimal thresholds are enforced for `buffer`, `batch_size` and
    /// `flush_interval` to avoid degenerate configurations.
    pub fn new(
        sink: Arc<dyn LogSink>,
        buffer: usize,
        batch_size: usize,
        flush_interval: Duration,
        retry_limit: usize,
    ) -> (Self, JoinHandle<()>) {
        let buffer = buffer.max(16);
        let batch_size = batch_size.max(1);
        let flush_interval = flush_interval.max(Duration::from_millis(10));
        let retry_limit = retry_limit.max(1);

        let (tx, mut rx) = mpsc::channel::<Command>(buffer);
        let stats = Arc::new(DispatchStats::default());
        let stats_bg = Arc::clone(&stats);

        let handle = tokio::spawn(async move {
            let mut batch = Vec::with_capacity(batch_size);
            let retry = Retry {
                limit: retry_limit,
                backoff: Duration::from_millis(100),
                max_backoff: Duration::from_secs(10),
            };

            // One timer for the worker's lifetime; records arriving do not
            // push the next flush back.
            let mut ticker = interval(flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    command = rx.recv() => match command {
                        Some(Command::Record(record)) => {
                            batch.push(record);
                            stats_bg.enqueued.fetch_add(1, Ordering::Relaxed);
                            if batch.len() >= batch_size {
                                send_batch(&*sink, &mut batch, &retry, &stats_bg).await;
                            }
                        }
                        Some(Command::Flush(ack)) => {
                            send_batch(&*sink, &mut batch, &retry, &stats_bg).await;
                            if let Err(e) = sink.flush().await {
                                tracing::warn!(target: DISPATCH_TARGET, error = %e, "log sink flush failed");
                            }
                            let _ = ack.send(());
                        }
                        None => {
                            send_batch(&*sink, &mut batch, &retry, &stats_bg).await;
                            let _ = sink.flush().await;
                            break;
                        }
                    },
                    _ = ticker.tick() => {
                        if !batch.is_empty() {
                            send_batch(&*sink, &mut batch, &retry, &stats_bg).await;
                        }
                    }
                }
            }
        });

        (Self { sender: tx, stats }, handle)
    }

    /// Hand a record to the worker without waiting.
    pub fn dispatch(&self, record: LogRecord) {
        self.stats.total.fetch_add(1, Ordering::Relaxed);
        if self.sender.try_send(Command::Record(record)).is_err() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(target: DISPATCH_TARGET, "log channel full, dropping log record");
        }
    }

    /// Hand a record to the worker, waiting for channel capacity instead of
    /// dropping it.
    pub async fn dispatch_wait(&self, record: LogRecord) {
        self.stats.total.fetch_add(1, Ordering::Relaxed);
        if self.sender.send(Command::Record(record)).await.is_err() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(target: DISPATCH_TARGET, "log worker stopped, dropping log record");
        }
    }

    /// Wait until every record dispatched before this call reached the sink.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Command::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            total: self.stats.total.load(Ordering::Relaxed),
            enqueued: self.stats.enqueued.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }
}

struct Retry {
    limit: usize,
    backoff: Duration,
    max_backoff: Duration,
}

async fn send_batch(
    sink: &dyn LogSink,
    batch: &mut Vec<LogRecord>,
    retry: &Retry,
    stats: &DispatchStats,
) {
    let mut backoff = retry.backoff;
    // Records already accepted are not resent on retry.
    let mut sent = 0;

    for attempt in 1..=retry.limit {
        let mut last_err: Option<Box<dyn Error + Send + Sync>> = None;
        for record in batch[sent..].iter() {
            if let Err(e) = sink.send(record).await {
                last_err = Some(e);
                break;
            }
            sent += 1;
        }

        match last_err {
            None => {
                batch.clear();
                return;
            }
            Some(e) if attempt < retry.limit => {
                tracing::warn!(
                    target: DISPATCH_TARGET,
                    error = %e,
                    retry_in = ?backoff,
                    "log sink send failed, retrying"
                );
                sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, retry.max_backoff);
            }
            Some(e) => {
                let lost = (batch.len() - sent) as u64;
                stats.dropped.fetch_add(lost, Ordering::Relaxed);
                tracing::warn!(
                    target: DISPATCH_TARGET,
                    error = %e,
                    lost,
                    "log sink send failed, dropping batch"
                );
            }
        }
    }
    batch.clear();
}
