use std::sync::Arc;

use chrono::Utc;
use tokio::time::{sleep, Duration};

use event_log::stdout_sink::StdoutSink;
use event_log::{fields, init_logger_with_config, LoggerConfig};

#[tokio::main]
async fn main() {
    let config = LoggerConfig {
        mirror_to_tracing: false,
        ..LoggerConfig::from_env()
    };
    let logger = init_logger_with_config(Arc::new(StdoutSink::new()), config);

    let mut log = logger.event("BATCH_IMPORT");
    log.set_tracker_id("import-2024-06-01");

    // Measured from creation.
    sleep(Duration::from_millis(120)).await;
    log.info_with_data("files listed", fields! { "files" => 3 });

    // Measured from a fresh anchor.
    log.timer_start();
    sleep(Duration::from_millis(80)).await;
    log.info_with_data("files parsed", fields! { "rows" => 1200 });

    // Measured from an instant captured elsewhere.
    let queued_at = Utc::now() - chrono::Duration::milliseconds(500);
    log.set_timer_start(queued_at);
    log.warn_with_data("import lagged behind its queue time", fields! { "lag_ms" => 500 });

    logger.flush().await;
}
