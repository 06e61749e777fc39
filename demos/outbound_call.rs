use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use event_log::outbound::{CallOptions, OutboundClient, ResponseBodyFormat};
use event_log::stdout_sink::StdoutSink;
use event_log::tracker::{self, TrackerId};
use event_log::{init_console_tracing, init_logger};

#[derive(Debug, Deserialize)]
struct Ip {
    origin: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_console_tracing("info")?;
    let logger = init_logger(Arc::new(StdoutSink::new()));
    let client = OutboundClient::new(logger.clone());

    let request = reqwest::Client::new()
        .get("https://httpbin.org/ip")
        .header("Authorization", "Bearer demo-token")
        .build()?;
    let options = CallOptions::new(Duration::from_secs(10), ResponseBodyFormat::Json);

    let result = tracker::scope(TrackerId::generate(), client.call::<Ip>(request, &options)).await;
    match result {
        Ok(reply) => {
            let status = reply.status;
            let origin = reply.decoded().map(|ip| ip.origin);
            tracing::info!(status, "origin: {:?}", origin);
        }
        Err(e) => tracing::error!(status = e.status_code(), "call failed: {}", e),
    }

    logger.flush().await;
    Ok(())
}
