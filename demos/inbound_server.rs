use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Path;
use axum::http::Method;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use event_log::inbound::{instrument, InboundState, RouteTable};
use event_log::stdout_sink::StdoutSink;
use event_log::{init_console_tracing, init_logger, tracker};

async fn get_order(Path(id): Path<u64>) -> Json<Value> {
    Json(json!({ "id": id, "tracker_id": tracker::current() }))
}

async fn crash() -> &'static str {
    panic!("simulated handler failure")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_console_tracing("info")?;
    let logger = init_logger(Arc::new(StdoutSink::new()));

    let routes = RouteTable::new()
        .route_fn(Method::GET, "/orders/:id", &get_order)
        .route_fn(Method::GET, "/crash", &crash);
    let state = InboundState::new(logger.clone(), routes);

    let app = Router::new()
        .route("/orders/:id", get(get_order))
        .route("/crash", get(crash));
    let app = instrument(app, state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    logger.flush().await;
    Ok(())
}
