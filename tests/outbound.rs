//! Outbound adapter against a local mock HTTP server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use event_log::memory_sink::MemorySink;
use event_log::outbound::{
    CallOptions, OutboundClient, OutboundError, ProxyConfig, ResponseBody, ResponseBodyFormat,
    OUTBOUND_EVENT,
};
use event_log::tracker::{self, TrackerId};
use event_log::{Level, Logger, LoggerConfig};
use serde::Deserialize;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize, PartialEq)]
struct Order {
    id: u32,
    status: String,
}

#[derive(Debug, Deserialize, PartialEq)]
struct UserEnvelope {
    user: User,
}

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    name: String,
    id: String,
}

fn client(sink: &MemorySink) -> (OutboundClient, Logger) {
    let config = LoggerConfig {
        mirror_to_tracing: false,
        ..LoggerConfig::default()
    }
    .with_app_name("outbound-test");
    let logger = Logger::new(Arc::new(sink.clone()), config);
    (OutboundClient::new(logger.clone()), logger)
}

fn get(url: String) -> reqwest::Request {
    reqwest::Client::new()
        .get(url)
        .header("Authorization", "Bearer s3cr3t-token")
        .build()
        .unwrap()
}

#[tokio::test]
async fn json_body_is_decoded_and_logged_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders/9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 9, "status": "paid" })))
        .mount(&server)
        .await;

    let sink = MemorySink::new();
    let (client, logger) = client(&sink);
    let options = CallOptions::new(Duration::from_secs(5), ResponseBodyFormat::Json);

    let reply = tracker::scope(TrackerId::new("trk-out-1"), async {
        client
            .call::<Order>(get(format!("{}/orders/9", server.uri())), &options)
            .await
    })
    .await
    .unwrap();

    assert_eq!(reply.status, 200);
    assert_eq!(reply.decoded(), Some(Order { id: 9, status: "paid".into() }));

    logger.flush().await;
    let records = sink.records();
    assert_eq!(records.len(), 1);

    let record = &records[0];
    assert_eq!(record.event, OUTBOUND_EVENT);
    assert_eq!(record.level, Level::Info);
    assert_eq!(record.message, "success");
    assert_eq!(record.tracker_id, "trk-out-1");
    assert_eq!(record.app, "outbound-test");
    assert_eq!(record.error, "");

    let net = &record.data["net"];
    assert_eq!(net["method"], json!("GET"));
    assert_eq!(net["url"], json!("/orders/9"));
    assert_eq!(net["format"], json!("json"));
    assert_eq!(net["response_http_code"], json!(200));
    assert!(net["response"].as_str().unwrap().contains(r#""status":"paid""#));

    let request = net["request"].as_str().unwrap();
    assert!(request.starts_with("GET /orders/9 HTTP/1.1\r\n"));
    assert!(request.contains("**hidden**"));
    assert!(!request.contains("s3cr3t-token"));
}

#[tokio::test]
async fn xml_body_is_converted_before_decoding() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<user><name>Ann</name><id>7</id></user>", "application/xml"),
        )
        .mount(&server)
        .await;

    let sink = MemorySink::new();
    let (client, _logger) = client(&sink);
    let options = CallOptions::new(Duration::from_secs(5), ResponseBodyFormat::Xml);

    let reply = client
        .call::<UserEnvelope>(get(format!("{}/user", server.uri())), &options)
        .await
        .unwrap();

    assert_eq!(
        reply.decoded(),
        Some(UserEnvelope { user: User { name: "Ann".into(), id: "7".into() } })
    );
}

#[tokio::test]
async fn raw_format_hands_back_the_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(202).set_body_bytes(b"\x00plain bytes".to_vec()))
        .mount(&server)
        .await;

    let sink = MemorySink::new();
    let (client, _logger) = client(&sink);

    let (status, body) = client
        .call_raw(get(server.uri()), Duration::from_secs(5), None)
        .await
        .unwrap();

    assert_eq!(status, 202);
    assert_eq!(&body[..], b"\x00plain bytes");

    let reply = client
        .call::<Value>(get(server.uri()), &CallOptions::default())
        .await
        .unwrap();
    assert!(matches!(reply.body, ResponseBody::Raw(_)));
}

#[tokio::test]
async fn timeout_is_classified_and_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let sink = MemorySink::new();
    let (client, logger) = client(&sink);
    let options = CallOptions::new(Duration::from_millis(200), ResponseBodyFormat::Json);

    let started = Instant::now();
    let err = client
        .call::<Order>(get(server.uri()), &options)
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(err.is_timeout());
    assert_eq!(err.status_code(), 0);

    logger.flush().await;
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].level, Level::Error);
    assert_eq!(records[0].message, "timeout on request");
    assert!(!records[0].error.is_empty());
    assert_eq!(records[0].data["net"]["response_http_code"], json!(0));
}

#[tokio::test]
async fn bad_proxy_fails_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let sink = MemorySink::new();
    let (client, logger) = client(&sink);
    let options = CallOptions::default().with_proxy(ProxyConfig {
        host: "bad host".into(),
        port: 8080,
    });

    let err = client
        .call::<Value>(get(server.uri()), &options)
        .await
        .unwrap_err();

    assert!(matches!(err, OutboundError::ProxyUrl(_)));
    assert_eq!(err.status_code(), -1);
    assert_eq!(err.to_string(), "failed to parse proxy url");
    assert!(server.received_requests().await.unwrap().is_empty());

    logger.flush().await;
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message, "failed to parse proxy url");
}

#[tokio::test]
async fn decode_failure_keeps_the_status_and_the_captured_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let sink = MemorySink::new();
    let (client, logger) = client(&sink);
    let options = CallOptions::new(Duration::from_secs(5), ResponseBodyFormat::Json);

    let err = client
        .call::<Order>(get(server.uri()), &options)
        .await
        .unwrap_err();

    assert!(matches!(err, OutboundError::Json { status: 502, .. }));
    assert_eq!(err.status_code(), 502);

    logger.flush().await;
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message, "failed to parsing json response");
    assert_eq!(records[0].data["net"]["response_http_code"], json!(502));
    assert!(records[0].data["net"]["response"]
        .as_str()
        .unwrap()
        .contains("bad gateway"));
}
