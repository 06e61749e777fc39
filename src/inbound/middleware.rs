use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;

use super::{format_timestamp, parse_timestamp, InboundState};
use crate::dump::dump_request;
use crate::record::Payload;
use crate::tracker::{self, TrackerId};

/// Event name of every access-log record.
pub const INBOUND_EVENT: &str = "INBOUND_REQUEST";

/// Stamp the arrival instant on the request before anything else runs.
pub async fn request_time(State(state): State<InboundState>, mut req: Request, next: Next) -> Response {
    if let Ok(value) = HeaderValue::from_str(&format_timestamp(Utc::now())) {
        req.headers_mut().insert(state.headers.request_time.clone(), value);
    }
    next.run(req).await
}

/// Assign a fresh tracker ID, visible to downstream handlers both as a
/// request extension and through [`tracker::current`].
pub async fn tracker_id(State(_state): State<InboundState>, mut req: Request, next: Next) -> Response {
    let id = TrackerId::generate();
    req.extensions_mut().insert(id.clone());
    tracker::scope(id, next.run(req)).await
}

/// Placeholder logged as the request body when it exceeded `body_limit`.
pub const REQUEST_TOO_LARGE: &str = "**request body exceeds limit**";

/// Emit one structured record per completed request.
///
/// The request body is buffered and replayed to the handler; the response
/// body is buffered and returned unchanged. A request body over
/// `body_limit` is answered with `413` without running the handler, and a
/// response body that cannot be read is answered with `500`. Both are
/// still logged.
pub async fn access_log(State(state): State<InboundState>, req: Request, next: Next) -> Response {
    let (parts, body) = req.into_parts();

    let request_time_text = header_text(&parts.headers, state.headers.request_time.as_str());
    let request_time = parse_timestamp(&request_time_text).unwrap_or_else(Utc::now);
    let matched_path = parts.extensions.get::<MatchedPath>().map(|p| p.as_str().to_string());
    let handler = state.routes.resolve(&parts.method, matched_path.as_deref());
    let tracker_id = parts
        .extensions
        .get::<TrackerId>()
        .map(|id| id.to_string())
        .unwrap_or_else(tracker::current);
    let remote_ip = real_ip(&parts.headers, parts.extensions.get::<ConnectInfo<SocketAddr>>());
    let method = parts.method.to_string();
    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());
    let host = parts
        .uri
        .authority()
        .map(|a| a.to_string())
        .unwrap_or_else(|| header_text(&parts.headers, "host"));

    let (request, request_header, response) = match to_bytes(body, state.body_limit).await {
        Ok(request_body) => {
            let request_header = request_dump(&state, &parts, request_body.clone());
            let request = String::from_utf8_lossy(&request_body).into_owned();
            let response = next.run(Request::from_parts(parts, Body::from(request_body))).await;
            (request, request_header, response)
        }
        Err(e) => {
            tracing::warn!(error = %e, limit = state.body_limit, "request body rejected by the access log");
            let request_header = request_dump(&state, &parts, Bytes::new());
            let response = (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
            (REQUEST_TOO_LARGE.to_string(), request_header, response)
        }
    };

    let (mut response_parts, body) = response.into_parts();
    let (response_body, failure) = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => (bytes, None),
        Err(e) => {
            tracing::warn!(error = %e, "response body could not be buffered for the access log");
            let (parts, _) = (StatusCode::INTERNAL_SERVER_ERROR, ()).into_response().into_parts();
            response_parts = parts;
            (Bytes::new(), Some(e))
        }
    };

    let response_time_text = format_timestamp(Utc::now());
    if let Ok(value) = HeaderValue::from_str(&response_time_text) {
        response_parts.headers.insert(state.headers.response_time.clone(), value);
    }
    let response_header = serde_json::to_string(&header_json(&response_parts.headers))
        .unwrap_or_default();

    let mut net = Map::new();
    net.insert("package".into(), Value::from(handler.package));
    net.insert("handler".into(), Value::from(handler.handler));
    net.insert("remote_ip".into(), Value::from(remote_ip));
    net.insert("host".into(), Value::from(host));
    net.insert("method".into(), Value::from(method));
    net.insert("url".into(), Value::from(url));
    net.insert("request_time".into(), Value::from(request_time_text));
    net.insert("request_header".into(), Value::from(request_header));
    net.insert("request".into(), Value::from(request));
    net.insert("response_time".into(), Value::from(response_time_text));
    net.insert("response_header".into(), Value::from(response_header));
    net.insert("response".into(), Value::from(String::from_utf8_lossy(&response_body).into_owned()));
    net.insert("response_http_code".into(), Value::from(response_parts.status.as_u16()));

    let mut log = state.logger.event(INBOUND_EVENT);
    log.set_timer_start(request_time);
    log.set_tracker_id(tracker_id);
    match failure {
        None => log.info_with_data("api_info", Payload::network(net)),
        Some(e) => log.error_with_data("api_info", Payload::network(net), &e),
    }

    Response::from_parts(response_parts, Body::from(response_body))
}

fn request_dump(state: &InboundState, parts: &http::request::Parts, body: Bytes) -> String {
    let hidden: Vec<&str> = state.hidden_headers.iter().map(String::as_str).collect();
    let mut view = http::Request::new(body);
    *view.method_mut() = parts.method.clone();
    *view.uri_mut() = parts.uri.clone();
    *view.version_mut() = parts.version;
    *view.headers_mut() = parts.headers.clone();
    dump_request(Some(&view), &hidden)
}

/// Client address: first `X-Forwarded-For` entry, then `X-Real-IP`, then
/// the peer address.
pub fn real_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    let forwarded = header_text(headers, "x-forwarded-for");
    if let Some(first) = forwarded.split(',').map(str::trim).find(|ip| !ip.is_empty()) {
        return first.to_string();
    }

    let real = header_text(headers, "x-real-ip");
    if !real.is_empty() {
        return real;
    }

    peer.map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

fn header_text(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn header_json(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        map.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    map
}
