//! Inbound web middleware for `axum` routers.
//!
//! # Pipeline
//! ```text
//! request_time   stamp X-<app>-RequestTime on the request
//!   → tracker_id  assign a fresh tracker ID for the rest of the pipeline
//!   → recover     turn a handler panic into one PANIC record and a 500
//!   → access_log  one INBOUND_REQUEST record per completed request
//!   → handler
//! ```
//! [`instrument`] applies the four stages in that order.

pub mod middleware;
pub mod recover;
pub mod routes;

use axum::middleware::from_fn_with_state;
use axum::Router;
use chrono::{DateTime, SecondsFormat, Utc};
use http::HeaderName;
use std::sync::Arc;

use crate::dump::AUTHORIZATION;
use crate::logger::Logger;

pub use middleware::{access_log, request_time, tracker_id, INBOUND_EVENT, REQUEST_TOO_LARGE};
pub use recover::{recover, PanicError, RecoverConfig, PANIC_EVENT};
pub use routes::{HandlerName, Route, RouteTable, UNDEFINED_ROUTE};

/// Request/response timing header names derived from the identity name.
#[derive(Debug, Clone)]
pub struct TimingHeaders {
    pub request_time: HeaderName,
    pub response_time: HeaderName,
}

impl TimingHeaders {
    /// `X-<app>-RequestTime` and `X-<app>-ResponseTime`. Characters not
    /// allowed in a header name are replaced by `-`.
    pub fn for_app(app: &str) -> Self {
        let app: String = app
            .chars()
            .map(|c| if is_token_char(c) { c } else { '-' })
            .collect();

        Self {
            request_time: header_name(&format!("X-{}-RequestTime", app), "x-requesttime"),
            response_time: header_name(&format!("X-{}-ResponseTime", app), "x-responsetime"),
        }
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

fn header_name(name: &str, fallback: &'static str) -> HeaderName {
    HeaderName::from_bytes(name.as_bytes()).unwrap_or_else(|_| HeaderName::from_static(fallback))
}

/// Timestamp text used in the timing headers (RFC 3339, nanoseconds).
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Shared state of the inbound middleware.
#[derive(Clone)]
pub struct InboundState {
    pub logger: Logger,
    pub routes: Arc<RouteTable>,
    pub headers: TimingHeaders,
    pub hidden_headers: Arc<Vec<String>>,
    /// Largest request body buffered for the access log; unlimited by
    /// default.
    pub body_limit: usize,
    pub recover: RecoverConfig,
}

impl InboundState {
    pub fn new(logger: Logger, routes: RouteTable) -> Self {
        let headers = TimingHeaders::for_app(logger.app());
        Self {
            logger,
            routes: Arc::new(routes),
            headers,
            hidden_headers: Arc::new(vec![AUTHORIZATION.to_string()]),
            body_limit: usize::MAX,
            recover: RecoverConfig::default(),
        }
    }

    pub fn with_hidden_headers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hidden_headers = Arc::new(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn with_recover_config(mut self, config: RecoverConfig) -> Self {
        self.recover = config;
        self
    }
}

/// Wrap every route of `router` in the inbound pipeline.
pub fn instrument<S>(router: Router<S>, state: InboundState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(from_fn_with_state(state.clone(), access_log))
        .layer(from_fn_with_state(state.clone(), recover))
        .layer(from_fn_with_state(state.clone(), tracker_id))
        .layer(from_fn_with_state(state, request_time))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_names_embed_the_app_name() {
        let headers = TimingHeaders::for_app("billing-api");
        assert_eq!(headers.request_time.as_str(), "x-billing-api-requesttime");
        assert_eq!(headers.response_time.as_str(), "x-billing-api-responsetime");
    }

    #[test]
    fn invalid_header_characters_are_replaced() {
        let headers = TimingHeaders::for_app("my app/1");
        assert_eq!(headers.request_time.as_str(), "x-my-app-1-requesttime");
    }

    #[test]
    fn timestamps_round_trip_with_nanoseconds() {
        let now = Utc::now();
        let text = format_timestamp(now);
        assert_eq!(parse_timestamp(&text), Some(now));
        assert_eq!(parse_timestamp("not a time"), None);
    }
}
