use crate::dump::{dump_outbound_request, dump_response, AUTHORIZATION};
use crate::logger::Logger;
use crate::record::Payload;
use crate::tracker;
use crate::xml::xml_to_json;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::time::Duration;

/// Event name of every outbound call record.
pub const OUTBOUND_EVENT: &str = "OUTBOUND_REQUEST";

/// How the response body is handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseBodyFormat {
    /// The bytes as received.
    #[default]
    Raw,
    /// Body deserialized as JSON.
    Json,
    /// Body converted from XML to JSON, then deserialized.
    Xml,
}

impl ResponseBodyFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseBodyFormat::Raw => "raw",
            ResponseBodyFormat::Json => "json",
            ResponseBodyFormat::Xml => "xml",
        }
    }
}

/// Forward proxy used for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
}

impl ProxyConfig {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct CallOptions {
    pub timeout: Duration,
    pub format: ResponseBodyFormat,
    pub proxy: Option<ProxyConfig>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            format: ResponseBodyFormat::Raw,
            proxy: None,
        }
    }
}

impl CallOptions {
    pub fn new(timeout: Duration, format: ResponseBodyFormat) -> Self {
        Self { timeout, format, proxy: None }
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }
}

/// Decoded body of a successful call.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody<T> {
    Raw(Bytes),
    Decoded(T),
}

/// Outcome of a call whose HTTP exchange and body decoding both succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    pub status: u16,
    pub body: ResponseBody<T>,
}

impl<T> Reply<T> {
    pub fn decoded(self) -> Option<T> {
        match self.body {
            ResponseBody::Decoded(value) => Some(value),
            ResponseBody::Raw(_) => None,
        }
    }

    pub fn raw(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Raw(bytes) => Some(bytes),
            ResponseBody::Decoded(_) => None,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum OutboundError {
    #[error("failed to parse proxy url")]
    ProxyUrl(#[source] reqwest::Error),

    #[error("failed to build http client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("error is {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("error is {0}")]
    Transport(#[source] reqwest::Error),

    #[error("failed to get response body")]
    BodyRead { status: u16, #[source] source: reqwest::Error },

    #[error("failed to convert xml to json")]
    XmlToJson { status: u16, #[source] source: crate::xml::XmlError },

    #[error("failed to parsing json from xml response")]
    JsonFromXml { status: u16, #[source] source: serde_json::Error },

    #[error("failed to parsing json response")]
    Json { status: u16, #[source] source: serde_json::Error },
}

impl OutboundError {
    /// Status reported alongside the error: `-1` when no request was
    /// attempted, `0` when the exchange failed, the real status when the
    /// response arrived but its body could not be used.
    pub fn status_code(&self) -> i32 {
        match self {
            OutboundError::ProxyUrl(_) | OutboundError::ClientBuild(_) => -1,
            OutboundError::Timeout(_) | OutboundError::Transport(_) => 0,
            OutboundError::BodyRead { status, .. }
            | OutboundError::XmlToJson { status, .. }
            | OutboundError::JsonFromXml { status, .. }
            | OutboundError::Json { status, .. } => i32::from(*status),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, OutboundError::Timeout(_))
    }
}

/// Instrumented HTTP client: one structured record per call.
#[derive(Clone)]
pub struct OutboundClient {
    logger: Logger,
    hidden_headers: Vec<String>,
}

impl OutboundClient {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            hidden_headers: vec![AUTHORIZATION.to_string()],
        }
    }

    /// Header names whose values are redacted from the logged request dump.
    pub fn with_hidden_headers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hidden_headers = names.into_iter().map(Into::into).collect();
        self
    }

    /// Execute `request` and decode its body per `options.format`.
    ///
    /// Emits exactly one record: info on success, error on any failure.
    /// The tracker ID is taken from the enclosing [`tracker::scope`].
    pub async fn call<T: DeserializeOwned>(
        &self,
        request: reqwest::Request,
        options: &CallOptions,
    ) -> Result<Reply<T>, OutboundError> {
        let mut log = self.logger.event(OUTBOUND_EVENT);
        log.set_tracker_id(tracker::current());

        let hidden: Vec<&str> = self.hidden_headers.iter().map(String::as_str).collect();
        let mut net = Map::new();
        net.insert("host".into(), Value::from(request.url().host_str().unwrap_or_default()));
        net.insert("method".into(), Value::from(request.method().as_str()));
        net.insert("url".into(), Value::from(request.url().path()));
        net.insert("format".into(), Value::from(options.format.as_str()));
        net.insert("request".into(), Value::from(dump_outbound_request(Some(&request), &hidden)));
        net.insert("response".into(), Value::from(""));
        net.insert("response_http_code".into(), Value::from(0));

        let mut builder = reqwest::Client::builder().timeout(options.timeout);
        if let Some(proxy) = &options.proxy {
            match reqwest::Proxy::all(proxy.url()) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => {
                    let err = OutboundError::ProxyUrl(e);
                    log.error_with_data("failed to parse proxy url", Payload::network(net), &err);
                    return Err(err);
                }
            }
        }
        let client = match builder.build() {
            Ok(client) => client,
            Err(e) => {
                let err = OutboundError::ClientBuild(e);
                log.error_with_data("failed to build http client", Payload::network(net), &err);
                return Err(err);
            }
        };

        log.timer_start();
        let response = match client.execute(request).await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                let err = OutboundError::Timeout(e);
                log.error_with_data("timeout on request", Payload::network(net), &err);
                return Err(err);
            }
            Err(e) => {
                let err = OutboundError::Transport(e);
                log.error_with_data("failed on request", Payload::network(net), &err);
                return Err(err);
            }
        };

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        net.insert("response_http_code".into(), Value::from(status.as_u16()));

        let buffer = match response.bytes().await {
            Ok(buffer) => buffer,
            Err(e) => {
                net.insert("response".into(), Value::from(render_response(status, version, &headers, Bytes::new())));
                let err = OutboundError::BodyRead { status: status.as_u16(), source: e };
                log.error_with_data("failed to get response body", Payload::network(net), &err);
                return Err(err);
            }
        };
        net.insert("response".into(), Value::from(render_response(status, version, &headers, buffer.clone())));

        let status = status.as_u16();
        let body = match decode::<T>(options.format, buffer, status) {
            Ok(body) => body,
            Err(err) => {
                log.error_with_data(failure_message(&err), Payload::network(net), &err);
                return Err(err);
            }
        };

        log.info_with_data("success", Payload::network(net));
        Ok(Reply { status, body })
    }

    /// [`call`](Self::call) with the body handed back as raw bytes.
    pub async fn call_raw(
        &self,
        request: reqwest::Request,
        timeout: Duration,
        proxy: Option<ProxyConfig>,
    ) -> Result<(u16, Bytes), OutboundError> {
        let options = CallOptions { timeout, format: ResponseBodyFormat::Raw, proxy };
        let reply = self.call::<Value>(request, &options).await?;
        match reply.body {
            ResponseBody::Raw(bytes) => Ok((reply.status, bytes)),
            ResponseBody::Decoded(_) => Ok((reply.status, Bytes::new())),
        }
    }
}

fn decode<T: DeserializeOwned>(
    format: ResponseBodyFormat,
    buffer: Bytes,
    status: u16,
) -> Result<ResponseBody<T>, OutboundError> {
    match format {
        ResponseBodyFormat::Raw => Ok(ResponseBody::Raw(buffer)),
        ResponseBodyFormat::Json => serde_json::from_slice(&buffer)
            .map(ResponseBody::Decoded)
            .map_err(|source| OutboundError::Json { status, source }),
        ResponseBodyFormat::Xml => {
            let json = xml_to_json(&buffer).map_err(|source| OutboundError::XmlToJson { status, source })?;
            serde_json::from_value(json)
                .map(ResponseBody::Decoded)
                .map_err(|source| OutboundError::JsonFromXml { status, source })
        }
    }
}

fn failure_message(err: &OutboundError) -> &'static str {
    match err {
        OutboundError::XmlToJson { .. } => "failed to convert xml to json",
        OutboundError::JsonFromXml { .. } => "failed to parsing json from xml response",
        _ => "failed to parsing json response",
    }
}

fn render_response(
    status: http::StatusCode,
    version: http::Version,
    headers: &http::HeaderMap,
    body: Bytes,
) -> String {
    let mut view = http::Response::new(body);
    *view.status_mut() = status;
    *view.version_mut() = version;
    *view.headers_mut() = headers.clone();
    dump_response(Some(&view))
}
