//! Wire-style text dumps of HTTP messages with secret header values
//! redacted.

use http::{HeaderMap, Request, Response, Version};
use std::fmt::Write;

/// Replacement text for redacted values.
pub const REDACTED: &str = "**hidden**";

/// Header whose value is hidden by default.
pub const AUTHORIZATION: &str = "Authorization";

/// Render `req` as it would appear on the wire.
///
/// For every name in `hidden_headers` present on the request with a
/// non-empty value, every occurrence of that value in the dump is replaced
/// by [`REDACTED`], not only the header line.
pub fn dump_request<B: AsRef<[u8]>>(req: Option<&Request<B>>, hidden_headers: &[&str]) -> String {
    let Some(req) = req else {
        return String::new();
    };

    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let host = req
        .uri()
        .authority()
        .map(|a| a.as_str().to_string())
        .or_else(|| header_str(req.headers(), "host"));

    let mut dump = String::new();
    let _ = write!(dump, "{} {} {}\r\n", req.method(), target, version_str(req.version()));
    if let Some(host) = host {
        let _ = write!(dump, "Host: {}\r\n", host);
    }
    write_headers(&mut dump, req.headers(), &["host"]);
    dump.push_str("\r\n");
    dump.push_str(&String::from_utf8_lossy(req.body().as_ref()));

    redact(dump, req.headers(), hidden_headers)
}

/// Render `resp` as it would appear on the wire.
pub fn dump_response<B: AsRef<[u8]>>(resp: Option<&Response<B>>) -> String {
    let Some(resp) = resp else {
        return String::new();
    };

    let mut dump = String::new();
    let status = resp.status();
    let _ = write!(
        dump,
        "{} {} {}\r\n",
        version_str(resp.version()),
        status.as_str(),
        status.canonical_reason().unwrap_or("")
    );
    write_headers(&mut dump, resp.headers(), &[]);
    dump.push_str("\r\n");
    dump.push_str(&String::from_utf8_lossy(resp.body().as_ref()));
    dump
}

/// Render an outbound `reqwest` request.
///
/// A streaming body cannot be read without consuming it, so such requests
/// fall back to a structural dump; redaction still applies.
pub fn dump_outbound_request(req: Option<&reqwest::Request>, hidden_headers: &[&str]) -> String {
    let Some(req) = req else {
        return String::new();
    };

    let body = match req.body() {
        None => Some(&[][..]),
        Some(body) => body.as_bytes(),
    };

    let rendered = body.and_then(|body| {
        let mut builder = Request::builder()
            .method(req.method().clone())
            .uri(req.url().as_str())
            .version(req.version());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(req.headers().clone());
        }
        builder.body(body).ok()
    });

    match rendered {
        Some(view) => dump_request(Some(&view), hidden_headers),
        None => redact(format!("{:#?}", req), req.headers(), hidden_headers),
    }
}

fn redact(mut dump: String, headers: &HeaderMap, hidden_headers: &[&str]) -> String {
    for name in hidden_headers {
        if let Some(value) = header_str(headers, name) {
            if !value.is_empty() {
                dump = dump.replace(&value, REDACTED);
            }
        }
    }
    dump
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

fn write_headers(dump: &mut String, headers: &HeaderMap, skip: &[&str]) {
    let mut names: Vec<_> = headers.keys().filter(|n| !skip.contains(&n.as_str())).collect();
    names.sort_by(|a, b| a.as_str().cmp(b.as_str()));

    for name in names {
        for value in headers.get_all(name) {
            let _ = write!(
                dump,
                "{}: {}\r\n",
                canonical_name(name.as_str()),
                String::from_utf8_lossy(value.as_bytes())
            );
        }
    }
}

/// `content-type` -> `Content-Type`.
fn canonical_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}
