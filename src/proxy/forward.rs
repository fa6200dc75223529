//! Relay of one proxied request to its dynamic upstream.

use crate::{Error, Result};
use axum::body::Body;
use axum::extract::Request;
use axum::http::header::HOST;
use axum::http::HeaderMap;
use axum::response::Response;
use std::collections::BTreeMap;
use url::Url;

/// Re-derived for every hop because the body is re-sent
const FRAMING: [&str; 3] = ["content-length", "transfer-encoding", "connection"];

/// Upstream URL named by the `url` query parameter
pub fn target_from_query(query: Option<&str>) -> Result<Url> {
    let raw = query
        .and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == "url")
                .map(|(_, v)| v.into_owned())
        })
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::MissingParameter("url".to_string()))?;

    let target = Url::parse(&raw).map_err(|e| Error::Parse(format!("Invalid url parameter {:?}: {}", raw, e)))?;
    match target.scheme() {
        "http" | "https" => Ok(target),
        other => Err(Error::Parse(format!("Unsupported upstream scheme {:?}", other))),
    }
}

/// Incoming headers without `Host` and the framing headers
pub fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    out.remove(HOST);
    strip_framing(&mut out);
    out
}

fn strip_framing(headers: &mut HeaderMap) {
    for name in FRAMING {
        headers.remove(name);
    }
}

fn headers_json(headers: &HeaderMap) -> String {
    let map: BTreeMap<&str, String> = headers
        .iter()
        .map(|(k, v)| (k.as_str(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect();
    serde_json::to_string(&map).unwrap_or_default()
}

/// Connection failures become 502, timeouts 504
pub fn upstream_error(err: reqwest::Error) -> Error {
    let status = if err.is_timeout() { 504 } else { 502 };
    Error::ProxyUpstream {
        status,
        message: err.to_string(),
    }
}

/// Relay one request to the upstream named in its query and stream back the answer.
///
/// The request body is buffered up to `max_body_bytes`.
pub(super) async fn forward(client: &reqwest::Client, req: Request, max_body_bytes: usize) -> Result<Response> {
    let (parts, body) = req.into_parts();
    let target = target_from_query(parts.uri.query())?;
    let headers = forwarded_headers(&parts.headers);
    log::info!("onProxyReq, full_url={}, headers={}", target, headers_json(&headers));

    let body = axum::body::to_bytes(body, max_body_bytes).await.map_err(|e| {
        Error::RequestBody(format!("Cannot read request body (limit {} bytes): {}", max_body_bytes, e))
    })?;

    let upstream = client
        .request(parts.method, target)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(upstream_error)?;

    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    if status.as_u16() == 200 {
        log::info!("onProxyRes, status={}", status.as_u16());
    } else {
        log::info!("onProxyRes, status={}, headers={}", status.as_u16(), headers_json(&headers));
    }
    strip_framing(&mut headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
