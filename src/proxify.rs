//! URL rewriting: public→internal host substitution and proxy wrapping.

use crate::request::ProxyContext;
use crate::diagnostics::LogSink;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters escaped in a URI component (everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`).
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// The two routes exposed by the forward proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyRoute {
    Http,
    Https,
}

impl ProxyRoute {
    /// Route selected by the scheme of the upstream URL
    pub fn for_url(url: &str) -> Self {
        if url.starts_with("https://") {
            ProxyRoute::Https
        } else {
            ProxyRoute::Http
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            ProxyRoute::Http => "/http_proxy",
            ProxyRoute::Https => "/https_proxy",
        }
    }
}

pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Percent-decode a URI component; invalid UTF-8 leaves the value untouched.
pub fn decode_component(value: &str) -> String {
    percent_decode_str(value)
        .decode_utf8()
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// Wrap `requested_url` into a request against the forward proxy.
pub fn proxify(proxy_base: &str, requested_url: &str) -> String {
    let route = ProxyRoute::for_url(requested_url);
    format!(
        "{}{}?url={}",
        proxy_base.trim_end_matches('/'),
        route.path(),
        encode_component(requested_url)
    )
}

/// Rewrite a public map-server prefix to its internal address.
///
/// Applies only when both addresses are set and the URL starts with the
/// public one; returns `None` otherwise.
pub fn substitute_host(requested_url: &str, ctx: &ProxyContext) -> Option<String> {
    match (ctx.gs_public_url.as_deref(), ctx.gs_url.as_deref()) {
        (Some(public), Some(internal))
            if !public.is_empty() && !internal.is_empty() && requested_url.starts_with(public) =>
        {
            Some(format!("{}{}", internal, &requested_url[public.len()..]))
        }
        _ => None,
    }
}

/// Host substitution followed by proxification, logging any rewrite.
pub fn adjust_layer_url(
    proxy_base: &str,
    requested_url: &str,
    ctx: &ProxyContext,
    sink: &dyn LogSink,
) -> String {
    match substitute_host(requested_url, ctx) {
        Some(rewritten) => {
            sink.log(format!("replaced layer URL {} with {}", requested_url, rewritten));
            proxify(proxy_base, &rewritten)
        }
        None => proxify(proxy_base, requested_url),
    }
}
