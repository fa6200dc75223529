//! Invocation parameters of one render run and the proxy context derived from them.

use crate::proxify::decode_component;
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Parameters decoded from the caller's query string.
///
/// | Parameter | Effect |
/// |---|---|
/// | `map_def_url` | required; source of the map definition JSON |
/// | `gs_url` / `gs_public_url` | host-substitution pair (public → internal) |
/// | `proxy_header` / `editor` | adds `{proxy_header: editor}` to every fetch |
/// | `file_name` | save the output image under this name |
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderRequest {
    pub map_def_url: String,
    pub gs_url: Option<String>,
    pub gs_public_url: Option<String>,
    pub proxy_header: Option<String>,
    pub editor: Option<String>,
    pub file_name: Option<String>,
}

impl RenderRequest {
    pub fn new(map_def_url: impl Into<String>) -> Self {
        Self {
            map_def_url: map_def_url.into(),
            ..Default::default()
        }
    }

    /// Decode a request from a raw query string (leading `?` optional).
    pub fn from_query(query: &str) -> Result<Self> {
        let query = query.trim_start_matches('?');
        let pairs = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()));
        Self::from_pairs(pairs)
    }

    /// Build a request from already split key/value pairs.
    ///
    /// Empty values count as absent. The URL-valued parameters are decoded
    /// once more because callers encode them twice.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut params: BTreeMap<String, String> = BTreeMap::new();
        for (k, v) in pairs {
            // first occurrence wins, like URLSearchParams.get
            params.entry(k).or_insert(v);
        }
        let mut take = |name: &str| params.remove(name).filter(|v| !v.is_empty());

        let map_def_url = take("map_def_url")
            .map(|v| decode_component(&v))
            .ok_or_else(|| Error::MissingParameter("map_def_url".to_string()))?;

        Ok(Self {
            map_def_url,
            gs_url: take("gs_url").map(|v| decode_component(&v)),
            gs_public_url: take("gs_public_url").map(|v| decode_component(&v)),
            proxy_header: take("proxy_header"),
            editor: take("editor"),
            file_name: take("file_name"),
        })
    }

    /// Headers sent with the definition fetch and every tile fetch
    pub fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        if let (Some(name), Some(editor)) = (&self.proxy_header, &self.editor) {
            headers.insert(name.clone(), editor.clone());
        }
        headers
    }

    pub fn proxy_context(&self) -> ProxyContext {
        ProxyContext {
            gs_url: self.gs_url.clone(),
            gs_public_url: self.gs_public_url.clone(),
            headers: self.headers(),
        }
    }
}

/// Immutable context shared by every loader of one render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyContext {
    /// Internal address of the map server
    pub gs_url: Option<String>,
    /// Public address of the map server, as it appears in layer URLs
    pub gs_public_url: Option<String>,
    pub headers: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_query_decodes_url_parameters() {
        let q = "?map_def_url=http%253A%252F%252Fhost%252Fmap.json&gs_url=http%3A%2F%2Fgeoserver%3A8080%2Fgeoserver&gs_public_url=https%3A%2F%2Fpublic%2Fgeoserver&file_name=thumb.png";
        let req = RenderRequest::from_query(q).unwrap();
        assert_eq!(req.map_def_url, "http://host/map.json");
        assert_eq!(req.gs_url.as_deref(), Some("http://geoserver:8080/geoserver"));
        assert_eq!(req.gs_public_url.as_deref(), Some("https://public/geoserver"));
        assert_eq!(req.file_name.as_deref(), Some("thumb.png"));
        assert!(req.headers().is_empty());
    }

    #[test]
    fn header_requires_both_name_and_editor() {
        let req = RenderRequest::from_query("map_def_url=x&proxy_header=X-Editor&editor=alice").unwrap();
        assert_eq!(req.headers().get("X-Editor").map(String::as_str), Some("alice"));

        let anonymous = RenderRequest::from_query("map_def_url=x&proxy_header=X-Editor&editor=").unwrap();
        assert!(anonymous.headers().is_empty());

        let no_header = RenderRequest::from_query("map_def_url=x&editor=alice").unwrap();
        assert!(no_header.proxy_context().headers.is_empty());
    }

    #[test]
    fn missing_map_def_url_is_rejected() {
        let err = RenderRequest::from_query("gs_url=http%3A%2F%2Fa").unwrap_err();
        assert!(matches!(err, Error::MissingParameter(ref p) if p == "map_def_url"));

        let empty = RenderRequest::from_query("map_def_url=").unwrap_err();
        assert!(matches!(empty, Error::MissingParameter(_)));
    }
}
