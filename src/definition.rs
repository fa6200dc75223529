//! Map definition model and the fetch that loads it through the proxy.

use crate::diagnostics::LogSink;
use crate::http::HttpClient;
use crate::proxify::proxify;
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Layer class tags rendered as WMS layers
pub const WMS_CLASS_NAMES: &[&str] = &["HSLayers.Layer.WMS", "OpenLayers.Layer.WMS", "WMS"];

/// Bounding box in EPSG:4326, either `"minX minY maxX maxY"` or `[minX, minY, maxX, maxY]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Extent {
    Text(String),
    Values(Vec<f64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapDefinition {
    pub extent: Extent,
    /// Bottom layer first
    pub layers: Vec<LayerDefinition>,
}

/// One entry of the definition's layer list
#[derive(Debug, Clone, PartialEq)]
pub enum LayerDefinition {
    Wms(WmsLayerDefinition),
    /// Any class tag without a renderer; skipped at layer construction
    Unsupported { class_name: String },
    /// Supported tag with fields that do not deserialize; skipped at layer construction
    Invalid { class_name: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WmsLayerDefinition {
    #[serde(default)]
    pub title: Option<String>,
    pub url: String,
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
    #[serde(default)]
    pub single_tile: bool,
    #[serde(default)]
    pub max_resolution: Option<f64>,
    #[serde(default)]
    pub min_resolution: Option<f64>,
    #[serde(default)]
    pub opacity: Option<f64>,
    #[serde(default)]
    pub visibility: Option<bool>,
    #[serde(default)]
    pub projection: Option<String>,
    /// CSS color filled behind the layer's surface
    #[serde(default)]
    pub background: Option<String>,
}

#[derive(Deserialize)]
struct RawMapDefinition {
    extent: Extent,
    #[serde(default)]
    layers: Option<RawLayers>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLayers {
    List(Vec<Value>),
    Wrapped { data: Vec<Value> },
}

impl MapDefinition {
    /// Parse a definition document; layers may be a list or `{ "data": [...] }`.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let raw: RawMapDefinition = serde_json::from_slice(bytes)?;
        let values = match raw.layers {
            Some(RawLayers::List(v)) | Some(RawLayers::Wrapped { data: v }) => v,
            None => Vec::new(),
        };
        let layers = values.into_iter().map(LayerDefinition::from_value).collect();
        Ok(Self { extent: raw.extent, layers })
    }
}

impl LayerDefinition {
    /// Dispatch on the `className` (or `kind`) tag.
    ///
    /// A malformed layer never fails the whole definition.
    pub fn from_value(value: Value) -> Self {
        let class_name = value
            .get("className")
            .or_else(|| value.get("kind"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if WMS_CLASS_NAMES.contains(&class_name.as_str()) {
            match serde_json::from_value::<WmsLayerDefinition>(value) {
                Ok(def) => LayerDefinition::Wms(def),
                Err(e) => LayerDefinition::Invalid {
                    class_name,
                    error: e.to_string(),
                },
            }
        } else {
            LayerDefinition::Unsupported { class_name }
        }
    }
}

/// Fetch and parse a map definition through the forward proxy.
///
/// Exactly one attempt is made. Failures are logged to `sink` and returned.
pub async fn fetch_map_definition(
    client: &dyn HttpClient,
    proxy_base: &str,
    map_def_url: &str,
    headers: &BTreeMap<String, String>,
    sink: &dyn LogSink,
) -> Result<MapDefinition> {
    sink.log(format!(
        "Fetching map {} with headers {}",
        map_def_url,
        serde_json::to_string_pretty(headers).unwrap_or_default()
    ));

    let result = async {
        let resp = client.get(&proxify(proxy_base, map_def_url), headers).await?;
        if resp.status != 200 {
            return Err(Error::Fetch {
                url: map_def_url.to_string(),
                status: resp.status,
            });
        }
        MapDefinition::from_json(&resp.body)
    }
    .await;

    if let Err(e) = &result {
        sink.log(format!("Error when fetching map: {}", e));
    }
    result
}
