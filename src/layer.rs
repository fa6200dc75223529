//! Renderable WMS layers built from layer definitions.

use crate::definition::{LayerDefinition, WmsLayerDefinition};
use crate::diagnostics::LogSink;
use crate::http::HttpClient;
use crate::loader::{ImageKey, ImageRequest, Placement, ProxifiedLoader};
use crate::projection::Projection;
use crate::proxify::decode_component;
use crate::rendering::compositor::{ContainerStyle, LayerFrame, SurfaceStyle};
use crate::rendering::raster::PixmapSurface;
use crate::rendering::surface::{Matrix, Rgba, Surface};
use crate::request::ProxyContext;
use crate::tilegrid::{TileGrid, TILE_SIZE};
use crate::view::View;
use crate::{EngineConfig, Error, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use url::Url;

/// Size of a single-image request relative to the viewport
pub const IMAGE_RATIO: f64 = 1.5;

const DEFAULT_PARAMS: [(&str, &str); 6] = [
    ("SERVICE", "WMS"),
    ("VERSION", "1.3.0"),
    ("REQUEST", "GetMap"),
    ("FORMAT", "image/png"),
    ("TRANSPARENT", "true"),
    ("STYLES", ""),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackingStore {
    /// One image covering the buffered view extent
    SingleImage,
    /// 256 px tiles from the projection's grid
    Tiled,
}

/// Upper-case keys, stringify values and drop `REQUEST` in any casing.
///
/// Keys colliding after upper-casing keep the value that comes last in the
/// document.
pub fn sanitize_params(params: &serde_json::Map<String, Value>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (key, value) in params {
        let key = key.to_ascii_uppercase();
        if key == "REQUEST" {
            continue;
        }
        let value = match value {
            Value::Null => continue,
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        };
        out.insert(key, value);
    }
    out
}

/// `true` when `version` is 1.3 or later
fn is_v13(version: &str) -> bool {
    let mut parts = version.split('.').map(|p| p.trim().parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    (major, minor) >= (1, 3)
}

/// GetMap endpoint plus the layer's sanitized parameters
#[derive(Debug, Clone, PartialEq)]
pub struct WmsSource {
    pub url: Url,
    /// Never contains `REQUEST`
    pub params: BTreeMap<String, String>,
}

impl WmsSource {
    pub fn new(url: Url, params: BTreeMap<String, String>) -> Self {
        Self { url, params }
    }

    /// GetMap URL for `bbox` (in `projection`) at `width` × `height` pixels
    pub fn get_map_url(&self, bbox: [f64; 4], width: u32, height: u32, projection: Projection) -> String {
        let mut merged: BTreeMap<&str, &str> = DEFAULT_PARAMS.iter().copied().collect();
        for (k, v) in &self.params {
            merged.insert(k.as_str(), v.as_str());
        }
        merged.insert("REQUEST", "GetMap");

        let v13 = is_v13(merged.get("VERSION").copied().unwrap_or("1.3.0"));
        let [min_x, min_y, max_x, max_y] = bbox;
        let axes = if v13 && projection == Projection::Epsg4326 {
            [min_y, min_x, max_y, max_x]
        } else {
            bbox
        };
        let bbox_param = axes.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",");

        let mut url = self.url.clone();
        {
            let mut query = url.query_pairs_mut();
            for (k, v) in &merged {
                query.append_pair(k, v);
            }
            query
                .append_pair("WIDTH", &width.to_string())
                .append_pair("HEIGHT", &height.to_string())
                .append_pair(if v13 { "CRS" } else { "SRS" }, projection.code())
                .append_pair("BBOX", &bbox_param);
        }
        url.into()
    }
}

type ImageStore = Arc<Mutex<HashMap<ImageKey, PixmapSurface>>>;

/// A WMS layer ready to be loaded and painted
pub struct RenderedLayer {
    /// Position in the definition's layer list
    pub index: usize,
    pub title: Option<String>,
    pub backing: BackingStore,
    pub source: WmsSource,
    pub visible: bool,
    pub min_resolution: f64,
    pub max_resolution: f64,
    pub opacity: f32,
    pub background: Option<Rgba>,
    loader: ProxifiedLoader,
    images: ImageStore,
}

impl std::fmt::Debug for RenderedLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedLayer")
            .field("index", &self.index)
            .field("title", &self.title)
            .field("backing", &self.backing)
            .field("visible", &self.visible)
            .field("opacity", &self.opacity)
            .finish()
    }
}

impl RenderedLayer {
    /// Resolution bounds check; the lower bound is inclusive, the upper exclusive
    pub fn is_visible_at(&self, resolution: f64) -> bool {
        self.min_resolution <= resolution && resolution < self.max_resolution
    }

    /// The layer takes part in rendering at this view
    pub fn is_rendered(&self, view: &View) -> bool {
        self.visible && self.is_visible_at(view.resolution)
    }

    /// Images needed to cover `view` at `pixel_ratio`
    pub fn plan(&self, view: &View, pixel_ratio: f64) -> Vec<ImageRequest> {
        match self.backing {
            BackingStore::SingleImage => self.plan_single(view, pixel_ratio),
            BackingStore::Tiled => self.plan_tiles(view, pixel_ratio),
        }
    }

    fn plan_single(&self, view: &View, pixel_ratio: f64) -> Vec<ImageRequest> {
        let [min_x, min_y, max_x, max_y] = view.extent();
        let (half_w, half_h) = ((max_x - min_x) * IMAGE_RATIO / 2.0, (max_y - min_y) * IMAGE_RATIO / 2.0);
        let bbox = [
            view.center[0] - half_w,
            view.center[1] - half_h,
            view.center[0] + half_w,
            view.center[1] + half_h,
        ];
        let width = (view.viewport.width as f64 * IMAGE_RATIO * pixel_ratio).round() as u32;
        let height = (view.viewport.height as f64 * IMAGE_RATIO * pixel_ratio).round() as u32;
        vec![ImageRequest {
            key: ImageKey::Single,
            url: self.source.get_map_url(bbox, width, height, view.projection),
            placement: placement(view, pixel_ratio, bbox),
        }]
    }

    fn plan_tiles(&self, view: &View, pixel_ratio: f64) -> Vec<ImageRequest> {
        let grid = TileGrid::for_projection(view.projection);
        let z = grid.z_for_resolution(view.resolution);
        let size = (TILE_SIZE as f64 * pixel_ratio).round() as u32;
        grid.tile_range(view.extent(), z)
            .iter()
            .map(|(x, y)| {
                let bbox = grid.tile_extent(z, x, y);
                ImageRequest {
                    key: ImageKey::Tile { z, x, y },
                    url: self.source.get_map_url(bbox, size, size, view.projection),
                    placement: placement(view, pixel_ratio, bbox),
                }
            })
            .collect()
    }

    /// Start every load of `plan`; each delivered image becomes resident.
    pub fn request(&self, plan: &[ImageRequest]) -> Vec<JoinHandle<()>> {
        plan.iter()
            .map(|req| {
                let images = Arc::clone(&self.images);
                let key = req.key;
                self.loader.load(&req.url, move |image| {
                    if let Ok(mut store) = images.lock() {
                        store.insert(key, image);
                    }
                })
            })
            .collect()
    }

    /// Number of images that have arrived so far
    pub fn resident(&self) -> usize {
        self.images.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Draw every resident image of `plan` onto a fresh layer surface.
    ///
    /// Images still in flight leave their area blank.
    pub fn paint(&self, view: &View, plan: &[ImageRequest], pixel_ratio: f64) -> Result<LayerFrame<PixmapSurface>> {
        let width = (view.viewport.width as f64 * pixel_ratio).round() as u32;
        let height = (view.viewport.height as f64 * pixel_ratio).round() as u32;
        let mut surface = PixmapSurface::new(width, height)?;

        if let Ok(store) = self.images.lock() {
            for req in plan {
                let Some(image) = store.get(&req.key) else {
                    continue;
                };
                let p = req.placement;
                surface.set_transform(Matrix::new(
                    p.width / image.width() as f32,
                    0.0,
                    0.0,
                    p.height / image.height() as f32,
                    p.x,
                    p.y,
                ));
                surface.draw_surface(image, 0.0, 0.0);
            }
        }
        surface.set_transform(Matrix::IDENTITY);

        Ok(LayerFrame {
            index: self.index,
            surface,
            style: SurfaceStyle {
                opacity: None,
                transform: None,
                css_width: view.viewport.width as f32,
                css_height: view.viewport.height as f32,
            },
            container: ContainerStyle {
                opacity: Some(self.opacity),
                background_color: self.background,
            },
            visible: self.is_rendered(view),
        })
    }
}

/// Device-pixel rectangle of `bbox` on a layer surface showing `view`
fn placement(view: &View, pixel_ratio: f64, bbox: [f64; 4]) -> Placement {
    let extent = view.extent();
    let px = |d: f64| (d / view.resolution * pixel_ratio) as f32;
    Placement {
        x: px(bbox[0] - extent[0]),
        y: px(extent[3] - bbox[3]),
        width: px(bbox[2] - bbox[0]),
        height: px(bbox[3] - bbox[1]),
    }
}

/// Builds [`RenderedLayer`]s, binding each to a [`ProxifiedLoader`].
pub struct LayerFactory {
    loader: ProxifiedLoader,
    view_projection: Projection,
    sink: Arc<dyn LogSink>,
}

impl LayerFactory {
    pub fn new(
        ctx: Arc<ProxyContext>,
        client: Arc<dyn HttpClient>,
        config: &EngineConfig,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            loader: ProxifiedLoader::new(client, ctx, config.proxy_base.clone(), Arc::clone(&sink)),
            view_projection: config.view_projection,
            sink,
        }
    }

    pub fn build(&self, index: usize, def: &LayerDefinition) -> Result<RenderedLayer> {
        match def {
            LayerDefinition::Wms(wms) => self.build_wms(index, wms),
            LayerDefinition::Unsupported { class_name } => Err(Error::UnsupportedLayer(class_name.clone())),
            LayerDefinition::Invalid { class_name, error } => {
                Err(Error::Parse(format!("Invalid {} layer: {}", class_name, error)))
            }
        }
    }

    fn build_wms(&self, index: usize, def: &WmsLayerDefinition) -> Result<RenderedLayer> {
        let raw_url = decode_component(&def.url);
        let url = Url::parse(&raw_url).map_err(|e| Error::Parse(format!("Invalid layer URL {}: {}", raw_url, e)))?;
        let label = def.title.clone().unwrap_or_else(|| format!("#{}", index));

        if let Some(code) = def.projection.as_deref() {
            if Projection::from_code(code) != Some(self.view_projection) {
                self.sink.log(format!(
                    "Layer {} declares projection {}, requesting {} instead",
                    label, code, self.view_projection
                ));
            }
        }

        let background = def.background.as_deref().and_then(|css| match Rgba::parse_css(css) {
            Ok(color) => Some(color),
            Err(e) => {
                self.sink.log(format!("Layer {} background ignored: {}", label, e));
                None
            }
        });

        Ok(RenderedLayer {
            index,
            title: def.title.clone(),
            backing: if def.single_tile {
                BackingStore::SingleImage
            } else {
                BackingStore::Tiled
            },
            source: WmsSource::new(url, sanitize_params(&def.params)),
            visible: def.visibility.unwrap_or(true),
            min_resolution: def.min_resolution.filter(|r| *r > 0.0).unwrap_or(0.0),
            max_resolution: def.max_resolution.filter(|r| *r > 0.0).unwrap_or(f64::INFINITY),
            opacity: def.opacity.map(|o| o.clamp(0.0, 1.0)).unwrap_or(1.0) as f32,
            background,
            loader: self.loader.clone(),
            images: Arc::default(),
        })
    }

    /// Build every layer in order; layers that cannot be built are logged and skipped.
    pub fn build_all(&self, defs: &[LayerDefinition]) -> Vec<RenderedLayer> {
        defs.iter()
            .enumerate()
            .filter_map(|(index, def)| match self.build(index, def) {
                Ok(layer) => Some(layer),
                Err(e @ Error::UnsupportedLayer(_)) => {
                    self.sink.log(e.to_string());
                    None
                }
                Err(e) => {
                    self.sink.log(format!("Skipping layer {}: {}", index, e));
                    None
                }
            })
            .collect()
    }
}
