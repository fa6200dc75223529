//! Mapshot
//!
//! Renders a declarative WMS map definition into a single flattened PNG and
//! provides the forward proxy every image fetch is routed through.
//!
//! # Pipeline
//!
//! - **Definition**: fetched through the proxy, optionally with one
//!   caller-supplied header
//! - **Layers**: one [`layer::RenderedLayer`] per supported descriptor, loading
//!   only through a [`loader::ProxifiedLoader`]
//! - **Render pass**: loads run as independent tasks; the layers are painted
//!   with whatever arrived and a one-shot completion signal fires
//! - **Composite**: per-layer surfaces are flattened honoring opacity,
//!   transforms and backgrounds
//!
//! # Example
//!
//! ```no_run
//! use mapshot::{EngineConfig, RenderRequest, Viewport};
//! use mapshot::diagnostics::LogBuffer;
//! use mapshot::http::ReqwestClient;
//! use std::sync::Arc;
//!
//! # async fn run() -> mapshot::Result<()> {
//! let config = EngineConfig {
//!     viewport: Viewport { width: 800, height: 600 },
//!     ..Default::default()
//! };
//! let request = RenderRequest::from_query("map_def_url=http%3A%2F%2Fhost%2Fmap.json")?;
//! let client = Arc::new(ReqwestClient::new(&config)?);
//! let image = mapshot::render_map(&request, &config, client, Arc::new(LogBuffer::new())).await?;
//! std::fs::write("map.png", image.to_png()?)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod definition;
pub mod diagnostics;
pub mod http;
pub mod layer;
pub mod loader;
pub mod projection;
pub mod proxify;
pub mod rendering;
pub mod request;
pub mod session;
pub mod tilegrid;
pub mod view;

// Forward proxy server (axum + tower-http)
#[cfg(feature = "proxy")]
pub mod proxy;

pub use projection::Projection;
pub use rendering::OutputImage;
pub use request::{ProxyContext, RenderRequest};
pub use session::{render_map, run, RunReport};

/// Configuration for one render run
///
/// The defaults match the headless window the thumbnails were designed for
/// and a proxy listening on the local host.
///
/// # Examples
///
/// ```
/// let cfg = mapshot::EngineConfig::default();
/// assert_eq!(cfg.proxy_base, "http://localhost:8080");
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Map viewport in CSS pixels; also the output image size
    pub viewport: Viewport,
    /// Device pixels per CSS pixel of the layer surfaces
    pub pixel_ratio: f64,
    /// Origin of the forward proxy every fetch is routed through
    pub proxy_base: String,
    /// Timeout for each fetch in milliseconds
    pub timeout_ms: u64,
    /// User agent string to send with requests
    pub user_agent: String,
    /// Delay between triggering loads and painting, in milliseconds.
    /// Zero paints right after the loads had one chance to run.
    pub settle_ms: u64,
    /// Projection of the map view
    pub view_projection: Projection,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            pixel_ratio: 1.0,
            proxy_base: "http://localhost:8080".to_string(),
            timeout_ms: 30000,
            user_agent: format!("mapshot/{}", env!("CARGO_PKG_VERSION")),
            settle_ms: 0,
            view_projection: Projection::Epsg3857,
        }
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 500,
            height: 500,
        }
    }
}
