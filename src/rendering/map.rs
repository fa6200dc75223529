//! The map render pass and its one-shot completion signal.

use crate::diagnostics::LogSink;
use crate::layer::RenderedLayer;
use crate::loader::ImageRequest;
use crate::rendering::compositor::LayerFrame;
use crate::rendering::raster::PixmapSurface;
use crate::view::View;
use crate::{EngineConfig, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Everything painted by one render pass, in stacking order
#[derive(Debug)]
pub struct RenderFrame {
    /// Output size in CSS pixels
    pub width: u32,
    pub height: u32,
    pub frames: Vec<LayerFrame<PixmapSurface>>,
}

/// Drives loading and painting of the layers of one map.
///
/// [`render_sync`](Self::render_sync) never waits for loads to finish: it
/// paints whatever is resident after the settle delay and fires the
/// render-complete signal once. Loads still in flight keep running and are
/// simply not part of the frame.
pub struct MapRenderer {
    view: View,
    layers: Vec<RenderedLayer>,
    pixel_ratio: f64,
    settle: Duration,
    sink: Arc<dyn LogSink>,
    complete: Option<oneshot::Sender<RenderFrame>>,
}

impl MapRenderer {
    pub fn new(view: View, layers: Vec<RenderedLayer>, config: &EngineConfig, sink: Arc<dyn LogSink>) -> Self {
        Self {
            view,
            layers,
            pixel_ratio: config.pixel_ratio,
            settle: Duration::from_millis(config.settle_ms),
            sink,
            complete: None,
        }
    }

    /// Register the single listener for the next completed render pass
    pub fn on_render_complete(&mut self) -> oneshot::Receiver<RenderFrame> {
        let (tx, rx) = oneshot::channel();
        self.complete = Some(tx);
        rx
    }

    /// Trigger every load, then paint what has arrived and signal completion.
    pub async fn render_sync(&mut self) -> Result<()> {
        let plans: Vec<Vec<ImageRequest>> = self
            .layers
            .iter()
            .map(|layer| {
                if !layer.is_rendered(&self.view) {
                    log::debug!("layer {} not rendered at resolution {}", layer.index, self.view.resolution);
                    return Vec::new();
                }
                let plan = layer.plan(&self.view, self.pixel_ratio);
                // detached; completion is not awaited
                let _ = layer.request(&plan);
                plan
            })
            .collect();

        let requested: usize = plans.iter().map(Vec::len).sum();
        self.sink
            .log(format!("render pass requested {} images for {} layers", requested, self.layers.len()));

        if self.settle.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.settle).await;
        }

        let frames = self
            .layers
            .iter()
            .zip(&plans)
            .map(|(layer, plan)| layer.paint(&self.view, plan, self.pixel_ratio))
            .collect::<Result<Vec<_>>>()?;

        let resident: usize = self.layers.iter().map(RenderedLayer::resident).sum();
        self.sink
            .log(format!("render pass painted {} of {} images", resident.min(requested), requested));

        if let Some(tx) = self.complete.take() {
            let frame = RenderFrame {
                width: self.view.viewport.width,
                height: self.view.viewport.height,
                frames,
            };
            if tx.send(frame).is_err() {
                log::warn!("render-complete listener dropped");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::LayerDefinition;
    use crate::diagnostics::LogBuffer;
    use crate::http::mock::{solid_png, MockClient};
    use crate::layer::LayerFactory;
    use crate::projection::Projection;
    use crate::rendering::surface::{Rgba, Surface};
    use crate::request::ProxyContext;
    use crate::Viewport;
    use serde_json::json;

    fn renderer(client: MockClient, layers: serde_json::Value) -> (MapRenderer, Arc<MockClient>, Arc<LogBuffer>) {
        let config = EngineConfig {
            viewport: Viewport { width: 64, height: 64 },
            settle_ms: 10,
            ..Default::default()
        };
        let client = Arc::new(client);
        let sink = Arc::new(LogBuffer::new());
        let factory = LayerFactory::new(Arc::new(ProxyContext::default()), client.clone(), &config, sink.clone());
        let defs: Vec<LayerDefinition> = layers
            .as_array()
            .unwrap()
            .iter()
            .cloned()
            .map(LayerDefinition::from_value)
            .collect();
        let view = View::fit([0.0, 0.0, 640_000.0, 640_000.0], Projection::Epsg3857, config.viewport).unwrap();
        let renderer = MapRenderer::new(view, factory.build_all(&defs), &config, sink.clone());
        (renderer, client, sink)
    }

    #[tokio::test]
    async fn signal_fires_with_available_images() {
        let client = MockClient::new()
            .respond("http://fast/wms", 200, solid_png(8, 8, [0, 0, 255, 255]))
            .hang("http://slow/wms");
        let (mut map, client, _sink) = renderer(
            client,
            json!([
                {"className": "WMS", "url": "http://fast/wms", "singleTile": true},
                {"className": "WMS", "url": "http://slow/wms", "singleTile": true}
            ]),
        );
        let complete = map.on_render_complete();
        map.render_sync().await.unwrap();
        let frame = complete.await.unwrap();

        assert_eq!((frame.width, frame.height), (64, 64));
        assert_eq!(frame.frames.len(), 2);
        assert_eq!(frame.frames[0].surface.pixel(32, 32), Some(Rgba(0, 0, 255, 255)));
        // the hung request leaves its layer blank but present
        assert!(frame.frames[1].visible);
        assert_eq!(frame.frames[1].surface.pixel(32, 32), Some(Rgba(0, 0, 0, 0)));
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn hidden_layers_are_not_loaded() {
        let (mut map, client, _sink) = renderer(
            MockClient::new(),
            json!([
                {"className": "WMS", "url": "http://x/wms", "visibility": false},
                {"className": "WMS", "url": "http://y/wms", "maxResolution": 1.0}
            ]),
        );
        let complete = map.on_render_complete();
        map.render_sync().await.unwrap();
        let frame = complete.await.unwrap();
        assert!(frame.frames.iter().all(|f| !f.visible));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn signal_fires_once() {
        let (mut map, _client, _sink) = renderer(MockClient::new(), json!([]));
        let complete = map.on_render_complete();
        map.render_sync().await.unwrap();
        map.render_sync().await.unwrap();
        let frame = complete.await.unwrap();
        assert!(frame.frames.is_empty());
    }
}
