//! Per-layer image loading through the forward proxy.

use crate::diagnostics::LogSink;
use crate::http::HttpClient;
use crate::proxify::adjust_layer_url;
use crate::rendering::raster::{decode_image, PixmapSurface};
use crate::request::ProxyContext;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Identity of one image of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKey {
    /// The single full-extent image of a single-image layer
    Single,
    Tile { z: usize, x: i64, y: i64 },
}

/// Destination rectangle of an image on its layer surface, in device pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One image needed to draw a layer at the current view
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub key: ImageKey,
    /// Upstream URL before host substitution and proxification
    pub url: String,
    pub placement: Placement,
}

/// The only way a layer obtains image data.
///
/// Every load rewrites the URL through [`adjust_layer_url`], fetches it with
/// the context headers and hands the decoded image to a callback. Loads are
/// independent spawned tasks: they may finish in any order, and a failed
/// load is logged without affecting the others.
#[derive(Clone)]
pub struct ProxifiedLoader {
    client: Arc<dyn HttpClient>,
    ctx: Arc<ProxyContext>,
    proxy_base: String,
    sink: Arc<dyn LogSink>,
}

impl ProxifiedLoader {
    pub fn new(
        client: Arc<dyn HttpClient>,
        ctx: Arc<ProxyContext>,
        proxy_base: impl Into<String>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            client,
            ctx,
            proxy_base: proxy_base.into(),
            sink,
        }
    }

    /// Start loading `image_url`; `deliver` runs only if the image arrives
    /// and decodes. Must be called from within a tokio runtime.
    pub fn load<F>(&self, image_url: &str, deliver: F) -> JoinHandle<()>
    where
        F: FnOnce(PixmapSurface) + Send + 'static,
    {
        let adjusted = adjust_layer_url(&self.proxy_base, image_url, &self.ctx, self.sink.as_ref());
        self.sink
            .log(format!("load_fn, image_url={} adjusted_image_url={}", image_url, adjusted));

        let fetch = self.client.get(&adjusted, &self.ctx.headers);
        let sink = Arc::clone(&self.sink);
        let image_url = image_url.to_string();

        tokio::spawn(async move {
            let result: Result<PixmapSurface> = async {
                let resp = fetch.await?;
                sink.log(format!("load_fn, res.status={}, image_url={}", resp.status, image_url));
                if !resp.is_success() {
                    return Err(Error::Fetch {
                        url: image_url.clone(),
                        status: resp.status,
                    });
                }
                decode_image(&resp.body)
            }
            .await;

            match result {
                Ok(image) => {
                    sink.log("load_fn, image loaded".to_string());
                    deliver(image);
                }
                Err(e) => sink.log(format!("load_fn, failed to load {}: {}", image_url, e)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::LogBuffer;
    use crate::http::mock::{solid_png, MockClient};
    use crate::rendering::surface::{Rgba, Surface};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn context() -> Arc<ProxyContext> {
        let mut headers = BTreeMap::new();
        headers.insert("X-Editor".to_string(), "bob".to_string());
        Arc::new(ProxyContext {
            gs_url: Some("http://gs:8600/geoserver".into()),
            gs_public_url: Some("https://maps.example/geoserver".into()),
            headers,
        })
    }

    #[tokio::test]
    async fn delivers_decoded_image_through_proxy() {
        let client = Arc::new(
            MockClient::new().respond("http://gs:8600/geoserver/wms", 200, solid_png(2, 2, [10, 20, 30, 255])),
        );
        let sink = Arc::new(LogBuffer::new());
        let loader = ProxifiedLoader::new(client.clone(), context(), "http://localhost:8080", sink.clone());

        let got = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&got);
        loader
            .load("https://maps.example/geoserver/wms?LAYERS=a", move |img| {
                *slot.lock().unwrap() = img.pixel(0, 0);
            })
            .await
            .unwrap();

        assert_eq!(*got.lock().unwrap(), Some(Rgba(10, 20, 30, 255)));
        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].0.starts_with("http://localhost:8080/http_proxy?url=http%3A%2F%2Fgs%3A8600"));
        assert_eq!(requests[0].1.get("X-Editor").map(String::as_str), Some("bob"));
        assert_eq!(sink.count_matching("replaced layer URL"), 1);
        assert_eq!(sink.count_matching("load_fn, res.status=200"), 1);
    }

    #[tokio::test]
    async fn failures_are_logged_and_not_delivered() {
        let client = Arc::new(
            MockClient::new()
                .respond("http://tiles/missing", 500, "boom")
                .respond("http://tiles/garbage", 200, "not a png"),
        );
        let sink = Arc::new(LogBuffer::new());
        let loader = ProxifiedLoader::new(client, context(), "http://p", sink.clone());

        let delivered = Arc::new(Mutex::new(0));
        for url in ["http://tiles/missing", "http://tiles/garbage"] {
            let counter = Arc::clone(&delivered);
            loader
                .load(url, move |_| *counter.lock().unwrap() += 1)
                .await
                .unwrap();
        }

        assert_eq!(*delivered.lock().unwrap(), 0);
        assert_eq!(sink.count_matching("failed to load"), 2);
        assert_eq!(sink.count_matching("status 500"), 1);
    }
}
