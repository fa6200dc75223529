//! One render run: definition fetch, layer construction, render pass, composite.

use crate::definition::fetch_map_definition;
use crate::diagnostics::{LogBuffer, LogSink};
use crate::http::HttpClient;
use crate::layer::LayerFactory;
use crate::rendering::map::MapRenderer;
use crate::rendering::OutputImage;
use crate::request::RenderRequest;
use crate::view::fit_view;
use crate::{EngineConfig, Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Render the map described by `request` into a single image.
///
/// A failed definition fetch aborts the run. Individual image failures only
/// leave their area blank.
pub async fn render_map(
    request: &RenderRequest,
    config: &EngineConfig,
    client: Arc<dyn HttpClient>,
    sink: Arc<dyn LogSink>,
) -> Result<OutputImage> {
    let ctx = Arc::new(request.proxy_context());
    let definition = fetch_map_definition(
        client.as_ref(),
        &config.proxy_base,
        &request.map_def_url,
        &ctx.headers,
        sink.as_ref(),
    )
    .await?;

    let view = fit_view(&definition.extent, config.view_projection, config.viewport)?;
    log::debug!("view center={:?} resolution={}", view.center, view.resolution);

    let factory = LayerFactory::new(Arc::clone(&ctx), client, config, Arc::clone(&sink));
    let layers = factory.build_all(&definition.layers);

    let mut renderer = MapRenderer::new(view, layers, config, Arc::clone(&sink));
    let complete = renderer.on_render_complete();
    renderer.render_sync().await?;
    let frame = complete
        .await
        .map_err(|_| Error::RenderError("render pass finished without signalling completion".into()))?;
    sink.log("rendercomplete".to_string());

    OutputImage::compose(&frame, sink.as_ref())
}

/// Outcome of [`run`], serializable for the CLI
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub data_url: Option<String>,
    pub error: Option<String>,
    pub saved_file: Option<PathBuf>,
    pub layers_drawn: usize,
    pub logs: Vec<String>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Full run with a fresh log buffer; saves into `out_dir` when a file name was requested.
pub async fn run(
    request: Result<RenderRequest>,
    config: &EngineConfig,
    client: Arc<dyn HttpClient>,
    out_dir: &Path,
) -> RunReport {
    let logs = Arc::new(LogBuffer::new());
    let mut report = RunReport::default();

    let outcome = match request {
        Ok(request) => execute(&request, config, client, Arc::clone(&logs) as Arc<dyn LogSink>, out_dir, &mut report).await,
        Err(e) => {
            if matches!(e, Error::MissingParameter(_)) {
                logs.log("Query does not contain map_def_url parameter".to_string());
            }
            Err(e)
        }
    };

    if let Err(e) = outcome {
        report.error = Some(e.to_string());
    }
    report.logs = logs.entries();
    report
}

async fn execute(
    request: &RenderRequest,
    config: &EngineConfig,
    client: Arc<dyn HttpClient>,
    sink: Arc<dyn LogSink>,
    out_dir: &Path,
    report: &mut RunReport,
) -> Result<()> {
    let image = render_map(request, config, client, Arc::clone(&sink)).await?;
    report.layers_drawn = image.drawn_layers().len();
    report.data_url = Some(image.to_data_url()?);
    if let Some(name) = &request.file_name {
        let path = image.save(out_dir, name)?;
        sink.log(format!("saved {}", path.display()));
        report.saved_file = Some(path);
    }
    Ok(())
}
