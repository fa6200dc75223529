//! Flattens per-layer surfaces into one output surface.

use crate::diagnostics::LogSink;
use crate::rendering::surface::{Matrix, Rgba, Surface};
use crate::Result;

/// Style attached to a layer's surface element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceStyle {
    pub opacity: Option<f32>,
    /// CSS `matrix(...)` transform string
    pub transform: Option<String>,
    /// Displayed size in CSS pixels
    pub css_width: f32,
    pub css_height: f32,
}

/// Style of the element containing a layer's surface
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerStyle {
    pub opacity: Option<f32>,
    pub background_color: Option<Rgba>,
}

/// One rendered layer awaiting composition
#[derive(Debug)]
pub struct LayerFrame<S> {
    /// Position of the layer in the definition
    pub index: usize,
    pub surface: S,
    pub style: SurfaceStyle,
    pub container: ContainerStyle,
    pub visible: bool,
}

impl<S: Surface> LayerFrame<S> {
    /// Surface opacity, falling back to the container's, then 1
    pub fn effective_opacity(&self) -> f32 {
        self.style.opacity.or(self.container.opacity).unwrap_or(1.0)
    }

    /// Explicit transform when present, otherwise the CSS-size / pixel-size scale
    pub fn effective_matrix(&self) -> Result<Matrix> {
        match &self.style.transform {
            Some(t) => Matrix::parse_css(t),
            None => Ok(Matrix::scale(
                self.style.css_width / self.surface.width() as f32,
                self.style.css_height / self.surface.height() as f32,
            )),
        }
    }
}

/// Record of a surface drawn into the output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawnLayer {
    pub index: usize,
    pub alpha: f32,
}

#[derive(Debug)]
pub struct Composite<S> {
    pub surface: S,
    pub drawn: Vec<DrawnLayer>,
}

/// Draw `frames` bottom-to-top into a fresh `width` × `height` surface.
///
/// Hidden and zero-width frames are skipped. A frame whose transform cannot
/// be parsed is logged and skipped; the rest still compose.
pub fn compose<S: Surface>(width: u32, height: u32, frames: &[LayerFrame<S>], sink: &dyn LogSink) -> Result<Composite<S>> {
    let mut out = S::new(width, height)?;
    let mut drawn = Vec::new();

    for frame in frames {
        if !frame.visible || frame.surface.width() == 0 {
            continue;
        }
        let matrix = match frame.effective_matrix() {
            Ok(m) => m,
            Err(e) => {
                sink.log(format!("Skipping layer {}: {}", frame.index, e));
                continue;
            }
        };
        let alpha = frame.effective_opacity();

        out.set_global_alpha(alpha);
        out.set_transform(matrix);
        if let Some(bg) = frame.container.background_color {
            out.fill_rect(bg, frame.surface.width() as f32, frame.surface.height() as f32);
        }
        out.draw_surface(&frame.surface, 0.0, 0.0);
        out.set_global_alpha(1.0);
        out.set_transform(Matrix::IDENTITY);

        drawn.push(DrawnLayer { index: frame.index, alpha });
    }

    Ok(Composite { surface: out, drawn })
}
