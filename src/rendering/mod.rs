//! Layer surfaces, the render pass and the flattened output image

pub mod compositor;
pub mod map;
pub mod raster;
pub mod surface;

use crate::diagnostics::LogSink;
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use compositor::DrawnLayer;
use map::RenderFrame;
use raster::PixmapSurface;
use std::path::{Path, PathBuf};
use surface::{Rgba, Surface};

/// The single flattened image of one render; read-only once composed.
#[derive(Debug)]
pub struct OutputImage {
    surface: PixmapSurface,
    drawn: Vec<DrawnLayer>,
}

impl OutputImage {
    /// Flatten a completed render pass at its viewport size
    pub fn compose(frame: &RenderFrame, sink: &dyn LogSink) -> Result<Self> {
        let composite = compositor::compose(frame.width, frame.height, &frame.frames, sink)?;
        Ok(Self {
            surface: composite.surface,
            drawn: composite.drawn,
        })
    }

    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        self.surface.pixel(x, y)
    }

    /// Layers drawn into the image, bottom first
    pub fn drawn_layers(&self) -> &[DrawnLayer] {
        &self.drawn
    }

    pub fn to_png(&self) -> Result<Vec<u8>> {
        self.surface.encode_png()
    }

    pub fn to_data_url(&self) -> Result<String> {
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(self.to_png()?)))
    }

    /// Write the PNG to `dir`, keeping only the final component of `file_name`
    pub fn save(&self, dir: &Path, file_name: &str) -> Result<PathBuf> {
        let name = Path::new(file_name)
            .file_name()
            .ok_or_else(|| Error::ConfigError(format!("Invalid file name {:?}", file_name)))?;
        std::fs::create_dir_all(dir)?;
        let path = dir.join(name);
        std::fs::write(&path, self.to_png()?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::compositor::{ContainerStyle, LayerFrame, SurfaceStyle};
    use super::*;
    use crate::diagnostics::LogBuffer;

    fn output() -> OutputImage {
        let mut green = PixmapSurface::new(2, 2).unwrap();
        green.fill_rect(Rgba(0, 255, 0, 255), 2.0, 2.0);
        let frame = RenderFrame {
            width: 4,
            height: 4,
            frames: vec![LayerFrame {
                index: 0,
                surface: green,
                style: SurfaceStyle { css_width: 4.0, css_height: 4.0, ..Default::default() },
                container: ContainerStyle::default(),
                visible: true,
            }],
        };
        OutputImage::compose(&frame, &LogBuffer::new()).unwrap()
    }

    #[test]
    fn encodes_png_and_data_url() {
        let image = output();
        assert_eq!((image.width(), image.height()), (4, 4));
        assert_eq!(image.pixel(3, 3), Some(Rgba(0, 255, 0, 255)));

        let url = image.to_data_url().unwrap();
        let b64 = url.strip_prefix("data:image/png;base64,").unwrap();
        assert_eq!(STANDARD.decode(b64).unwrap(), image.to_png().unwrap());
    }

    #[test]
    fn save_strips_directories_from_file_name() {
        let dir = std::env::temp_dir().join(format!("mapshot-save-{}", std::process::id()));
        let path = output().save(&dir, "../../thumb.png").unwrap();
        assert_eq!(path, dir.join("thumb.png"));
        assert!(std::fs::read(&path).unwrap().starts_with(b"\x89PNG"));
        let _ = std::fs::remove_dir_all(&dir);

        assert!(output().save(&dir, "..").is_err());
    }
}
