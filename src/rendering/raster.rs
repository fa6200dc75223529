//! Software rasterizer surface backed by a tiny-skia pixmap

use crate::rendering::surface::{Matrix, Rgba, Surface};
use crate::{Error, Result};
use tiny_skia::{BlendMode, FilterQuality, IntSize, Paint, Pixmap, PixmapPaint, Rect, Transform};

pub struct PixmapSurface {
    pixmap: Pixmap,
    global_alpha: f32,
    transform: Transform,
}

impl PixmapSurface {
    pub fn from_pixmap(pixmap: Pixmap) -> Self {
        Self {
            pixmap,
            global_alpha: 1.0,
            transform: Transform::identity(),
        }
    }
}

impl std::fmt::Debug for PixmapSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixmapSurface")
            .field("width", &self.pixmap.width())
            .field("height", &self.pixmap.height())
            .finish()
    }
}

fn to_transform(m: Matrix) -> Transform {
    Transform::from_row(m.a, m.b, m.c, m.d, m.e, m.f)
}

impl Surface for PixmapSurface {
    fn new(width: u32, height: u32) -> Result<Self> {
        let pixmap = Pixmap::new(width, height)
            .ok_or_else(|| Error::RenderError(format!("Cannot allocate {}x{} surface", width, height)))?;
        Ok(Self::from_pixmap(pixmap))
    }

    fn width(&self) -> u32 {
        self.pixmap.width()
    }

    fn height(&self) -> u32 {
        self.pixmap.height()
    }

    fn set_global_alpha(&mut self, alpha: f32) {
        self.global_alpha = alpha.clamp(0.0, 1.0);
    }

    fn set_transform(&mut self, matrix: Matrix) {
        self.transform = to_transform(matrix);
    }

    fn fill_rect(&mut self, color: Rgba, width: f32, height: f32) {
        let Some(rect) = Rect::from_xywh(0.0, 0.0, width, height) else {
            return;
        };
        let alpha = (color.3 as f32 * self.global_alpha).round() as u8;
        let mut paint = Paint::default();
        paint.set_color_rgba8(color.0, color.1, color.2, alpha);
        paint.anti_alias = false;
        self.pixmap.fill_rect(rect, &paint, self.transform, None);
    }

    fn draw_surface(&mut self, source: &Self, x: f32, y: f32) {
        let paint = PixmapPaint {
            opacity: self.global_alpha,
            blend_mode: BlendMode::SourceOver,
            quality: FilterQuality::Bilinear,
        };
        let transform = self.transform.pre_translate(x, y);
        self.pixmap
            .draw_pixmap(0, 0, source.pixmap.as_ref(), &paint, transform, None);
    }

    fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        let c = self.pixmap.pixel(x, y)?.demultiply();
        Some(Rgba(c.red(), c.green(), c.blue(), c.alpha()))
    }

    fn encode_png(&self) -> Result<Vec<u8>> {
        self.pixmap
            .encode_png()
            .map_err(|e| Error::RenderError(format!("PNG encoding failed: {}", e)))
    }
}

/// Decode fetched image bytes (PNG/JPEG) into a drawable surface.
pub fn decode_image(bytes: &[u8]) -> Result<PixmapSurface> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| Error::RenderError(format!("Cannot decode image: {}", e)))?;
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();

    // tiny-skia stores premultiplied RGBA
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        data.push((r as f32 * alpha).round() as u8);
        data.push((g as f32 * alpha).round() as u8);
        data.push((b as f32 * alpha).round() as u8);
        data.push(a);
    }

    let size = IntSize::from_wh(width, height)
        .ok_or_else(|| Error::RenderError("Decoded image is empty".into()))?;
    let pixmap = Pixmap::from_vec(data, size)
        .ok_or_else(|| Error::RenderError("Decoded image has an invalid size".into()))?;
    Ok(PixmapSurface::from_pixmap(pixmap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::solid_png;

    fn solid(width: u32, height: u32, color: Rgba) -> PixmapSurface {
        let mut s = PixmapSurface::new(width, height).unwrap();
        s.fill_rect(color, width as f32, height as f32);
        s
    }

    #[test]
    fn decode_and_encode_png() {
        let surface = decode_image(&solid_png(4, 3, [0, 128, 255, 255])).unwrap();
        assert_eq!((surface.width(), surface.height()), (4, 3));
        assert_eq!(surface.pixel(3, 2), Some(Rgba(0, 128, 255, 255)));

        let png = surface.encode_png().unwrap();
        assert_eq!(&png[0..8], b"\x89PNG\r\n\x1a\n");
        assert!(decode_image(b"definitely not an image").is_err());
    }

    #[test]
    fn draw_respects_global_alpha() {
        let mut dst = solid(2, 2, Rgba(255, 255, 255, 255));
        let src = solid(2, 2, Rgba(255, 0, 0, 255));
        dst.set_global_alpha(0.5);
        dst.draw_surface(&src, 0.0, 0.0);
        let p = dst.pixel(1, 1).unwrap();
        assert_eq!(p.0, 255);
        assert!((126..=129).contains(&p.1), "green was {}", p.1);
        assert_eq!(p.3, 255);
    }

    #[test]
    fn draw_applies_scale_transform() {
        let mut dst = PixmapSurface::new(4, 4).unwrap();
        let src = solid(2, 2, Rgba(0, 0, 255, 255));
        dst.set_transform(Matrix::scale(0.5, 0.5));
        dst.draw_surface(&src, 0.0, 0.0);
        assert_eq!(dst.pixel(0, 0).map(|p| p.2), Some(255));
        assert_eq!(dst.pixel(2, 2), Some(Rgba(0, 0, 0, 0)));
    }
}
