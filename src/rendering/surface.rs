//! Drawable surface capability shared by layer surfaces and the output image

use crate::{Error, Result};

/// 2-D affine transform in canvas `setTransform(a, b, c, d, e, f)` order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 };

    pub fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Parse a CSS `matrix(a, b, c, d, e, f)` transform
    pub fn parse_css(value: &str) -> Result<Self> {
        let inner = value
            .trim()
            .strip_prefix("matrix(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| Error::RenderError(format!("Unsupported transform {:?}", value)))?;
        let numbers = inner
            .split(',')
            .map(|n| n.trim().parse::<f32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::RenderError(format!("Invalid transform {:?}: {}", value, e)))?;
        let [a, b, c, d, e, f] = <[f32; 6]>::try_from(numbers)
            .map_err(|n| Error::RenderError(format!("Transform needs 6 values, got {}", n.len())))?;
        Ok(Self::new(a, b, c, d, e, f))
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Straight (non-premultiplied) RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba(pub u8, pub u8, pub u8, pub u8);

impl Rgba {
    /// Parse any CSS color notation
    pub fn parse_css(value: &str) -> Result<Self> {
        let color = csscolorparser::parse(value)
            .map_err(|e| Error::Parse(format!("Invalid color {:?}: {}", value, e)))?;
        let [r, g, b, a] = color.to_rgba8();
        Ok(Rgba(r, g, b, a))
    }
}

/// The operations the compositor needs from a canvas-like surface.
///
/// Global alpha and transform are drawing state, applied to every
/// subsequent `fill_rect`/`draw_surface` until changed.
pub trait Surface {
    fn new(width: u32, height: u32) -> Result<Self>
    where
        Self: Sized;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn set_global_alpha(&mut self, alpha: f32);

    fn set_transform(&mut self, matrix: Matrix);

    /// Fill `(0, 0, width, height)` under the current transform
    fn fill_rect(&mut self, color: Rgba, width: f32, height: f32);

    /// Draw `source` with its top-left corner at `(x, y)` under the current transform
    fn draw_surface(&mut self, source: &Self, x: f32, y: f32);

    fn pixel(&self, x: u32, y: u32) -> Option<Rgba>;

    fn encode_png(&self) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_css_matrix() {
        let m = Matrix::parse_css("matrix(0.5, 0, 0, 0.5, 10, -4.5)").unwrap();
        assert_eq!(m, Matrix::new(0.5, 0.0, 0.0, 0.5, 10.0, -4.5));
        assert!(Matrix::parse_css("scale(2)").is_err());
        assert!(Matrix::parse_css("matrix(1, 0, 0, 1)").is_err());
        assert!(Matrix::parse_css("matrix(1, 0, x, 1, 0, 0)").is_err());
    }

    #[test]
    fn parses_css_colors() {
        assert_eq!(Rgba::parse_css("#ff0000").unwrap(), Rgba(255, 0, 0, 255));
        let translucent = Rgba::parse_css("rgba(0, 0, 255, 0.5)").unwrap();
        assert_eq!((translucent.0, translucent.2), (0, 255));
        assert!((127..=128).contains(&translucent.3));
        assert!(Rgba::parse_css("not-a-color").is_err());
    }
}
