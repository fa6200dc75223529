//! Tile grid covering a projection's extent, origin at the top-left corner.

use crate::projection::Projection;

pub const TILE_SIZE: u32 = 256;
const MAX_ZOOM: usize = 42;

/// Inclusive range of tile columns/rows at one zoom level; empty when min > max
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub min_x: i64,
    pub max_x: i64,
    pub min_y: i64,
    pub max_y: i64,
}

impl TileRange {
    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        (self.min_y..=self.max_y).flat_map(move |y| (self.min_x..=self.max_x).map(move |x| (x, y)))
    }
}

#[derive(Debug, Clone)]
pub struct TileGrid {
    extent: [f64; 4],
    resolutions: Vec<f64>,
}

impl TileGrid {
    pub fn for_projection(projection: Projection) -> Self {
        let extent = projection.extent();
        let max_res = f64::max(extent[2] - extent[0], extent[3] - extent[1]) / TILE_SIZE as f64;
        let resolutions = (0..=MAX_ZOOM).map(|z| max_res / 2f64.powi(z as i32)).collect();
        Self { extent, resolutions }
    }

    pub fn resolution(&self, z: usize) -> f64 {
        self.resolutions[z.min(MAX_ZOOM)]
    }

    /// Level whose resolution is nearest to `resolution`
    pub fn z_for_resolution(&self, resolution: f64) -> usize {
        self.resolutions
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (*a - resolution)
                    .abs()
                    .partial_cmp(&(*b - resolution).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(z, _)| z)
            .unwrap_or(0)
    }

    fn span(&self, z: usize) -> f64 {
        self.resolution(z) * TILE_SIZE as f64
    }

    /// Tiles intersecting `extent`, clamped to the grid
    pub fn tile_range(&self, extent: [f64; 4], z: usize) -> TileRange {
        let span = self.span(z);
        let (origin_x, origin_y) = (self.extent[0], self.extent[3]);
        let cols = ((self.extent[2] - self.extent[0]) / span).ceil() as i64;
        let rows = ((self.extent[3] - self.extent[1]) / span).ceil() as i64;

        TileRange {
            min_x: (((extent[0] - origin_x) / span).floor() as i64).max(0),
            max_x: ((((extent[2] - origin_x) / span).ceil() as i64) - 1).min(cols - 1),
            min_y: (((origin_y - extent[3]) / span).floor() as i64).max(0),
            max_y: ((((origin_y - extent[1]) / span).ceil() as i64) - 1).min(rows - 1),
        }
    }

    pub fn tile_extent(&self, z: usize, x: i64, y: i64) -> [f64; 4] {
        let span = self.span(z);
        let min_x = self.extent[0] + x as f64 * span;
        let max_y = self.extent[3] - y as f64 * span;
        [min_x, max_y - span, min_x + span, max_y]
    }
}
