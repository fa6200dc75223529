//! View fitting: extent normalization, reprojection and resolution fit.

use crate::definition::Extent;
use crate::projection::{transform_extent, Projection};
use crate::{Error, Result, Viewport};

/// Coordinate reference system every definition extent is expressed in
pub const SOURCE_PROJECTION: Projection = Projection::Epsg4326;

/// Normalize an extent to `[minX, minY, maxX, maxY]`.
///
/// Strings are split on whitespace. Every value must be a finite number;
/// anything else fails with [`Error::Parse`].
pub fn normalize_extent(extent: &Extent) -> Result<[f64; 4]> {
    let values: Vec<f64> = match extent {
        Extent::Text(s) => s
            .split_whitespace()
            .map(|token| {
                token
                    .parse::<f64>()
                    .map_err(|_| Error::Parse(format!("Extent token {:?} is not a number", token)))
            })
            .collect::<Result<_>>()?,
        Extent::Values(v) => v.clone(),
    };
    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
        return Err(Error::Parse(format!("Extent value {} is not finite", bad)));
    }
    <[f64; 4]>::try_from(values)
        .map_err(|v| Error::Parse(format!("Extent needs 4 values, got {}", v.len())))
}

/// Center and resolution of the map for one viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct View {
    pub projection: Projection,
    pub center: [f64; 2],
    /// Map units per CSS pixel
    pub resolution: f64,
    pub viewport: Viewport,
}

impl View {
    /// Fit `extent` (in `projection`) into `viewport` without snapping the
    /// resolution to discrete zoom levels.
    pub fn fit(extent: [f64; 4], projection: Projection, viewport: Viewport) -> Result<Self> {
        if viewport.width == 0 || viewport.height == 0 {
            return Err(Error::ConfigError("Viewport must not be empty".into()));
        }
        let [min_x, min_y, max_x, max_y] = extent;
        let resolution = f64::max(
            (max_x - min_x) / viewport.width as f64,
            (max_y - min_y) / viewport.height as f64,
        );
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(Error::RenderError(format!("Cannot fit view to extent {:?}", extent)));
        }
        Ok(Self {
            projection,
            center: [(min_x + max_x) / 2.0, (min_y + max_y) / 2.0],
            resolution,
            viewport,
        })
    }

    /// Extent covered by the viewport
    pub fn extent(&self) -> [f64; 4] {
        let half_w = self.viewport.width as f64 * self.resolution / 2.0;
        let half_h = self.viewport.height as f64 * self.resolution / 2.0;
        [
            self.center[0] - half_w,
            self.center[1] - half_h,
            self.center[0] + half_w,
            self.center[1] + half_h,
        ]
    }
}

/// Normalize, reproject from EPSG:4326 and fit.
pub fn fit_view(extent: &Extent, projection: Projection, viewport: Viewport) -> Result<View> {
    let bbox = normalize_extent(extent)?;
    let projected = transform_extent(bbox, SOURCE_PROJECTION, projection);
    View::fit(projected, projection, viewport)
}
