//! Supported coordinate reference systems and the forward transforms between them.

use crate::{Error, Result};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

pub const EARTH_RADIUS: f64 = 6_378_137.0;
/// Half the width of the spherical Mercator world
pub const HALF_SIZE: f64 = PI * EARTH_RADIUS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Projection {
    /// Geographic longitude/latitude
    Epsg4326,
    /// Spherical (web) Mercator
    Epsg3857,
}

impl Projection {
    /// Resolve a CRS code, including the common aliases of both systems
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "EPSG:4326" | "CRS:84" | "URN:OGC:DEF:CRS:EPSG::4326" | "URN:OGC:DEF:CRS:OGC:1.3:CRS84" => {
                Some(Projection::Epsg4326)
            }
            "EPSG:3857" | "EPSG:900913" | "EPSG:102100" | "EPSG:102113" | "EPSG:3785"
            | "URN:OGC:DEF:CRS:EPSG::3857" => Some(Projection::Epsg3857),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Projection::Epsg4326 => "EPSG:4326",
            Projection::Epsg3857 => "EPSG:3857",
        }
    }

    /// Validity extent `[minX, minY, maxX, maxY]`
    pub fn extent(self) -> [f64; 4] {
        match self {
            Projection::Epsg4326 => [-180.0, -90.0, 180.0, 90.0],
            Projection::Epsg3857 => [-HALF_SIZE, -HALF_SIZE, HALF_SIZE, HALF_SIZE],
        }
    }

    pub fn transform_point(self, to: Projection, x: f64, y: f64) -> (f64, f64) {
        match (self, to) {
            (Projection::Epsg4326, Projection::Epsg3857) => {
                let mx = EARTH_RADIUS * x.to_radians();
                let my = EARTH_RADIUS * (PI * (y + 90.0) / 360.0).tan().ln();
                (mx, my.clamp(-HALF_SIZE, HALF_SIZE))
            }
            (Projection::Epsg3857, Projection::Epsg4326) => {
                let lon = (x / EARTH_RADIUS).to_degrees();
                let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
                (lon, lat)
            }
            _ => (x, y),
        }
    }
}

impl FromStr for Projection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Projection::from_code(s).ok_or_else(|| Error::ConfigError(format!("Unsupported projection {}", s)))
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Transform a bounding box by its corners.
pub fn transform_extent(extent: [f64; 4], from: Projection, to: Projection) -> [f64; 4] {
    let [min_x, min_y, max_x, max_y] = extent;
    let corners = [(min_x, min_y), (min_x, max_y), (max_x, min_y), (max_x, max_y)];
    let mut out = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
    for (x, y) in corners {
        let (tx, ty) = from.transform_point(to, x, y);
        out[0] = out[0].min(tx);
        out[1] = out[1].min(ty);
        out[2] = out[2].max(tx);
        out[3] = out[3].max(ty);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6 * b.abs().max(1.0)
    }

    #[test]
    fn resolves_aliases() {
        assert_eq!(Projection::from_code("epsg:900913"), Some(Projection::Epsg3857));
        assert_eq!(Projection::from_code("CRS:84"), Some(Projection::Epsg4326));
        assert_eq!(Projection::from_code("EPSG:5514"), None);
        assert!(matches!("EPSG:5514".parse::<Projection>(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn mercator_forward_transform() {
        let (x, y) = Projection::Epsg4326.transform_point(Projection::Epsg3857, 0.0, 0.0);
        assert!(close(x, 0.0) && close(y, 0.0));

        let (x, _) = Projection::Epsg4326.transform_point(Projection::Epsg3857, 180.0, 0.0);
        assert!(close(x, HALF_SIZE));

        let (_, y) = Projection::Epsg4326.transform_point(Projection::Epsg3857, 10.0, 10.0);
        assert!(close(y, 1_118_889.974_857_959));

        // poles clamp to the square world
        let (_, y) = Projection::Epsg4326.transform_point(Projection::Epsg3857, 0.0, 90.0);
        assert_eq!(y, HALF_SIZE);
    }

    #[test]
    fn extent_transform_uses_corners() {
        let ext = transform_extent([0.0, 0.0, 10.0, 10.0], Projection::Epsg4326, Projection::Epsg3857);
        assert!(close(ext[0], 0.0));
        assert!(close(ext[2], 1_113_194.907_932_735_7));
        assert!(close(ext[3], 1_118_889.974_857_959));

        let same = transform_extent([1.0, 2.0, 3.0, 4.0], Projection::Epsg4326, Projection::Epsg4326);
        assert_eq!(same, [1.0, 2.0, 3.0, 4.0]);
    }
}
