//! Point buffers used as the query bound and export region.
//!
//! ## Coordinate order convention:
//!
//! - Earth Engine geometries take `[lon, lat]`, the reverse of the point table.
//! - Bounds arrays: `[min_lon, min_lat, max_lon, max_lat]`

use crate::expr::Node;
use anyhow::Result;
use serde::Serialize;
use serde_json::json;

/// Meters per degree of latitude on the WGS84 mean sphere.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Bounds in WGS84: [min_lon, min_lat, max_lon, max_lat]
pub type Bounds = [f64; 4];

/// A circular region around a point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BufferedPoint {
    pub longitude: f64,
    pub latitude: f64,
    pub radius_m: f64,
    pub max_error_m: f64,
}

impl BufferedPoint {
    /// Buffer a point. Fails on coordinates that cannot form a geometry.
    pub fn new(latitude: f64, longitude: f64, radius_m: f64, max_error_m: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            anyhow::bail!("Latitude {} is outside [-90, 90]", latitude);
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            anyhow::bail!("Longitude {} is outside [-180, 180]", longitude);
        }
        if !radius_m.is_finite() || radius_m < 0.0 {
            anyhow::bail!("Buffer radius must be >= 0, got {}", radius_m);
        }
        if !max_error_m.is_finite() || max_error_m < 0.0 {
            anyhow::bail!("Buffer error margin must be >= 0, got {}", max_error_m);
        }

        Ok(Self {
            longitude,
            latitude,
            radius_m,
            max_error_m,
        })
    }

    /// Approximate bounding box of the buffer.
    ///
    /// Longitude extent widens with latitude and is clamped to a full turn near the poles.
    pub fn bounds_wgs84(&self) -> Bounds {
        let dlat = self.radius_m / METERS_PER_DEGREE;
        let cos_lat = self.latitude.to_radians().cos();
        let dlon = if cos_lat > 1e-9 {
            (self.radius_m / (METERS_PER_DEGREE * cos_lat)).min(180.0)
        } else {
            180.0
        };

        [
            (self.longitude - dlon).max(-180.0),
            (self.latitude - dlat).max(-90.0),
            (self.longitude + dlon).min(180.0),
            (self.latitude + dlat).min(90.0),
        ]
    }

    /// Server-side geometry: `Geometry.buffer(Point([lon, lat]), radius, ErrorMargin(max_error))`.
    pub fn to_node(&self) -> Node {
        let point = Node::call(
            "GeometryConstructors.Point",
            [("coordinates", Node::constant(json!([self.longitude, self.latitude])))],
        );
        let margin = Node::call("ErrorMargin", [("value", Node::constant(json!(self.max_error_m)))]);

        Node::call(
            "Geometry.buffer",
            [
                ("geometry", point),
                ("distance", Node::constant(json!(self.radius_m))),
                ("maxError", margin),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_out_of_range() {
        assert!(BufferedPoint::new(91.0, 0.0, 50.0, 0.0).is_err());
        assert!(BufferedPoint::new(0.0, -180.5, 50.0, 0.0).is_err());
        assert!(BufferedPoint::new(f64::NAN, 0.0, 50.0, 0.0).is_err());
        assert!(BufferedPoint::new(0.0, 0.0, -1.0, 0.0).is_err());
        assert!(BufferedPoint::new(90.0, 180.0, 50.0, 0.0).is_ok());
    }

    #[test]
    fn test_bounds_at_equator() {
        let point = BufferedPoint::new(0.0, 10.0, 50.0, 0.0).unwrap();
        let [min_lon, min_lat, max_lon, max_lat] = point.bounds_wgs84();
        let expected = 50.0 / METERS_PER_DEGREE;
        assert!((max_lat - min_lat - 2.0 * expected).abs() < 1e-12);
        assert!((max_lon - min_lon - 2.0 * expected).abs() < 1e-9);
        assert!(min_lon < 10.0 && max_lon > 10.0);
    }

    #[test]
    fn test_bounds_widen_with_latitude() {
        let equator = BufferedPoint::new(0.0, 0.0, 50.0, 0.0).unwrap().bounds_wgs84();
        let north = BufferedPoint::new(60.0, 0.0, 50.0, 0.0).unwrap().bounds_wgs84();
        assert!((north[2] - north[0]) > 1.9 * (equator[2] - equator[0]));
    }

    #[test]
    fn test_bounds_clamped_at_pole() {
        let pole = BufferedPoint::new(90.0, 0.0, 50.0, 0.0).unwrap().bounds_wgs84();
        assert_eq!(pole[0], -180.0);
        assert_eq!(pole[2], 180.0);
        assert_eq!(pole[3], 90.0);
    }

    #[test]
    fn test_node_uses_lon_lat_order() {
        let point = BufferedPoint::new(42.5, -1.5, 50.0, 0.0).unwrap();
        let value = serde_json::to_value(crate::expr::Expression::encode(&point.to_node())).unwrap();
        let text = value.to_string();
        assert!(text.contains("[-1.5,42.5]"));
        assert!(text.contains("Geometry.buffer"));
        assert!(text.contains("ErrorMargin"));
    }
}
