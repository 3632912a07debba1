//! Geometric primitives shared by representations and interpolation methods.

use crate::errors::{RegridError, RegridResult};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in metres, used by the spectral wind derivation.
pub const EARTH_RADIUS: f64 = 6_371_229.0;

/// A grid point in geographic coordinates, degrees.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Cartesian coordinates on the unit sphere.
    ///
    /// Spatial search happens in 3-D so that neighbourhoods remain correct
    /// across the date line and near the poles.
    pub fn to_xyz(&self) -> [f64; 3] {
        let lat = self.lat.to_radians();
        let lon = self.lon.to_radians();
        [
            lat.cos() * lon.cos(),
            lat.cos() * lon.sin(),
            lat.sin(),
        ]
    }
}

/// Normalise a longitude into `[reference, reference + 360)`.
pub fn normalise_longitude(lon: f64, reference: f64) -> f64 {
    let mut result = lon;
    while result < reference {
        result += 360.0;
    }
    while result >= reference + 360.0 {
        result -= 360.0;
    }
    result
}

/// A latitude/longitude bounding box, degrees.
///
/// Invariants: `north > south`, both within `[-90, 90]`, and the west-east
/// span lies in `(0, 360]`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    north: f64,
    west: f64,
    south: f64,
    east: f64,
}

impl BoundingBox {
    pub fn new(north: f64, west: f64, south: f64, east: f64) -> RegridResult<Self> {
        // A full 360-degree span must survive normalisation.
        let normalised = normalise_longitude(east, west);
        let east = if normalised == west && east != west {
            west + 360.0
        } else {
            normalised
        };
        let degenerate = !(north > south)
            || north > 90.0
            || south < -90.0
            || (east - west) <= 0.0
            || (east - west) > 360.0;
        if degenerate {
            return Err(RegridError::DegenerateBoundingBox {
                north,
                south,
                west,
                east,
            });
        }
        Ok(Self {
            north,
            west,
            south,
            east,
        })
    }

    /// The whole globe.
    pub fn global() -> Self {
        Self {
            north: 90.0,
            west: 0.0,
            south: -90.0,
            east: 360.0,
        }
    }

    pub fn north(&self) -> f64 {
        self.north
    }

    pub fn west(&self) -> f64 {
        self.west
    }

    pub fn south(&self) -> f64 {
        self.south
    }

    pub fn east(&self) -> f64 {
        self.east
    }

    /// Whether the point lies inside the box, longitudes compared modulo 360.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        if lat > self.north || lat < self.south {
            return false;
        }
        let lon = normalise_longitude(lon, self.west);
        lon <= self.east
    }

    /// Whether the longitude falls within the box's west-east span.
    pub fn contains_longitude(&self, lon: f64) -> bool {
        normalise_longitude(lon, self.west) <= self.east
    }

    /// Whether `other` covers the same area within `tolerance` degrees.
    pub fn is_close_to(&self, other: &BoundingBox, tolerance: f64) -> bool {
        (self.north - other.north).abs() <= tolerance
            && (self.south - other.south).abs() <= tolerance
            && (self.west - other.west).abs() <= tolerance
            && (self.east - other.east).abs() <= tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_invariants() {
        assert!(BoundingBox::new(10.0, 0.0, 20.0, 30.0).is_err());
        assert!(BoundingBox::new(95.0, 0.0, -90.0, 360.0).is_err());
        assert!(BoundingBox::new(10.0, 0.0, -10.0, 0.0).is_err());
        assert!(BoundingBox::new(10.0, 0.0, -10.0, 30.0).is_ok());
    }

    #[test]
    fn global_box_contains_everything() {
        let bbox = BoundingBox::global();
        assert!(bbox.contains(90.0, 0.0));
        assert!(bbox.contains(-90.0, 359.9));
        assert!(bbox.contains(0.0, -180.0));
    }

    #[test]
    fn containment_wraps_longitude() {
        let bbox = BoundingBox::new(60.0, 350.0, 40.0, 370.0).unwrap();
        assert!(bbox.contains(50.0, 355.0));
        assert!(bbox.contains(50.0, 5.0));
        assert!(!bbox.contains(50.0, 20.0));
        assert!(!bbox.contains(30.0, 355.0));
    }

    #[test]
    fn unit_sphere_coordinates() {
        let north_pole = Point::new(90.0, 0.0).to_xyz();
        assert!((north_pole[2] - 1.0).abs() < 1e-12);

        let greenwich = Point::new(0.0, 0.0).to_xyz();
        assert!((greenwich[0] - 1.0).abs() < 1e-12);
    }
}
