//! Regular and rotated latitude/longitude grids.

use crate::errors::{RegridError, RegridResult};
use crate::geometry::{normalise_longitude, BoundingBox, Point};
use crate::param::Parametrisation;
use crate::representation::{crop_to_point_list, Cropping, Representation};
use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const COUNT_EPS: f64 = 1e-9;

/// A regular latitude/longitude grid.
///
/// Points are stored row-major, north to south, west to east. A grid whose
/// west-east span is a full circle omits the duplicate eastern column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegularLatLon {
    bbox: BoundingBox,
    /// West-east increment, degrees.
    dlon: f64,
    /// South-north increment, degrees.
    dlat: f64,
    nlat: usize,
    nlon: usize,
}

impl RegularLatLon {
    pub fn new(bbox: BoundingBox, dlon: f64, dlat: f64) -> RegridResult<Self> {
        if dlon <= 0.0 || dlat <= 0.0 {
            return Err(RegridError::InvalidParameter {
                name: "increments".to_string(),
                reason: format!("increments must be positive, got [{}, {}]", dlon, dlat),
            });
        }
        let nlat = ((bbox.north() - bbox.south()) / dlat + COUNT_EPS).floor() as usize + 1;
        let span = bbox.east() - bbox.west();
        let full_circle = (span - 360.0).abs() <= COUNT_EPS;
        let nlon = if full_circle {
            (360.0 / dlon + COUNT_EPS).floor() as usize
        } else {
            (span / dlon + COUNT_EPS).floor() as usize + 1
        };
        Ok(Self {
            bbox,
            dlon,
            dlat,
            nlat,
            nlon,
        })
    }

    /// Build from `increments` (`[west-east, south-north]`) and an optional
    /// `area` (`[north, west, south, east]`, default global).
    pub fn from_params(params: &dyn Parametrisation) -> RegridResult<Self> {
        let increments = params.require_f64_array("increments")?;
        if increments.len() != 2 {
            return Err(RegridError::InvalidParameter {
                name: "increments".to_string(),
                reason: format!("expected [dlon, dlat], got {} values", increments.len()),
            });
        }
        let bbox = crate::representation::area_from_params(params)?
            .unwrap_or_else(BoundingBox::global);
        Self::new(bbox, increments[0], increments[1])
    }

    pub fn nlat(&self) -> usize {
        self.nlat
    }

    pub fn nlon(&self) -> usize {
        self.nlon
    }

    pub fn increments(&self) -> (f64, f64) {
        (self.dlon, self.dlat)
    }

    fn full_circle(&self) -> bool {
        (self.bbox.east() - self.bbox.west() - 360.0).abs() <= COUNT_EPS
    }

    fn latitude(&self, row: usize) -> f64 {
        self.bbox.north() - row as f64 * self.dlat
    }

    fn longitude(&self, col: usize) -> f64 {
        self.bbox.west() + col as f64 * self.dlon
    }
}

impl Representation for RegularLatLon {
    fn grid_name(&self) -> &'static str {
        "regular-latlon"
    }

    fn point_count(&self) -> usize {
        self.nlat * self.nlon
    }

    fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    fn points(&self) -> Box<dyn Iterator<Item = Point> + '_> {
        Box::new((0..self.nlat).flat_map(move |i| {
            (0..self.nlon).map(move |j| Point::new(self.latitude(i), self.longitude(j)))
        }))
    }

    fn cache_signature(&self) -> String {
        format!(
            "regular-latlon:{:.6}x{:.6}:{:.6}/{:.6}/{:.6}/{:.6}",
            self.dlon,
            self.dlat,
            self.bbox.north(),
            self.bbox.west(),
            self.bbox.south(),
            self.bbox.east()
        )
    }

    fn cropped(&self, bbox: &BoundingBox) -> RegridResult<Cropping> {
        // A rectangular crop of a regular grid stays regular.
        let rows: Vec<usize> = (0..self.nlat)
            .filter(|&i| {
                let lat = self.latitude(i);
                lat <= bbox.north() + COUNT_EPS && lat >= bbox.south() - COUNT_EPS
            })
            .collect();
        let cols: Vec<usize> = (0..self.nlon)
            .filter(|&j| bbox.contains_longitude(self.longitude(j)))
            .collect();
        if rows.is_empty() || cols.is_empty() {
            return Err(RegridError::EmptyNeighbourhood {
                context: format!("cropping regular-latlon to {:?} leaves no points", bbox),
            });
        }
        // Wrapped or non-contiguous column selections, and crops too narrow
        // to span a box, lose the structural invariant; fall back to the
        // generic point list.
        let contiguous = cols.windows(2).all(|w| w[1] == w[0] + 1);
        if !contiguous || rows.len() < 2 || cols.len() < 2 {
            return crop_to_point_list(self, bbox);
        }

        let north = self.latitude(rows[0]);
        let south = self.latitude(*rows.last().unwrap());
        let west = self.longitude(cols[0]);
        let east = self.longitude(*cols.last().unwrap());
        let sub = RegularLatLon::new(
            BoundingBox::new(north, west, south, east)?,
            self.dlon,
            self.dlat,
        )?;
        let mut kept = Vec::with_capacity(rows.len() * cols.len());
        for &i in &rows {
            for &j in &cols {
                kept.push(i * self.nlon + j);
            }
        }
        Ok(Cropping {
            representation: Arc::new(sub),
            kept,
        })
    }

    fn has_cells(&self) -> bool {
        true
    }

    fn cell_index(&self, lat: f64, lon: f64) -> Option<usize> {
        let row = ((self.bbox.north() - lat) / self.dlat).round();
        if row < 0.0 || row >= self.nlat as f64 {
            return None;
        }
        let lon = normalise_longitude(lon, self.bbox.west());
        let mut col = ((lon - self.bbox.west()) / self.dlon).round() as usize;
        if col >= self.nlon {
            if self.full_circle() {
                col %= self.nlon;
            } else {
                return None;
            }
        }
        Some(row as usize * self.nlon + col)
    }
}

/// A regular grid defined in a rotated coordinate system.
///
/// The grid's own south pole sits at (`south_pole_lat`, `south_pole_lon`)
/// in true coordinates, with an optional further `angle` of rotation about
/// the pole axis. Point order follows the underlying rotated grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotatedLatLon {
    inner: RegularLatLon,
    south_pole_lat: f64,
    south_pole_lon: f64,
    angle: f64,
}

impl RotatedLatLon {
    pub fn new(
        inner: RegularLatLon,
        south_pole_lat: f64,
        south_pole_lon: f64,
        angle: f64,
    ) -> Self {
        Self {
            inner,
            south_pole_lat,
            south_pole_lon,
            angle,
        }
    }

    pub fn from_params(params: &dyn Parametrisation) -> RegridResult<Self> {
        let pole = params.require_f64_array("south_pole")?;
        if pole.len() != 2 {
            return Err(RegridError::InvalidParameter {
                name: "south_pole".to_string(),
                reason: format!("expected [lat, lon], got {} values", pole.len()),
            });
        }
        let angle = params.get_f64("angle").unwrap_or(0.0);
        Ok(Self::new(
            RegularLatLon::from_params(params)?,
            pole[0],
            pole[1],
            angle,
        ))
    }

    /// Rotation taking rotated-system coordinates to true coordinates.
    fn rotation(&self) -> Rotation3<f64> {
        Rotation3::from_axis_angle(&Vector3::z_axis(), self.south_pole_lon.to_radians())
            * Rotation3::from_axis_angle(
                &Vector3::y_axis(),
                -(90.0 + self.south_pole_lat).to_radians(),
            )
            * Rotation3::from_axis_angle(&Vector3::z_axis(), self.angle.to_radians())
    }

    fn apply(rotation: &Rotation3<f64>, point: Point) -> Point {
        let xyz = point.to_xyz();
        let rotated = rotation * Vector3::new(xyz[0], xyz[1], xyz[2]);
        let lat = rotated.z.clamp(-1.0, 1.0).asin().to_degrees();
        let lon = rotated.y.atan2(rotated.x).to_degrees();
        Point::new(lat, normalise_longitude(lon, 0.0))
    }
}

impl Representation for RotatedLatLon {
    fn grid_name(&self) -> &'static str {
        "rotated-latlon"
    }

    fn point_count(&self) -> usize {
        self.inner.point_count()
    }

    fn bounding_box(&self) -> BoundingBox {
        // The box around the true (rotated) positions of the grid points.
        let mut north = f64::NEG_INFINITY;
        let mut south = f64::INFINITY;
        for point in self.points() {
            north = north.max(point.lat);
            south = south.min(point.lat);
        }
        BoundingBox::new((north + 1e-6).min(90.0), 0.0, (south - 1e-6).max(-90.0), 360.0)
            .unwrap_or_else(|_| BoundingBox::global())
    }

    fn points(&self) -> Box<dyn Iterator<Item = Point> + '_> {
        let rotation = self.rotation();
        Box::new(self.inner.points().map(move |p| Self::apply(&rotation, p)))
    }

    fn cache_signature(&self) -> String {
        format!(
            "rotated-latlon:{:.6}/{:.6}/{:.6}:{}",
            self.south_pole_lat,
            self.south_pole_lon,
            self.angle,
            self.inner.cache_signature()
        )
    }

    fn cropped(&self, bbox: &BoundingBox) -> RegridResult<Cropping> {
        // Crops are expressed in true coordinates, which do not align with
        // the rotated rows and columns; the result is a point list.
        crop_to_point_list(self, bbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    fn one_degree_global() -> RegularLatLon {
        RegularLatLon::new(BoundingBox::global(), 1.0, 1.0).unwrap()
    }

    #[test]
    fn global_one_degree_counts() {
        let grid = one_degree_global();
        assert_eq!(grid.nlat(), 181);
        assert_eq!(grid.nlon(), 360);
        assert_eq!(grid.point_count(), 181 * 360);
    }

    #[test]
    fn points_scan_north_to_south_west_to_east() {
        let grid = one_degree_global();
        let mut points = grid.points();
        let first = points.next().unwrap();
        assert_eq!(first.lat, 90.0);
        assert_eq!(first.lon, 0.0);
        let second = points.next().unwrap();
        assert_eq!(second.lat, 90.0);
        assert_eq!(second.lon, 1.0);
    }

    #[test]
    fn limited_area_includes_both_ends() {
        let bbox = BoundingBox::new(60.0, 10.0, 40.0, 30.0).unwrap();
        let grid = RegularLatLon::new(bbox, 5.0, 5.0).unwrap();
        assert_eq!(grid.nlat(), 5);
        assert_eq!(grid.nlon(), 5);
    }

    #[test]
    fn cropping_to_own_box_is_identity() {
        let grid = one_degree_global();
        let cropping = grid.cropped(&grid.bounding_box()).unwrap();
        assert_eq!(cropping.representation.point_count(), grid.point_count());
        assert_eq!(cropping.kept.len(), grid.point_count());
        for (a, b) in grid.points().zip(cropping.representation.points()) {
            assert!(is_close!(a.lat, b.lat));
            assert!(is_close!(a.lon, b.lon));
        }
    }

    #[test]
    fn rectangular_crop_stays_regular() {
        let grid = one_degree_global();
        let bbox = BoundingBox::new(10.0, 20.0, -10.0, 40.0).unwrap();
        let cropping = grid.cropped(&bbox).unwrap();
        assert_eq!(cropping.representation.grid_name(), "regular-latlon");
        assert_eq!(cropping.representation.point_count(), 21 * 21);
        assert_eq!(cropping.kept.len(), 21 * 21);
    }

    #[test]
    fn cell_index_round_trips_points() {
        let grid = one_degree_global();
        for (index, point) in grid.points().enumerate().step_by(977) {
            assert_eq!(grid.cell_index(point.lat, point.lon), Some(index));
        }
        // Slightly perturbed points stay in the same cell
        assert_eq!(grid.cell_index(89.8, 0.3), grid.cell_index(90.0, 0.0));
        // Far outside
        assert_eq!(grid.cell_index(95.0, 0.0), None);
    }

    #[test]
    fn unrotated_pole_is_identity() {
        let rotated = RotatedLatLon::new(one_degree_global(), -90.0, 0.0, 0.0);
        for (a, b) in rotated.points().zip(one_degree_global().points()).step_by(533) {
            assert!(is_close!(a.lat, b.lat, abs_tol = 1e-9));
            assert!(is_close!(
                normalise_longitude(a.lon, 0.0),
                normalise_longitude(b.lon, 0.0),
                abs_tol = 1e-9
            ));
        }
    }

    #[test]
    fn rotated_origin_lands_over_the_pole_complement() {
        // With the south pole at (-40, 10), the rotated origin maps to 50N.
        let inner = RegularLatLon::new(BoundingBox::global(), 90.0, 90.0).unwrap();
        let rotated = RotatedLatLon::new(inner, -40.0, 10.0, 0.0);
        let origin = RotatedLatLon::apply(&rotated.rotation(), Point::new(0.0, 0.0));
        assert!(is_close!(origin.lat, 50.0, abs_tol = 1e-9));
        assert!(is_close!(origin.lon, 10.0, abs_tol = 1e-9));
    }
}
