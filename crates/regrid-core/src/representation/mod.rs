//! Grid and spectral domain representations.
//!
//! A [`Representation`] describes the geometry of the domain a field lives
//! on: its bounding box, its points, and the identifying signature fed into
//! cache keys. Concrete grid types form a flat set behind the single trait;
//! they are constructed through [`build`], a match-based factory keyed by a
//! grid-type name. Unknown names are rejected rather than approximated.

pub mod gaussian;
pub mod latlon;
pub mod spectral;

use crate::errors::{RegridError, RegridResult};
use crate::geometry::{BoundingBox, Point};
use crate::param::Parametrisation;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

pub use self::gaussian::{ReducedGaussian, RegularGaussian};
pub use self::latlon::{RegularLatLon, RotatedLatLon};
pub use self::spectral::SphericalHarmonics;

/// The result of restricting a representation to a sub-domain.
///
/// `kept` maps each point of the cropped representation back to its index
/// in the original point ordering, so field values can be subset alongside
/// the geometry.
#[derive(Debug)]
pub struct Cropping {
    pub representation: Arc<dyn Representation>,
    pub kept: Vec<usize>,
}

/// Describes a grid or spectral domain.
///
/// Implementations are immutable once constructed and are shared between
/// pipeline steps behind `Arc`.
pub trait Representation: Debug + Send + Sync {
    fn grid_name(&self) -> &'static str;

    /// Number of values a field on this representation carries.
    fn point_count(&self) -> usize;

    fn bounding_box(&self) -> BoundingBox;

    /// Iterates the points in storage order. Empty for spectral domains.
    fn points(&self) -> Box<dyn Iterator<Item = Point> + '_>;

    /// Stable identifying string fed into cache-key hashes.
    ///
    /// Two representations with equal signatures are interchangeable for
    /// caching purposes; [`Representation::is_same`] is defined on top of
    /// this so structural equality and cache-key equality cannot diverge.
    fn cache_signature(&self) -> String;

    /// Restrict to a sub-domain.
    ///
    /// Structured grids stay structured where the crop preserves their
    /// invariant; otherwise the result degrades to an unstructured point
    /// list. This information loss is deliberate.
    fn cropped(&self, bbox: &BoundingBox) -> RegridResult<Cropping>;

    fn is_same(&self, other: &dyn Representation) -> bool {
        self.cache_signature() == other.cache_signature()
    }

    /// Spectral truncation, `None` for gridded domains.
    fn truncation(&self) -> Option<usize> {
        None
    }

    /// Whether the representation divides its domain into cells around its
    /// points. Required by cell-based aggregation methods.
    fn has_cells(&self) -> bool {
        false
    }

    /// Index of the grid cell containing the point, for cell-based
    /// aggregation. `None` when the representation has no cell structure
    /// or the point is outside the domain.
    fn cell_index(&self, lat: f64, lon: f64) -> Option<usize> {
        let _ = (lat, lon);
        None
    }
}

/// A bare list of points, the fallback representation produced by crops
/// that break a structured grid's invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnstructuredGrid {
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
}

impl UnstructuredGrid {
    pub fn new(latitudes: Vec<f64>, longitudes: Vec<f64>) -> RegridResult<Self> {
        if latitudes.len() != longitudes.len() {
            return Err(RegridError::InvalidParameter {
                name: "latitudes/longitudes".to_string(),
                reason: format!(
                    "{} latitudes but {} longitudes",
                    latitudes.len(),
                    longitudes.len()
                ),
            });
        }
        if latitudes.is_empty() {
            return Err(RegridError::InvalidParameter {
                name: "latitudes".to_string(),
                reason: "point list is empty".to_string(),
            });
        }
        Ok(Self {
            latitudes,
            longitudes,
        })
    }
}

impl Representation for UnstructuredGrid {
    fn grid_name(&self) -> &'static str {
        "unstructured"
    }

    fn point_count(&self) -> usize {
        self.latitudes.len()
    }

    fn bounding_box(&self) -> BoundingBox {
        // The tight box around the points, widened to a degenerate-safe
        // span when all points share a latitude or longitude.
        let mut north = f64::NEG_INFINITY;
        let mut south = f64::INFINITY;
        for &lat in &self.latitudes {
            north = north.max(lat);
            south = south.min(lat);
        }
        let west = self.longitudes.iter().cloned().fold(f64::INFINITY, f64::min);
        let east = self
            .longitudes
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        BoundingBox::new(
            (north + 1e-9).min(90.0),
            west,
            (south - 1e-9).max(-90.0),
            east + 1e-9,
        )
        .unwrap_or_else(|_| BoundingBox::global())
    }

    fn points(&self) -> Box<dyn Iterator<Item = Point> + '_> {
        Box::new(
            self.latitudes
                .iter()
                .zip(self.longitudes.iter())
                .map(|(&lat, &lon)| Point::new(lat, lon)),
        )
    }

    fn cache_signature(&self) -> String {
        let mut ctx = md5::Context::new();
        for (lat, lon) in self.latitudes.iter().zip(self.longitudes.iter()) {
            ctx.consume(lat.to_le_bytes());
            ctx.consume(lon.to_le_bytes());
        }
        format!("unstructured:{}:{:x}", self.latitudes.len(), ctx.compute())
    }

    fn cropped(&self, bbox: &BoundingBox) -> RegridResult<Cropping> {
        crop_to_point_list(self, bbox)
    }
}

/// Crop any gridded representation by filtering its point list.
pub(crate) fn crop_to_point_list(
    representation: &dyn Representation,
    bbox: &BoundingBox,
) -> RegridResult<Cropping> {
    let mut kept = Vec::new();
    let mut latitudes = Vec::new();
    let mut longitudes = Vec::new();
    for (index, point) in representation.points().enumerate() {
        if bbox.contains(point.lat, point.lon) {
            kept.push(index);
            latitudes.push(point.lat);
            longitudes.push(point.lon);
        }
    }
    if kept.is_empty() {
        return Err(RegridError::EmptyNeighbourhood {
            context: format!(
                "cropping {} to {:?} leaves no points",
                representation.grid_name(),
                bbox
            ),
        });
    }
    Ok(Cropping {
        representation: Arc::new(UnstructuredGrid::new(latitudes, longitudes)?),
        kept,
    })
}

/// Build a representation from a grid-type name and parameters.
///
/// This is the whole registry: the closed set of supported names lives in
/// this match and nowhere else. Unknown names fail with `NotImplemented`.
pub fn build(
    name: &str,
    params: &dyn Parametrisation,
) -> RegridResult<Arc<dyn Representation>> {
    match name {
        "regular-latlon" => Ok(Arc::new(RegularLatLon::from_params(params)?)),
        "rotated-latlon" => Ok(Arc::new(RotatedLatLon::from_params(params)?)),
        "regular-gaussian" => Ok(Arc::new(RegularGaussian::new(
            params.require_usize("n")?,
        )?)),
        "reduced-gaussian" => {
            let n = params.require_usize("n")?;
            match params.get_f64_array("pl") {
                Some(pl) => {
                    let pl = pl.iter().map(|&v| v as usize).collect();
                    Ok(Arc::new(ReducedGaussian::from_pl(n, pl)?))
                }
                None => Err(RegridError::MissingParameter {
                    name: "pl".to_string(),
                }),
            }
        }
        "octahedral-gaussian" => Ok(Arc::new(ReducedGaussian::octahedral(
            params.require_usize("n")?,
        )?)),
        "unstructured" => Ok(Arc::new(UnstructuredGrid::new(
            params.require_f64_array("latitudes")?,
            params.require_f64_array("longitudes")?,
        )?)),
        "spherical-harmonics" => Ok(Arc::new(SphericalHarmonics::new(
            params.require_usize("truncation")?,
        )?)),
        other => Err(RegridError::NotImplemented {
            what: format!("representation '{}'", other),
        }),
    }
}

/// A serialisable recipe for a representation: the factory name plus its
/// parameters.
///
/// Pipeline actions hold grid specs rather than built representations so
/// that they carry configuration only and stay comparable and
/// serialisable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub name: String,
    pub params: crate::param::SimpleParametrisation,
}

impl GridSpec {
    pub fn new(name: &str, params: crate::param::SimpleParametrisation) -> Self {
        Self {
            name: name.to_string(),
            params,
        }
    }

    pub fn build(&self) -> RegridResult<Arc<dyn Representation>> {
        build(&self.name, &self.params)
    }
}

/// Read an `area` parameter (`[north, west, south, east]`) if present.
pub fn area_from_params(params: &dyn Parametrisation) -> RegridResult<Option<BoundingBox>> {
    match params.get_f64_array("area") {
        None => Ok(None),
        Some(area) => {
            if area.len() != 4 {
                return Err(RegridError::InvalidParameter {
                    name: "area".to_string(),
                    reason: format!("expected [north, west, south, east], got {} values", area.len()),
                });
            }
            Ok(Some(BoundingBox::new(area[0], area[1], area[2], area[3])?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::SimpleParametrisation;

    #[test]
    fn factory_rejects_unknown_names() {
        let params = SimpleParametrisation::new();
        let err = build("lambert-conformal", &params).unwrap_err();
        assert!(matches!(err, RegridError::NotImplemented { .. }));
    }

    #[test]
    fn factory_builds_regular_latlon() {
        let mut params = SimpleParametrisation::new();
        params.set_f64_array("increments", vec![10.0, 10.0]);
        let grid = build("regular-latlon", &params).unwrap();
        assert_eq!(grid.grid_name(), "regular-latlon");
        // 19 latitude rows x 36 longitudes
        assert_eq!(grid.point_count(), 19 * 36);
    }

    #[test]
    fn unstructured_round_trip() {
        let grid = UnstructuredGrid::new(vec![10.0, -10.0], vec![5.0, 355.0]).unwrap();
        assert_eq!(grid.point_count(), 2);
        let points: Vec<_> = grid.points().collect();
        assert_eq!(points[1].lon, 355.0);
    }

    #[test]
    fn same_signature_means_same_grid() {
        let a = UnstructuredGrid::new(vec![1.0, 2.0], vec![3.0, 4.0]).unwrap();
        let b = UnstructuredGrid::new(vec![1.0, 2.0], vec![3.0, 4.0]).unwrap();
        let c = UnstructuredGrid::new(vec![1.0, 2.5], vec![3.0, 4.0]).unwrap();
        assert!(a.is_same(&b));
        assert!(!a.is_same(&c));
    }

    #[test]
    fn cropping_to_a_disjoint_box_fails() {
        let grid = UnstructuredGrid::new(vec![50.0], vec![10.0]).unwrap();
        let bbox = BoundingBox::new(-40.0, 0.0, -60.0, 30.0).unwrap();
        assert!(grid.cropped(&bbox).is_err());
    }
}
