//! Interpolation methods: strategies that assemble a weight matrix for a
//! given pair of representations.
//!
//! Methods form a flat set behind the [`Method`] trait and are selected by
//! name through [`build`], the module's match-based registry. Each method
//! contributes its name and configuration to the weight-matrix cache key,
//! so equal methods (`same_as`) always produce equal keys.

pub mod distance;
pub mod finite_element;
pub mod gridbox;
pub mod knn;
pub mod nonlinear;

use crate::caching::CacheKeyBuilder;
use crate::errors::{RegridError, RegridResult};
use crate::geometry::Point;
use crate::param::Parametrisation;
use crate::representation::Representation;
use crate::weights::WeightMatrix;
use self::nonlinear::NonLinear;
use std::any::Any;
use std::fmt::Debug;

pub use self::finite_element::FiniteElement;
pub use self::gridbox::{GridBoxStatistic, Statistic};
pub use self::knn::KNearestNeighbours;

/// Counters reported by weight assembly.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AssemblyStatistics {
    /// Output points outside the input domain that fell back to
    /// nearest-neighbour extrapolation.
    pub extrapolated_points: usize,
    /// Output cells that received no input point.
    pub empty_cells: usize,
}

/// An interpolation strategy.
pub trait Method: Debug + Send + Sync {
    /// Stable name, used as a cache-key component.
    fn name(&self) -> &'static str;

    /// Deterministically fill a weight matrix for the representation pair.
    fn assemble(
        &self,
        statistics: &mut AssemblyStatistics,
        input: &dyn Representation,
        output: &dyn Representation,
    ) -> RegridResult<WeightMatrix>;

    /// Structural equality, used for plan deduplication.
    fn same_as(&self, other: &dyn Method) -> bool;

    /// Contribute the method's identity and configuration to a cache key.
    fn hash_into(&self, key: &mut CacheKeyBuilder);

    /// The treatment applied when the assembled matrix is applied to a
    /// field.
    fn non_linear(&self) -> NonLinear {
        NonLinear::default()
    }

    fn as_any(&self) -> &dyn Any;
}

/// Build a method from its name and parameters.
///
/// This is the whole registry of interpolation methods; unknown names are
/// rejected.
pub fn build(name: &str, params: &dyn Parametrisation) -> RegridResult<Box<dyn Method>> {
    match name {
        "finite-element" => Ok(Box::new(FiniteElement::from_params(params)?)),
        "k-nearest-neighbours" => Ok(Box::new(KNearestNeighbours::from_params(params)?)),
        "nearest-neighbour" => Ok(Box::new(KNearestNeighbours::nearest())),
        "grid-box-statistic" => Ok(Box::new(GridBoxStatistic::from_params(params)?)),
        other => Err(RegridError::NotImplemented {
            what: format!("interpolation method '{}'", other),
        }),
    }
}

/// An input point prepared for spatial search.
#[derive(Debug, Clone)]
pub(crate) struct InputPoint {
    pub index: usize,
    pub xyz: [f64; 3],
}

/// Collect a representation's points in unit-sphere coordinates.
pub(crate) fn input_points_xyz(
    representation: &dyn Representation,
) -> RegridResult<Vec<InputPoint>> {
    let points: Vec<InputPoint> = representation
        .points()
        .enumerate()
        .map(|(index, point)| InputPoint {
            index,
            xyz: point.to_xyz(),
        })
        .collect();
    if points.is_empty() {
        return Err(RegridError::EmptyNeighbourhood {
            context: format!("input representation '{}'", representation.grid_name()),
        });
    }
    Ok(points)
}

/// Collect a representation's points in geographic coordinates.
pub(crate) fn collect_points(representation: &dyn Representation) -> Vec<Point> {
    representation.points().collect()
}
