//! K-nearest-neighbour interpolation.

use crate::caching::CacheKeyBuilder;
use crate::errors::{RegridError, RegridResult};
use crate::method::distance::DistanceWeighting;
use crate::method::nonlinear::NonLinear;
use crate::method::{input_points_xyz, AssemblyStatistics, InputPoint, Method};
use crate::param::Parametrisation;
use crate::representation::Representation;
use crate::weights::{WeightMatrix, WeightMatrixBuilder};
use log::debug;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::any::Any;

/// Interpolation from the `nclosest` nearest input points, weighted by a
/// [`DistanceWeighting`] policy.
///
/// Neighbour search runs over unit-sphere coordinates so neighbourhoods
/// stay correct across the date line and near the poles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KNearestNeighbours {
    nclosest: usize,
    weighting: DistanceWeighting,
    non_linear: NonLinear,
}

impl KNearestNeighbours {
    pub fn new(nclosest: usize, weighting: DistanceWeighting) -> RegridResult<Self> {
        if nclosest == 0 {
            return Err(RegridError::InvalidParameter {
                name: "nclosest".to_string(),
                reason: "at least one neighbour is required".to_string(),
            });
        }
        Ok(Self {
            nclosest,
            weighting,
            non_linear: NonLinear::default(),
        })
    }

    /// The plain nearest-neighbour method.
    pub fn nearest() -> Self {
        Self {
            nclosest: 1,
            weighting: DistanceWeighting::NearestNeighbour,
            non_linear: NonLinear::default(),
        }
    }

    pub fn from_params(params: &dyn Parametrisation) -> RegridResult<Self> {
        let nclosest = params.get_usize("nclosest").unwrap_or(4);
        let weighting = match params.get_string("distance-weighting") {
            Some(name) => DistanceWeighting::build(&name)?,
            None => DistanceWeighting::default(),
        };
        let mut method = Self::new(nclosest, weighting)?;
        if let Some(name) = params.get_string("non-linear") {
            method.non_linear = NonLinear::build(&name)?;
        }
        Ok(method)
    }

    pub fn nclosest(&self) -> usize {
        self.nclosest
    }
}

impl Method for KNearestNeighbours {
    fn name(&self) -> &'static str {
        "k-nearest-neighbours"
    }

    fn assemble(
        &self,
        _statistics: &mut AssemblyStatistics,
        input: &dyn Representation,
        output: &dyn Representation,
    ) -> RegridResult<WeightMatrix> {
        let points = input_points_xyz(input)?;
        let tree = kd_tree::KdTree3::build_by_key(points, |point: &InputPoint, k| {
            OrderedFloat(point.xyz[k])
        });

        debug!(
            "assembling {}-nearest weights: {} -> {}",
            self.nclosest,
            input.grid_name(),
            output.grid_name()
        );

        let mut builder = WeightMatrixBuilder::new(output.point_count(), input.point_count());
        for (row, point) in output.points().enumerate() {
            let found = tree.nearests_by(&point.to_xyz(), self.nclosest, |item, k| item.xyz[k]);
            if found.is_empty() {
                return Err(RegridError::EmptyNeighbourhood {
                    context: format!("output point ({}, {})", point.lat, point.lon),
                });
            }
            let distances2: Vec<f64> = found.iter().map(|n| n.squared_distance).collect();
            let weights = self.weighting.weights(&distances2);
            let entries: Vec<(usize, f64)> = found
                .iter()
                .zip(weights.iter())
                .filter(|(_, &weight)| weight > 0.0)
                .map(|(neighbour, &weight)| (neighbour.item.index, weight))
                .collect();
            builder.push_row(row, &entries);
        }
        let matrix = builder.build();
        matrix.check_row_sums()?;
        Ok(matrix)
    }

    fn same_as(&self, other: &dyn Method) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .map_or(false, |other| self == other)
    }

    fn hash_into(&self, key: &mut CacheKeyBuilder) {
        key.add(self.name())
            .add(&self.nclosest.to_string())
            .add(self.weighting.name());
    }

    fn non_linear(&self) -> NonLinear {
        self.non_linear
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::geometry::BoundingBox;
    use crate::representation::{RegularLatLon, Representation, UnstructuredGrid};
    use is_close::is_close;
    use ndarray::Array1;
    use std::sync::Arc;

    fn coarse_grid() -> Arc<RegularLatLon> {
        Arc::new(RegularLatLon::new(BoundingBox::global(), 10.0, 10.0).unwrap())
    }

    #[test]
    fn nearest_neighbour_reproduces_coincident_points() {
        let grid = coarse_grid();
        let values = Array1::from_iter((0..grid.point_count()).map(|i| (i % 17) as f64));
        let field = Field::new(values.clone(), grid.clone(), None).unwrap();

        // Output points coincide with a subset of the input points. The
        // poles are left out: every pole-row point shares one location,
        // so the nearest of them is ambiguous.
        let output = UnstructuredGrid::new(
            vec![0.0, 40.0, -30.0],
            vec![0.0, 120.0, 250.0],
        )
        .unwrap();

        let method = KNearestNeighbours::nearest();
        let mut statistics = AssemblyStatistics::default();
        let matrix = method
            .assemble(&mut statistics, grid.as_ref(), &output)
            .unwrap();
        let result = matrix.apply(&field, method.non_linear()).unwrap();

        for (row, point) in output.points().enumerate() {
            let input_index = grid.cell_index(point.lat, point.lon).unwrap();
            assert_eq!(result[row], values[input_index]);
        }
    }

    #[test]
    fn constant_fields_stay_constant() {
        let grid = coarse_grid();
        let field = Field::constant(5.0, grid.clone());
        let output = RegularLatLon::new(BoundingBox::global(), 7.5, 7.5).unwrap();

        let mut params = crate::param::SimpleParametrisation::new();
        params.set_usize("nclosest", 4);
        let method = KNearestNeighbours::from_params(&params).unwrap();

        let mut statistics = AssemblyStatistics::default();
        let matrix = method
            .assemble(&mut statistics, grid.as_ref(), &output)
            .unwrap();
        matrix.check_row_sums().unwrap();
        let result = matrix.apply(&field, method.non_linear()).unwrap();
        for &value in result.iter() {
            assert!(is_close!(value, 5.0, abs_tol = 1e-12));
        }
    }

    #[test]
    fn zero_neighbours_is_invalid() {
        assert!(KNearestNeighbours::new(0, DistanceWeighting::default()).is_err());
    }
}
