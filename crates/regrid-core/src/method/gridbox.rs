//! Grid-box statistics: aggregate the input points falling inside each
//! output cell.

use crate::caching::CacheKeyBuilder;
use crate::errors::{RegridError, RegridResult};
use crate::method::nonlinear::NonLinear;
use crate::method::{AssemblyStatistics, Method};
use crate::param::Parametrisation;
use crate::representation::Representation;
use crate::weights::{WeightMatrix, WeightMatrixBuilder};
use log::debug;
use serde::{Deserialize, Serialize};
use std::any::Any;

/// The statistic computed over each output cell.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statistic {
    Average,
    Maximum,
    Minimum,
    Count,
}

impl Statistic {
    /// Select a statistic by name. Rank statistics beyond this set (mode,
    /// percentiles, ...) have no defined treatment and are rejected.
    pub fn build(name: &str) -> RegridResult<Self> {
        match name {
            "average" => Ok(Self::Average),
            "maximum" => Ok(Self::Maximum),
            "minimum" => Ok(Self::Minimum),
            "count" => Ok(Self::Count),
            other => Err(RegridError::NotImplemented {
                what: format!("grid-box statistic '{}'", other),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Average => "average",
            Self::Maximum => "maximum",
            Self::Minimum => "minimum",
            Self::Count => "count",
        }
    }
}

/// Aggregation of all input points inside each output grid cell.
///
/// Only the average distributes over linear weights; the rank statistics
/// reuse the sparse structure as a membership list and are resolved by the
/// matching [`NonLinear`] treatment when the matrix is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridBoxStatistic {
    statistic: Statistic,
}

impl GridBoxStatistic {
    pub fn new(statistic: Statistic) -> Self {
        Self { statistic }
    }

    pub fn from_params(params: &dyn Parametrisation) -> RegridResult<Self> {
        let name = params.require_string("statistic")?;
        Ok(Self::new(Statistic::build(&name)?))
    }

    pub fn statistic(&self) -> Statistic {
        self.statistic
    }
}

impl Method for GridBoxStatistic {
    fn name(&self) -> &'static str {
        "grid-box-statistic"
    }

    fn assemble(
        &self,
        statistics: &mut AssemblyStatistics,
        input: &dyn Representation,
        output: &dyn Representation,
    ) -> RegridResult<WeightMatrix> {
        if !output.has_cells() {
            return Err(RegridError::NotImplemented {
                what: format!(
                    "grid-box statistics onto representation '{}'",
                    output.grid_name()
                ),
            });
        }

        let rows = output.point_count();
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); rows];
        let mut outside = 0usize;
        for (index, point) in input.points().enumerate() {
            match output.cell_index(point.lat, point.lon) {
                Some(cell) => members[cell].push(index),
                None => outside += 1,
            }
        }
        if members.iter().all(|cell| cell.is_empty()) {
            return Err(RegridError::EmptyNeighbourhood {
                context: format!(
                    "no input point of '{}' falls inside any cell of '{}'",
                    input.grid_name(),
                    output.grid_name()
                ),
            });
        }
        statistics.empty_cells = members.iter().filter(|cell| cell.is_empty()).count();
        debug!(
            "grid-box {}: {} empty cells, {} input points outside the target domain",
            self.statistic.name(),
            statistics.empty_cells,
            outside
        );

        let normalised = self.statistic == Statistic::Average;
        let mut builder = WeightMatrixBuilder::new(rows, input.point_count());
        if !normalised {
            builder = builder.without_normalisation();
        }
        for (row, cell) in members.iter().enumerate() {
            let entries: Vec<(usize, f64)> =
                cell.iter().map(|&index| (index, 1.0)).collect();
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
        key.add(self.name()).add(self.statistic.name());
    }

    fn non_linear(&self) -> NonLinear {
        match self.statistic {
            Statistic::Average => NonLinear::MissingIfAllMissing,
            Statistic::Maximum => NonLinear::Maximum,
            Statistic::Minimum => NonLinear::Minimum,
            Statistic::Count => NonLinear::Count,
        }
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
    use ndarray::Array1;
    use std::sync::Arc;

    /// Three input points inside one 10-degree cell around (0, 180).
    fn clustered_input() -> Arc<UnstructuredGrid> {
        Arc::new(
            UnstructuredGrid::new(
                vec![1.0, -2.0, 3.0],
                vec![179.0, 181.0, 180.5],
            )
            .unwrap(),
        )
    }

    fn target() -> RegularLatLon {
        RegularLatLon::new(BoundingBox::global(), 10.0, 10.0).unwrap()
    }

    fn aggregate(statistic: Statistic, values: Vec<f64>) -> Array1<f64> {
        let input = clustered_input();
        let field = Field::new(Array1::from_vec(values), input.clone(), None).unwrap();
        let method = GridBoxStatistic::new(statistic);
        let mut stats = AssemblyStatistics::default();
        let output = target();
        let matrix = method
            .assemble(&mut stats, input.as_ref(), &output)
            .unwrap();
        matrix.apply(&field, method.non_linear()).unwrap()
    }

    fn cell_of_cluster() -> usize {
        target().cell_index(0.0, 180.0).unwrap()
    }

    #[test]
    fn maximum_of_cell_members() {
        let result = aggregate(Statistic::Maximum, vec![1.0, 7.0, 3.0]);
        assert_eq!(result[cell_of_cluster()], 7.0);
    }

    #[test]
    fn minimum_of_cell_members() {
        let result = aggregate(Statistic::Minimum, vec![1.0, 7.0, 3.0]);
        assert_eq!(result[cell_of_cluster()], 1.0);
    }

    #[test]
    fn average_of_cell_members() {
        let result = aggregate(Statistic::Average, vec![1.0, 7.0, 4.0]);
        assert_eq!(result[cell_of_cluster()], 4.0);
    }

    #[test]
    fn count_of_cell_members() {
        let result = aggregate(Statistic::Count, vec![1.0, 7.0, 3.0]);
        assert_eq!(result[cell_of_cluster()], 3.0);
    }

    #[test]
    fn cells_without_points_are_missing() {
        let result = aggregate(Statistic::Average, vec![1.0, 7.0, 4.0]);
        let empty_cell = target().cell_index(45.0, 0.0).unwrap();
        assert!(result[empty_cell].is_nan());
    }

    #[test]
    fn unsupported_statistic_is_rejected() {
        assert!(matches!(
            Statistic::build("variance"),
            Err(RegridError::NotImplemented { .. })
        ));
    }

    #[test]
    fn target_without_cells_is_rejected() {
        let input = clustered_input();
        let output = UnstructuredGrid::new(vec![0.0], vec![180.0]).unwrap();
        let method = GridBoxStatistic::new(Statistic::Average);
        let mut stats = AssemblyStatistics::default();
        let err = method
            .assemble(&mut stats, input.as_ref(), &output)
            .unwrap_err();
        assert!(matches!(err, RegridError::NotImplemented { .. }));
    }
}
