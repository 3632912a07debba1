//! Finite-element interpolation over a Delaunay tessellation of the input
//! points.

use crate::caching::CacheKeyBuilder;
use crate::errors::{RegridError, RegridResult};
use crate::method::nonlinear::NonLinear;
use crate::method::{collect_points, input_points_xyz, AssemblyStatistics, InputPoint, Method};
use crate::param::Parametrisation;
use crate::representation::Representation;
use crate::weights::{WeightMatrix, WeightMatrixBuilder};
use log::{debug, warn};
use nalgebra::{Matrix2, Vector2};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::any::Any;

/// Barycentric tolerance: a point this far outside an edge still counts as
/// inside its triangle.
const BARYCENTRIC_EPS: f64 = 1e-10;

/// Number of nearby triangles examined before an output point is declared
/// outside the tessellated hull.
const CANDIDATE_TRIANGLES: usize = 24;

/// Mesh-based interpolation: triangulate the input points, locate each
/// output point in a triangle and use its barycentric coordinates as
/// weights.
///
/// Output points outside the triangulated hull fall back to
/// nearest-neighbour extrapolation and are counted in the assembly
/// statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiniteElement {
    non_linear: NonLinear,
}

impl FiniteElement {
    pub fn new() -> Self {
        Self {
            non_linear: NonLinear::default(),
        }
    }

    pub fn from_params(params: &dyn Parametrisation) -> RegridResult<Self> {
        let mut method = Self::new();
        if let Some(name) = params.get_string("non-linear") {
            method.non_linear = NonLinear::build(&name)?;
        }
        Ok(method)
    }
}

impl Default for FiniteElement {
    fn default() -> Self {
        Self::new()
    }
}

/// One triangle of the tessellation: vertex indices into the input points.
#[derive(Debug, Clone)]
struct Triangle {
    vertices: [usize; 3],
    centroid: [f64; 2],
}

/// Barycentric coordinates of `point` in the triangle `(a, b, c)`, or
/// `None` for degenerate triangles.
fn barycentric(
    point: [f64; 2],
    a: [f64; 2],
    b: [f64; 2],
    c: [f64; 2],
) -> Option<[f64; 3]> {
    let basis = Matrix2::new(b[0] - a[0], c[0] - a[0], b[1] - a[1], c[1] - a[1]);
    let relative = Vector2::new(point[0] - a[0], point[1] - a[1]);
    let solution = basis.lu().solve(&relative)?;
    let (u, v) = (solution[0], solution[1]);
    Some([1.0 - u - v, u, v])
}

impl Method for FiniteElement {
    fn name(&self) -> &'static str {
        "finite-element"
    }

    fn assemble(
        &self,
        statistics: &mut AssemblyStatistics,
        input: &dyn Representation,
        output: &dyn Representation,
    ) -> RegridResult<WeightMatrix> {
        let points = collect_points(input);
        if points.is_empty() {
            return Err(RegridError::EmptyNeighbourhood {
                context: format!("input representation '{}'", input.grid_name()),
            });
        }
        let plane: Vec<delaunator::Point> = points
            .iter()
            .map(|p| delaunator::Point { x: p.lon, y: p.lat })
            .collect();
        let tessellation = delaunator::triangulate(&plane);
        let triangles: Vec<Triangle> = tessellation
            .triangles
            .chunks(3)
            .map(|chunk| {
                let vertices = [chunk[0], chunk[1], chunk[2]];
                let centroid = [
                    (plane[vertices[0]].x + plane[vertices[1]].x + plane[vertices[2]].x) / 3.0,
                    (plane[vertices[0]].y + plane[vertices[1]].y + plane[vertices[2]].y) / 3.0,
                ];
                Triangle { vertices, centroid }
            })
            .collect();
        if triangles.is_empty() {
            warn!(
                "input '{}' could not be tessellated; every output point extrapolates",
                input.grid_name()
            );
        }
        debug!(
            "tessellated {} input points into {} triangles",
            points.len(),
            triangles.len()
        );

        // Nearby triangles are found through their centroids; points the
        // candidate set cannot place are treated as outside the hull.
        let centroid_tree = (!triangles.is_empty()).then(|| {
            kd_tree::KdTree2::build_by_key(triangles.clone(), |triangle: &Triangle, k| {
                OrderedFloat(triangle.centroid[k])
            })
        });
        // Fallback tree over the input points themselves.
        let point_tree = kd_tree::KdTree3::build_by_key(
            input_points_xyz(input)?,
            |point: &InputPoint, k| OrderedFloat(point.xyz[k]),
        );

        let mut builder = WeightMatrixBuilder::new(output.point_count(), input.point_count());
        for (row, target) in output.points().enumerate() {
            let query = [
                crate::geometry::normalise_longitude(target.lon, 0.0),
                target.lat,
            ];
            let mut located = false;
            if let Some(tree) = &centroid_tree {
                let candidates =
                    tree.nearests_by(&query, CANDIDATE_TRIANGLES, |t, k| t.centroid[k]);
                for candidate in candidates {
                    let triangle = candidate.item;
                    let [ia, ib, ic] = triangle.vertices;
                    let coords = barycentric(
                        query,
                        [plane[ia].x, plane[ia].y],
                        [plane[ib].x, plane[ib].y],
                        [plane[ic].x, plane[ic].y],
                    );
                    if let Some(weights) = coords {
                        if weights.iter().all(|&w| w >= -BARYCENTRIC_EPS) {
                            builder.push_row(
                                row,
                                &[
                                    (ia, weights[0].max(0.0)),
                                    (ib, weights[1].max(0.0)),
                                    (ic, weights[2].max(0.0)),
                                ],
                            );
                            located = true;
                            break;
                        }
                    }
                }
            }
            if !located {
                // Outside the hull: nearest-neighbour extrapolation.
                let nearest = point_tree
                    .nearest_by(&target.to_xyz(), |point, k| point.xyz[k])
                    .ok_or_else(|| RegridError::PointNotLocated {
                        lat: target.lat,
                        lon: target.lon,
                    })?;
                builder.push(row, nearest.item.index, 1.0);
                statistics.extrapolated_points += 1;
            }
        }
        if statistics.extrapolated_points > 0 {
            debug!(
                "{} output points fell outside the tessellated hull",
                statistics.extrapolated_points
            );
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
        key.add(self.name());
    }

    fn non_linear(&self) -> NonLinear {
        self.non_linear
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
