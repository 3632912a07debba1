//! Neighbour distance weighting strategies.

use crate::errors::{RegridError, RegridResult};
use serde::{Deserialize, Serialize};

/// Distance below which an output point is treated as coincident with an
/// input point, squared chord length on the unit sphere.
const COINCIDENT_DISTANCE2: f64 = 1e-18;

/// Turns squared neighbour distances into normalised weights.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceWeighting {
    /// All weight on the closest neighbour.
    NearestNeighbour,
    /// Inverse squared distance, exact at coincident points.
    InverseDistance,
    /// Equal weight to every neighbour.
    Uniform,
}

impl DistanceWeighting {
    /// Select a weighting by name. This is the whole registry of distance
    /// weightings; unknown names are rejected.
    pub fn build(name: &str) -> RegridResult<Self> {
        match name {
            "nearest-neighbour" => Ok(Self::NearestNeighbour),
            "inverse-distance-weighting" => Ok(Self::InverseDistance),
            "no" => Ok(Self::Uniform),
            other => Err(RegridError::NotImplemented {
                what: format!("distance weighting '{}'", other),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NearestNeighbour => "nearest-neighbour",
            Self::InverseDistance => "inverse-distance-weighting",
            Self::Uniform => "no",
        }
    }

    /// Weights for neighbours at the given squared distances, summing to
    /// one. The input must not be empty.
    pub fn weights(&self, distances2: &[f64]) -> Vec<f64> {
        assert!(!distances2.is_empty());
        match self {
            Self::NearestNeighbour => {
                let closest = distances2
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.partial_cmp(b.1).expect("distances are finite"))
                    .map(|(index, _)| index)
                    .expect("at least one neighbour");
                let mut weights = vec![0.0; distances2.len()];
                weights[closest] = 1.0;
                weights
            }
            Self::InverseDistance => {
                // A coincident neighbour short-circuits to an exact copy.
                if let Some(index) = distances2
                    .iter()
                    .position(|&d2| d2 < COINCIDENT_DISTANCE2)
                {
                    let mut weights = vec![0.0; distances2.len()];
                    weights[index] = 1.0;
                    return weights;
                }
                let raw: Vec<f64> = distances2.iter().map(|&d2| 1.0 / d2).collect();
                let total: f64 = raw.iter().sum();
                raw.into_iter().map(|w| w / total).collect()
            }
            Self::Uniform => {
                let weight = 1.0 / distances2.len() as f64;
                vec![weight; distances2.len()]
            }
        }
    }
}

impl Default for DistanceWeighting {
    fn default() -> Self {
        Self::InverseDistance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    #[test]
    fn nearest_puts_all_weight_on_the_closest() {
        let weights = DistanceWeighting::NearestNeighbour.weights(&[0.4, 0.1, 0.9]);
        assert_eq!(weights, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn inverse_distance_normalises() {
        let weights = DistanceWeighting::InverseDistance.weights(&[1.0, 2.0]);
        assert!(is_close!(weights.iter().sum::<f64>(), 1.0));
        assert!(weights[0] > weights[1]);
    }

    #[test]
    fn coincident_point_is_copied_exactly() {
        let weights = DistanceWeighting::InverseDistance.weights(&[0.5, 0.0, 0.25]);
        assert_eq!(weights, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn uniform_ignores_distances() {
        let weights = DistanceWeighting::Uniform.weights(&[0.5, 0.1, 0.25, 0.9]);
        assert_eq!(weights, vec![0.25; 4]);
    }

    #[test]
    fn unknown_weighting_is_rejected() {
        assert!(DistanceWeighting::build("gaussian").is_err());
    }
}
