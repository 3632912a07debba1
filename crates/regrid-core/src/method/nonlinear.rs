//! Treatment of missing values and rank statistics during weighted
//! resampling.
//!
//! Linear weighting is only valid for statistics that distribute over a
//! weighted sum. Rank statistics (maximum, minimum) reuse the sparse
//! structure as a neighbourhood list and pick the ranked value at
//! application time instead.

use crate::errors::{RegridError, RegridResult};
use serde::{Deserialize, Serialize};

/// How a row of weights combines its source values.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonLinear {
    /// Weighted mean; the output is missing as soon as any contributor is.
    MissingIfAnyMissing,
    /// Weighted mean over the present contributors, renormalised; the
    /// output is missing only when every contributor is.
    MissingIfAllMissing,
    /// Weighted sum without renormalisation. Used by count-like statistics
    /// whose rows deliberately do not sum to one.
    UnnormalisedSum,
    /// Largest non-missing contributor.
    Maximum,
    /// Smallest non-missing contributor.
    Minimum,
    /// Number of non-missing contributors, ignoring weights and values.
    Count,
}

impl NonLinear {
    /// Select a treatment by name, as configured on a request.
    ///
    /// This is the whole registry of treatments; unknown names fail.
    pub fn build(name: &str) -> RegridResult<Self> {
        match name {
            "missing-if-any-missing" => Ok(Self::MissingIfAnyMissing),
            "missing-if-all-missing" => Ok(Self::MissingIfAllMissing),
            other => Err(RegridError::NotImplemented {
                what: format!("non-linear treatment '{}'", other),
            }),
        }
    }

    /// Whether rows under this treatment are expected to sum to one.
    pub fn expects_partition_of_unity(&self) -> bool {
        matches!(self, Self::MissingIfAnyMissing | Self::MissingIfAllMissing)
    }
}

impl Default for NonLinear {
    fn default() -> Self {
        Self::MissingIfAllMissing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_by_name() {
        assert_eq!(
            NonLinear::build("missing-if-any-missing").unwrap(),
            NonLinear::MissingIfAnyMissing
        );
        assert!(NonLinear::build("simulate-missing").is_err());
    }
}
