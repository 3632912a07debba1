//! Spectral (spherical-harmonic) domain representation.

use crate::errors::{RegridError, RegridResult};
use crate::geometry::{BoundingBox, Point};
use crate::representation::{Cropping, Representation};
use serde::{Deserialize, Serialize};

/// A triangularly truncated spherical-harmonic domain.
///
/// Field values on this representation are the coefficients in the GRIB
/// layout: for each order `m = 0..=T` and degree `n = m..=T`, the real and
/// imaginary parts interleaved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SphericalHarmonics {
    truncation: usize,
}

impl SphericalHarmonics {
    pub fn new(truncation: usize) -> RegridResult<Self> {
        if truncation == 0 {
            return Err(RegridError::InvalidParameter {
                name: "truncation".to_string(),
                reason: "truncation must be positive".to_string(),
            });
        }
        Ok(Self { truncation })
    }

    /// Number of complex coefficients in the triangular truncation.
    pub fn coefficient_count(&self) -> usize {
        (self.truncation + 1) * (self.truncation + 2) / 2
    }
}

impl Representation for SphericalHarmonics {
    fn grid_name(&self) -> &'static str {
        "spherical-harmonics"
    }

    fn point_count(&self) -> usize {
        2 * self.coefficient_count()
    }

    fn bounding_box(&self) -> BoundingBox {
        BoundingBox::global()
    }

    fn points(&self) -> Box<dyn Iterator<Item = Point> + '_> {
        // A spectral domain has no geographic points.
        Box::new(std::iter::empty())
    }

    fn cache_signature(&self) -> String {
        format!("spherical-harmonics:{}", self.truncation)
    }

    fn cropped(&self, _bbox: &BoundingBox) -> RegridResult<Cropping> {
        Err(RegridError::NotImplemented {
            what: "cropping a spectral domain".to_string(),
        })
    }

    fn truncation(&self) -> Option<usize> {
        Some(self.truncation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coefficient_counts() {
        let sh = SphericalHarmonics::new(21).unwrap();
        assert_eq!(sh.coefficient_count(), 22 * 23 / 2);
        assert_eq!(sh.point_count(), 22 * 23);
        assert_eq!(sh.truncation(), Some(21));
    }

    #[test]
    fn spectral_domain_cannot_be_cropped() {
        let sh = SphericalHarmonics::new(21).unwrap();
        let err = sh.cropped(&BoundingBox::global()).unwrap_err();
        assert!(matches!(err, RegridError::NotImplemented { .. }));
    }
}
