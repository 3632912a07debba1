//! Gaussian grids: regular, reduced and reduced-octahedral.

use crate::errors::{RegridError, RegridResult};
use crate::geometry::{BoundingBox, Point};
use crate::representation::{crop_to_point_list, Cropping, Representation};
use serde::{Deserialize, Serialize};

/// Gaussian latitudes for a grid with `count` rows, degrees, north to south.
///
/// The latitudes are the arcsines of the roots of the Legendre polynomial
/// of degree `count`, found by Newton iteration from the Chebyshev initial
/// guess.
pub fn gaussian_latitudes(count: usize) -> Vec<f64> {
    assert!(count > 0, "a Gaussian grid needs at least one row");
    let mut latitudes = Vec::with_capacity(count);
    for k in 0..count {
        let mut x = (std::f64::consts::PI * (k as f64 + 0.75) / (count as f64 + 0.5)).cos();
        for _ in 0..100 {
            let (p, p_prev) = legendre_pair(count, x);
            let derivative = count as f64 * (x * p - p_prev) / (x * x - 1.0);
            let step = p / derivative;
            x -= step;
            if step.abs() < 1e-15 {
                break;
            }
        }
        latitudes.push(x.asin().to_degrees());
    }
    latitudes
}

/// Legendre polynomial of degree `n` at `x`, together with degree `n - 1`.
fn legendre_pair(n: usize, x: f64) -> (f64, f64) {
    let mut p_prev = 1.0;
    let mut p = x;
    for j in 2..=n {
        let j = j as f64;
        let next = ((2.0 * j - 1.0) * x * p - (j - 1.0) * p_prev) / j;
        p_prev = p;
        p = next;
    }
    (p, p_prev)
}

/// A regular Gaussian grid: `2N` Gaussian latitude rows of `4N` points each.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegularGaussian {
    n: usize,
    latitudes: Vec<f64>,
}

impl RegularGaussian {
    pub fn new(n: usize) -> RegridResult<Self> {
        if n == 0 {
            return Err(RegridError::InvalidParameter {
                name: "n".to_string(),
                reason: "Gaussian number must be positive".to_string(),
            });
        }
        Ok(Self {
            n,
            latitudes: gaussian_latitudes(2 * n),
        })
    }

    pub fn gaussian_number(&self) -> usize {
        self.n
    }

    pub fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }
}

impl Representation for RegularGaussian {
    fn grid_name(&self) -> &'static str {
        "regular-gaussian"
    }

    fn point_count(&self) -> usize {
        2 * self.n * 4 * self.n
    }

    fn bounding_box(&self) -> BoundingBox {
        BoundingBox::global()
    }

    fn points(&self) -> Box<dyn Iterator<Item = Point> + '_> {
        let nlon = 4 * self.n;
        let dlon = 360.0 / nlon as f64;
        Box::new(self.latitudes.iter().flat_map(move |&lat| {
            (0..nlon).map(move |j| Point::new(lat, j as f64 * dlon))
        }))
    }

    fn cache_signature(&self) -> String {
        format!("regular-gaussian:{}", self.n)
    }

    fn cropped(&self, bbox: &BoundingBox) -> RegridResult<Cropping> {
        crop_to_point_list(self, bbox)
    }
}

/// A reduced Gaussian grid: per-row point counts shrink towards the poles.
///
/// The octahedral variant derives its row lengths from the Gaussian number;
/// the classic variant takes an explicit `pl` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReducedGaussian {
    n: usize,
    latitudes: Vec<f64>,
    pl: Vec<usize>,
    octahedral: bool,
}

impl ReducedGaussian {
    /// Classic reduced grid from an explicit row-length table.
    pub fn from_pl(n: usize, pl: Vec<usize>) -> RegridResult<Self> {
        if pl.len() != 2 * n {
            return Err(RegridError::InvalidParameter {
                name: "pl".to_string(),
                reason: format!("expected {} rows, got {}", 2 * n, pl.len()),
            });
        }
        if pl.iter().any(|&count| count == 0) {
            return Err(RegridError::InvalidParameter {
                name: "pl".to_string(),
                reason: "row point counts must be positive".to_string(),
            });
        }
        Ok(Self {
            n,
            latitudes: gaussian_latitudes(2 * n),
            pl,
            octahedral: false,
        })
    }

    /// Octahedral reduced grid: row `i` (1-based, from either pole) has
    /// `4 i + 16` points.
    pub fn octahedral(n: usize) -> RegridResult<Self> {
        if n == 0 {
            return Err(RegridError::InvalidParameter {
                name: "n".to_string(),
                reason: "Gaussian number must be positive".to_string(),
            });
        }
        let mut pl: Vec<usize> = (1..=n).map(|i| 4 * i + 16).collect();
        let mut southern: Vec<usize> = pl.iter().rev().cloned().collect();
        pl.append(&mut southern);
        Ok(Self {
            n,
            latitudes: gaussian_latitudes(2 * n),
            pl,
            octahedral: true,
        })
    }

    pub fn gaussian_number(&self) -> usize {
        self.n
    }

    pub fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }

    pub fn pl(&self) -> &[usize] {
        &self.pl
    }
}

impl Representation for ReducedGaussian {
    fn grid_name(&self) -> &'static str {
        if self.octahedral {
            "octahedral-gaussian"
        } else {
            "reduced-gaussian"
        }
    }

    fn point_count(&self) -> usize {
        self.pl.iter().sum()
    }

    fn bounding_box(&self) -> BoundingBox {
        BoundingBox::global()
    }

    fn points(&self) -> Box<dyn Iterator<Item = Point> + '_> {
        Box::new(
            self.latitudes
                .iter()
                .zip(self.pl.iter())
                .flat_map(move |(&lat, &nlon)| {
                    let dlon = 360.0 / nlon as f64;
                    (0..nlon).map(move |j| Point::new(lat, j as f64 * dlon))
                }),
        )
    }

    fn cache_signature(&self) -> String {
        if self.octahedral {
            format!("octahedral-gaussian:{}", self.n)
        } else {
            let mut ctx = md5::Context::new();
            for &count in &self.pl {
                ctx.consume((count as u64).to_le_bytes());
            }
            format!("reduced-gaussian:{}:{:x}", self.n, ctx.compute())
        }
    }

    /// Cropping breaks the reduced structure: the result is a plain point
    /// list, and the classic row-length invariant is not recoverable.
    fn cropped(&self, bbox: &BoundingBox) -> RegridResult<Cropping> {
        crop_to_point_list(self, bbox)
    }
}
