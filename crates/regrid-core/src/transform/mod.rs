//! Inverse spherical-harmonic transforms: spectral coefficients to
//! gridded values.
//!
//! Scalar fields and vector (vorticity/divergence to u/v) fields take
//! distinct paths with distinct operator caches. Coefficients follow the
//! m-major triangular layout with interleaved real and imaginary parts.

pub mod legendre;

use crate::caching::{CacheConfig, CacheOutcome};
use crate::errors::{RegridError, RegridResult};
use crate::geometry::EARTH_RADIUS;
use crate::representation::{ReducedGaussian, Representation, SphericalHarmonics};
use log::debug;
use ndarray::Array1;
use std::sync::Arc;

/// The Gaussian grid the transform lands on when the request names none:
/// the octahedral grid of the linear-grid rule `N = (T + 1) / 2`.
pub fn default_output_grid(truncation: usize) -> RegridResult<Arc<dyn Representation>> {
    let n = (truncation + 2) / 2;
    Ok(Arc::new(ReducedGaussian::octahedral(n)?))
}

/// The latitudes a gridded representation needs Legendre values at, with
/// each point's index into that latitude list.
///
/// Points arrive row-major, so distinct latitudes are found by run-length
/// scanning.
fn distinct_latitudes(representation: &dyn Representation) -> (Vec<f64>, Vec<usize>) {
    let mut latitudes: Vec<f64> = Vec::new();
    let mut indices = Vec::with_capacity(representation.point_count());
    for point in representation.points() {
        match latitudes.last() {
            Some(&last) if last == point.lat => {}
            _ => latitudes.push(point.lat),
        }
        indices.push(latitudes.len() - 1);
    }
    (latitudes, indices)
}

fn check_coefficients(
    spectral: &SphericalHarmonics,
    name: &str,
    coefficients: &[f64],
) -> RegridResult<()> {
    if coefficients.len() != spectral.point_count() {
        return Err(RegridError::InvalidParameter {
            name: name.to_string(),
            reason: format!(
                "truncation {} needs {} values, got {}",
                spectral.truncation().unwrap_or(0),
                spectral.point_count(),
                coefficients.len()
            ),
        });
    }
    Ok(())
}

/// Evaluate the Fourier series `a_0 + 2 sum_m (a_m cos - b_m sin)` at
/// longitude `lon` degrees.
fn fourier_value(a: &[f64], b: &[f64], lon: f64) -> f64 {
    let lambda = lon.to_radians();
    let mut value = a[0];
    for m in 1..a.len() {
        let phase = m as f64 * lambda;
        value += 2.0 * (a[m] * phase.cos() - b[m] * phase.sin());
    }
    value
}

/// Inverse transform of a scalar spectral field onto a gridded
/// representation.
pub fn sh_to_grid_scalar(
    config: &CacheConfig,
    spectral: &SphericalHarmonics,
    coefficients: &[f64],
    output: &dyn Representation,
) -> RegridResult<(Array1<f64>, CacheOutcome)> {
    check_coefficients(spectral, "coefficients", coefficients)?;
    let truncation = spectral.truncation().expect("spectral representation");
    let (latitudes, point_lat) = distinct_latitudes(output);
    let (table, outcome) = legendre::find_or_compute(
        config,
        truncation,
        &output.cache_signature(),
        &latitudes,
        false,
    )?;
    debug!(
        "scalar inverse transform T{} onto '{}' ({} latitudes)",
        truncation,
        output.grid_name(),
        latitudes.len()
    );

    // Per latitude, collapse degrees into Fourier coefficients.
    let nlat = latitudes.len();
    let mut fourier_a = vec![vec![0.0; truncation + 1]; nlat];
    let mut fourier_b = vec![vec![0.0; truncation + 1]; nlat];
    for lat_index in 0..nlat {
        for m in 0..=truncation {
            let mut a = 0.0;
            let mut b = 0.0;
            for n in m..=truncation {
                let coefficient = legendre::coefficient_index(truncation, m, n);
                let p = table.value(lat_index, m, n);
                a += coefficients[2 * coefficient] * p;
                b += coefficients[2 * coefficient + 1] * p;
            }
            fourier_a[lat_index][m] = a;
            fourier_b[lat_index][m] = b;
        }
    }

    let mut values = Array1::zeros(output.point_count());
    for (index, point) in output.points().enumerate() {
        let lat_index = point_lat[index];
        values[index] = fourier_value(&fourier_a[lat_index], &fourier_b[lat_index], point.lon);
    }
    Ok((values, outcome))
}

/// Inverse transform of a vorticity/divergence pair into u/v wind
/// components on a gridded representation.
///
/// The rotational and divergent parts are recovered through the inverse
/// Laplacian (streamfunction and velocity potential) and differentiated
/// spectrally. Wind at the geographic poles is not defined by this
/// expansion and comes out as zero.
pub fn sh_to_grid_wind(
    config: &CacheConfig,
    spectral: &SphericalHarmonics,
    vorticity: &[f64],
    divergence: &[f64],
    output: &dyn Representation,
) -> RegridResult<(Array1<f64>, Array1<f64>, CacheOutcome)> {
    check_coefficients(spectral, "vorticity", vorticity)?;
    check_coefficients(spectral, "divergence", divergence)?;
    let truncation = spectral.truncation().expect("spectral representation");
    let (latitudes, point_lat) = distinct_latitudes(output);
    let (table, outcome) = legendre::find_or_compute(
        config,
        truncation,
        &output.cache_signature(),
        &latitudes,
        true,
    )?;
    debug!(
        "vector inverse transform T{} onto '{}' ({} latitudes)",
        truncation,
        output.grid_name(),
        latitudes.len()
    );

    // Streamfunction and velocity potential: psi = -a^2 zeta / (n (n+1)).
    let ncoef = (truncation + 1) * (truncation + 2) / 2;
    let mut psi = vec![0.0; 2 * ncoef];
    let mut chi = vec![0.0; 2 * ncoef];
    for m in 0..=truncation {
        for n in m.max(1)..=truncation {
            let coefficient = legendre::coefficient_index(truncation, m, n);
            let scale = -EARTH_RADIUS * EARTH_RADIUS / (n * (n + 1)) as f64;
            psi[2 * coefficient] = scale * vorticity[2 * coefficient];
            psi[2 * coefficient + 1] = scale * vorticity[2 * coefficient + 1];
            chi[2 * coefficient] = scale * divergence[2 * coefficient];
            chi[2 * coefficient + 1] = scale * divergence[2 * coefficient + 1];
        }
    }

    // u = (dchi/dlon - cos(lat) dpsi/dlat) / (a cos(lat))
    // v = (dpsi/dlon + cos(lat) dchi/dlat) / (a cos(lat))
    let nlat = latitudes.len();
    let mut u_a = vec![vec![0.0; truncation + 1]; nlat];
    let mut u_b = vec![vec![0.0; truncation + 1]; nlat];
    let mut v_a = vec![vec![0.0; truncation + 1]; nlat];
    let mut v_b = vec![vec![0.0; truncation + 1]; nlat];
    for lat_index in 0..nlat {
        for m in 0..=truncation {
            let m_f = m as f64;
            for n in m..=truncation {
                let coefficient = legendre::coefficient_index(truncation, m, n);
                let p = table.value(lat_index, m, n);
                let h = table.derivative(lat_index, m, n);
                let (psi_re, psi_im) = (psi[2 * coefficient], psi[2 * coefficient + 1]);
                let (chi_re, chi_im) = (chi[2 * coefficient], chi[2 * coefficient + 1]);
                // d/dlon multiplies a coefficient by i m.
                u_a[lat_index][m] += -m_f * chi_im * p - psi_re * h;
                u_b[lat_index][m] += m_f * chi_re * p - psi_im * h;
                v_a[lat_index][m] += -m_f * psi_im * p + chi_re * h;
                v_b[lat_index][m] += m_f * psi_re * p + chi_im * h;
            }
        }
    }

    let mut u = Array1::zeros(output.point_count());
    let mut v = Array1::zeros(output.point_count());
    for (index, point) in output.points().enumerate() {
        let lat_index = point_lat[index];
        let cos_lat = point.lat.to_radians().cos();
        if cos_lat < 1e-10 {
            continue;
        }
        let denominator = EARTH_RADIUS * cos_lat;
        u[index] = fourier_value(&u_a[lat_index], &u_b[lat_index], point.lon) / denominator;
        v[index] = fourier_value(&v_a[lat_index], &v_b[lat_index], point.lon) / denominator;
    }
    Ok((u, v, outcome))
}
