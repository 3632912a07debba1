//! Associated Legendre function tables.
//!
//! The inverse spherical-harmonic transform is dominated by the evaluation
//! of normalised associated Legendre functions at the output latitudes.
//! The tables are computed once per (truncation, latitude set) and cached
//! on disk in the `.leg` namespace; the vector variant additionally holds
//! the meridional-derivative table and lives in its own `.vleg` namespace.

use crate::caching::{atomic_write, CacheConfig, CacheKeyBuilder, CacheKind, CacheOutcome, LoaderKind};
use crate::errors::{RegridError, RegridResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use std::fs;
use std::io::{Read, Write};
use std::sync::Arc;

/// Index of the coefficient (m, n) in the triangular m-major layout.
pub fn coefficient_index(truncation: usize, m: usize, n: usize) -> usize {
    debug_assert!(m <= n && n <= truncation);
    m * (truncation + 1) - m * (m.saturating_sub(1)) / 2 + (n - m)
}

/// `sqrt((n^2 - m^2) / (4 n^2 - 1))`, the coupling coefficient of the
/// degree recurrences.
fn epsilon(n: usize, m: usize) -> f64 {
    let n2 = (n * n) as f64;
    let m2 = (m * m) as f64;
    ((n2 - m2) / (4.0 * n2 - 1.0)).sqrt()
}

/// Normalised associated Legendre functions `P(m, n)` at `x = sin(lat)`
/// for every `m <= n <= tmax`, without the Condon-Shortley phase.
///
/// The normalisation is chosen so that `P(0, 0) = 1` and
/// `P(0, 1) = sqrt(3) x`, matching the meteorological spectral
/// coefficient convention.
fn legendre_row(tmax: usize, x: f64) -> Vec<f64> {
    let sin2 = (1.0 - x * x).max(0.0);
    let cos_lat = sin2.sqrt();
    let mut values = vec![0.0; (tmax + 1) * (tmax + 2) / 2];
    // Sectoral seed and m-recurrence
    let mut sectoral = 1.0;
    for m in 0..=tmax {
        if m > 0 {
            sectoral *= ((2 * m + 1) as f64 / (2 * m) as f64).sqrt() * cos_lat;
        }
        let base = coefficient_index(tmax, m, m);
        values[base] = sectoral;
        if m + 1 <= tmax {
            values[base + 1] = ((2 * m + 3) as f64).sqrt() * x * sectoral;
        }
        for n in (m + 2)..=tmax {
            let a = epsilon(n, m);
            let b = epsilon(n - 1, m);
            values[coefficient_index(tmax, m, n)] = (x
                * values[coefficient_index(tmax, m, n - 1)]
                - b * values[coefficient_index(tmax, m, n - 2)])
                / a;
        }
    }
    values
}

/// Wait-free read-only table of Legendre values per latitude.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendreTable {
    truncation: usize,
    latitudes: Vec<f64>,
    /// `values[lat_index * ncoef + coefficient_index]`
    values: Vec<f64>,
    /// Meridional derivatives `cos(lat) dP/dlat`, same layout; present
    /// only in vector tables.
    derivatives: Option<Vec<f64>>,
}

impl LegendreTable {
    /// Number of `(m, n)` coefficients per latitude.
    pub fn coefficient_count(&self) -> usize {
        (self.truncation + 1) * (self.truncation + 2) / 2
    }

    pub fn truncation(&self) -> usize {
        self.truncation
    }

    pub fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }

    pub fn has_derivatives(&self) -> bool {
        self.derivatives.is_some()
    }

    /// Compute the scalar table.
    pub fn scalar(truncation: usize, latitudes: Vec<f64>) -> Self {
        let ncoef = (truncation + 1) * (truncation + 2) / 2;
        let mut values = Vec::with_capacity(latitudes.len() * ncoef);
        for &lat in &latitudes {
            let x = lat.to_radians().sin();
            let row = legendre_row(truncation, x);
            values.extend_from_slice(&row);
        }
        Self {
            truncation,
            latitudes,
            values,
            derivatives: None,
        }
    }

    /// Compute the vector table: values plus meridional derivatives.
    pub fn vector(truncation: usize, latitudes: Vec<f64>) -> Self {
        let ncoef = (truncation + 1) * (truncation + 2) / 2;
        let mut values = Vec::with_capacity(latitudes.len() * ncoef);
        let mut derivatives = Vec::with_capacity(latitudes.len() * ncoef);
        for &lat in &latitudes {
            let x = lat.to_radians().sin();
            // The derivative of degree n couples degrees n-1 and n+1.
            let extended = legendre_row(truncation + 1, x);
            for m in 0..=truncation {
                for n in m..=truncation {
                    values.push(extended[coefficient_index(truncation + 1, m, n)]);
                    let below = if n > m {
                        extended[coefficient_index(truncation + 1, m, n - 1)]
                    } else {
                        0.0
                    };
                    let above = extended[coefficient_index(truncation + 1, m, n + 1)];
                    derivatives.push(
                        (n + 1) as f64 * epsilon(n, m) * below
                            - n as f64 * epsilon(n + 1, m) * above,
                    );
                }
            }
        }
        Self {
            truncation,
            latitudes,
            values,
            derivatives: Some(derivatives),
        }
    }

    /// `P(m, n)` at the latitude with the given index.
    pub fn value(&self, lat_index: usize, m: usize, n: usize) -> f64 {
        self.values[lat_index * self.coefficient_count()
            + coefficient_index(self.truncation, m, n)]
    }

    /// `cos(lat) dP(m, n)/dlat` at the latitude with the given index.
    ///
    /// # Panics
    ///
    /// If the table was computed without derivatives.
    pub fn derivative(&self, lat_index: usize, m: usize, n: usize) -> f64 {
        let derivatives = self
            .derivatives
            .as_ref()
            .expect("derivative lookup on a scalar Legendre table");
        derivatives[lat_index * self.coefficient_count()
            + coefficient_index(self.truncation, m, n)]
    }

    /// Raw little-endian dump.
    pub fn write_to(&self, writer: &mut impl Write) -> std::io::Result<()> {
        writer.write_u64::<LittleEndian>(self.truncation as u64)?;
        writer.write_u64::<LittleEndian>(self.latitudes.len() as u64)?;
        writer.write_u8(self.derivatives.is_some() as u8)?;
        for &lat in &self.latitudes {
            writer.write_f64::<LittleEndian>(lat)?;
        }
        for &value in &self.values {
            writer.write_f64::<LittleEndian>(value)?;
        }
        if let Some(derivatives) = &self.derivatives {
            for &value in derivatives {
                writer.write_f64::<LittleEndian>(value)?;
            }
        }
        Ok(())
    }

    /// Inverse of [`LegendreTable::write_to`].
    pub fn read_from(reader: &mut impl Read) -> std::io::Result<Self> {
        let truncation = reader.read_u64::<LittleEndian>()? as usize;
        let nlat = reader.read_u64::<LittleEndian>()? as usize;
        let has_derivatives = reader.read_u8()? != 0;
        let ncoef = (truncation + 1) * (truncation + 2) / 2;
        let mut latitudes = Vec::with_capacity(nlat);
        for _ in 0..nlat {
            latitudes.push(reader.read_f64::<LittleEndian>()?);
        }
        let mut values = Vec::with_capacity(nlat * ncoef);
        for _ in 0..nlat * ncoef {
            values.push(reader.read_f64::<LittleEndian>()?);
        }
        let derivatives = if has_derivatives {
            let mut derivatives = Vec::with_capacity(nlat * ncoef);
            for _ in 0..nlat * ncoef {
                derivatives.push(reader.read_f64::<LittleEndian>()?);
            }
            Some(derivatives)
        } else {
            None
        };
        Ok(Self {
            truncation,
            latitudes,
            values,
            derivatives,
        })
    }
}

/// Fetch a Legendre table from the cache, computing and publishing it on a
/// miss (unless strict mode forbids regeneration).
pub fn find_or_compute(
    config: &CacheConfig,
    truncation: usize,
    grid_signature: &str,
    latitudes: &[f64],
    vector: bool,
) -> RegridResult<(Arc<LegendreTable>, CacheOutcome)> {
    let kind = if vector {
        CacheKind::LegendreVector
    } else {
        CacheKind::LegendreScalar
    };
    let mut key = CacheKeyBuilder::new();
    key.add(kind.directory())
        .add(&truncation.to_string())
        .add(grid_signature);
    let key = key.finish();

    if config.loader() != LoaderKind::None {
        let path = config.entry_path(kind, &key);
        if path.exists() {
            debug!("loading Legendre table {} from {}", key, path.display());
            let mut file = fs::File::open(&path)?;
            let table =
                LegendreTable::read_from(&mut file).map_err(|err| RegridError::CacheCorrupt {
                    path: path.display().to_string(),
                    reason: err.to_string(),
                })?;
            return Ok((Arc::new(table), CacheOutcome::DiskHit));
        }
    }

    if config.strict() {
        return Err(RegridError::CacheMiss {
            key: key.hex().to_string(),
        });
    }

    debug!(
        "computing {} Legendre table, truncation {}, {} latitudes",
        if vector { "vector" } else { "scalar" },
        truncation,
        latitudes.len()
    );
    let table = if vector {
        LegendreTable::vector(truncation, latitudes.to_vec())
    } else {
        LegendreTable::scalar(truncation, latitudes.to_vec())
    };
    if config.loader() != LoaderKind::None {
        let path = config.entry_path(kind, &key);
        let mut payload = Vec::new();
        table.write_to(&mut payload)?;
        atomic_write(&path, &payload)?;
    }
    Ok((Arc::new(table), CacheOutcome::Assembled))
}
