//! Land-sea masks: cacheable boolean arrays over a representation's
//! points.
//!
//! The mask source is a raw little-endian array of doubles on its own
//! grid; projecting it onto a target representation goes through
//! nearest-neighbour interpolation followed by thresholding. Projected
//! masks are cached keyed by source path, threshold and both grid
//! signatures.

use crate::caching::{atomic_write, CacheConfig, CacheKeyBuilder, CacheKind, CacheOutcome, LoaderKind};
use crate::errors::{RegridError, RegridResult};
use crate::field::Field;
use crate::method::{AssemblyStatistics, KNearestNeighbours, Method};
use crate::param::Parametrisation;
use crate::representation::{GridSpec, Representation};
use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;
use ndarray::Array1;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// A land-sea mask source: a value file plus the grid it lives on.
///
/// Points whose projected source value reaches `threshold` are masked.
#[derive(Debug, Clone)]
pub struct LandSeaMask {
    path: PathBuf,
    threshold: f64,
    source: GridSpec,
}

impl LandSeaMask {
    pub fn new(path: impl Into<PathBuf>, threshold: f64, source: GridSpec) -> Self {
        Self {
            path: path.into(),
            threshold,
            source,
        }
    }

    /// Whether masking is requested at all.
    pub fn active(params: &dyn Parametrisation) -> bool {
        params.get_bool("lsm").unwrap_or(false)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn source(&self) -> &GridSpec {
        &self.source
    }

    fn cache_key(&self, representation: &dyn Representation) -> RegridResult<CacheKeyBuilder> {
        let mut key = CacheKeyBuilder::new();
        key.add("land-sea-mask")
            .add(&self.path.display().to_string())
            .add(&format!("{:.9}", self.threshold))
            .add(&self.source.build()?.cache_signature())
            .add(&representation.cache_signature());
        Ok(key)
    }

    /// Read the raw source values from disk.
    fn source_values(&self, expected: usize) -> RegridResult<Vec<f64>> {
        let payload = fs::read(&self.path)?;
        if payload.len() != expected * 8 {
            return Err(RegridError::InvalidParameter {
                name: "lsm.path".to_string(),
                reason: format!(
                    "'{}' holds {} bytes, expected {} values",
                    self.path.display(),
                    payload.len(),
                    expected
                ),
            });
        }
        let mut reader = payload.as_slice();
        let mut values = Vec::with_capacity(expected);
        for _ in 0..expected {
            values.push(reader.read_f64::<LittleEndian>()?);
        }
        Ok(values)
    }

    /// The boolean mask over the given representation's points.
    pub fn mask(
        &self,
        config: &CacheConfig,
        representation: &dyn Representation,
    ) -> RegridResult<(Arc<Vec<bool>>, CacheOutcome)> {
        let key = self.cache_key(representation)?.finish();

        if config.loader() != LoaderKind::None {
            let path = config.entry_path(CacheKind::Mask, &key);
            if path.exists() {
                debug!("loading mask {} from {}", key, path.display());
                let payload = fs::read(&path)?;
                if payload.len() != representation.point_count() {
                    return Err(RegridError::CacheCorrupt {
                        path: path.display().to_string(),
                        reason: format!(
                            "{} bytes for {} points",
                            payload.len(),
                            representation.point_count()
                        ),
                    });
                }
                let mask = payload.iter().map(|&byte| byte != 0).collect();
                return Ok((Arc::new(mask), CacheOutcome::DiskHit));
            }
        }

        if config.strict() {
            return Err(RegridError::CacheMiss {
                key: key.hex().to_string(),
            });
        }

        let source = self.source.build()?;
        let values = self.source_values(source.point_count())?;
        let field = Field::new(Array1::from_vec(values), source.clone(), None)?;

        let method = KNearestNeighbours::nearest();
        let mut statistics = AssemblyStatistics::default();
        let matrix = method.assemble(&mut statistics, source.as_ref(), representation)?;
        let projected = matrix.apply(&field, method.non_linear())?;

        let mask: Vec<bool> = projected
            .iter()
            .map(|&value| value >= self.threshold)
            .collect();
        debug!(
            "mask {}: {} of {} points masked",
            key,
            mask.iter().filter(|&&masked| masked).count(),
            mask.len()
        );

        if config.loader() != LoaderKind::None {
            let payload: Vec<u8> = mask.iter().map(|&masked| masked as u8).collect();
            atomic_write(&config.entry_path(CacheKind::Mask, &key), &payload)?;
        }
        Ok((Arc::new(mask), CacheOutcome::Assembled))
    }
}
