//! Pipeline actions and plans.
//!
//! An [`Action`] is one processing step holding configuration only; the
//! data flows through the [`Context`]. Actions are serialisable trait
//! objects (the same `typetag` arrangement the rest of the crate uses for
//! pluggable pieces), and compare with [`Action::same_as`] so equivalent
//! plans can be recognised and merged.

pub mod context;
pub mod logic;
pub mod plan;
#[cfg(test)]
mod tests;

use crate::caching::{CacheKeyBuilder, CacheKind};
use crate::errors::{RegridError, RegridResult};
use crate::field::Field;
use crate::geometry::BoundingBox;
use crate::mask::LandSeaMask;
use crate::method::{self, AssemblyStatistics};
use crate::param::SimpleParametrisation;
use crate::representation::{GridSpec, Representation, SphericalHarmonics};
use crate::transform;
use log::debug;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

pub use self::context::{Context, Statistics};
pub use self::logic::Logic;
pub use self::plan::{ActionPlan, PlanGraph};

/// One step of a processing pipeline.
///
/// An action that cannot satisfy its contract fails fast; the plan
/// executor aborts the whole request and no partial output is returned.
#[typetag::serde]
pub trait Action: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn execute(&self, context: &mut Context) -> RegridResult<()>;

    /// Configuration equality, used for plan deduplication.
    fn same_as(&self, other: &dyn Action) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// The do-nothing root of merged plan graphs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NullAction {}

#[typetag::serde]
impl Action for NullAction {
    fn name(&self) -> &'static str {
        "null"
    }

    fn execute(&self, _context: &mut Context) -> RegridResult<()> {
        Ok(())
    }

    fn same_as(&self, other: &dyn Action) -> bool {
        other.as_any().is::<Self>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn spectral_input(representation: &dyn Representation) -> RegridResult<SphericalHarmonics> {
    match representation.truncation() {
        Some(truncation) => SphericalHarmonics::new(truncation),
        None => Err(RegridError::InvalidParameter {
            name: "input".to_string(),
            reason: format!(
                "a spectral transform needs spectral input, got '{}'",
                representation.grid_name()
            ),
        }),
    }
}

fn transform_output(
    grid: &Option<GridSpec>,
    truncation: usize,
) -> RegridResult<Arc<dyn Representation>> {
    let output = match grid {
        Some(spec) => spec.build()?,
        None => transform::default_output_grid(truncation)?,
    };
    if output.truncation().is_some() {
        return Err(RegridError::NotImplemented {
            what: "spectral-to-spectral truncation change".to_string(),
        });
    }
    Ok(output)
}

/// Inverse spherical-harmonic transform of each scalar field in the
/// pipeline onto a gridded representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShScalarToGridded {
    /// Target grid; the octahedral Gaussian grid matching the truncation
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridSpec>,
}

#[typetag::serde]
impl Action for ShScalarToGridded {
    fn name(&self) -> &'static str {
        "transform.sh-scalar-to-grid"
    }

    fn execute(&self, context: &mut Context) -> RegridResult<()> {
        let input = context.representation()?;
        let spectral = spectral_input(input.as_ref())?;
        let truncation = spectral.truncation().expect("spectral by construction");
        let output = transform_output(&self.grid, truncation)?;
        let cache = context.cache();

        let mut outcomes = Vec::new();
        for field in context.fields_mut() {
            let coefficients = field.values().to_vec();
            let (values, outcome) =
                transform::sh_to_grid_scalar(cache, &spectral, &coefficients, output.as_ref())?;
            field.replace(values, output.clone())?;
            outcomes.push(outcome);
        }
        let statistics = context.statistics_mut();
        statistics.transforms += outcomes.len();
        for outcome in outcomes {
            statistics.record_cache(outcome);
        }
        Ok(())
    }

    fn same_as(&self, other: &dyn Action) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .map_or(false, |other| self == other)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Inverse transform of a vorticity/divergence coefficient pair into u/v
/// wind components.
///
/// This is the vector code path: it consumes exactly two spectral fields
/// and leaves exactly two gridded fields, and its Legendre operators live
/// in their own cache namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShWindToGridded {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridSpec>,
}

#[typetag::serde]
impl Action for ShWindToGridded {
    fn name(&self) -> &'static str {
        "transform.sh-wind-to-grid"
    }

    fn execute(&self, context: &mut Context) -> RegridResult<()> {
        if context.fields().len() != 2 {
            return Err(RegridError::InvalidParameter {
                name: "fields".to_string(),
                reason: format!(
                    "the wind transform needs a vorticity/divergence pair, got {} fields",
                    context.fields().len()
                ),
            });
        }
        let input = context.representation()?;
        let spectral = spectral_input(input.as_ref())?;
        let truncation = spectral.truncation().expect("spectral by construction");
        let output = transform_output(&self.grid, truncation)?;

        let vorticity = context.fields()[0].values().to_vec();
        let divergence = context.fields()[1].values().to_vec();
        let (u, v, outcome) = transform::sh_to_grid_wind(
            context.cache(),
            &spectral,
            &vorticity,
            &divergence,
            output.as_ref(),
        )?;
        context.replace_fields(vec![
            Field::new(u, output.clone(), None)?,
            Field::new(v, output, None)?,
        ]);
        let statistics = context.statistics_mut();
        statistics.transforms += 1;
        statistics.record_cache(outcome);
        Ok(())
    }

    fn same_as(&self, other: &dyn Action) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .map_or(false, |other| self == other)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Grid-to-grid interpolation through a cached weight matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridToGrid {
    pub grid: GridSpec,
    pub method: String,
    pub method_params: SimpleParametrisation,
}

impl GridToGrid {
    /// The cache key of the weight matrix this action would use.
    pub fn cache_key(
        &self,
        input: &dyn Representation,
        output: &dyn Representation,
    ) -> RegridResult<crate::caching::CacheKey> {
        let method = method::build(&self.method, &self.method_params)?;
        let mut key = CacheKeyBuilder::new();
        key.add("weight-matrix")
            .add(&CacheKind::WeightMatrix.version().to_string());
        method.hash_into(&mut key);
        key.add(&input.cache_signature())
            .add(&output.cache_signature());
        Ok(key.finish())
    }
}

#[typetag::serde]
impl Action for GridToGrid {
    fn name(&self) -> &'static str {
        "interpolate.grid-to-grid"
    }

    fn execute(&self, context: &mut Context) -> RegridResult<()> {
        let input = context.representation()?;
        if input.truncation().is_some() {
            return Err(RegridError::InvalidParameter {
                name: "input".to_string(),
                reason: "grid-to-grid interpolation needs gridded input".to_string(),
            });
        }
        let output = self.grid.build()?;
        let method = method::build(&self.method, &self.method_params)?;
        let key = self.cache_key(input.as_ref(), output.as_ref())?;

        let mut assembly = AssemblyStatistics::default();
        let (matrix, outcome) = crate::caching::find_or_assemble(context.cache(), &key, || {
            method.assemble(&mut assembly, input.as_ref(), output.as_ref())
        })?;
        debug!(
            "{}: {} -> {} through {} ({} entries)",
            self.name(),
            input.grid_name(),
            output.grid_name(),
            self.method,
            matrix.entry_count()
        );

        for field in context.fields_mut() {
            let values = matrix.apply(field, method.non_linear())?;
            field.replace(values, output.clone())?;
        }
        let statistics = context.statistics_mut();
        statistics.record_cache(outcome);
        statistics.extrapolated_points += assembly.extrapolated_points;
        statistics.empty_cells += assembly.empty_cells;
        Ok(())
    }

    fn same_as(&self, other: &dyn Action) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .map_or(false, |other| self == other)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Restrict every field to a sub-domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaCrop {
    pub north: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
}

impl AreaCrop {
    pub fn new(bbox: &BoundingBox) -> Self {
        Self {
            north: bbox.north(),
            west: bbox.west(),
            south: bbox.south(),
            east: bbox.east(),
        }
    }
}

#[typetag::serde]
impl Action for AreaCrop {
    fn name(&self) -> &'static str {
        "crop.area"
    }

    fn execute(&self, context: &mut Context) -> RegridResult<()> {
        let bbox = BoundingBox::new(self.north, self.west, self.south, self.east)?;
        let input = context.representation()?;
        let cropping = input.cropped(&bbox)?;
        debug!(
            "{}: {} points of '{}' inside {:?}",
            self.name(),
            cropping.kept.len(),
            input.grid_name(),
            bbox
        );
        for field in context.fields_mut() {
            let values: Array1<f64> = cropping
                .kept
                .iter()
                .map(|&index| field.values()[index])
                .collect();
            field.replace(values, cropping.representation.clone())?;
        }
        Ok(())
    }

    fn same_as(&self, other: &dyn Action) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .map_or(false, |other| self == other)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Mark the points selected by a land-sea mask as missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandSeaMaskFilter {
    pub path: String,
    pub threshold: f64,
    pub source: GridSpec,
}

#[typetag::serde]
impl Action for LandSeaMaskFilter {
    fn name(&self) -> &'static str {
        "filter.land-sea-mask"
    }

    fn execute(&self, context: &mut Context) -> RegridResult<()> {
        let representation = context.representation()?;
        let lsm = LandSeaMask::new(&self.path, self.threshold, self.source.clone());
        let (mask, outcome) = lsm.mask(context.cache(), representation.as_ref())?;

        let mut masked = 0usize;
        for field in context.fields_mut() {
            for (index, &is_masked) in mask.iter().enumerate() {
                if is_masked {
                    field.set_missing(index);
                    masked += 1;
                }
            }
        }
        let statistics = context.statistics_mut();
        statistics.record_cache(outcome);
        statistics.masked_points += masked;
        Ok(())
    }

    fn same_as(&self, other: &dyn Action) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .map_or(false, |other| self == other)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
