//! Plan construction: the policy deciding which actions a request needs.

use crate::action::{
    ActionPlan, AreaCrop, GridToGrid, LandSeaMaskFilter, ShScalarToGridded, ShWindToGridded,
};
use crate::errors::{RegridError, RegridResult};
use crate::mask::LandSeaMask;
use crate::param::{Parametrisation, SimpleParametrisation};
use crate::representation::{self, GridSpec, Representation};
use log::debug;
use std::sync::Arc;

/// Method configuration keys forwarded from a request into a
/// [`GridToGrid`] action. Keeping the copy minimal lets requests that
/// differ only in unrelated settings still produce equivalent actions.
const METHOD_KEYS: [&str; 4] = ["nclosest", "distance-weighting", "non-linear", "statistic"];

/// Builds action plans from a user request and the input field's
/// representation.
pub struct Logic;

impl Logic {
    /// The plan for one request.
    ///
    /// Spectral input is first transformed onto the requested grid (or
    /// the truncation's Gaussian grid); gridded input is interpolated
    /// when a different grid is requested. An `area` restricts the
    /// domain afterwards, and an active land-sea mask filters last.
    pub fn plan(
        params: &SimpleParametrisation,
        input: &dyn Representation,
    ) -> RegridResult<ActionPlan> {
        let mut plan = ActionPlan::new();

        let grid = params
            .get_string("grid")
            .map(|name| GridSpec::new(&name, params.scoped("grid")));
        let vector = params.get_bool("vod2uv").unwrap_or(false);

        if input.truncation().is_some() {
            if vector {
                plan.add(Arc::new(ShWindToGridded { grid }));
            } else {
                plan.add(Arc::new(ShScalarToGridded { grid }));
            }
        } else {
            if vector {
                return Err(RegridError::InvalidParameter {
                    name: "vod2uv".to_string(),
                    reason: "the wind transform needs spectral input".to_string(),
                });
            }
            if let Some(grid) = grid {
                // Interpolating a grid onto itself is still executed; the
                // request asked for it and the result is exact.
                let mut method_params = SimpleParametrisation::new();
                for key in METHOD_KEYS {
                    for (name, value) in params.iter() {
                        if name == key {
                            method_params.set(name, value.clone());
                        }
                    }
                }
                plan.add(Arc::new(GridToGrid {
                    grid,
                    method: params
                        .get_string("method")
                        .unwrap_or_else(|| "finite-element".to_string()),
                    method_params,
                }));
            }
        }

        if let Some(bbox) = representation::area_from_params(params)? {
            plan.add(Arc::new(AreaCrop::new(&bbox)));
        }

        if LandSeaMask::active(params) {
            let lsm_params = params.scoped("lsm");
            plan.add(Arc::new(LandSeaMaskFilter {
                path: lsm_params.require_string("path")?,
                threshold: lsm_params.get_f64("threshold").unwrap_or(0.5),
                source: GridSpec::new(&lsm_params.require_string("grid")?, lsm_params.clone()),
            }));
        }

        debug!(
            "planned {} actions for input '{}'",
            plan.len(),
            input.grid_name()
        );
        Ok(plan)
    }
}
