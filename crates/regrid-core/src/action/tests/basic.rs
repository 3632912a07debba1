//! Basic plan tests: construction, equivalence, serialisation.

use crate::action::{ActionPlan, Context, Logic};
use crate::caching::CacheConfig;
use crate::errors::RegridError;
use crate::field::Field;
use crate::param::SimpleParametrisation;
use crate::representation::{self, Representation};
use std::sync::Arc;

fn gridded_input() -> Arc<dyn Representation> {
    let mut params = SimpleParametrisation::new();
    params.set_f64_array("increments", vec![10.0, 10.0]);
    representation::build("regular-latlon", &params).unwrap()
}

fn spectral_input() -> Arc<dyn Representation> {
    let mut params = SimpleParametrisation::new();
    params.set_usize("truncation", 21);
    representation::build("spherical-harmonics", &params).unwrap()
}

fn interpolation_request() -> SimpleParametrisation {
    let mut params = SimpleParametrisation::new();
    params.set_string("grid", "regular-latlon");
    params.set_f64_array("grid.increments", vec![5.0, 5.0]);
    params.set_string("method", "k-nearest-neighbours");
    params.set_usize("nclosest", 4);
    params
}

#[test]
fn gridded_request_plans_one_interpolation() {
    let plan = Logic::plan(&interpolation_request(), gridded_input().as_ref()).unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan.iter().next().unwrap().name(), "interpolate.grid-to-grid");
}

#[test]
fn spectral_request_plans_a_transform_first() {
    let plan = Logic::plan(&interpolation_request(), spectral_input().as_ref()).unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(
        plan.iter().next().unwrap().name(),
        "transform.sh-scalar-to-grid"
    );
}

#[test]
fn area_and_mask_extend_the_plan() {
    let mut params = interpolation_request();
    params.set_f64_array("area", vec![60.0, 0.0, -60.0, 180.0]);
    params.set_bool("lsm", true);
    params.set_string("lsm.path", "/data/lsm.bin");
    params.set_string("lsm.grid", "regular-latlon");
    params.set_f64_array("lsm.increments", vec![10.0, 10.0]);

    let plan = Logic::plan(&params, gridded_input().as_ref()).unwrap();
    let names: Vec<&str> = plan.iter().map(|action| action.name()).collect();
    assert_eq!(
        names,
        vec![
            "interpolate.grid-to-grid",
            "crop.area",
            "filter.land-sea-mask"
        ]
    );
}

#[test]
fn request_without_work_plans_nothing() {
    let params = SimpleParametrisation::new();
    let plan = Logic::plan(&params, gridded_input().as_ref()).unwrap();
    assert!(plan.is_empty());
}

#[test]
fn wind_request_needs_spectral_input() {
    let mut params = SimpleParametrisation::new();
    params.set_bool("vod2uv", true);
    let err = Logic::plan(&params, gridded_input().as_ref()).unwrap_err();
    assert!(matches!(err, RegridError::InvalidParameter { .. }));
}

#[test]
fn equivalent_requests_build_equivalent_plans() {
    let params = interpolation_request();
    let a = Logic::plan(&params, gridded_input().as_ref()).unwrap();
    let b = Logic::plan(&params, gridded_input().as_ref()).unwrap();

    // Reflexive, symmetric
    assert!(a.same_as(&a));
    assert!(a.same_as(&b));
    assert!(b.same_as(&a));
}

#[test]
fn different_methods_build_different_plans() {
    let params = interpolation_request();
    let a = Logic::plan(&params, gridded_input().as_ref()).unwrap();

    let mut params = interpolation_request();
    params.set_usize("nclosest", 12);
    let b = Logic::plan(&params, gridded_input().as_ref()).unwrap();

    assert!(!a.same_as(&b));
}

#[test]
fn unrelated_request_settings_do_not_break_equivalence() {
    // A request that also carries masking settings still wants the same
    // interpolation; the interpolation actions must stay equivalent.
    let plain = Logic::plan(&interpolation_request(), gridded_input().as_ref()).unwrap();

    let mut params = interpolation_request();
    params.set_bool("lsm", true);
    params.set_string("lsm.path", "/data/lsm.bin");
    params.set_string("lsm.grid", "regular-latlon");
    params.set_f64_array("lsm.increments", vec![10.0, 10.0]);
    let masked = Logic::plan(&params, gridded_input().as_ref()).unwrap();

    assert!(plain
        .iter()
        .next()
        .unwrap()
        .same_as(masked.iter().next().unwrap().as_ref()));
}

#[test]
fn serialise_and_deserialise_plan() {
    let mut params = interpolation_request();
    params.set_f64_array("area", vec![60.0, 0.0, -60.0, 180.0]);
    let plan = Logic::plan(&params, gridded_input().as_ref()).unwrap();

    let serialised = serde_json::to_string_pretty(&plan).unwrap();
    let deserialised: ActionPlan = serde_json::from_str(&serialised).unwrap();
    assert!(plan.same_as(&deserialised));

    let serialised = toml::to_string(&plan).unwrap();
    let deserialised: ActionPlan = toml::from_str(&serialised).unwrap();
    assert!(plan.same_as(&deserialised));
}

#[test]
fn failing_action_aborts_the_plan() {
    // The target grid name is not implemented, so execution must fail
    // before producing any output.
    let mut params = SimpleParametrisation::new();
    params.set_string("grid", "lambert-conformal");
    let plan = Logic::plan(&params, gridded_input().as_ref()).unwrap();

    let cache = CacheConfig::disabled();
    let field = Field::constant(1.0, gridded_input());
    let mut context = Context::single(field, &cache);
    let err = plan.execute(&mut context).unwrap_err();
    assert!(matches!(err, RegridError::NotImplemented { .. }));
    // The field is untouched
    let (fields, statistics) = context.finish();
    assert_eq!(fields[0].representation().grid_name(), "regular-latlon");
    assert_eq!(statistics.actions_executed, 0);
}
