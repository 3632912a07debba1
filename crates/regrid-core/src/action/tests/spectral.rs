//! End-to-end spectral transform plans.

use crate::action::{Context, Logic};
use crate::caching::CacheConfig;
use crate::errors::RegridError;
use crate::field::Field;
use crate::geometry::EARTH_RADIUS;
use crate::param::SimpleParametrisation;
use crate::representation::{self, Representation, SphericalHarmonics};
use crate::transform::legendre::coefficient_index;
use is_close::is_close;
use ndarray::Array1;
use std::sync::Arc;

const TRUNCATION: usize = 15;

fn spectral_input() -> Arc<dyn Representation> {
    let mut params = SimpleParametrisation::new();
    params.set_usize("truncation", TRUNCATION);
    representation::build("spherical-harmonics", &params).unwrap()
}

fn constant_coefficients(value: f64) -> Array1<f64> {
    let sh = SphericalHarmonics::new(TRUNCATION).unwrap();
    let mut coefficients = Array1::zeros(sh.point_count());
    coefficients[2 * coefficient_index(TRUNCATION, 0, 0)] = value;
    coefficients
}

#[test]
fn spectral_constant_lands_on_the_default_gaussian_grid() {
    let field = Field::new(constant_coefficients(5.0), spectral_input(), None).unwrap();
    let plan = Logic::plan(&SimpleParametrisation::new(), field.representation().as_ref())
        .unwrap();
    assert_eq!(plan.len(), 1);

    let cache = CacheConfig::disabled();
    let mut context = Context::single(field, &cache);
    plan.execute(&mut context).unwrap();
    let (fields, statistics) = context.finish();

    let result = &fields[0];
    assert_eq!(result.representation().grid_name(), "octahedral-gaussian");
    for &value in result.values().iter() {
        assert!(is_close!(value, 5.0, abs_tol = 1e-10));
    }
    assert_eq!(statistics.transforms, 1);
}

#[test]
fn spectral_constant_lands_on_a_requested_latlon_grid() {
    let mut params = SimpleParametrisation::new();
    params.set_string("grid", "regular-latlon");
    params.set_f64_array("grid.increments", vec![15.0, 15.0]);

    let field = Field::new(constant_coefficients(-3.5), spectral_input(), None).unwrap();
    let plan = Logic::plan(&params, field.representation().as_ref()).unwrap();

    let cache = CacheConfig::disabled();
    let mut context = Context::single(field, &cache);
    plan.execute(&mut context).unwrap();
    let (fields, _) = context.finish();

    let result = &fields[0];
    assert_eq!(result.representation().grid_name(), "regular-latlon");
    for &value in result.values().iter() {
        assert!(is_close!(value, -3.5, abs_tol = 1e-10));
    }
}

#[test]
fn wind_plan_recovers_solid_body_rotation() {
    // Vorticity of solid-body rotation is the (0, 1) harmonic; the plan
    // must produce u proportional to cos(lat) and vanishing v.
    let k = 2.0e-5;
    let sh = SphericalHarmonics::new(TRUNCATION).unwrap();
    let mut vorticity = Array1::zeros(sh.point_count());
    vorticity[2 * coefficient_index(TRUNCATION, 0, 1)] = k;
    let divergence = Array1::zeros(sh.point_count());

    let input = spectral_input();
    let fields = vec![
        Field::new(vorticity, input.clone(), None).unwrap(),
        Field::new(divergence, input.clone(), None).unwrap(),
    ];

    let mut params = SimpleParametrisation::new();
    params.set_bool("vod2uv", true);
    let plan = Logic::plan(&params, input.as_ref()).unwrap();
    assert_eq!(
        plan.iter().next().unwrap().name(),
        "transform.sh-wind-to-grid"
    );

    let cache = CacheConfig::disabled();
    let mut context = Context::new(fields, &cache);
    plan.execute(&mut context).unwrap();
    let (fields, _) = context.finish();
    assert_eq!(fields.len(), 2);

    let (u, v) = (&fields[0], &fields[1]);
    for (index, point) in u.representation().points().enumerate() {
        let expected = EARTH_RADIUS * k * 3.0f64.sqrt() * point.lat.to_radians().cos() / 2.0;
        assert!(is_close!(u.values()[index], expected, rel_tol = 1e-9, abs_tol = 1e-9));
        assert!(is_close!(v.values()[index], 0.0, abs_tol = 1e-9));
    }
}

#[test]
fn wind_plan_without_a_pair_fails() {
    let field = Field::new(constant_coefficients(1.0), spectral_input(), None).unwrap();
    let mut params = SimpleParametrisation::new();
    params.set_bool("vod2uv", true);
    let plan = Logic::plan(&params, field.representation().as_ref()).unwrap();

    let cache = CacheConfig::disabled();
    let mut context = Context::single(field, &cache);
    let err = plan.execute(&mut context).unwrap_err();
    assert!(matches!(err, RegridError::InvalidParameter { .. }));
}

#[test]
fn spectral_to_spectral_is_rejected() {
    let mut params = SimpleParametrisation::new();
    params.set_string("grid", "spherical-harmonics");
    params.set_usize("grid.truncation", 10);

    let field = Field::new(constant_coefficients(1.0), spectral_input(), None).unwrap();
    let plan = Logic::plan(&params, field.representation().as_ref()).unwrap();

    let cache = CacheConfig::disabled();
    let mut context = Context::single(field, &cache);
    let err = plan.execute(&mut context).unwrap_err();
    assert!(matches!(err, RegridError::NotImplemented { .. }));
}

#[test]
fn transform_then_crop_composes() {
    let mut params = SimpleParametrisation::new();
    params.set_f64_array("area", vec![30.0, 0.0, -30.0, 120.0]);

    let field = Field::new(constant_coefficients(7.0), spectral_input(), None).unwrap();
    let plan = Logic::plan(&params, field.representation().as_ref()).unwrap();
    assert_eq!(plan.len(), 2);

    let cache = CacheConfig::disabled();
    let mut context = Context::single(field, &cache);
    plan.execute(&mut context).unwrap();
    let (fields, _) = context.finish();

    let result = &fields[0];
    for point in result.representation().points() {
        assert!(point.lat.abs() <= 30.0);
        assert!(point.lon <= 120.0);
    }
    for &value in result.values().iter() {
        assert!(is_close!(value, 7.0, abs_tol = 1e-10));
    }
}
