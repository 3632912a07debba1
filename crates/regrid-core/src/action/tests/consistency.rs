//! End-to-end interpolation consistency checks.

use crate::action::{Context, Logic};
use crate::caching::CacheConfig;
use crate::field::Field;
use crate::param::SimpleParametrisation;
use crate::representation::{self, Representation};
use is_close::is_close;
use ndarray::Array1;
use std::sync::Arc;

fn regular(increment: f64) -> Arc<dyn Representation> {
    let mut params = SimpleParametrisation::new();
    params.set_f64_array("increments", vec![increment, increment]);
    representation::build("regular-latlon", &params).unwrap()
}

fn request_for(increment: f64, method: &str) -> SimpleParametrisation {
    let mut params = SimpleParametrisation::new();
    params.set_string("grid", "regular-latlon");
    params.set_f64_array("grid.increments", vec![increment, increment]);
    params.set_string("method", method);
    params
}

fn run(params: &SimpleParametrisation, field: Field) -> (Vec<Field>, crate::action::Statistics) {
    let plan = Logic::plan(params, field.representation().as_ref()).unwrap();
    let cache = CacheConfig::disabled();
    let mut context = Context::single(field, &cache);
    plan.execute(&mut context).unwrap();
    context.finish()
}

#[test]
fn constant_field_survives_finite_element_interpolation() {
    let field = Field::constant(5.0, regular(10.0));
    let (fields, _) = run(&request_for(7.5, "finite-element"), field);
    assert_eq!(fields.len(), 1);
    for &value in fields[0].values().iter() {
        assert!(is_close!(value, 5.0, abs_tol = 1e-12));
    }
}

#[test]
fn constant_field_survives_knn_interpolation() {
    let mut params = request_for(7.5, "k-nearest-neighbours");
    params.set_usize("nclosest", 4);
    let field = Field::constant(5.0, regular(10.0));
    let (fields, _) = run(&params, field);
    for &value in fields[0].values().iter() {
        assert!(is_close!(value, 5.0, abs_tol = 1e-12));
    }
}

#[test]
fn interpolating_onto_the_same_grid_is_identity() {
    // A pole-free domain keeps every grid position distinct, so nearest
    // neighbours are unambiguous.
    let area = vec![60.0, 0.0, -60.0, 350.0];
    let mut input_params = SimpleParametrisation::new();
    input_params.set_f64_array("increments", vec![10.0, 10.0]);
    input_params.set_f64_array("area", area.clone());
    let input = representation::build("regular-latlon", &input_params).unwrap();

    let values = Array1::from_iter((0..input.point_count()).map(|i| (i % 23) as f64 * 0.5));
    let field = Field::new(values.clone(), input, None).unwrap();

    let mut params = request_for(10.0, "nearest-neighbour");
    params.set_f64_array("grid.area", area);
    let (fields, _) = run(&params, field);
    assert_eq!(fields[0].values().len(), values.len());
    for (result, expected) in fields[0].values().iter().zip(values.iter()) {
        assert_eq!(result, expected);
    }
}

#[test]
fn grid_box_maximum_over_a_constant_field() {
    let mut params = request_for(30.0, "grid-box-statistic");
    params.set_string("statistic", "maximum");
    let field = Field::constant(4.25, regular(10.0));
    let (fields, _) = run(&params, field);
    // Every 30-degree cell contains 10-degree points, so nothing is
    // missing and the maximum of a constant is the constant.
    for &value in fields[0].values().iter() {
        assert_eq!(value, 4.25);
    }
}

#[test]
fn cropping_after_interpolation_restricts_the_domain() {
    let mut params = request_for(10.0, "nearest-neighbour");
    params.set_f64_array("area", vec![40.0, 10.0, -40.0, 90.0]);
    let field = Field::constant(2.0, regular(20.0));
    let (fields, _) = run(&params, field);

    let result = &fields[0];
    assert!(result.representation().point_count() < regular(10.0).point_count());
    for point in result.representation().points() {
        assert!(point.lat <= 40.0 && point.lat >= -40.0);
        assert!(point.lon >= 10.0 && point.lon <= 90.0);
    }
    for &value in result.values().iter() {
        assert_eq!(value, 2.0);
    }
}

#[test]
fn missing_values_stay_missing_through_knn() {
    let input = regular(10.0);
    let mut values = Array1::from_elem(input.point_count(), 1.5);
    // Mask out one entire 10-degree neighbourhood
    for (index, point) in input.points().enumerate() {
        if point.lat.abs() < 15.0 && (100.0..140.0).contains(&point.lon) {
            values[index] = 9999.0;
        }
    }
    let field = Field::new(values, input, Some(9999.0)).unwrap();

    let mut params = request_for(10.0, "k-nearest-neighbours");
    params.set_usize("nclosest", 4);
    params.set_string("non-linear", "missing-if-any-missing");
    let (fields, _) = run(&params, field);

    let result = &fields[0];
    let mut missing = 0usize;
    for (index, point) in result.representation().points().enumerate() {
        if point.lat.abs() < 15.0 && (100.0..140.0).contains(&point.lon) {
            assert!(result.is_missing(index), "at {:?}", point);
            missing += 1;
        }
    }
    assert!(missing > 0);
}
