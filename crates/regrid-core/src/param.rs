//! Key-value parameter lookup backing plan and factory configuration.
//!
//! The core never assumes which concrete source (request, field metadata,
//! configuration file) provides a parameter; it only consumes the
//! [`Parametrisation`] lookup interface. [`SimpleParametrisation`] is the
//! map-backed implementation used for embedding and tests.

use crate::errors::{RegridError, RegridResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A typed parameter value.
///
/// Integer-looking numbers deserialise as `Usize` before `F64`, so grid
/// counts written as `4` keep their integer type through a round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Usize(usize),
    F64(f64),
    String(String),
    F64Array(Vec<f64>),
}

/// Read access to named parameters.
///
/// Every getter returns `None` when the name is unknown or the value has a
/// different type; callers that require a parameter use the `require_*`
/// helpers, which convert absence into a [`RegridError::MissingParameter`].
pub trait Parametrisation: std::fmt::Debug {
    fn get_string(&self, name: &str) -> Option<String>;
    fn get_f64(&self, name: &str) -> Option<f64>;
    fn get_usize(&self, name: &str) -> Option<usize>;
    fn get_bool(&self, name: &str) -> Option<bool>;
    fn get_f64_array(&self, name: &str) -> Option<Vec<f64>>;

    fn has(&self, name: &str) -> bool {
        self.get_string(name).is_some()
            || self.get_f64(name).is_some()
            || self.get_usize(name).is_some()
            || self.get_bool(name).is_some()
            || self.get_f64_array(name).is_some()
    }

    fn require_string(&self, name: &str) -> RegridResult<String> {
        self.get_string(name).ok_or_raise(name)
    }

    fn require_f64(&self, name: &str) -> RegridResult<f64> {
        self.get_f64(name).ok_or_raise(name)
    }

    fn require_usize(&self, name: &str) -> RegridResult<usize> {
        self.get_usize(name).ok_or_raise(name)
    }

    fn require_f64_array(&self, name: &str) -> RegridResult<Vec<f64>> {
        self.get_f64_array(name).ok_or_raise(name)
    }
}

/// A parametrisation backed by an ordered map.
///
/// The map is ordered so that serialisation and hashing are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimpleParametrisation {
    values: BTreeMap<String, Value>,
}

impl SimpleParametrisation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: Value) -> &mut Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn set_string(&mut self, name: &str, value: &str) -> &mut Self {
        self.set(name, Value::String(value.to_string()))
    }

    pub fn set_f64(&mut self, name: &str, value: f64) -> &mut Self {
        self.set(name, Value::F64(value))
    }

    pub fn set_usize(&mut self, name: &str, value: usize) -> &mut Self {
        self.set(name, Value::Usize(value))
    }

    pub fn set_bool(&mut self, name: &str, value: bool) -> &mut Self {
        self.set(name, Value::Bool(value))
    }

    pub fn set_f64_array(&mut self, name: &str, value: Vec<f64>) -> &mut Self {
        self.set(name, Value::F64Array(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// The parameters under `prefix.`, with the prefix stripped.
    ///
    /// Used to carve nested configuration (such as the land-sea-mask
    /// source grid) out of a flat request.
    pub fn scoped(&self, prefix: &str) -> SimpleParametrisation {
        let prefix = format!("{}.", prefix);
        let values = self
            .values
            .iter()
            .filter_map(|(name, value)| {
                name.strip_prefix(&prefix)
                    .map(|stripped| (stripped.to_string(), value.clone()))
            })
            .collect();
        SimpleParametrisation { values }
    }
}

impl Parametrisation for SimpleParametrisation {
    fn get_string(&self, name: &str) -> Option<String> {
        match self.values.get(name) {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn get_f64(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(Value::F64(v)) => Some(*v),
            Some(Value::Usize(v)) => Some(*v as f64),
            _ => None,
        }
    }

    fn get_usize(&self, name: &str) -> Option<usize> {
        match self.values.get(name) {
            Some(Value::Usize(v)) => Some(*v),
            _ => None,
        }
    }

    fn get_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(Value::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    fn get_f64_array(&self, name: &str) -> Option<Vec<f64>> {
        match self.values.get(name) {
            Some(Value::F64Array(v)) => Some(v.clone()),
            _ => None,
        }
    }

    fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

trait OrRaise<T> {
    fn ok_or_raise(self, name: &str) -> RegridResult<T>;
}

impl<T> OrRaise<T> for Option<T> {
    fn ok_or_raise(self, name: &str) -> RegridResult<T> {
        self.ok_or_else(|| RegridError::MissingParameter {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_access() {
        let mut params = SimpleParametrisation::new();
        params
            .set_string("grid", "regular-latlon")
            .set_usize("nclosest", 4)
            .set_f64("threshold", 0.5)
            .set_bool("strict", true)
            .set_f64_array("area", vec![90.0, 0.0, -90.0, 360.0]);

        assert_eq!(params.get_string("grid").unwrap(), "regular-latlon");
        assert_eq!(params.get_usize("nclosest").unwrap(), 4);
        assert_eq!(params.get_f64("threshold").unwrap(), 0.5);
        assert!(params.get_bool("strict").unwrap());
        assert_eq!(params.get_f64_array("area").unwrap().len(), 4);

        // Integer values are also readable as floats
        assert_eq!(params.get_f64("nclosest").unwrap(), 4.0);
        // but not the other way around
        assert!(params.get_usize("threshold").is_none());
    }

    #[test]
    fn missing_parameter_is_an_error() {
        let params = SimpleParametrisation::new();
        let err = params.require_usize("truncation").unwrap_err();
        assert!(err.to_string().contains("truncation"));
    }

    #[test]
    fn round_trip_preserves_types() {
        let mut params = SimpleParametrisation::new();
        params.set_usize("n", 640).set_f64("west", -10.5);

        let serialised = serde_json::to_string(&params).unwrap();
        let restored: SimpleParametrisation = serde_json::from_str(&serialised).unwrap();
        assert_eq!(params, restored);
        assert_eq!(restored.get_usize("n").unwrap(), 640);
    }
}
