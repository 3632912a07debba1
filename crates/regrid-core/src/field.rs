//! The data being transformed: values plus the representation they live on.

use crate::errors::{RegridError, RegridResult};
use crate::representation::Representation;
use ndarray::Array1;
use std::sync::Arc;

/// A single field: one value per representation point, with optional
/// missing-value metadata.
///
/// The field is owned by whichever pipeline step currently holds it;
/// each step replaces both values and representation.
#[derive(Debug, Clone)]
pub struct Field {
    values: Array1<f64>,
    representation: Arc<dyn Representation>,
    missing_value: Option<f64>,
}

impl Field {
    pub fn new(
        values: Array1<f64>,
        representation: Arc<dyn Representation>,
        missing_value: Option<f64>,
    ) -> RegridResult<Self> {
        if values.len() != representation.point_count() {
            return Err(RegridError::FieldSizeMismatch {
                representation: representation.grid_name().to_string(),
                expected: representation.point_count(),
                actual: values.len(),
            });
        }
        Ok(Self {
            values,
            representation,
            missing_value,
        })
    }

    /// A field holding the same value everywhere.
    pub fn constant(value: f64, representation: Arc<dyn Representation>) -> Self {
        Self {
            values: Array1::from_elem(representation.point_count(), value),
            representation,
            missing_value: None,
        }
    }

    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn representation(&self) -> &Arc<dyn Representation> {
        &self.representation
    }

    pub fn missing_value(&self) -> Option<f64> {
        self.missing_value
    }

    /// Whether the value at `index` counts as missing.
    pub fn is_missing(&self, index: usize) -> bool {
        let value = self.values[index];
        value.is_nan()
            || self
                .missing_value
                .map_or(false, |missing| value == missing)
    }

    pub fn has_missing(&self) -> bool {
        (0..self.values.len()).any(|index| self.is_missing(index))
    }

    /// The value used to mark missing points, introducing NaN as the
    /// marker when none is configured.
    pub fn missing_marker(&mut self) -> f64 {
        *self.missing_value.get_or_insert(f64::NAN)
    }

    /// Replace values and representation in one step, preserving the
    /// missing-value metadata.
    pub fn replace(
        &mut self,
        values: Array1<f64>,
        representation: Arc<dyn Representation>,
    ) -> RegridResult<()> {
        if values.len() != representation.point_count() {
            return Err(RegridError::FieldSizeMismatch {
                representation: representation.grid_name().to_string(),
                expected: representation.point_count(),
                actual: values.len(),
            });
        }
        self.values = values;
        self.representation = representation;
        Ok(())
    }

    /// Mark the point at `index` missing.
    pub fn set_missing(&mut self, index: usize) {
        let marker = self.missing_marker();
        self.values[index] = marker;
    }
}
