//! Sparse interpolation weight matrices.
//!
//! A [`WeightMatrix`] maps input points (columns) to output points (rows).
//! It is assembled once from triplets, checked, optionally persisted as a
//! raw little-endian dump, and never mutated afterwards.

use crate::errors::{RegridError, RegridResult};
use crate::field::Field;
use crate::method::nonlinear::NonLinear;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::Array1;
use std::io::{Read, Write};

/// Tolerance for the partition-of-unity row check.
pub const ROW_SUM_TOLERANCE: f64 = 1e-10;

/// One interpolation weight: output row, input column, weight.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Triplet {
    pub row: usize,
    pub col: usize,
    pub weight: f64,
}

impl Triplet {
    pub fn new(row: usize, col: usize, weight: f64) -> Self {
        Self { row, col, weight }
    }
}

/// Collects triplets during assembly and compresses them into a matrix.
#[derive(Debug)]
pub struct WeightMatrixBuilder {
    rows: usize,
    cols: usize,
    triplets: Vec<Triplet>,
    normalised: bool,
}

impl WeightMatrixBuilder {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            triplets: Vec::new(),
            normalised: true,
        }
    }

    /// Declare that rows of this matrix deliberately do not sum to one.
    pub fn without_normalisation(mut self) -> Self {
        self.normalised = false;
        self
    }

    pub fn push(&mut self, row: usize, col: usize, weight: f64) {
        debug_assert!(row < self.rows && col < self.cols);
        self.triplets.push(Triplet::new(row, col, weight));
    }

    /// Append a full row of `(column, weight)` pairs, rescaled to sum to
    /// one when normalisation is on.
    pub fn push_row(&mut self, row: usize, entries: &[(usize, f64)]) {
        if self.normalised {
            let total: f64 = entries.iter().map(|(_, w)| w).sum();
            if total > 0.0 {
                for &(col, weight) in entries {
                    self.push(row, col, weight / total);
                }
                return;
            }
        }
        for &(col, weight) in entries {
            self.push(row, col, weight);
        }
    }

    /// Compress the triplets into row-major sparse storage.
    pub fn build(mut self) -> WeightMatrix {
        self.triplets
            .sort_by(|a, b| (a.row, a.col).cmp(&(b.row, b.col)));
        let mut row_offsets = vec![0usize; self.rows + 1];
        for triplet in &self.triplets {
            row_offsets[triplet.row + 1] += 1;
        }
        for row in 0..self.rows {
            row_offsets[row + 1] += row_offsets[row];
        }
        let columns = self.triplets.iter().map(|t| t.col).collect();
        let weights = self.triplets.iter().map(|t| t.weight).collect();
        WeightMatrix {
            rows: self.rows,
            cols: self.cols,
            row_offsets,
            columns,
            weights,
            normalised: self.normalised,
        }
    }
}

/// A read-only sparse matrix of interpolation weights.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightMatrix {
    rows: usize,
    cols: usize,
    row_offsets: Vec<usize>,
    columns: Vec<usize>,
    weights: Vec<f64>,
    normalised: bool,
}

impl WeightMatrix {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn entry_count(&self) -> usize {
        self.weights.len()
    }

    pub fn normalised(&self) -> bool {
        self.normalised
    }

    /// The `(column, weight)` entries of one row.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_offsets[row]..self.row_offsets[row + 1];
        self.columns[range.clone()]
            .iter()
            .cloned()
            .zip(self.weights[range].iter().cloned())
    }

    /// Verify the partition-of-unity invariant: every non-empty row sums
    /// to one within [`ROW_SUM_TOLERANCE`]. Skipped for matrices declared
    /// unnormalised.
    pub fn check_row_sums(&self) -> RegridResult<()> {
        if !self.normalised {
            return Ok(());
        }
        for row in 0..self.rows {
            let sum: f64 = self.row(row).map(|(_, weight)| weight).sum();
            let empty = self.row_offsets[row] == self.row_offsets[row + 1];
            if !empty && (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
                return Err(RegridError::Error(format!(
                    "weight matrix row {} sums to {} instead of 1",
                    row, sum
                )));
            }
        }
        Ok(())
    }

    /// Resample a field through this matrix under the given treatment.
    ///
    /// Rows without any usable contributor come out missing; the result
    /// carries the input field's missing-value metadata, falling back to
    /// NaN when the input had none.
    pub fn apply(&self, field: &Field, treatment: NonLinear) -> RegridResult<Array1<f64>> {
        if field.values().len() != self.cols {
            return Err(RegridError::FieldSizeMismatch {
                representation: field.representation().grid_name().to_string(),
                expected: self.cols,
                actual: field.values().len(),
            });
        }
        let missing = field.missing_value().unwrap_or(f64::NAN);
        let values = field.values();
        let mut output = Array1::from_elem(self.rows, missing);

        for row in 0..self.rows {
            let result = match treatment {
                NonLinear::MissingIfAnyMissing => {
                    let mut sum = 0.0;
                    let mut any = false;
                    let mut poisoned = false;
                    for (col, weight) in self.row(row) {
                        if field.is_missing(col) {
                            poisoned = true;
                            break;
                        }
                        sum += weight * values[col];
                        any = true;
                    }
                    (any && !poisoned).then_some(sum)
                }
                NonLinear::MissingIfAllMissing => {
                    let mut sum = 0.0;
                    let mut weight_sum = 0.0;
                    for (col, weight) in self.row(row) {
                        if !field.is_missing(col) {
                            sum += weight * values[col];
                            weight_sum += weight;
                        }
                    }
                    (weight_sum > 0.0).then(|| sum / weight_sum)
                }
                NonLinear::UnnormalisedSum => {
                    let mut sum = 0.0;
                    let mut any = false;
                    for (col, weight) in self.row(row) {
                        if !field.is_missing(col) {
                            sum += weight * values[col];
                        }
                        any = true;
                    }
                    any.then_some(sum)
                }
                NonLinear::Maximum => self
                    .row(row)
                    .filter(|&(col, _)| !field.is_missing(col))
                    .map(|(col, _)| values[col])
                    .fold(None, |best: Option<f64>, v| {
                        Some(best.map_or(v, |b| b.max(v)))
                    }),
                NonLinear::Minimum => self
                    .row(row)
                    .filter(|&(col, _)| !field.is_missing(col))
                    .map(|(col, _)| values[col])
                    .fold(None, |best: Option<f64>, v| {
                        Some(best.map_or(v, |b| b.min(v)))
                    }),
                NonLinear::Count => {
                    let mut entries = 0usize;
                    let mut present = 0usize;
                    for (col, _) in self.row(row) {
                        entries += 1;
                        if !field.is_missing(col) {
                            present += 1;
                        }
                    }
                    (entries > 0).then_some(present as f64)
                }
            };
            if let Some(value) = result {
                output[row] = value;
            }
        }
        Ok(output)
    }

    /// Raw little-endian dump of the sparse structure.
    pub fn write_to(&self, writer: &mut impl Write) -> std::io::Result<()> {
        writer.write_u64::<LittleEndian>(self.rows as u64)?;
        writer.write_u64::<LittleEndian>(self.cols as u64)?;
        writer.write_u64::<LittleEndian>(self.weights.len() as u64)?;
        writer.write_u8(self.normalised as u8)?;
        for &offset in &self.row_offsets {
            writer.write_u64::<LittleEndian>(offset as u64)?;
        }
        for &column in &self.columns {
            writer.write_u64::<LittleEndian>(column as u64)?;
        }
        for &weight in &self.weights {
            writer.write_f64::<LittleEndian>(weight)?;
        }
        Ok(())
    }

    /// Inverse of [`WeightMatrix::write_to`].
    pub fn read_from(reader: &mut impl Read) -> std::io::Result<Self> {
        let rows = reader.read_u64::<LittleEndian>()? as usize;
        let cols = reader.read_u64::<LittleEndian>()? as usize;
        let entries = reader.read_u64::<LittleEndian>()? as usize;
        let normalised = reader.read_u8()? != 0;
        let mut row_offsets = Vec::with_capacity(rows + 1);
        for _ in 0..=rows {
            row_offsets.push(reader.read_u64::<LittleEndian>()? as usize);
        }
        let mut columns = Vec::with_capacity(entries);
        for _ in 0..entries {
            columns.push(reader.read_u64::<LittleEndian>()? as usize);
        }
        let mut weights = Vec::with_capacity(entries);
        for _ in 0..entries {
            weights.push(reader.read_f64::<LittleEndian>()?);
        }
        Ok(Self {
            rows,
            cols,
            row_offsets,
            columns,
            weights,
            normalised,
        })
    }
}
