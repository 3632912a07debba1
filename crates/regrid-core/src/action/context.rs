//! Execution context threaded through a plan.

use crate::caching::{CacheConfig, CacheOutcome};
use crate::errors::{RegridError, RegridResult};
use crate::field::Field;
use crate::representation::Representation;
use std::sync::Arc;

/// Counters accumulated while a plan executes.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Statistics {
    pub actions_executed: usize,
    pub transforms: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub extrapolated_points: usize,
    pub empty_cells: usize,
    pub masked_points: usize,
}

impl Statistics {
    pub fn record_cache(&mut self, outcome: CacheOutcome) {
        match outcome {
            CacheOutcome::SharedHit | CacheOutcome::DiskHit => self.cache_hits += 1,
            CacheOutcome::Assembled => self.cache_misses += 1,
        }
    }

    /// Fold another statistics record into this one.
    pub fn merge(&mut self, other: &Statistics) {
        self.actions_executed += other.actions_executed;
        self.transforms += other.transforms;
        self.cache_hits += other.cache_hits;
        self.cache_misses += other.cache_misses;
        self.extrapolated_points += other.extrapolated_points;
        self.empty_cells += other.empty_cells;
        self.masked_points += other.masked_points;
    }
}

/// The state a plan operates on: the fields currently flowing through the
/// pipeline, the cache configuration, and execution statistics.
///
/// All fields in a context share one representation; actions replace the
/// whole set in a single step. Scalar pipelines carry one field; the
/// vector transform consumes a vorticity/divergence pair and leaves a
/// u/v pair.
#[derive(Debug)]
pub struct Context<'a> {
    fields: Vec<Field>,
    cache: &'a CacheConfig,
    statistics: Statistics,
}

impl<'a> Context<'a> {
    pub fn new(fields: Vec<Field>, cache: &'a CacheConfig) -> Self {
        Self {
            fields,
            cache,
            statistics: Statistics::default(),
        }
    }

    pub fn single(field: Field, cache: &'a CacheConfig) -> Self {
        Self::new(vec![field], cache)
    }

    pub fn cache(&self) -> &'a CacheConfig {
        self.cache
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut [Field] {
        &mut self.fields
    }

    /// Replace the whole field set, e.g. after a vector transform.
    pub fn replace_fields(&mut self, fields: Vec<Field>) {
        self.fields = fields;
    }

    /// Consume the context, yielding the final fields and statistics.
    pub fn finish(self) -> (Vec<Field>, Statistics) {
        (self.fields, self.statistics)
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn statistics_mut(&mut self) -> &mut Statistics {
        &mut self.statistics
    }

    /// The representation shared by every field in the context.
    ///
    /// A context with fields on diverging representations is a logic
    /// error in the plan and is rejected.
    pub fn representation(&self) -> RegridResult<Arc<dyn Representation>> {
        let first = self
            .fields
            .first()
            .ok_or_else(|| RegridError::Error("the pipeline holds no field".to_string()))?;
        for field in &self.fields[1..] {
            if !field
                .representation()
                .is_same(first.representation().as_ref())
            {
                return Err(RegridError::Error(
                    "pipeline fields have diverging representations".to_string(),
                ));
            }
        }
        Ok(first.representation().clone())
    }
}
